//! Named constructors for pluggable algorithms.
//!
//! A registry is built once and handed to rule construction by reference.
//! Names are case insensitive.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use sharding_error::{Result, ShardingError};

use crate::config::rule::AlgorithmConfig;
use crate::rule::algorithm::{
    BoundaryRangeShardingAlgorithm,
    Crc32ModShardingAlgorithm,
    HashModShardingAlgorithm,
    ModShardingAlgorithm,
    ShardingAlgorithm,
    VolumeRangeShardingAlgorithm,
};
use crate::rule::encrypt::{Encryptor, Md5Encryptor, Rc4Encryptor};
use crate::rule::key_generator::{
    IncrementKeyGenerator,
    KeyGenerator,
    SnowflakeKeyGenerator,
    UuidKeyGenerator,
};
use crate::rule::primary_replica::{RandomLoadBalancer, ReplicaLoadBalancer, RoundRobinLoadBalancer};

pub type AlgorithmCtor = fn(&BTreeMap<String, String>) -> Result<Arc<dyn ShardingAlgorithm>>;
pub type KeyGeneratorCtor = fn(&BTreeMap<String, String>) -> Result<Arc<dyn KeyGenerator>>;
pub type EncryptorCtor = fn(&BTreeMap<String, String>) -> Result<Arc<dyn Encryptor>>;
pub type LoadBalancerCtor = fn() -> Arc<dyn ReplicaLoadBalancer>;

#[derive(Default)]
pub struct ExtensionRegistry {
    algorithms: HashMap<String, AlgorithmCtor>,
    key_generators: HashMap<String, KeyGeneratorCtor>,
    encryptors: HashMap<String, EncryptorCtor>,
    load_balancers: HashMap<String, LoadBalancerCtor>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("algorithms", &sorted_names(&self.algorithms))
            .field("key_generators", &sorted_names(&self.key_generators))
            .field("encryptors", &sorted_names(&self.encryptors))
            .field("load_balancers", &sorted_names(&self.load_balancers))
            .finish()
    }
}

fn sorted_names<F>(map: &HashMap<String, F>) -> Vec<&str> {
    let mut names: Vec<_> = map.keys().map(|k| k.as_str()).collect();
    names.sort_unstable();
    names
}

fn register<F>(map: &mut HashMap<String, F>, kind: &'static str, name: &str, ctor: F) -> Result<()> {
    let key = name.to_ascii_uppercase();
    if map.contains_key(&key) {
        return Err(ShardingError::config("Duplicate extension name")
            .with_field("kind", kind)
            .with_field("name", key));
    }
    map.insert(key, ctor);
    Ok(())
}

fn lookup<'a, F>(map: &'a HashMap<String, F>, kind: &'static str, name: &str) -> Result<&'a F> {
    map.get(&name.to_ascii_uppercase()).ok_or_else(|| {
        ShardingError::config("Unknown extension type")
            .with_field("kind", kind)
            .with_field("type", name.to_string())
    })
}

impl ExtensionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in extension registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        let algorithms: [(&str, AlgorithmCtor); 5] = [
            (ModShardingAlgorithm::TYPE, |props| Ok(Arc::new(ModShardingAlgorithm::try_new(props)?))),
            (HashModShardingAlgorithm::TYPE, |props| {
                Ok(Arc::new(HashModShardingAlgorithm::try_new(props)?))
            }),
            (Crc32ModShardingAlgorithm::TYPE, |props| {
                Ok(Arc::new(Crc32ModShardingAlgorithm::try_new(props)?))
            }),
            (VolumeRangeShardingAlgorithm::TYPE, |props| {
                Ok(Arc::new(VolumeRangeShardingAlgorithm::try_new(props)?))
            }),
            (BoundaryRangeShardingAlgorithm::TYPE, |props| {
                Ok(Arc::new(BoundaryRangeShardingAlgorithm::try_new(props)?))
            }),
        ];
        let key_generators: [(&str, KeyGeneratorCtor); 3] = [
            (SnowflakeKeyGenerator::TYPE, |props| Ok(Arc::new(SnowflakeKeyGenerator::try_new(props)?))),
            (UuidKeyGenerator::TYPE, |_| Ok(Arc::new(UuidKeyGenerator))),
            (IncrementKeyGenerator::TYPE, |props| Ok(Arc::new(IncrementKeyGenerator::try_new(props)?))),
        ];
        let encryptors: [(&str, EncryptorCtor); 2] = [
            (Md5Encryptor::TYPE, |_| Ok(Arc::new(Md5Encryptor))),
            (Rc4Encryptor::TYPE, |props| Ok(Arc::new(Rc4Encryptor::try_new(props)?))),
        ];
        let load_balancers: [(&str, LoadBalancerCtor); 2] = [
            (RoundRobinLoadBalancer::TYPE, || Arc::new(RoundRobinLoadBalancer::default())),
            (RandomLoadBalancer::TYPE, || Arc::new(RandomLoadBalancer)),
        ];

        // Built-in names are distinct, plain inserts are fine.
        for (name, ctor) in algorithms {
            self.algorithms.insert(name.to_string(), ctor);
        }
        for (name, ctor) in key_generators {
            self.key_generators.insert(name.to_string(), ctor);
        }
        for (name, ctor) in encryptors {
            self.encryptors.insert(name.to_string(), ctor);
        }
        for (name, ctor) in load_balancers {
            self.load_balancers.insert(name.to_string(), ctor);
        }
    }

    pub fn register_algorithm(&mut self, name: &str, ctor: AlgorithmCtor) -> Result<()> {
        register(&mut self.algorithms, "sharding algorithm", name, ctor)
    }

    pub fn register_key_generator(&mut self, name: &str, ctor: KeyGeneratorCtor) -> Result<()> {
        register(&mut self.key_generators, "key generator", name, ctor)
    }

    pub fn register_encryptor(&mut self, name: &str, ctor: EncryptorCtor) -> Result<()> {
        register(&mut self.encryptors, "encryptor", name, ctor)
    }

    pub fn register_load_balancer(&mut self, name: &str, ctor: LoadBalancerCtor) -> Result<()> {
        register(&mut self.load_balancers, "load balancer", name, ctor)
    }

    pub fn create_algorithm(&self, config: &AlgorithmConfig) -> Result<Arc<dyn ShardingAlgorithm>> {
        let ctor = lookup(&self.algorithms, "sharding algorithm", &config.algorithm_type)?;
        ctor(&config.props)
    }

    pub fn create_key_generator(&self, config: &AlgorithmConfig) -> Result<Arc<dyn KeyGenerator>> {
        let ctor = lookup(&self.key_generators, "key generator", &config.algorithm_type)?;
        ctor(&config.props)
    }

    pub fn create_encryptor(&self, config: &AlgorithmConfig) -> Result<Arc<dyn Encryptor>> {
        let ctor = lookup(&self.encryptors, "encryptor", &config.algorithm_type)?;
        ctor(&config.props)
    }

    pub fn create_load_balancer(&self, name: &str) -> Result<Arc<dyn ReplicaLoadBalancer>> {
        let ctor = lookup(&self.load_balancers, "load balancer", name)?;
        Ok(ctor())
    }
}

#[cfg(test)]
mod tests {
    use sharding_error::ErrorKind;

    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = ExtensionRegistry::with_builtins();
        let algorithm = registry
            .create_algorithm(&AlgorithmConfig::new("hash_mod").with_prop("sharding-count", "4"))
            .unwrap();
        assert_eq!("HASH_MOD", algorithm.algorithm_type());
    }

    #[test]
    fn duplicate_registration_errors() {
        let mut registry = ExtensionRegistry::with_builtins();
        let err = registry
            .register_key_generator("uuid", |_| Ok(Arc::new(UuidKeyGenerator)))
            .unwrap_err();
        assert_eq!(ErrorKind::Config, err.kind());
    }

    #[test]
    fn unknown_type() {
        let registry = ExtensionRegistry::new();
        let err = registry.create_load_balancer("ROUND_ROBIN").unwrap_err();
        assert_eq!(Some("ROUND_ROBIN"), err.field("type"));
    }
}
