//! Serializable rule configuration.
//!
//! These types only describe a rule. They're turned into an immutable
//! [`ShardingRule`](crate::rule::ShardingRule) with the help of an
//! [`ExtensionRegistry`](crate::registry::ExtensionRegistry).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reference to a named algorithm plus its properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    #[serde(rename = "type")]
    pub algorithm_type: String,
    #[serde(default)]
    pub props: BTreeMap<String, String>,
}

impl AlgorithmConfig {
    pub fn new(algorithm_type: impl Into<String>) -> Self {
        AlgorithmConfig {
            algorithm_type: algorithm_type.into(),
            props: BTreeMap::new(),
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StrategyConfig {
    /// Shard on a single column with a named algorithm.
    Standard {
        sharding_column: String,
        algorithm_name: String,
    },
    /// Never narrow, always route to every target.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGenerateConfig {
    pub column: String,
    pub key_generator_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRuleConfig {
    pub logic_table: String,
    /// Inline expression such as `ds_${0..1}.t_order_${0..1}`. Defaults to
    /// the logic table on every configured data source.
    #[serde(default)]
    pub actual_data_nodes: Option<String>,
    #[serde(default)]
    pub database_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub table_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub key_generate: Option<KeyGenerateConfig>,
}

impl TableRuleConfig {
    pub fn new(logic_table: impl Into<String>, actual_data_nodes: impl Into<String>) -> Self {
        TableRuleConfig {
            logic_table: logic_table.into(),
            actual_data_nodes: Some(actual_data_nodes.into()),
            database_strategy: None,
            table_strategy: None,
            key_generate: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptColumnConfig {
    pub logic_column: String,
    pub cipher_column: String,
    #[serde(default)]
    pub assisted_query_column: Option<String>,
    #[serde(default)]
    pub plain_column: Option<String>,
    pub encryptor_name: String,
    #[serde(default)]
    pub assisted_query_encryptor_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptTableConfig {
    pub table: String,
    pub columns: Vec<EncryptColumnConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptRuleConfig {
    #[serde(default)]
    pub encryptors: BTreeMap<String, AlgorithmConfig>,
    #[serde(default)]
    pub tables: Vec<EncryptTableConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryReplicaConfig {
    /// Logical data source name used by table rules.
    pub name: String,
    pub primary_data_source: String,
    pub replica_data_sources: Vec<String>,
    /// Load balancer type, round robin when absent.
    #[serde(default)]
    pub load_balancer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingRuleConfig {
    /// Every logical data source. Data sources referenced by data nodes are
    /// added implicitly.
    #[serde(default)]
    pub data_sources: Vec<String>,
    #[serde(default)]
    pub tables: Vec<TableRuleConfig>,
    #[serde(default)]
    pub binding_tables: Vec<Vec<String>>,
    #[serde(default)]
    pub broadcast_tables: Vec<String>,
    #[serde(default)]
    pub default_data_source: Option<String>,
    #[serde(default)]
    pub default_database_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub default_table_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub default_key_generate: Option<KeyGenerateConfig>,
    #[serde(default)]
    pub sharding_algorithms: BTreeMap<String, AlgorithmConfig>,
    #[serde(default)]
    pub key_generators: BTreeMap<String, AlgorithmConfig>,
    #[serde(default)]
    pub encrypt: Option<EncryptRuleConfig>,
    #[serde(default)]
    pub primary_replica: Vec<PrimaryReplicaConfig>,
}
