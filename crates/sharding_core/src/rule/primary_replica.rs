//! Read/write splitting between a primary and its replicas.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use sharding_error::{Result, ShardingError};

use crate::config::rule::PrimaryReplicaConfig;
use crate::registry::ExtensionRegistry;

pub trait ReplicaLoadBalancer: fmt::Debug + Sync + Send {
    fn balancer_type(&self) -> &'static str;

    /// Pick one of the replicas. `replicas` is never empty.
    fn choose<'a>(&self, group: &str, replicas: &'a [String]) -> &'a str;
}

#[derive(Debug, Default)]
pub struct RoundRobinLoadBalancer {
    counter: AtomicUsize,
}

impl RoundRobinLoadBalancer {
    pub const TYPE: &'static str = "ROUND_ROBIN";
}

impl ReplicaLoadBalancer for RoundRobinLoadBalancer {
    fn balancer_type(&self) -> &'static str {
        Self::TYPE
    }

    fn choose<'a>(&self, _group: &str, replicas: &'a [String]) -> &'a str {
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % replicas.len();
        &replicas[idx]
    }
}

#[derive(Debug, Default)]
pub struct RandomLoadBalancer;

impl RandomLoadBalancer {
    pub const TYPE: &'static str = "RANDOM";
}

impl ReplicaLoadBalancer for RandomLoadBalancer {
    fn balancer_type(&self) -> &'static str {
        Self::TYPE
    }

    fn choose<'a>(&self, _group: &str, replicas: &'a [String]) -> &'a str {
        let idx = rand::rng().random_range(0..replicas.len());
        &replicas[idx]
    }
}

#[derive(Debug, Clone)]
pub struct PrimaryReplicaGroup {
    /// Logical data source name.
    pub name: String,
    pub primary: String,
    pub replicas: Vec<String>,
    pub balancer: Arc<dyn ReplicaLoadBalancer>,
}

impl PrimaryReplicaGroup {
    /// Actual data source for a read. Falls back to the primary if there are
    /// no replicas.
    pub fn read_data_source(&self) -> &str {
        if self.replicas.is_empty() {
            return &self.primary;
        }
        self.balancer.choose(&self.name, &self.replicas)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrimaryReplicaRule {
    groups: Vec<PrimaryReplicaGroup>,
}

impl PrimaryReplicaRule {
    pub fn try_from_config(configs: &[PrimaryReplicaConfig], registry: &ExtensionRegistry) -> Result<Self> {
        let mut groups: Vec<PrimaryReplicaGroup> = Vec::with_capacity(configs.len());
        for config in configs {
            if groups.iter().any(|g| g.name == config.name) {
                return Err(ShardingError::config("Duplicate primary replica group")
                    .with_field("group", config.name.clone()));
            }
            let balancer_type = config
                .load_balancer
                .as_deref()
                .unwrap_or(RoundRobinLoadBalancer::TYPE);
            groups.push(PrimaryReplicaGroup {
                name: config.name.clone(),
                primary: config.primary_data_source.clone(),
                replicas: config.replica_data_sources.clone(),
                balancer: registry.create_load_balancer(balancer_type)?,
            });
        }
        Ok(PrimaryReplicaRule { groups })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[PrimaryReplicaGroup] {
        &self.groups
    }

    pub fn find_group(&self, name: &str) -> Option<&PrimaryReplicaGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}
