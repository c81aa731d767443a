//! Immutable sharding rule built from configuration.

pub mod algorithm;
pub mod data_node;
pub mod encrypt;
pub mod key_generator;
pub mod primary_replica;
pub mod strategy;
pub mod table_rule;

use std::collections::HashMap;
use std::sync::Arc;

use data_node::{DataNode, expand_inline_expression};
use encrypt::EncryptRule;
use indexmap::IndexMap;
use key_generator::KeyGenerator;
use primary_replica::PrimaryReplicaRule;
use sharding_error::{Result, ShardingError};
use strategy::ShardingStrategy;
use table_rule::{GenerateKey, TableRule};
use tracing::debug;

use self::algorithm::ShardingAlgorithm;
use crate::config::rule::{KeyGenerateConfig, ShardingRuleConfig, StrategyConfig};
use crate::registry::ExtensionRegistry;
use crate::value::ScalarValue;

#[derive(Debug, Clone)]
pub struct ShardingRule {
    /// Lower cased logic table name to rule, in configuration order.
    table_rules: IndexMap<String, TableRule>,
    /// Lower cased table names, one entry per binding group.
    binding_groups: Vec<Vec<String>>,
    broadcast_tables: Vec<String>,
    data_source_names: Vec<String>,
    default_data_source: Option<String>,
    encrypt_rule: EncryptRule,
    primary_replica_rule: PrimaryReplicaRule,
}

struct RuleBuilder<'a> {
    config: &'a ShardingRuleConfig,
    algorithms: HashMap<&'a str, Arc<dyn ShardingAlgorithm>>,
    key_generators: HashMap<&'a str, Arc<dyn KeyGenerator>>,
}

impl RuleBuilder<'_> {
    fn strategy(&self, config: Option<&StrategyConfig>, default: &ShardingStrategy) -> Result<ShardingStrategy> {
        match config {
            None => Ok(default.clone()),
            Some(config) => self.build_strategy(config),
        }
    }

    fn build_strategy(&self, config: &StrategyConfig) -> Result<ShardingStrategy> {
        match config {
            StrategyConfig::None => Ok(ShardingStrategy::None),
            StrategyConfig::Standard {
                sharding_column,
                algorithm_name,
            } => {
                if sharding_column.trim().is_empty() {
                    return Err(ShardingError::config("Sharding column cannot be empty")
                        .with_field("algorithm", algorithm_name.clone()));
                }
                let algorithm = self.algorithms.get(algorithm_name.as_str()).ok_or_else(|| {
                    ShardingError::config("Missing sharding algorithm").with_field("algorithm", algorithm_name.clone())
                })?;
                Ok(ShardingStrategy::Standard {
                    column: sharding_column.clone(),
                    algorithm: algorithm.clone(),
                })
            }
        }
    }

    fn generate_key(&self, config: Option<&KeyGenerateConfig>) -> Result<Option<GenerateKey>> {
        let Some(config) = config.or(self.config.default_key_generate.as_ref()) else {
            return Ok(None);
        };
        let generator = self
            .key_generators
            .get(config.key_generator_name.as_str())
            .ok_or_else(|| {
                ShardingError::config("Missing key generator")
                    .with_field("key_generator", config.key_generator_name.clone())
            })?;
        Ok(Some(GenerateKey {
            column: config.column.clone(),
            generator: generator.clone(),
        }))
    }
}

impl ShardingRule {
    pub fn try_from_config(config: &ShardingRuleConfig, registry: &ExtensionRegistry) -> Result<Self> {
        let mut algorithms = HashMap::new();
        for (name, algorithm) in &config.sharding_algorithms {
            let algorithm = registry.create_algorithm(algorithm).map_err(|e| e.with_field("algorithm", name))?;
            algorithms.insert(name.as_str(), algorithm);
        }
        let mut key_generators = HashMap::new();
        for (name, generator) in &config.key_generators {
            let generator = registry
                .create_key_generator(generator)
                .map_err(|e| e.with_field("key_generator", name))?;
            key_generators.insert(name.as_str(), generator);
        }
        let builder = RuleBuilder {
            config,
            algorithms,
            key_generators,
        };

        let default_database_strategy = match &config.default_database_strategy {
            Some(c) => builder.build_strategy(c)?,
            None => ShardingStrategy::None,
        };
        let default_table_strategy = match &config.default_table_strategy {
            Some(c) => builder.build_strategy(c)?,
            None => ShardingStrategy::None,
        };

        let mut data_source_names: Vec<String> = Vec::new();
        let mut add_data_source = |name: &str| {
            if !data_source_names.iter().any(|n| n == name) {
                data_source_names.push(name.to_string());
            }
        };
        for name in &config.data_sources {
            add_data_source(name);
        }

        let mut table_rules = IndexMap::with_capacity(config.tables.len());
        for table in &config.tables {
            let nodes = match &table.actual_data_nodes {
                Some(expr) => expand_inline_expression(expr)?
                    .iter()
                    .map(|node| DataNode::parse(node))
                    .collect::<Result<Vec<_>>>()?,
                None => config
                    .data_sources
                    .iter()
                    .map(|ds| DataNode::new(ds, &table.logic_table))
                    .collect(),
            };
            if nodes.is_empty() {
                return Err(ShardingError::config("Table rule has no actual data nodes")
                    .with_field("table", table.logic_table.clone()));
            }
            for node in &nodes {
                add_data_source(&node.data_source);
            }

            let rule = TableRule::new(
                table.logic_table.clone(),
                nodes,
                builder
                    .strategy(table.database_strategy.as_ref(), &default_database_strategy)
                    .map_err(|e| e.with_field("table", &table.logic_table))?,
                builder
                    .strategy(table.table_strategy.as_ref(), &default_table_strategy)
                    .map_err(|e| e.with_field("table", &table.logic_table))?,
                builder
                    .generate_key(table.key_generate.as_ref())
                    .map_err(|e| e.with_field("table", &table.logic_table))?,
            );
            if table_rules.insert(table.logic_table.to_lowercase(), rule).is_some() {
                return Err(ShardingError::config("Duplicate table rule").with_field("table", table.logic_table.clone()));
            }
        }

        if let Some(default) = &config.default_data_source {
            add_data_source(default);
        }

        let mut binding_groups = Vec::with_capacity(config.binding_tables.len());
        for group in &config.binding_tables {
            let group: Vec<String> = group.iter().map(|t| t.to_lowercase()).collect();
            for table in &group {
                if !table_rules.contains_key(table) {
                    return Err(ShardingError::config("Binding table has no table rule").with_field("table", table));
                }
            }
            binding_groups.push(group);
        }

        let encrypt_rule = match &config.encrypt {
            Some(encrypt) => EncryptRule::try_from_config(encrypt, registry)?,
            None => EncryptRule::default(),
        };
        let primary_replica_rule = PrimaryReplicaRule::try_from_config(&config.primary_replica, registry)?;

        debug!(
            tables = table_rules.len(),
            binding_groups = binding_groups.len(),
            data_sources = data_source_names.len(),
            "built sharding rule"
        );

        Ok(ShardingRule {
            table_rules,
            binding_groups,
            broadcast_tables: config.broadcast_tables.iter().map(|t| t.to_lowercase()).collect(),
            data_source_names,
            default_data_source: config.default_data_source.clone(),
            encrypt_rule,
            primary_replica_rule,
        })
    }

    pub fn table_rules(&self) -> impl Iterator<Item = &TableRule> {
        self.table_rules.values()
    }

    pub fn find_table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.table_rules.get(&logic_table.to_lowercase())
    }

    pub fn table_rule(&self, logic_table: &str) -> Result<&TableRule> {
        self.find_table_rule(logic_table)
            .ok_or_else(|| ShardingError::table_not_found(logic_table))
    }

    /// Find the rule owning an actual table name.
    pub fn find_table_rule_by_actual_table(&self, actual_table: &str) -> Option<&TableRule> {
        self.table_rules.values().find(|rule| rule.is_existed(actual_table))
    }

    pub fn is_sharding_table(&self, logic_table: &str) -> bool {
        self.find_table_rule(logic_table).is_some()
    }

    pub fn is_broadcast_table(&self, logic_table: &str) -> bool {
        self.broadcast_tables.contains(&logic_table.to_lowercase())
    }

    pub fn is_all_broadcast_tables(&self, logic_tables: &[&str]) -> bool {
        !logic_tables.is_empty() && logic_tables.iter().all(|t| self.is_broadcast_table(t))
    }

    /// Filter to tables with a table rule.
    pub fn sharding_logic_tables<'a>(&self, logic_tables: &[&'a str]) -> Vec<&'a str> {
        logic_tables
            .iter()
            .copied()
            .filter(|t| self.is_sharding_table(t))
            .collect()
    }

    pub fn find_binding_group(&self, logic_table: &str) -> Option<&[String]> {
        let table = logic_table.to_lowercase();
        self.binding_groups
            .iter()
            .find(|group| group.contains(&table))
            .map(|group| group.as_slice())
    }

    /// All tables are sharded and belong to the same binding group.
    pub fn is_all_binding_tables(&self, logic_tables: &[&str]) -> bool {
        let Some(first) = logic_tables.first() else {
            return false;
        };
        let Some(group) = self.find_binding_group(first) else {
            return false;
        };
        logic_tables.iter().all(|t| group.contains(&t.to_lowercase()))
    }

    /// Map an actual table of `other_logic_table` to the actual table of
    /// `logic_table` at the same position in `data_source`.
    pub fn binding_actual_table(
        &self,
        data_source: &str,
        logic_table: &str,
        other_logic_table: &str,
        other_actual_table: &str,
    ) -> Result<String> {
        let other_rule = self.table_rule(other_logic_table)?;
        let idx = other_rule
            .find_actual_table_index(data_source, other_actual_table)
            .ok_or_else(|| {
                ShardingError::sharding_algorithm("Actual table not found for binding table")
                    .with_field("data_source", data_source.to_string())
                    .with_field("table", other_actual_table.to_string())
            })?;
        let rule = self.table_rule(logic_table)?;
        rule.actual_tables_in(data_source)
            .into_iter()
            .nth(idx)
            .ok_or_else(|| {
                ShardingError::sharding_algorithm("Binding tables have different numbers of actual tables")
                    .with_field("table", logic_table.to_string())
                    .with_field("other_table", other_logic_table.to_string())
                    .with_field("data_source", data_source.to_string())
            })
    }

    /// Every logical data source, in configuration order.
    pub fn data_source_names(&self) -> &[String] {
        &self.data_source_names
    }

    pub fn default_data_source(&self) -> Option<&str> {
        self.default_data_source.as_deref()
    }

    /// If `column` is a sharding column of `logic_table`.
    pub fn is_sharding_column(&self, column: &str, logic_table: &str) -> bool {
        self.find_table_rule(logic_table)
            .is_some_and(|rule| rule.is_sharding_column(column))
    }

    pub fn generate_key_column(&self, logic_table: &str) -> Option<&str> {
        self.find_table_rule(logic_table)?.generate_key_column()
    }

    /// Generate `count` keys for `logic_table`.
    pub fn generate_keys(&self, logic_table: &str, count: usize) -> Result<Vec<ScalarValue>> {
        let rule = self.table_rule(logic_table)?;
        let generate_key = rule.generate_key.as_ref().ok_or_else(|| {
            ShardingError::config("Table has no key generator").with_field("table", logic_table.to_string())
        })?;
        (0..count).map(|_| generate_key.generator.generate_key()).collect()
    }

    pub fn encrypt_rule(&self) -> &EncryptRule {
        &self.encrypt_rule
    }

    pub fn primary_replica_rule(&self) -> &PrimaryReplicaRule {
        &self.primary_replica_rule
    }
}
