#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sharding_core::ShardingKernel;
use sharding_core::config::props::ConfigProps;
use sharding_core::config::rule::ShardingRuleConfig;
use sharding_core::execute::SqlUnit;
use sharding_core::execute::executor::{DataSourceMap, ShardDataSource};
use sharding_core::merge::DatabaseDialect;
use sharding_core::merge::result::{MemoryQueryResult, MergedResult, QueryResult};
use sharding_core::value::ScalarValue;
use sharding_error::{Result, ShardingError};

/// Two data sources, `t_order` split by `user_id % 2` and `order_id % 2`,
/// `t_user` split by `user_id % 2` with an encrypted `phone`, and a
/// broadcast `t_config`.
pub const RULE_JSON: &str = r#"{
    "data_sources": ["ds_0", "ds_1"],
    "tables": [
        {
            "logic_table": "t_order",
            "actual_data_nodes": "ds_${0..1}.t_order_${0..1}",
            "database_strategy": {"kind": "standard", "sharding_column": "user_id", "algorithm_name": "db_mod"},
            "table_strategy": {"kind": "standard", "sharding_column": "order_id", "algorithm_name": "table_mod"},
            "key_generate": {"column": "order_id", "key_generator_name": "increment"}
        },
        {
            "logic_table": "t_user",
            "actual_data_nodes": "ds_${0..1}.t_user",
            "database_strategy": {"kind": "standard", "sharding_column": "user_id", "algorithm_name": "db_mod"},
            "table_strategy": {"kind": "none"}
        }
    ],
    "broadcast_tables": ["t_config"],
    "sharding_algorithms": {
        "db_mod": {"type": "MOD", "props": {"sharding-count": "2"}},
        "table_mod": {"type": "MOD", "props": {"sharding-count": "2"}}
    },
    "key_generators": {"increment": {"type": "INCREMENT", "props": {"initial-value": "100"}}},
    "encrypt": {
        "encryptors": {
            "rc4": {"type": "RC4", "props": {"rc4-key-value": "integration"}},
            "md5": {"type": "MD5"}
        },
        "tables": [{
            "table": "t_user",
            "columns": [{
                "logic_column": "phone",
                "cipher_column": "phone_cipher",
                "assisted_query_column": "phone_assisted",
                "encryptor_name": "rc4",
                "assisted_query_encryptor_name": "md5"
            }]
        }]
    }
}"#;

pub fn rule_config() -> ShardingRuleConfig {
    serde_json::from_str(RULE_JSON).unwrap()
}

pub fn kernel(props: ConfigProps, dialect: DatabaseDialect) -> ShardingKernel {
    ShardingKernel::try_from_config(&rule_config(), props, dialect).unwrap()
}

/// Rows per actual table of one data source. Queries are answered with the
/// rows of the first table named in the SQL, regardless of predicates.
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: HashMap<String, (Vec<String>, Vec<Vec<ScalarValue>>)>,
    affected: u64,
    pub executed: Mutex<Vec<SqlUnit>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &str, labels: &[&str], rows: Vec<Vec<ScalarValue>>) -> Self {
        self.tables.insert(
            table.to_string(),
            (labels.iter().map(|l| l.to_string()).collect(), rows),
        );
        self
    }

    pub fn with_affected(mut self, affected: u64) -> Self {
        self.affected = affected;
        self
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed.lock().iter().map(|u| u.sql.clone()).collect()
    }
}

#[async_trait]
impl ShardDataSource for MemorySource {
    async fn query(&self, unit: &SqlUnit) -> Result<Box<dyn QueryResult>> {
        self.executed.lock().push(unit.clone());
        let (labels, rows) = unit
            .sql
            .split(|c: char| c.is_whitespace() || c == ',')
            .find_map(|word| self.tables.get(word))
            .ok_or_else(|| ShardingError::execution("Table not found").with_field("sql", unit.sql.clone()))?;
        Ok(Box::new(MemoryQueryResult::new(labels.clone(), rows.clone())))
    }

    async fn update(&self, unit: &SqlUnit) -> Result<u64> {
        self.executed.lock().push(unit.clone());
        Ok(self.affected)
    }
}

pub fn data_sources(sources: Vec<(&str, Arc<MemorySource>)>) -> DataSourceMap {
    let mut map = DataSourceMap::new();
    for (name, source) in sources {
        map.insert(name, source);
    }
    map
}

pub fn ints(values: &[i64]) -> Vec<Vec<ScalarValue>> {
    values.iter().map(|v| vec![ScalarValue::Int64(*v)]).collect()
}

/// Every row of a merged result, reading `columns` columns.
pub fn drain(mut merged: Box<dyn MergedResult>, columns: usize) -> Vec<Vec<ScalarValue>> {
    let mut rows = Vec::new();
    while merged.next().unwrap() {
        rows.push((0..columns).map(|c| merged.value(c).unwrap()).collect());
    }
    merged.close().unwrap();
    rows
}
