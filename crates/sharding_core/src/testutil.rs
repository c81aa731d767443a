//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use sharding_error::{Result, ShardingError};

use crate::config::rule::{
    AlgorithmConfig,
    EncryptColumnConfig,
    EncryptRuleConfig,
    EncryptTableConfig,
    KeyGenerateConfig,
    PrimaryReplicaConfig,
    ShardingRuleConfig,
    StrategyConfig,
    TableRuleConfig,
};
use crate::merge::result::{MemoryQueryResult, QueryResult};
use crate::registry::ExtensionRegistry;
use crate::route::context::RouteContext;
use crate::route::route;
use crate::rule::ShardingRule;
use crate::statement::{LogicSql, SqlStatementContext};
use crate::value::ScalarValue;

fn standard(column: &str, algorithm: &str) -> Option<StrategyConfig> {
    Some(StrategyConfig::Standard {
        sharding_column: column.to_string(),
        algorithm_name: algorithm.to_string(),
    })
}

/// Two data sources with two tables each.
///
/// - `t_order` and `t_order_item` are bound, databases by `user_id % 2`,
///   tables by `order_id % 2`. `t_order.order_id` is generated by an
///   INCREMENT generator.
/// - `t_user` is split across databases by `user_id % 2`.
/// - `t_config` is broadcast.
pub fn order_rule_config() -> ShardingRuleConfig {
    let mut order = TableRuleConfig::new("t_order", "ds_${0..1}.t_order_${0..1}");
    order.database_strategy = standard("user_id", "database_mod");
    order.table_strategy = standard("order_id", "table_mod");
    order.key_generate = Some(KeyGenerateConfig {
        column: "order_id".to_string(),
        key_generator_name: "increment".to_string(),
    });

    let mut item = TableRuleConfig::new("t_order_item", "ds_${0..1}.t_order_item_${0..1}");
    item.database_strategy = standard("user_id", "database_mod");
    item.table_strategy = standard("order_id", "table_mod");

    let mut user = TableRuleConfig::new("t_user", "ds_${0..1}.t_user");
    user.database_strategy = standard("user_id", "database_mod");
    user.table_strategy = Some(StrategyConfig::None);

    ShardingRuleConfig {
        data_sources: vec!["ds_0".to_string(), "ds_1".to_string()],
        tables: vec![order, item, user],
        binding_tables: vec![vec!["t_order".to_string(), "t_order_item".to_string()]],
        broadcast_tables: vec!["t_config".to_string()],
        sharding_algorithms: [
            (
                "database_mod".to_string(),
                AlgorithmConfig::new("MOD").with_prop("sharding-count", "2"),
            ),
            (
                "table_mod".to_string(),
                AlgorithmConfig::new("MOD").with_prop("sharding-count", "2"),
            ),
        ]
        .into(),
        key_generators: [(
            "increment".to_string(),
            AlgorithmConfig::new("INCREMENT").with_prop("initial-value", "100"),
        )]
        .into(),
        ..Default::default()
    }
}

pub fn order_rule() -> ShardingRule {
    ShardingRule::try_from_config(&order_rule_config(), &ExtensionRegistry::with_builtins()).unwrap()
}

/// Same as [`order_rule`] with `ds_0` and `ds_1` each backed by a primary and
/// one replica.
pub fn primary_replica_rule() -> ShardingRule {
    let mut config = order_rule_config();
    config.primary_replica = (0..2)
        .map(|i| PrimaryReplicaConfig {
            name: format!("ds_{i}"),
            primary_data_source: format!("primary_{i}"),
            replica_data_sources: vec![format!("replica_{i}")],
            load_balancer: None,
        })
        .collect();
    ShardingRule::try_from_config(&config, &ExtensionRegistry::with_builtins()).unwrap()
}

/// [`order_rule`] with encrypted `t_user` columns.
///
/// - `phone` is RC4 encrypted into `phone_cipher` with an md5 digest in
///   `phone_assisted` and the plain text kept in `phone_plain`.
/// - `pwd` is md5 digested into `pwd_cipher` only.
pub fn encrypt_rule() -> ShardingRule {
    let mut config = order_rule_config();
    config.encrypt = Some(EncryptRuleConfig {
        encryptors: [
            ("md5".to_string(), AlgorithmConfig::new("MD5")),
            (
                "rc4".to_string(),
                AlgorithmConfig::new("RC4").with_prop("rc4-key-value", "test-key"),
            ),
        ]
        .into(),
        tables: vec![EncryptTableConfig {
            table: "t_user".to_string(),
            columns: vec![
                EncryptColumnConfig {
                    logic_column: "phone".to_string(),
                    cipher_column: "phone_cipher".to_string(),
                    assisted_query_column: Some("phone_assisted".to_string()),
                    plain_column: Some("phone_plain".to_string()),
                    encryptor_name: "rc4".to_string(),
                    assisted_query_encryptor_name: Some("md5".to_string()),
                },
                EncryptColumnConfig {
                    logic_column: "pwd".to_string(),
                    cipher_column: "pwd_cipher".to_string(),
                    assisted_query_column: None,
                    plain_column: None,
                    encryptor_name: "md5".to_string(),
                    assisted_query_encryptor_name: None,
                },
            ],
        }],
    });
    ShardingRule::try_from_config(&config, &ExtensionRegistry::with_builtins()).unwrap()
}

/// Route a statement against [`encrypt_rule`].
pub fn route_encrypted_sql(
    sql: &str,
    statement: impl Into<SqlStatementContext>,
    parameters: Vec<ScalarValue>,
) -> (ShardingRule, RouteContext) {
    let rule = encrypt_rule();
    let ctx = route(&rule, LogicSql::new(sql, statement, parameters)).unwrap();
    (rule, ctx)
}

/// Route a statement against [`order_rule`].
pub fn route_sql(
    sql: &str,
    statement: impl Into<SqlStatementContext>,
    parameters: Vec<ScalarValue>,
) -> (ShardingRule, RouteContext) {
    let rule = order_rule();
    let ctx = route(&rule, LogicSql::new(sql, statement, parameters)).unwrap();
    (rule, ctx)
}

/// Single `id` column cursor over `values`.
pub fn int_result(values: &[i64]) -> Box<dyn QueryResult> {
    Box::new(MemoryQueryResult::new(
        vec!["id".to_string()],
        values.iter().map(|v| vec![ScalarValue::Int64(*v)]).collect(),
    ))
}

/// Cursor over `rows` labelled with `labels`.
pub fn rows_result(labels: &[&str], rows: Vec<Vec<ScalarValue>>) -> Box<dyn QueryResult> {
    Box::new(MemoryQueryResult::new(
        labels.iter().map(|l| l.to_string()).collect(),
        rows,
    ))
}

/// Four cursors with two rows each, for pagination windows.
pub fn paged_results() -> Vec<Box<dyn QueryResult>> {
    (0..4).map(|i| int_result(&[i * 2, i * 2 + 1])).collect()
}

/// Cursor that yields `rows` rows then fails.
#[derive(Debug)]
pub struct FailingQueryResult {
    remaining: usize,
}

impl FailingQueryResult {
    pub fn after_rows(rows: usize) -> Self {
        FailingQueryResult { remaining: rows }
    }
}

impl QueryResult for FailingQueryResult {
    fn next(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            return Err(ShardingError::execution("Connection reset"));
        }
        self.remaining -= 1;
        Ok(true)
    }

    fn value(&self, _column: usize) -> Result<ScalarValue> {
        Ok(ScalarValue::Int64(self.remaining as i64))
    }

    fn column_count(&self) -> usize {
        1
    }

    fn column_label(&self, _column: usize) -> Option<&str> {
        Some("id")
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Wraps a cursor and counts how often it was closed.
#[derive(Debug)]
pub struct TrackedQueryResult {
    inner: Box<dyn QueryResult>,
    pub closed: Arc<AtomicUsize>,
}

impl TrackedQueryResult {
    pub fn new(inner: Box<dyn QueryResult>, closed: Arc<AtomicUsize>) -> Self {
        TrackedQueryResult { inner, closed }
    }
}

impl QueryResult for TrackedQueryResult {
    fn next(&mut self) -> Result<bool> {
        self.inner.next()
    }

    fn value(&self, column: usize) -> Result<ScalarValue> {
        self.inner.value(column)
    }

    fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    fn column_label(&self, column: usize) -> Option<&str> {
        self.inner.column_label(column)
    }

    fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}
