//! Entry point tying routing, rewriting, execution and merging together.

use std::sync::Arc;

use sharding_error::Result;
use tracing::debug;

use crate::config::props::ConfigProps;
use crate::config::rule::ShardingRuleConfig;
use crate::execute::executor::{DataSourceMap, ShardExecutor};
use crate::execute::sql_log::SqlLogger;
use crate::execute::{ExecutionContext, ExecutionUnit};
use crate::merge::result::{MergedResult, QueryResult};
use crate::merge::{DatabaseDialect, MergeEngine, merge_update_counts};
use crate::registry::ExtensionRegistry;
use crate::rewrite::SqlRewriteEngine;
use crate::route::context::RouteContext;
use crate::route::route;
use crate::rule::ShardingRule;
use crate::statement::LogicSql;

/// Processes logical statements against one sharding rule.
///
/// Routing, rewriting and merging only read the rule, so a kernel can be
/// shared between any number of concurrent statements.
#[derive(Debug)]
pub struct ShardingKernel {
    rule: Arc<ShardingRule>,
    props: ConfigProps,
    dialect: DatabaseDialect,
    rewrite_engine: SqlRewriteEngine,
    merge_engine: MergeEngine,
    executor: ShardExecutor,
    sql_logger: SqlLogger,
}

impl ShardingKernel {
    pub fn try_new(rule: Arc<ShardingRule>, props: ConfigProps, dialect: DatabaseDialect) -> Result<Self> {
        let executor = ShardExecutor::try_new(props.max_connections_size_per_query)?;
        Ok(ShardingKernel {
            merge_engine: MergeEngine::new(rule.clone(), dialect),
            rewrite_engine: SqlRewriteEngine::default(),
            sql_logger: SqlLogger::new(props.sql_simple),
            executor,
            rule,
            props,
            dialect,
        })
    }

    /// Build the rule with the built-in algorithms.
    pub fn try_from_config(config: &ShardingRuleConfig, props: ConfigProps, dialect: DatabaseDialect) -> Result<Self> {
        let rule = ShardingRule::try_from_config(config, &ExtensionRegistry::with_builtins())?;
        Self::try_new(Arc::new(rule), props, dialect)
    }

    pub fn rule(&self) -> &Arc<ShardingRule> {
        &self.rule
    }

    pub fn props(&self) -> &ConfigProps {
        &self.props
    }

    pub fn dialect(&self) -> DatabaseDialect {
        self.dialect
    }

    pub fn route(&self, logic_sql: LogicSql) -> Result<RouteContext> {
        route(&self.rule, logic_sql)
    }

    pub fn rewrite(&self, route: &RouteContext) -> Result<Vec<ExecutionUnit>> {
        self.rewrite_engine.rewrite(&self.rule, route)
    }

    /// Route and rewrite, logging the SQL when `sql_show` is on.
    pub fn prepare(&self, logic_sql: LogicSql) -> Result<ExecutionContext> {
        let route = self.route(logic_sql)?;
        let units = self.rewrite(&route)?;
        if self.props.sql_show {
            self.sql_logger.log(&route.logic_sql.sql, &units);
        }
        Ok(ExecutionContext { route, units })
    }

    pub fn merge(&self, ctx: &ExecutionContext, results: Vec<Box<dyn QueryResult>>) -> Result<Box<dyn MergedResult>> {
        let logic_sql = &ctx.route.logic_sql;
        self.merge_engine
            .merge(&logic_sql.statement, &logic_sql.parameters, results)
    }

    pub async fn execute_query(&self, sources: &DataSourceMap, logic_sql: LogicSql) -> Result<Box<dyn MergedResult>> {
        let ctx = self.prepare(logic_sql)?;
        let results = self.executor.query(sources, ctx.units.clone()).await?;
        debug!(results = results.len(), "merging query results");
        self.merge(&ctx, results)
    }

    /// Total affected rows across every unit.
    pub async fn execute_update(&self, sources: &DataSourceMap, logic_sql: LogicSql) -> Result<u64> {
        let ctx = self.prepare(logic_sql)?;
        let counts = self.executor.update(sources, ctx.units).await?;
        Ok(merge_update_counts(&counts))
    }
}
