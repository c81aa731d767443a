//! Statement routing.
//!
//! Routing decides which data sources and actual tables a logical statement
//! targets. The engine used depends on the statement kind and on how the
//! referenced tables are configured:
//!
//! - DCL and DDL go to every node of the sharded tables they name, or every
//!   data source otherwise.
//! - Statements only touching broadcast tables go to one data source for
//!   reads and to every data source for writes.
//! - Statements without sharded tables go to the default data source.
//! - Sharded tables of a single binding group use the standard engine,
//!   anything else is routed per group and joined.

pub mod complex;
pub mod context;
pub mod primary_replica;
pub mod standard;

use complex::ComplexRouteEngine;
use context::{RouteContext, RouteMapper, RouteResult, RouteUnit};
use sharding_error::{Result, ShardingError};
use standard::StandardRouteEngine;
use tracing::debug;

use crate::condition::generated_key::GeneratedKeyContext;
use crate::condition::{ShardingConditions, extract_conditions};
use crate::rule::ShardingRule;
use crate::statement::{LogicSql, SqlStatementContext};

/// Route a logical statement.
pub fn route(rule: &ShardingRule, logic_sql: LogicSql) -> Result<RouteContext> {
    let generated_key = match &logic_sql.statement {
        SqlStatementContext::Insert(insert) => GeneratedKeyContext::try_new(rule, insert, &logic_sql.parameters)?,
        _ => None,
    };
    let conditions = extract_conditions(rule, &logic_sql.statement, &logic_sql.parameters, generated_key.as_ref())?;

    let mut route_result = route_statement(rule, &logic_sql.statement, &conditions)?;
    primary_replica::decorate(rule.primary_replica_rule(), &logic_sql.statement, &mut route_result);

    debug!(
        kind = %logic_sql.statement.kind(),
        units = route_result.units.len(),
        data_sources = ?route_result.actual_data_sources(),
        "routed statement"
    );

    Ok(RouteContext {
        logic_sql,
        route_result,
        generated_key,
    })
}

fn route_statement(
    rule: &ShardingRule,
    statement: &SqlStatementContext,
    conditions: &ShardingConditions,
) -> Result<RouteResult> {
    let tables = statement.table_names();
    let sharding_tables = rule.sharding_logic_tables(&tables);

    let mut result = match statement {
        SqlStatementContext::Dcl(_) if tables.is_empty() => route_data_sources(rule, &[]),
        SqlStatementContext::Dcl(_) | SqlStatementContext::Ddl(_) => {
            if sharding_tables.is_empty() {
                route_data_sources(rule, &tables)
            } else {
                route_table_nodes(rule, &sharding_tables)?
            }
        }
        _ if rule.is_all_broadcast_tables(&tables) => {
            if statement.is_read_only() {
                route_unicast(rule, &tables)
            } else {
                route_data_sources(rule, &tables)
            }
        }
        _ if sharding_tables.is_empty() => route_default(rule, &tables)?,
        _ if sharding_tables.len() == 1 || rule.is_all_binding_tables(&sharding_tables) => {
            StandardRouteEngine::new(rule, sharding_tables.clone()).route(conditions)?
        }
        _ => ComplexRouteEngine::new(rule, sharding_tables.clone()).route(conditions)?,
    };

    // Tables that aren't sharded keep their name on every unit.
    let unsharded: Vec<&str> = tables
        .iter()
        .copied()
        .filter(|t| !rule.is_sharding_table(t))
        .collect();
    if !sharding_tables.is_empty() && !unsharded.is_empty() {
        for unit in &mut result.units {
            unit.tables.extend(unsharded.iter().map(|t| RouteMapper::identity(*t)));
        }
    }

    Ok(result)
}

fn identity_mappers(tables: &[&str]) -> Vec<RouteMapper> {
    tables.iter().map(|t| RouteMapper::identity(*t)).collect()
}

/// One unit per data source.
fn route_data_sources(rule: &ShardingRule, tables: &[&str]) -> RouteResult {
    RouteResult::new(
        rule.data_source_names()
            .iter()
            .map(|ds| RouteUnit::new(RouteMapper::identity(ds), identity_mappers(tables)))
            .collect(),
    )
}

/// One unit per data node of every table.
fn route_table_nodes(rule: &ShardingRule, tables: &[&str]) -> Result<RouteResult> {
    let mut result = RouteResult::default();
    for table in tables {
        let table_rule = rule.table_rule(table)?;
        for node in table_rule.actual_data_nodes() {
            result.push_unit(RouteUnit::new(
                RouteMapper::identity(&node.data_source),
                vec![RouteMapper::new(*table, &node.table)],
            ));
        }
    }
    Ok(result)
}

/// A single unit on the first data source.
fn route_unicast(rule: &ShardingRule, tables: &[&str]) -> RouteResult {
    match rule.data_source_names().first() {
        Some(ds) => RouteResult::new(vec![RouteUnit::new(RouteMapper::identity(ds), identity_mappers(tables))]),
        None => RouteResult::default(),
    }
}

fn route_default(rule: &ShardingRule, tables: &[&str]) -> Result<RouteResult> {
    if let Some(ds) = rule.default_data_source() {
        return Ok(RouteResult::new(vec![RouteUnit::new(
            RouteMapper::identity(ds),
            identity_mappers(tables),
        )]));
    }
    match tables.iter().find(|t| !rule.is_broadcast_table(t)) {
        Some(table) => Err(ShardingError::table_not_found(*table)),
        // Statements without tables, e.g. `SELECT 1`.
        None => Ok(route_unicast(rule, tables)),
    }
}
