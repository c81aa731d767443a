//! Routing for a single sharded table, or tables of one binding group.

use std::collections::{BTreeMap, BTreeSet};

use sharding_error::{Result, ShardingError};
use tracing::trace;

use super::context::{RouteMapper, RouteResult, RouteUnit};
use crate::condition::{ShardingCondition, ShardingConditions};
use crate::rule::ShardingRule;
use crate::rule::data_node::DataNode;
use crate::rule::table_rule::TableRule;

#[derive(Debug)]
pub struct StandardRouteEngine<'a> {
    rule: &'a ShardingRule,
    /// Tables routed together. More than one only if they're bound.
    tables: Vec<&'a str>,
}

impl<'a> StandardRouteEngine<'a> {
    pub fn new(rule: &'a ShardingRule, tables: Vec<&'a str>) -> Self {
        StandardRouteEngine { rule, tables }
    }

    pub fn route(&self, conditions: &ShardingConditions) -> Result<RouteResult> {
        let mut result = RouteResult::default();
        if conditions.is_always_false() {
            trace!(tables = ?self.tables, "always false condition, routing nowhere");
            return Ok(result);
        }

        if conditions.is_empty() {
            let (driving, nodes) = self.route_condition(None)?;
            for node in nodes {
                result.push_unit(self.unit_for(driving, &node)?);
            }
            return Ok(result);
        }

        for condition in &conditions.conditions {
            if condition.is_always_false() {
                result.original_data_nodes.push(Vec::new());
                continue;
            }
            let (driving, nodes) = self.route_condition(Some(condition))?;
            for node in &nodes {
                result.push_unit(self.unit_for(driving, node)?);
            }
            result.original_data_nodes.push(nodes);
        }
        Ok(result)
    }

    /// Route one condition. Returns the table whose nodes drive unit creation
    /// and its nodes.
    fn route_condition(&self, condition: Option<&ShardingCondition>) -> Result<(&'a str, Vec<DataNode>)> {
        let first = *self
            .tables
            .first()
            .ok_or_else(|| ShardingError::new("Standard routing requires at least one table"))?;
        let driving = condition
            .and_then(|c| self.tables.iter().copied().find(|t| c.has_table(t)))
            .unwrap_or(first);

        let driving_rule = self.rule.table_rule(driving)?;
        let mut nodes = route_table(driving_rule, condition)?;

        // Bound tables with their own constraints narrow the driving table
        // to the shards they share. Sharing none means the constraints
        // contradict each other across the binding.
        if let Some(condition) = condition {
            for other in self.tables.iter().copied().filter(|t| *t != driving) {
                if !condition.has_table(other) {
                    continue;
                }
                let other_rule = self.rule.table_rule(other)?;
                let other_nodes = route_table(other_rule, Some(condition))?;
                if nodes.is_empty() || other_nodes.is_empty() {
                    continue;
                }
                let other_indexes = shard_indexes(other_rule, &other_nodes);
                nodes.retain(|node| {
                    let idx = driving_rule.find_actual_table_index(&node.data_source, &node.table);
                    match (idx, other_indexes.get(&node.data_source)) {
                        (Some(idx), Some(idxs)) => idxs.contains(&idx),
                        _ => false,
                    }
                });
                if nodes.is_empty() {
                    return Err(ShardingError::sharding_algorithm("Binding tables routed to different shards")
                        .with_field("table", driving.to_string())
                        .with_field("other_table", other.to_string()));
                }
            }
        }

        Ok((driving, nodes))
    }

    fn unit_for(&self, driving: &str, node: &DataNode) -> Result<RouteUnit> {
        let mut tables = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            let actual = if *table == driving {
                node.table.clone()
            } else {
                self.rule
                    .binding_actual_table(&node.data_source, table, driving, &node.table)?
            };
            tables.push(RouteMapper::new(*table, actual));
        }
        Ok(RouteUnit::new(RouteMapper::identity(&node.data_source), tables))
    }
}

/// Nodes of one table satisfying a condition. No condition means every node.
pub fn route_table(rule: &TableRule, condition: Option<&ShardingCondition>) -> Result<Vec<DataNode>> {
    let values_for = |column: Option<&str>| {
        let column = column?;
        condition?.find(&rule.logic_table, column).map(|v| &v.values)
    };

    let data_sources = rule.database_strategy.do_sharding(
        &rule.actual_data_sources(),
        &rule.logic_table,
        values_for(rule.database_strategy.sharding_column()),
    )?;

    let table_values = values_for(rule.table_strategy.sharding_column());
    let mut nodes = Vec::new();
    for data_source in data_sources {
        let tables =
            rule.table_strategy
                .do_sharding(&rule.actual_tables_in(&data_source), &rule.logic_table, table_values)?;
        for table in tables {
            nodes.push(DataNode::new(data_source.clone(), table));
        }
    }
    Ok(nodes)
}

/// Data source to positions of the routed actual tables.
fn shard_indexes(rule: &TableRule, nodes: &[DataNode]) -> BTreeMap<String, BTreeSet<usize>> {
    let mut indexes: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
    for node in nodes {
        if let Some(idx) = rule.find_actual_table_index(&node.data_source, &node.table) {
            indexes.entry(node.data_source.clone()).or_default().insert(idx);
        }
    }
    indexes
}
