//! Routing for statements joining sharded tables that aren't all bound.
//!
//! Each group of bound tables is routed on its own, then the per group units
//! are joined on the data sources they share.

use sharding_error::{Result, ShardingError};

use super::context::{RouteResult, RouteUnit};
use super::standard::StandardRouteEngine;
use crate::condition::ShardingConditions;
use crate::rule::ShardingRule;

#[derive(Debug)]
pub struct ComplexRouteEngine<'a> {
    rule: &'a ShardingRule,
    tables: Vec<&'a str>,
}

impl<'a> ComplexRouteEngine<'a> {
    pub fn new(rule: &'a ShardingRule, tables: Vec<&'a str>) -> Self {
        ComplexRouteEngine { rule, tables }
    }

    /// Split tables into groups routed together, in statement order.
    fn groups(&self) -> Vec<Vec<&'a str>> {
        let mut groups: Vec<Vec<&'a str>> = Vec::new();
        for table in &self.tables {
            if groups.iter().flatten().any(|t| t.eq_ignore_ascii_case(table)) {
                continue;
            }
            let group = match self.rule.find_binding_group(table) {
                Some(binding) => self
                    .tables
                    .iter()
                    .copied()
                    .filter(|t| binding.contains(&t.to_lowercase()))
                    .collect(),
                None => vec![*table],
            };
            groups.push(group);
        }
        groups
    }

    pub fn route(&self, conditions: &ShardingConditions) -> Result<RouteResult> {
        let mut results = Vec::new();
        for group in self.groups() {
            results.push(StandardRouteEngine::new(self.rule, group).route(conditions)?);
        }
        cartesian_join(results, &self.tables)
    }
}

/// Join per group results on shared data sources.
fn cartesian_join(results: Vec<RouteResult>, tables: &[&str]) -> Result<RouteResult> {
    let Some(first) = results.first() else {
        return Ok(RouteResult::default());
    };
    // Any group routing nowhere means the join is empty.
    if results.iter().any(|r| r.units.is_empty()) {
        return Ok(RouteResult::default());
    }

    let data_sources: Vec<&str> = first
        .units
        .iter()
        .map(|u| u.data_source.logic_name.as_str())
        .filter(|ds| {
            results
                .iter()
                .all(|r| r.units.iter().any(|u| u.data_source.logic_name == *ds))
        })
        .fold(Vec::new(), |mut acc, ds| {
            if !acc.contains(&ds) {
                acc.push(ds);
            }
            acc
        });
    if data_sources.is_empty() {
        return Err(
            ShardingError::unsupported("Cannot join sharded tables without a common data source")
                .with_field("tables", tables.join(", ")),
        );
    }

    let mut joined = RouteResult::default();
    for data_source in data_sources {
        let mut partial: Vec<RouteUnit> = Vec::new();
        for (idx, result) in results.iter().enumerate() {
            let units: Vec<&RouteUnit> = result
                .units
                .iter()
                .filter(|u| u.data_source.logic_name == data_source)
                .collect();
            if idx == 0 {
                partial = units.into_iter().cloned().collect();
                continue;
            }
            let mut next = Vec::with_capacity(partial.len() * units.len());
            for left in &partial {
                for right in &units {
                    let mut unit = left.clone();
                    unit.tables.extend(right.tables.iter().cloned());
                    next.push(unit);
                }
            }
            partial = next;
        }
        for unit in partial {
            joined.push_unit(unit);
        }
    }
    Ok(joined)
}
