use std::fmt;

use crate::condition::generated_key::GeneratedKeyContext;
use crate::rule::data_node::DataNode;
use crate::statement::LogicSql;

/// Logic name to actual name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteMapper {
    pub logic_name: String,
    pub actual_name: String,
}

impl RouteMapper {
    pub fn new(logic_name: impl Into<String>, actual_name: impl Into<String>) -> Self {
        RouteMapper {
            logic_name: logic_name.into(),
            actual_name: actual_name.into(),
        }
    }

    /// Logic and actual name are the same.
    pub fn identity(name: impl Into<String>) -> Self {
        let name = name.into();
        RouteMapper {
            actual_name: name.clone(),
            logic_name: name,
        }
    }
}

/// One physical statement target: a data source and the actual tables the
/// statement's logic tables map to there.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteUnit {
    pub data_source: RouteMapper,
    pub tables: Vec<RouteMapper>,
}

impl RouteUnit {
    pub fn new(data_source: RouteMapper, tables: Vec<RouteMapper>) -> Self {
        RouteUnit { data_source, tables }
    }

    /// Actual table for a logic table.
    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|t| t.logic_name.eq_ignore_ascii_case(logic_table))
            .map(|t| t.actual_name.as_str())
    }

    /// Logic table for an actual table.
    pub fn logic_table(&self, actual_table: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|t| t.actual_name.eq_ignore_ascii_case(actual_table))
            .map(|t| t.logic_name.as_str())
    }

    /// If this unit targets `node`. Nodes name logic data sources.
    pub fn contains_data_node(&self, node: &DataNode) -> bool {
        self.data_source.logic_name == node.data_source
            && self
                .tables
                .iter()
                .any(|t| t.actual_name.eq_ignore_ascii_case(&node.table))
    }
}

impl fmt::Display for RouteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data_source.actual_name)?;
        for (idx, table) in self.tables.iter().enumerate() {
            let sep = if idx == 0 { ": " } else { ", " };
            write!(f, "{sep}{}->{}", table.logic_name, table.actual_name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteResult {
    /// Deduplicated, in routing order.
    pub units: Vec<RouteUnit>,
    /// For inserts, the data nodes each row routed to.
    pub original_data_nodes: Vec<Vec<DataNode>>,
}

impl RouteResult {
    pub fn new(units: Vec<RouteUnit>) -> Self {
        let mut result = RouteResult::default();
        for unit in units {
            result.push_unit(unit);
        }
        result
    }

    /// Add a unit unless an equal one exists.
    pub fn push_unit(&mut self, unit: RouteUnit) {
        if !self.units.contains(&unit) {
            self.units.push(unit);
        }
    }

    pub fn is_single_routing(&self) -> bool {
        self.units.len() == 1
    }

    /// Distinct actual data sources in unit order.
    pub fn actual_data_sources(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !out.contains(&unit.data_source.actual_name.as_str()) {
                out.push(&unit.data_source.actual_name);
            }
        }
        out
    }
}

/// Everything routing learned about a logical statement.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteContext {
    pub logic_sql: LogicSql,
    pub route_result: RouteResult,
    pub generated_key: Option<GeneratedKeyContext>,
}

impl RouteContext {
    pub fn units(&self) -> &[RouteUnit] {
        &self.route_result.units
    }
}
