//! Execution units and their dispatch to shards.

pub mod executor;
pub mod group;
pub mod sql_log;

use std::fmt;

use crate::route::context::RouteContext;
use crate::value::ScalarValue;

/// Physical SQL with its bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlUnit {
    pub sql: String,
    pub parameters: Vec<ScalarValue>,
}

impl SqlUnit {
    pub fn new(sql: impl Into<String>, parameters: Vec<ScalarValue>) -> Self {
        SqlUnit {
            sql: sql.into(),
            parameters,
        }
    }
}

/// A physical statement targeted at one actual data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionUnit {
    pub data_source: String,
    pub sql_unit: SqlUnit,
}

impl ExecutionUnit {
    pub fn new(data_source: impl Into<String>, sql_unit: SqlUnit) -> Self {
        ExecutionUnit {
            data_source: data_source.into(),
            sql_unit,
        }
    }
}

impl fmt::Display for ExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ::: {}", self.data_source, self.sql_unit.sql)?;
        if !self.sql_unit.parameters.is_empty() {
            let params: Vec<String> = self.sql_unit.parameters.iter().map(|p| p.to_string()).collect();
            write!(f, " ::: [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

/// Everything needed to execute a logical statement and merge its results.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub route: RouteContext,
    pub units: Vec<ExecutionUnit>,
}

impl ExecutionContext {
    /// Distinct actual data sources in first-seen order.
    pub fn data_sources(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !out.contains(&unit.data_source.as_str()) {
                out.push(&unit.data_source);
            }
        }
        out
    }
}
