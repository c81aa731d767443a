//! Grouping execution units onto connections.
//!
//! A logical query holds at most `max_connections_size_per_query` connections
//! per data source. When every unit gets its own connection, results can be
//! streamed. Otherwise a connection runs several units one after another and
//! each result must be read into memory before the next unit starts.

use indexmap::IndexMap;
use sharding_error::{Result, ShardingError};

use super::ExecutionUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionMode {
    /// One connection per unit, results may stay open.
    MemoryStrictly,
    /// Units share connections, results are materialized.
    ConnectionStrictly,
}

/// Units executed in order on one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionGroup {
    pub units: Vec<ExecutionUnit>,
}

/// All connection groups for one data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceGroup {
    pub data_source: String,
    pub mode: ConnectionMode,
    pub connections: Vec<ConnectionGroup>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionGroupEngine {
    max_connections_size_per_query: usize,
}

impl ExecutionGroupEngine {
    pub fn try_new(max_connections_size_per_query: u64) -> Result<Self> {
        let max = usize::try_from(max_connections_size_per_query).map_err(|_| {
            ShardingError::config("Connection limit does not fit in usize")
                .with_field("max_connections_size_per_query", max_connections_size_per_query)
        })?;
        if max == 0 {
            return Err(ShardingError::config("Connection limit must be at least one")
                .with_field("max_connections_size_per_query", max));
        }
        Ok(ExecutionGroupEngine {
            max_connections_size_per_query: max,
        })
    }

    /// Group units by data source in first-seen order, then split each data
    /// source's units across connections.
    pub fn group(&self, units: Vec<ExecutionUnit>) -> Vec<DataSourceGroup> {
        let mut by_source: IndexMap<String, Vec<ExecutionUnit>> = IndexMap::new();
        for unit in units {
            by_source.entry(unit.data_source.clone()).or_default().push(unit);
        }

        by_source
            .into_iter()
            .map(|(data_source, units)| {
                let max = self.max_connections_size_per_query;
                let mode = if max < units.len() {
                    ConnectionMode::ConnectionStrictly
                } else {
                    ConnectionMode::MemoryStrictly
                };
                let per_connection = units.len().div_ceil(max).max(1);
                let connections = units
                    .chunks(per_connection)
                    .map(|chunk| ConnectionGroup { units: chunk.to_vec() })
                    .collect();
                DataSourceGroup {
                    data_source,
                    mode,
                    connections,
                }
            })
            .collect()
    }
}
