//! Dispatching execution units to the physical data sources.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use sharding_error::{Result, ShardingError};
use tracing::debug;

use super::{ExecutionUnit, SqlUnit};
use super::group::{ConnectionMode, DataSourceGroup, ExecutionGroupEngine};
use crate::merge::result::{MemoryQueryResult, QueryResult, release};

/// A physical data source able to run rewritten SQL.
///
/// Every call runs on its own connection from the implementation's point of
/// view. Units sharing a connection are issued one after another.
#[async_trait]
pub trait ShardDataSource: fmt::Debug + Send + Sync {
    async fn query(&self, unit: &SqlUnit) -> Result<Box<dyn QueryResult>>;

    /// Returns the number of affected rows.
    async fn update(&self, unit: &SqlUnit) -> Result<u64>;
}

/// Actual data source name to data source.
#[derive(Debug, Clone, Default)]
pub struct DataSourceMap {
    sources: HashMap<String, Arc<dyn ShardDataSource>>,
}

impl DataSourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, source: Arc<dyn ShardDataSource>) {
        self.sources.insert(name.into(), source);
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn ShardDataSource>> {
        self.sources.get(name).ok_or_else(|| {
            ShardingError::execution("Missing data source").with_field("data_source", name.to_string())
        })
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn unit_error(unit: &ExecutionUnit, err: ShardingError) -> ShardingError {
    ShardingError::execution("Failed to execute unit")
        .with_field("data_source", unit.data_source.clone())
        .with_field("sql", unit.sql_unit.sql.clone())
        .with_source(Box::new(err))
}

/// Runs units concurrently across connection groups and sequentially within
/// one. The first failure fails the whole statement.
///
/// Results come back grouped by data source in first-seen order, then in
/// unit order.
#[derive(Debug, Clone, Copy)]
pub struct ShardExecutor {
    grouping: ExecutionGroupEngine,
}

impl ShardExecutor {
    pub fn try_new(max_connections_size_per_query: u64) -> Result<Self> {
        Ok(ShardExecutor {
            grouping: ExecutionGroupEngine::try_new(max_connections_size_per_query)?,
        })
    }

    fn connections<'a>(
        sources: &'a DataSourceMap,
        groups: &'a [DataSourceGroup],
    ) -> Result<Vec<(&'a Arc<dyn ShardDataSource>, ConnectionMode, &'a [ExecutionUnit])>> {
        let mut connections = Vec::new();
        for group in groups {
            let source = sources.get(&group.data_source)?;
            for connection in &group.connections {
                connections.push((source, group.mode, connection.units.as_slice()));
            }
        }
        Ok(connections)
    }

    pub async fn query(&self, sources: &DataSourceMap, units: Vec<ExecutionUnit>) -> Result<Vec<Box<dyn QueryResult>>> {
        let groups = self.grouping.group(units);
        let connections = Self::connections(sources, &groups)?;
        debug!(connections = connections.len(), "executing query");

        let results = try_join_all(
            connections
                .into_iter()
                .map(|(source, mode, units)| query_connection(source.as_ref(), mode, units)),
        )
        .await?;
        Ok(results.into_iter().flatten().collect())
    }

    /// Affected row counts, one per unit.
    pub async fn update(&self, sources: &DataSourceMap, units: Vec<ExecutionUnit>) -> Result<Vec<u64>> {
        let groups = self.grouping.group(units);
        let connections = Self::connections(sources, &groups)?;
        debug!(connections = connections.len(), "executing update");

        let counts = try_join_all(
            connections
                .into_iter()
                .map(|(source, _, units)| update_connection(source.as_ref(), units)),
        )
        .await?;
        Ok(counts.into_iter().flatten().collect())
    }
}

async fn query_connection(
    source: &dyn ShardDataSource,
    mode: ConnectionMode,
    units: &[ExecutionUnit],
) -> Result<Vec<Box<dyn QueryResult>>> {
    let mut results: Vec<Box<dyn QueryResult>> = Vec::with_capacity(units.len());
    for unit in units {
        let mut result = match source.query(&unit.sql_unit).await {
            Ok(result) => result,
            Err(err) => {
                release(&mut results);
                return Err(unit_error(unit, err));
            }
        };
        // The connection is reused by the next unit.
        if mode == ConnectionMode::ConnectionStrictly {
            match MemoryQueryResult::materialize(result.as_mut()) {
                Ok(materialized) => result = Box::new(materialized),
                Err(err) => {
                    results.push(result);
                    release(&mut results);
                    return Err(unit_error(unit, err));
                }
            }
        }
        results.push(result);
    }
    Ok(results)
}

async fn update_connection(source: &dyn ShardDataSource, units: &[ExecutionUnit]) -> Result<Vec<u64>> {
    let mut counts = Vec::with_capacity(units.len());
    for unit in units {
        counts.push(source.update(&unit.sql_unit).await.map_err(|e| unit_error(unit, e))?);
    }
    Ok(counts)
}
