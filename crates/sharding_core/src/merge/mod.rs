//! Merging the physical results of every execution unit into one logical
//! result.

pub mod aggregation;
pub mod encrypt;
pub mod group_by;
pub mod iterator;
pub mod order_by;
pub mod pagination;
pub mod result;

use std::fmt;
use std::mem;
use std::str::FromStr;
use std::sync::Arc;

use aggregation::resolve_aggregations;
use encrypt::{EncryptDecoratorMergedResult, resolve_decryptors};
use group_by::{GroupByStreamMergedResult, group_by_memory};
use iterator::IteratorMergedResult;
use order_by::{OrderByStreamMergedResult, resolve_sort_keys};
use pagination::{LimitDecoratorMergedResult, RowNumberDecoratorMergedResult, TopAndRowNumberDecoratorMergedResult};
use result::{MemoryMergedResult, MergedResult, QueryResult, TransparentMergedResult, close_on_error};
use serde::{Deserialize, Serialize};
use sharding_error::{Result, ShardingError};
use tracing::trace;

use crate::rule::ShardingRule;
use crate::statement::SqlStatementContext;
use crate::statement::select::SelectStatementContext;
use crate::value::ScalarValue;

/// Database flavor of the physical data sources. Decides how pagination is
/// applied to merged rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DatabaseDialect {
    #[default]
    MySql,
    PostgreSql,
    H2,
    Oracle,
    SqlServer,
}

impl fmt::Display for DatabaseDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MySql => write!(f, "MySQL"),
            Self::PostgreSql => write!(f, "PostgreSQL"),
            Self::H2 => write!(f, "H2"),
            Self::Oracle => write!(f, "Oracle"),
            Self::SqlServer => write!(f, "SQLServer"),
        }
    }
}

impl FromStr for DatabaseDialect {
    type Err = ShardingError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "mysql" => Self::MySql,
            "postgresql" | "postgres" => Self::PostgreSql,
            "h2" => Self::H2,
            "oracle" => Self::Oracle,
            "sqlserver" => Self::SqlServer,
            _ => return Err(ShardingError::config("Unknown database dialect").with_field("dialect", s.to_string())),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MergeEngine {
    rule: Arc<ShardingRule>,
    dialect: DatabaseDialect,
}

impl MergeEngine {
    pub fn new(rule: Arc<ShardingRule>, dialect: DatabaseDialect) -> Self {
        MergeEngine { rule, dialect }
    }

    /// Merge the cursors of every execution unit, in unit order.
    pub fn merge(
        &self,
        statement: &SqlStatementContext,
        parameters: &[ScalarValue],
        results: Vec<Box<dyn QueryResult>>,
    ) -> Result<Box<dyn MergedResult>> {
        let Some(first) = results.first() else {
            return Ok(Box::new(MemoryMergedResult::new(Vec::new(), Vec::new())));
        };
        let SqlStatementContext::Select(select) = statement else {
            return Ok(Box::new(IteratorMergedResult::new(results)));
        };

        let encrypt = self.rule.encrypt_rule();
        let decryptors = if encrypt.is_empty() {
            Vec::new()
        } else {
            resolve_decryptors(encrypt, select, first.as_ref())
        };

        let merged: Box<dyn MergedResult> = if results.len() == 1 {
            let result = results.into_iter().next().ok_or_else(|| ShardingError::merge("Missing result"))?;
            Box::new(TransparentMergedResult::new(result))
        } else {
            // Cursors not yet handed to a merged result are closed on error.
            // Once handed over, dropping the merged result closes them.
            let mut results = results;
            let merged = close_on_error(&mut results, |results| self.build(select, results))?;
            self.decorate_pagination(select, parameters, merged)?
        };

        if decryptors.iter().any(Option::is_some) {
            return Ok(Box::new(EncryptDecoratorMergedResult::new(merged, decryptors)));
        }
        Ok(merged)
    }

    /// Resolves columns against the first cursor, then takes `results` once
    /// the merge strategy is known.
    fn build(
        &self,
        select: &SelectStatementContext,
        results: &mut Vec<Box<dyn QueryResult>>,
    ) -> Result<Box<dyn MergedResult>> {
        let first = results
            .first()
            .ok_or_else(|| ShardingError::merge("Missing result"))?
            .as_ref();
        let order_keys = resolve_sort_keys(&select.order_by, select, first)?;

        if !select.group_by().is_empty() || select.has_aggregation() {
            let aggregations = resolve_aggregations(select, first)?;
            let group_columns: Vec<_> = resolve_sort_keys(select.group_by(), select, first)?
                .into_iter()
                .map(|key| key.index)
                .collect();
            if select.is_same_group_by_and_order_by() {
                trace!("merging with stream group by");
                return Ok(Box::new(GroupByStreamMergedResult::try_new(
                    mem::take(results),
                    order_keys,
                    group_columns,
                    aggregations,
                )?));
            }
            trace!("merging with memory group by");
            return Ok(Box::new(group_by_memory(mem::take(results), &group_columns, &order_keys, &aggregations)?));
        }

        if select.is_distinct_row() {
            let columns: Vec<_> = (0..first.column_count()).collect();
            return Ok(Box::new(group_by_memory(mem::take(results), &columns, &order_keys, &[])?));
        }

        if !order_keys.is_empty() {
            return Ok(Box::new(OrderByStreamMergedResult::try_new(mem::take(results), order_keys)?));
        }

        Ok(Box::new(IteratorMergedResult::new(mem::take(results))))
    }

    fn decorate_pagination(
        &self,
        select: &SelectStatementContext,
        parameters: &[ScalarValue],
        merged: Box<dyn MergedResult>,
    ) -> Result<Box<dyn MergedResult>> {
        let Some(pagination) = select.pagination(parameters)? else {
            return Ok(merged);
        };
        if !pagination.has_pagination() {
            return Ok(merged);
        }
        Ok(match self.dialect {
            DatabaseDialect::MySql | DatabaseDialect::PostgreSql | DatabaseDialect::H2 => {
                Box::new(LimitDecoratorMergedResult::try_new(merged, &pagination)?)
            }
            DatabaseDialect::Oracle => Box::new(RowNumberDecoratorMergedResult::try_new(merged, &pagination)?),
            DatabaseDialect::SqlServer => Box::new(TopAndRowNumberDecoratorMergedResult::try_new(merged, &pagination)?),
        })
    }
}

/// Total rows affected by a DML statement across every unit.
pub fn merge_update_counts(counts: &[u64]) -> u64 {
    counts.iter().fold(0u64, |acc, count| acc.saturating_add(*count))
}
