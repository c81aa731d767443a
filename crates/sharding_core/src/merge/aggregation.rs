//! Aggregate functions recomputed across shards.

use std::cmp::Ordering;

use indexmap::IndexSet;
use sharding_error::{Result, ShardingError};

use super::result::{QueryResult, column_index};
use crate::statement::select::{AggregationKind, SelectStatementContext};
use crate::value::{NullsOrder, ScalarValue, compare_values};

/// Where an aggregation reads its inputs and writes its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationColumn {
    pub kind: AggregationKind,
    pub distinct: bool,
    /// Column holding the aggregation. The merged value replaces it.
    pub index: usize,
    /// Columns of the derived COUNT and SUM for AVG.
    pub avg_inputs: Option<(usize, usize)>,
}

impl AggregationColumn {
    pub fn new_unit(&self) -> AggregationUnit {
        AggregationUnit::new(self.kind, self.distinct)
    }

    /// Values of `row` this aggregation consumes.
    pub fn inputs(&self, row: &[ScalarValue]) -> Result<Vec<ScalarValue>> {
        let indexes = match self.avg_inputs {
            Some((count, sum)) => vec![count, sum],
            None => vec![self.index],
        };
        indexes
            .into_iter()
            .map(|idx| {
                row.get(idx).cloned().ok_or_else(|| {
                    ShardingError::merge("Aggregation column out of range").with_field("column", idx)
                })
            })
            .collect()
    }
}

/// Resolve every aggregation of `select` against the labels of `first`.
pub fn resolve_aggregations(select: &SelectStatementContext, first: &dyn QueryResult) -> Result<Vec<AggregationColumn>> {
    select
        .aggregations
        .iter()
        .map(|agg| {
            let avg_inputs = match (&agg.avg_derived, agg.distinct) {
                (Some((count, sum)), false) => Some((column_index(first, count)?, column_index(first, sum)?)),
                _ => None,
            };
            Ok(AggregationColumn {
                kind: agg.kind,
                distinct: agg.distinct,
                index: column_index(first, &agg.label)?,
                avg_inputs,
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
enum State {
    /// COUNT and SUM add up the per shard results.
    Sum(Option<ScalarValue>),
    /// MAX keeps the greatest value, MIN the least.
    Extreme {
        best: Option<ScalarValue>,
        keep: Ordering,
    },
    Avg {
        count: Option<ScalarValue>,
        sum: Option<ScalarValue>,
    },
    /// Distinct aggregations see raw values and deduplicate them here.
    Distinct(IndexSet<ScalarValue>),
}

/// Running state of one aggregation for one group.
#[derive(Debug, Clone)]
pub struct AggregationUnit {
    kind: AggregationKind,
    state: State,
}

impl AggregationUnit {
    pub fn new(kind: AggregationKind, distinct: bool) -> Self {
        let state = match kind {
            AggregationKind::Count | AggregationKind::Sum | AggregationKind::Avg if distinct => {
                State::Distinct(IndexSet::new())
            }
            AggregationKind::Count | AggregationKind::Sum => State::Sum(None),
            AggregationKind::Max => State::Extreme {
                best: None,
                keep: Ordering::Greater,
            },
            AggregationKind::Min => State::Extreme {
                best: None,
                keep: Ordering::Less,
            },
            AggregationKind::Avg => State::Avg { count: None, sum: None },
        };
        AggregationUnit { kind, state }
    }

    /// Fold one row's inputs into the state. AVG takes the derived count and
    /// sum, everything else a single value.
    pub fn merge(&mut self, values: &[ScalarValue]) -> Result<()> {
        let first = values
            .first()
            .ok_or_else(|| ShardingError::merge("Aggregation requires a value").with_field("function", self.kind))?;
        match &mut self.state {
            State::Sum(total) => add_into(total, first)?,
            State::Extreme { best, keep } => {
                if !first.is_null()
                    && best
                        .as_ref()
                        .is_none_or(|b| compare_values(first, b, NullsOrder::NullsFirst) == *keep)
                {
                    *best = Some(first.clone());
                }
            }
            State::Avg { count, sum } => {
                let sum_value = values.get(1).ok_or_else(|| {
                    ShardingError::merge("AVG requires derived count and sum values").with_field("values", values.len())
                })?;
                add_into(count, first)?;
                add_into(sum, sum_value)?;
            }
            State::Distinct(seen) => {
                if !first.is_null() {
                    seen.insert(first.clone());
                }
            }
        }
        Ok(())
    }

    pub fn result(&self) -> Result<ScalarValue> {
        match &self.state {
            State::Sum(total) => Ok(match (total, self.kind) {
                (Some(total), _) => total.clone(),
                (None, AggregationKind::Count) => ScalarValue::Int64(0),
                (None, _) => ScalarValue::Null,
            }),
            State::Extreme { best, .. } => Ok(best.clone().unwrap_or_default()),
            State::Avg { count, sum } => match (count, sum) {
                (Some(count), Some(sum)) => divide(sum, count),
                _ => Ok(ScalarValue::Null),
            },
            State::Distinct(seen) => {
                let mut total = None;
                for value in seen {
                    add_into(&mut total, value)?;
                }
                match self.kind {
                    AggregationKind::Count => Ok(ScalarValue::Int64(seen.len() as i64)),
                    AggregationKind::Avg => match total {
                        Some(total) => divide(&total, &ScalarValue::Int64(seen.len() as i64)),
                        None => Ok(ScalarValue::Null),
                    },
                    _ => Ok(total.unwrap_or_default()),
                }
            }
        }
    }
}

fn add_into(total: &mut Option<ScalarValue>, value: &ScalarValue) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    *total = Some(match total.take() {
        None => value.clone(),
        Some(ScalarValue::Int64(a)) if matches!(value, ScalarValue::Int64(_)) => {
            let b = value.try_as_i64()?;
            match a.checked_add(b) {
                Some(sum) => ScalarValue::Int64(sum),
                None => ScalarValue::Float64(a as f64 + b as f64),
            }
        }
        Some(current) => ScalarValue::Float64(current.try_as_f64()? + value.try_as_f64()?),
    });
    Ok(())
}

fn divide(sum: &ScalarValue, count: &ScalarValue) -> Result<ScalarValue> {
    let count = count.try_as_f64()?;
    if count == 0.0 {
        return Ok(ScalarValue::Null);
    }
    Ok(ScalarValue::Float64(sum.try_as_f64()? / count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(kind: AggregationKind, distinct: bool, rows: &[&[ScalarValue]]) -> ScalarValue {
        let mut unit = AggregationUnit::new(kind, distinct);
        for row in rows {
            unit.merge(row).unwrap();
        }
        unit.result().unwrap()
    }

    #[test]
    fn count_and_sum() {
        let rows: &[&[ScalarValue]] = &[&[2.into()], &[ScalarValue::Null], &[5.into()]];
        assert_eq!(ScalarValue::Int64(7), run(AggregationKind::Count, false, rows));
        assert_eq!(ScalarValue::Int64(7), run(AggregationKind::Sum, false, rows));
        assert_eq!(ScalarValue::Int64(0), run(AggregationKind::Count, false, &[]));
        assert_eq!(ScalarValue::Null, run(AggregationKind::Sum, false, &[]));
        assert_eq!(
            ScalarValue::Float64(3.5),
            run(AggregationKind::Sum, false, &[&[1.into()], &[2.5.into()]])
        );
    }

    #[test]
    fn max_and_min_skip_nulls() {
        let rows: &[&[ScalarValue]] = &[&[ScalarValue::Null], &[3.into()], &[9.into()], &[1.into()]];
        assert_eq!(ScalarValue::Int64(9), run(AggregationKind::Max, false, rows));
        assert_eq!(ScalarValue::Int64(1), run(AggregationKind::Min, false, rows));
    }

    #[test]
    fn avg_from_derived_count_and_sum() {
        // Shard 0: 2 rows summing to 10, shard 1: 3 rows summing to 20.
        let rows: &[&[ScalarValue]] = &[&[2.into(), 10.into()], &[3.into(), 20.into()]];
        assert_eq!(ScalarValue::Float64(6.0), run(AggregationKind::Avg, false, rows));
        assert_eq!(ScalarValue::Null, run(AggregationKind::Avg, false, &[]));
    }

    #[test]
    fn distinct_deduplicates_across_shards() {
        let rows: &[&[ScalarValue]] = &[&[1.into()], &[2.into()], &[2.into()], &[3.into()], &[1.into()]];
        assert_eq!(ScalarValue::Int64(3), run(AggregationKind::Count, true, rows));
        assert_eq!(ScalarValue::Int64(6), run(AggregationKind::Sum, true, rows));
        assert_eq!(ScalarValue::Float64(2.0), run(AggregationKind::Avg, true, rows));
    }
}
