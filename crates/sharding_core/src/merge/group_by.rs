//! GROUP BY and aggregate merging.
//!
//! When every shard returns rows sorted by the grouping columns the groups
//! can be folded while streaming. Otherwise every row is read into memory
//! first.

use indexmap::IndexMap;
use sharding_error::{Result, ShardingError};

use super::aggregation::{AggregationColumn, AggregationUnit};
use super::order_by::{OrderByQueue, SortKey, compare_sort_values};
use super::result::{
    MemoryMergedResult,
    MergedResult,
    QueryResult,
    advance,
    close_on_error,
    current_row,
    row_value,
};
use crate::value::ScalarValue;

fn group_key(row: &[ScalarValue], columns: &[usize]) -> Result<Vec<ScalarValue>> {
    columns.iter().map(|idx| row_value(row, *idx)).collect()
}

/// First row of the group with every aggregation column replaced by its
/// merged value.
fn finish_group(
    mut row: Vec<ScalarValue>,
    aggregations: &[AggregationColumn],
    units: &[AggregationUnit],
) -> Result<Vec<ScalarValue>> {
    for (agg, unit) in aggregations.iter().zip(units) {
        let value = unit.result()?;
        if let Some(cell) = row.get_mut(agg.index) {
            *cell = value;
        }
    }
    Ok(row)
}

/// Groups consumed in ORDER BY order from the merge queue.
#[derive(Debug)]
pub struct GroupByStreamMergedResult {
    queue: OrderByQueue,
    group_columns: Vec<usize>,
    aggregations: Vec<AggregationColumn>,
    /// Queue is positioned on a row not yet folded into a group.
    pending: bool,
    current: Option<Vec<ScalarValue>>,
}

impl GroupByStreamMergedResult {
    pub fn try_new(
        results: Vec<Box<dyn QueryResult>>,
        order_keys: Vec<SortKey>,
        group_columns: Vec<usize>,
        aggregations: Vec<AggregationColumn>,
    ) -> Result<Self> {
        let mut queue = OrderByQueue::try_new(results, order_keys)?;
        let pending = queue.next()?;
        Ok(GroupByStreamMergedResult {
            queue,
            group_columns,
            aggregations,
            pending,
            current: None,
        })
    }
}

impl MergedResult for GroupByStreamMergedResult {
    fn next(&mut self) -> Result<bool> {
        if !self.pending {
            self.current = None;
            return Ok(false);
        }
        let first = self.queue.current_row()?;
        let key = group_key(&first, &self.group_columns)?;
        let mut units: Vec<_> = self.aggregations.iter().map(|a| a.new_unit()).collect();

        let mut row = first.clone();
        loop {
            for (agg, unit) in self.aggregations.iter().zip(units.iter_mut()) {
                unit.merge(&agg.inputs(&row)?)?;
            }
            self.pending = self.queue.next()?;
            if !self.pending {
                break;
            }
            row = self.queue.current_row()?;
            if group_key(&row, &self.group_columns)? != key {
                break;
            }
        }

        self.current = Some(finish_group(first, &self.aggregations, &units)?);
        Ok(true)
    }

    fn value(&self, column: usize) -> Result<ScalarValue> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| ShardingError::merge("Group by merge is not positioned on a row"))?;
        row_value(row, column)
    }

    fn close(&mut self) -> Result<()> {
        self.current = None;
        self.pending = false;
        self.queue.close()
    }
}

/// Read every row, fold them into groups, then sort the groups.
///
/// Groups keep first-seen order when there are no sort keys. `SELECT
/// DISTINCT` is a grouping over every column without aggregations.
pub fn group_by_memory(
    mut results: Vec<Box<dyn QueryResult>>,
    group_columns: &[usize],
    order_keys: &[SortKey],
    aggregations: &[AggregationColumn],
) -> Result<MemoryMergedResult> {
    let rows: Vec<Vec<ScalarValue>> = close_on_error(&mut results, |results| {
        let mut groups: IndexMap<Vec<ScalarValue>, (Vec<ScalarValue>, Vec<AggregationUnit>)> = IndexMap::new();
        for result in results.iter_mut() {
            while advance(result.as_mut())? {
                let row = current_row(result.as_ref())?;
                let key = group_key(&row, group_columns)?;
                let (_, units) = groups
                    .entry(key)
                    .or_insert_with(|| (row.clone(), aggregations.iter().map(|a| a.new_unit()).collect()));
                for (agg, unit) in aggregations.iter().zip(units.iter_mut()) {
                    unit.merge(&agg.inputs(&row)?)?;
                }
            }
        }

        let mut rows = groups
            .into_values()
            .map(|(first, units)| {
                let row = finish_group(first, aggregations, &units)?;
                let sort_values = SortKey::extract(order_keys, &row)?;
                Ok((sort_values, row))
            })
            .collect::<Result<Vec<_>>>()?;
        if !order_keys.is_empty() {
            rows.sort_by(|(a, _), (b, _)| compare_sort_values(order_keys, a, b));
        }
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    })?;

    Ok(MemoryMergedResult::new(rows, results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::select::{AggregationKind, OrderDirection};
    use crate::testutil;

    const LABELS: [&str; 3] = ["user_id", "COUNT(*)", "MAX(price)"];

    fn aggregations() -> Vec<AggregationColumn> {
        vec![
            AggregationColumn {
                kind: AggregationKind::Count,
                distinct: false,
                index: 1,
                avg_inputs: None,
            },
            AggregationColumn {
                kind: AggregationKind::Max,
                distinct: false,
                index: 2,
                avg_inputs: None,
            },
        ]
    }

    fn row(user: i64, count: i64, max: i64) -> Vec<ScalarValue> {
        vec![user.into(), count.into(), max.into()]
    }

    fn drain(mut merged: impl MergedResult) -> Vec<Vec<ScalarValue>> {
        let mut out = Vec::new();
        while merged.next().unwrap() {
            out.push((0..3).map(|c| merged.value(c).unwrap()).collect());
        }
        merged.close().unwrap();
        out
    }

    #[test]
    fn stream_folds_sorted_groups() {
        let results = vec![
            testutil::rows_result(&LABELS, vec![row(1, 2, 10), row(3, 1, 7)]),
            testutil::rows_result(&LABELS, vec![row(1, 3, 12), row(2, 1, 4), row(3, 4, 5)]),
        ];
        let merged = GroupByStreamMergedResult::try_new(
            results,
            vec![SortKey::new(0, OrderDirection::Asc)],
            vec![0],
            aggregations(),
        )
        .unwrap();
        assert_eq!(vec![row(1, 5, 12), row(2, 1, 4), row(3, 5, 7)], drain(merged));
    }

    #[test]
    fn memory_keeps_first_seen_order_without_sort_keys() {
        let results = vec![
            testutil::rows_result(&LABELS, vec![row(3, 1, 7), row(1, 2, 10)]),
            testutil::rows_result(&LABELS, vec![row(2, 1, 4), row(3, 4, 5)]),
        ];
        let merged = group_by_memory(results, &[0], &[], &aggregations()).unwrap();
        assert_eq!(vec![row(3, 5, 7), row(1, 2, 10), row(2, 1, 4)], drain(merged));
    }

    #[test]
    fn memory_sorts_by_aggregate() {
        let results = vec![
            testutil::rows_result(&LABELS, vec![row(3, 1, 7), row(1, 2, 10)]),
            testutil::rows_result(&LABELS, vec![row(2, 1, 4), row(3, 4, 5)]),
        ];
        let keys = [SortKey::new(1, OrderDirection::Desc)];
        let merged = group_by_memory(results, &[0], &keys, &aggregations()).unwrap();
        assert_eq!(vec![row(3, 5, 7), row(1, 2, 10), row(2, 1, 4)], drain(merged));
    }

    #[test]
    fn distinct_rows() {
        let results = vec![
            testutil::rows_result(&LABELS, vec![row(1, 1, 1), row(2, 2, 2)]),
            testutil::rows_result(&LABELS, vec![row(2, 2, 2), row(1, 1, 1), row(0, 0, 0)]),
        ];
        let keys = [SortKey::new(0, OrderDirection::Asc)];
        let merged = group_by_memory(results, &[0, 1, 2], &keys, &[]).unwrap();
        assert_eq!(vec![row(0, 0, 0), row(1, 1, 1), row(2, 2, 2)], drain(merged));
    }

    #[test]
    fn aggregate_without_group_by_is_one_group() {
        let results = vec![
            testutil::rows_result(&LABELS, vec![row(0, 2, 10)]),
            testutil::rows_result(&LABELS, vec![row(0, 3, 30)]),
        ];
        let merged = group_by_memory(results, &[], &[], &aggregations()).unwrap();
        assert_eq!(vec![row(0, 5, 30)], drain(merged));
    }
}
