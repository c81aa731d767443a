//! Streaming k-way merge of cursors that are each sorted the same way.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use sharding_error::{Result, ShardingError};

use super::result::{
    MergedResult,
    QueryResult,
    advance,
    close_all,
    column_index,
    current_row,
    cursor_error,
    release,
};
use crate::statement::select::{OrderByColumn, OrderByItem, OrderDirection, Projection, SelectStatementContext};
use crate::value::{NullsOrder, ScalarValue, compare_values};

/// One ORDER BY item resolved to a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub index: usize,
    pub direction: OrderDirection,
    pub nulls: Option<NullsOrder>,
}

impl SortKey {
    pub fn new(index: usize, direction: OrderDirection) -> Self {
        SortKey {
            index,
            direction,
            nulls: None,
        }
    }

    /// NULL is the smallest value unless a placement was given explicitly, in
    /// which case it holds in both directions.
    pub fn compare(&self, left: &ScalarValue, right: &ScalarValue) -> Ordering {
        if let Some(nulls) = self.nulls {
            if left.is_null() || right.is_null() {
                return compare_values(left, right, nulls);
            }
        }
        let ord = compare_values(left, right, NullsOrder::NullsFirst);
        match self.direction {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        }
    }

    /// Values of `row` at the key columns.
    pub fn extract(keys: &[SortKey], row: &[ScalarValue]) -> Result<Vec<ScalarValue>> {
        keys.iter()
            .map(|key| {
                row.get(key.index).cloned().ok_or_else(|| {
                    ShardingError::merge("Sort column out of range").with_field("column", key.index)
                })
            })
            .collect()
    }
}

/// Compare two rows' extracted sort values key by key.
pub fn compare_sort_values(keys: &[SortKey], left: &[ScalarValue], right: &[ScalarValue]) -> Ordering {
    keys.iter()
        .zip(left.iter().zip(right))
        .map(|(key, (l, r))| key.compare(l, r))
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Resolve ORDER BY or GROUP BY items to column indexes of `first`.
///
/// A named column resolves to the label the select list gives it, an alias
/// to itself, and a column missing from the select list to the derived
/// projection added for it.
pub fn resolve_sort_keys(
    items: &[OrderByItem],
    select: &SelectStatementContext,
    first: &dyn QueryResult,
) -> Result<Vec<SortKey>> {
    items
        .iter()
        .map(|item| {
            let index = match &item.column {
                OrderByColumn::Position(position) => {
                    if *position == 0 || *position > first.column_count() {
                        return Err(ShardingError::merge("ORDER BY position out of range")
                            .with_field("position", position)
                            .with_field("column_count", first.column_count()));
                    }
                    position - 1
                }
                OrderByColumn::Column { owner, name } => {
                    let label = column_label(select, owner.as_deref(), name);
                    column_index(first, &label)?
                }
            };
            Ok(SortKey {
                index,
                direction: item.direction,
                nulls: item.nulls,
            })
        })
        .collect()
}

fn column_label(select: &SelectStatementContext, owner: Option<&str>, name: &str) -> String {
    let items = &select.statement.projections.items;
    let by_name = items.iter().find_map(|p| match p {
        Projection::Column {
            name: col, alias, ..
        } if col.eq_ignore_ascii_case(name) => Some(alias.clone().unwrap_or_else(|| col.clone())),
        _ => None,
    });
    if let Some(label) = by_name {
        return label;
    }
    if let Some(alias) = items.iter().filter_map(|p| p.alias()).find(|a| a.eq_ignore_ascii_case(name)) {
        return alias.to_string();
    }
    let expression = match owner {
        Some(owner) => format!("{owner}.{name}"),
        None => name.to_string(),
    };
    select
        .derived_projections
        .iter()
        .find(|d| d.expression.eq_ignore_ascii_case(&expression))
        .map(|d| d.alias.clone())
        .unwrap_or_else(|| name.to_string())
}

#[derive(Debug)]
struct QueueEntry {
    values: Vec<ScalarValue>,
    cursor: usize,
    keys: Arc<[SortKey]>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // Reversed so the max-heap pops the smallest row first. Ties go to the
    // earlier cursor.
    fn cmp(&self, other: &Self) -> Ordering {
        compare_sort_values(&self.keys, &other.values, &self.values).then_with(|| other.cursor.cmp(&self.cursor))
    }
}

/// Priority queue over the head rows of every cursor.
///
/// The cursor that produced the current row is only advanced on the next call
/// to `next`, so its values stay readable until then.
#[derive(Debug)]
pub struct OrderByQueue {
    results: Vec<Box<dyn QueryResult>>,
    keys: Arc<[SortKey]>,
    heap: BinaryHeap<QueueEntry>,
    current: Option<usize>,
}

impl OrderByQueue {
    pub fn try_new(results: Vec<Box<dyn QueryResult>>, keys: Vec<SortKey>) -> Result<Self> {
        // Owned by the queue before the first read so a failing cursor still
        // gets every cursor closed on drop.
        let mut queue = OrderByQueue {
            heap: BinaryHeap::with_capacity(results.len()),
            results,
            keys: keys.into(),
            current: None,
        };
        for (cursor, result) in queue.results.iter_mut().enumerate() {
            if advance(result.as_mut())? {
                queue.heap.push(Self::entry(result.as_ref(), cursor, &queue.keys)?);
            }
        }
        Ok(queue)
    }

    fn entry(result: &dyn QueryResult, cursor: usize, keys: &Arc<[SortKey]>) -> Result<QueueEntry> {
        let values = keys
            .iter()
            .map(|key| result.value(key.index).map_err(cursor_error))
            .collect::<Result<_>>()?;
        Ok(QueueEntry {
            values,
            cursor,
            keys: keys.clone(),
        })
    }

    pub fn next(&mut self) -> Result<bool> {
        if let Some(cursor) = self.current.take() {
            let keys = self.keys.clone();
            let result = self.cursor_mut(cursor)?;
            if advance(result.as_mut())? {
                let entry = Self::entry(result.as_ref(), cursor, &keys)?;
                self.heap.push(entry);
            }
        }
        match self.heap.pop() {
            Some(entry) => {
                self.current = Some(entry.cursor);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn cursor_mut(&mut self, cursor: usize) -> Result<&mut Box<dyn QueryResult>> {
        self.results
            .get_mut(cursor)
            .ok_or_else(|| ShardingError::merge("Unknown cursor").with_field("cursor", cursor))
    }

    fn current_result(&self) -> Result<&dyn QueryResult> {
        self.current
            .and_then(|idx| self.results.get(idx))
            .map(|r| r.as_ref())
            .ok_or_else(|| ShardingError::merge("Order by merge is not positioned on a row"))
    }

    pub fn value(&self, column: usize) -> Result<ScalarValue> {
        self.current_result()?.value(column).map_err(cursor_error)
    }

    pub fn current_row(&self) -> Result<Vec<ScalarValue>> {
        current_row(self.current_result()?)
    }

    pub fn close(&mut self) -> Result<()> {
        self.current = None;
        self.heap.clear();
        close_all(&mut self.results)
    }
}

impl Drop for OrderByQueue {
    fn drop(&mut self) {
        release(&mut self.results);
    }
}

/// Rows of all cursors in global ORDER BY order.
#[derive(Debug)]
pub struct OrderByStreamMergedResult {
    queue: OrderByQueue,
}

impl OrderByStreamMergedResult {
    pub fn try_new(results: Vec<Box<dyn QueryResult>>, keys: Vec<SortKey>) -> Result<Self> {
        Ok(OrderByStreamMergedResult {
            queue: OrderByQueue::try_new(results, keys)?,
        })
    }
}

impl MergedResult for OrderByStreamMergedResult {
    fn next(&mut self) -> Result<bool> {
        self.queue.next()
    }

    fn value(&self, column: usize) -> Result<ScalarValue> {
        self.queue.value(column)
    }

    fn close(&mut self) -> Result<()> {
        self.queue.close()
    }
}
