//! Physical and merged cursors.

use std::fmt;

use sharding_error::{ErrorKind, Result, ShardingError};
use tracing::warn;

use crate::value::ScalarValue;

/// A cursor over the rows one execution unit returned.
///
/// Column indexes are 0-based.
pub trait QueryResult: fmt::Debug + Send {
    /// Advance to the next row. Returns false once exhausted.
    fn next(&mut self) -> Result<bool>;

    /// Value of a column in the current row.
    fn value(&self, column: usize) -> Result<ScalarValue>;

    fn column_count(&self) -> usize;

    fn column_label(&self, column: usize) -> Option<&str>;

    /// Release the underlying resources. Must be safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

/// The single logical cursor handed back to the caller.
pub trait MergedResult: fmt::Debug + Send {
    fn next(&mut self) -> Result<bool>;

    fn value(&self, column: usize) -> Result<ScalarValue>;

    /// Close every physical cursor this result was built from.
    fn close(&mut self) -> Result<()>;
}

/// Errors from a physical cursor become merge errors.
pub(crate) fn cursor_error(err: ShardingError) -> ShardingError {
    if err.kind() == ErrorKind::Merge {
        return err;
    }
    ShardingError::merge("Physical cursor failed").with_source(Box::new(err))
}

pub(crate) fn advance(result: &mut dyn QueryResult) -> Result<bool> {
    result.next().map_err(cursor_error)
}

/// Every value of the current row.
pub(crate) fn current_row(result: &dyn QueryResult) -> Result<Vec<ScalarValue>> {
    (0..result.column_count())
        .map(|idx| result.value(idx).map_err(cursor_error))
        .collect()
}

/// Close every cursor, returning the first error after all were attempted.
pub(crate) fn close_all<'a>(results: impl IntoIterator<Item = &'a mut Box<dyn QueryResult>>) -> Result<()> {
    let mut first_err = None;
    for result in results {
        if let Err(err) = result.close() {
            if first_err.is_none() {
                first_err = Some(cursor_error(err));
            }
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Close cursors from `drop`, where failures can only be logged.
pub(crate) fn release(results: &mut [Box<dyn QueryResult>]) {
    if let Err(err) = close_all(results.iter_mut()) {
        warn!(%err, "failed to close cursor on release");
    }
}

/// Run `f` over the cursors, closing every one of them if it fails.
pub(crate) fn close_on_error<T>(
    results: &mut Vec<Box<dyn QueryResult>>,
    f: impl FnOnce(&mut Vec<Box<dyn QueryResult>>) -> Result<T>,
) -> Result<T> {
    let out = f(results);
    if out.is_err() {
        release(results);
    }
    out
}

/// Index of the column labelled `label`, case insensitive.
pub(crate) fn column_index(result: &dyn QueryResult, label: &str) -> Result<usize> {
    (0..result.column_count())
        .find(|idx| result.column_label(*idx).is_some_and(|l| l.eq_ignore_ascii_case(label)))
        .ok_or_else(|| ShardingError::merge("Missing column in query result").with_field("label", label.to_string()))
}

pub(crate) fn row_value(row: &[ScalarValue], column: usize) -> Result<ScalarValue> {
    row.get(column).cloned().ok_or_else(|| {
        ShardingError::merge("Column index out of range")
            .with_field("column", column)
            .with_field("column_count", row.len())
    })
}

fn no_current_row() -> ShardingError {
    ShardingError::merge("Cursor is not positioned on a row")
}

/// Rows held in memory.
///
/// Used for materialized results of connection strict execution and as a
/// stand-in for physical cursors.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryQueryResult {
    labels: Vec<String>,
    rows: Vec<Vec<ScalarValue>>,
    /// Index of the next row to return.
    next_row: usize,
    current: Option<usize>,
}

impl MemoryQueryResult {
    pub fn new(labels: Vec<String>, rows: Vec<Vec<ScalarValue>>) -> Self {
        MemoryQueryResult {
            labels,
            rows,
            next_row: 0,
            current: None,
        }
    }

    /// Read every remaining row of `result` then close it.
    pub fn materialize(result: &mut dyn QueryResult) -> Result<Self> {
        let labels = (0..result.column_count())
            .map(|idx| result.column_label(idx).unwrap_or_default().to_string())
            .collect();
        let mut rows = Vec::new();
        while advance(result)? {
            rows.push(current_row(result)?);
        }
        result.close().map_err(cursor_error)?;
        Ok(Self::new(labels, rows))
    }
}

impl QueryResult for MemoryQueryResult {
    fn next(&mut self) -> Result<bool> {
        if self.next_row < self.rows.len() {
            self.current = Some(self.next_row);
            self.next_row += 1;
            Ok(true)
        } else {
            self.current = None;
            Ok(false)
        }
    }

    fn value(&self, column: usize) -> Result<ScalarValue> {
        let row = self.current.and_then(|idx| self.rows.get(idx)).ok_or_else(no_current_row)?;
        row_value(row, column)
    }

    fn column_count(&self) -> usize {
        self.labels.len()
    }

    fn column_label(&self, column: usize) -> Option<&str> {
        self.labels.get(column).map(|s| s.as_str())
    }

    fn close(&mut self) -> Result<()> {
        self.current = None;
        self.next_row = self.rows.len();
        Ok(())
    }
}

/// A single physical cursor returned as is.
#[derive(Debug)]
pub struct TransparentMergedResult {
    result: Box<dyn QueryResult>,
}

impl TransparentMergedResult {
    pub fn new(result: Box<dyn QueryResult>) -> Self {
        TransparentMergedResult { result }
    }
}

impl MergedResult for TransparentMergedResult {
    fn next(&mut self) -> Result<bool> {
        advance(self.result.as_mut())
    }

    fn value(&self, column: usize) -> Result<ScalarValue> {
        self.result.value(column).map_err(cursor_error)
    }

    fn close(&mut self) -> Result<()> {
        self.result.close().map_err(cursor_error)
    }
}

impl Drop for TransparentMergedResult {
    fn drop(&mut self) {
        release(std::slice::from_mut(&mut self.result));
    }
}

/// Merged rows computed up front, e.g. by a memory group by.
#[derive(Debug)]
pub struct MemoryMergedResult {
    rows: std::vec::IntoIter<Vec<ScalarValue>>,
    current: Option<Vec<ScalarValue>>,
    results: Vec<Box<dyn QueryResult>>,
}

impl MemoryMergedResult {
    /// `results` are kept so that closing the merged result closes them.
    pub fn new(rows: Vec<Vec<ScalarValue>>, results: Vec<Box<dyn QueryResult>>) -> Self {
        MemoryMergedResult {
            rows: rows.into_iter(),
            current: None,
            results,
        }
    }
}

impl MergedResult for MemoryMergedResult {
    fn next(&mut self) -> Result<bool> {
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn value(&self, column: usize) -> Result<ScalarValue> {
        row_value(self.current.as_ref().ok_or_else(no_current_row)?, column)
    }

    fn close(&mut self) -> Result<()> {
        self.current = None;
        close_all(&mut self.results)
    }
}

impl Drop for MemoryMergedResult {
    fn drop(&mut self) {
        release(&mut self.results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FailingQueryResult;

    #[test]
    fn memory_result_cursor() {
        let mut result = MemoryQueryResult::new(
            vec!["id".to_string(), "name".to_string()],
            vec![vec![1.into(), "a".into()], vec![2.into(), "b".into()]],
        );
        assert!(result.value(0).is_err());
        assert!(result.next().unwrap());
        assert_eq!(ScalarValue::from("a"), result.value(1).unwrap());
        assert!(result.value(2).is_err());
        assert!(result.next().unwrap());
        assert!(!result.next().unwrap());
        assert_eq!(Some(1), column_index(&result, "NAME").ok());
    }

    #[test]
    fn materialize_reads_and_closes() {
        let mut source = MemoryQueryResult::new(vec!["id".to_string()], vec![vec![1.into()], vec![2.into()]]);
        let mut copy = MemoryQueryResult::materialize(&mut source).unwrap();
        assert!(!source.next().unwrap());
        assert!(copy.next().unwrap());
        assert_eq!(ScalarValue::Int64(1), copy.value(0).unwrap());
        assert_eq!(Some("id"), copy.column_label(0));
    }

    #[test]
    fn cursor_failure_is_merge_error() {
        let mut merged = TransparentMergedResult::new(Box::new(FailingQueryResult::after_rows(1)));
        assert!(merged.next().unwrap());
        let err = merged.next().unwrap_err();
        assert_eq!(ErrorKind::Merge, err.kind());
    }
}
