use sharding_error::{Result, ShardingError};

use super::result::{MergedResult, QueryResult, advance, close_all, cursor_error, release};
use crate::value::ScalarValue;

/// Concatenates the cursors in order.
#[derive(Debug)]
pub struct IteratorMergedResult {
    results: Vec<Box<dyn QueryResult>>,
    current: usize,
}

impl IteratorMergedResult {
    pub fn new(results: Vec<Box<dyn QueryResult>>) -> Self {
        IteratorMergedResult { results, current: 0 }
    }
}

impl MergedResult for IteratorMergedResult {
    fn next(&mut self) -> Result<bool> {
        while let Some(result) = self.results.get_mut(self.current) {
            if advance(result.as_mut())? {
                return Ok(true);
            }
            self.current += 1;
        }
        Ok(false)
    }

    fn value(&self, column: usize) -> Result<ScalarValue> {
        let result = self
            .results
            .get(self.current)
            .ok_or_else(|| ShardingError::merge("Iterator merge is exhausted").with_field("column", column))?;
        result.value(column).map_err(cursor_error)
    }

    fn close(&mut self) -> Result<()> {
        close_all(&mut self.results)
    }
}

impl Drop for IteratorMergedResult {
    fn drop(&mut self) {
        release(&mut self.results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn concatenates_and_skips_empty() {
        let results = vec![
            testutil::int_result(&[1, 2]),
            testutil::int_result(&[]),
            testutil::int_result(&[3]),
        ];
        let mut merged = IteratorMergedResult::new(results);
        let mut values = Vec::new();
        while merged.next().unwrap() {
            values.push(merged.value(0).unwrap());
        }
        assert_eq!(vec![ScalarValue::Int64(1), ScalarValue::Int64(2), ScalarValue::Int64(3)], values);
        assert!(!merged.next().unwrap());
        merged.close().unwrap();
    }
}
