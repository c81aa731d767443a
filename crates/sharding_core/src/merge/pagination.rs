//! Cutting the global pagination window out of a merged result.
//!
//! Shards were asked for rows from the start of the window's first page, so
//! the offset rows are skipped here.

use sharding_error::Result;

use super::result::MergedResult;
use crate::statement::select::PaginationContext;
use crate::value::ScalarValue;

/// Skip `offset` rows. Returns true if the input ran out first.
fn skip_offset(inner: &mut dyn MergedResult, offset: i64) -> Result<bool> {
    for _ in 0..offset {
        if !inner.next()? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `LIMIT offset, row_count` style.
#[derive(Debug)]
pub struct LimitDecoratorMergedResult {
    inner: Box<dyn MergedResult>,
    row_count: Option<i64>,
    row_number: i64,
    skip_all: bool,
}

impl LimitDecoratorMergedResult {
    pub fn try_new(mut inner: Box<dyn MergedResult>, pagination: &PaginationContext) -> Result<Self> {
        let skip_all = skip_offset(inner.as_mut(), pagination.actual_offset())?;
        Ok(LimitDecoratorMergedResult {
            inner,
            row_count: pagination.actual_row_count(),
            row_number: 0,
            skip_all,
        })
    }
}

impl MergedResult for LimitDecoratorMergedResult {
    fn next(&mut self) -> Result<bool> {
        if self.skip_all {
            return Ok(false);
        }
        let Some(row_count) = self.row_count else {
            return self.inner.next();
        };
        self.row_number += 1;
        if self.row_number > row_count {
            return Ok(false);
        }
        self.inner.next()
    }

    fn value(&self, column: usize) -> Result<ScalarValue> {
        self.inner.value(column)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

/// Oracle `ROWNUM` style. Row numbers continue from the offset, so the
/// window ends at an absolute row number rather than after a count.
#[derive(Debug)]
pub struct RowNumberDecoratorMergedResult {
    inner: Box<dyn MergedResult>,
    row_count: Option<i64>,
    row_number: i64,
    skip_all: bool,
}

impl RowNumberDecoratorMergedResult {
    pub fn try_new(mut inner: Box<dyn MergedResult>, pagination: &PaginationContext) -> Result<Self> {
        let offset = pagination.actual_offset();
        let skip_all = skip_offset(inner.as_mut(), offset)?;
        Ok(RowNumberDecoratorMergedResult {
            inner,
            row_count: pagination.actual_row_count(),
            row_number: offset.saturating_add(1),
            skip_all,
        })
    }
}

impl MergedResult for RowNumberDecoratorMergedResult {
    fn next(&mut self) -> Result<bool> {
        if self.skip_all {
            return Ok(false);
        }
        let Some(row_count) = self.row_count else {
            return self.inner.next();
        };
        let within = self.row_number <= row_count;
        self.row_number = self.row_number.saturating_add(1);
        if !within {
            return Ok(false);
        }
        self.inner.next()
    }

    fn value(&self, column: usize) -> Result<ScalarValue> {
        self.inner.value(column)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

/// SQL Server `TOP n` with a `ROW_NUMBER()` offset. The TOP value bounds the
/// absolute row number the same way ROWNUM does.
#[derive(Debug)]
pub struct TopAndRowNumberDecoratorMergedResult {
    inner: RowNumberDecoratorMergedResult,
}

impl TopAndRowNumberDecoratorMergedResult {
    pub fn try_new(inner: Box<dyn MergedResult>, pagination: &PaginationContext) -> Result<Self> {
        Ok(TopAndRowNumberDecoratorMergedResult {
            inner: RowNumberDecoratorMergedResult::try_new(inner, pagination)?,
        })
    }
}

impl MergedResult for TopAndRowNumberDecoratorMergedResult {
    fn next(&mut self) -> Result<bool> {
        self.inner.next()
    }

    fn value(&self, column: usize) -> Result<ScalarValue> {
        self.inner.value(column)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
