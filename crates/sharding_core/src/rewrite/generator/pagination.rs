//! Pagination pushdown.
//!
//! Every shard is asked for the first `offset + count` rows starting at zero.
//! The merge then cuts the requested window out of the combined result.

use sharding_error::{Result, ShardingError};

use super::{GeneratorContext, TokenGenerator};
use crate::rewrite::parameter::ParameterBuilder;
use crate::rewrite::token::SqlToken;
use crate::statement::SqlStatementContext;
use crate::statement::select::{
    PaginationContext,
    PaginationStyle,
    PaginationValue,
    PaginationValueSegment,
    SelectStatementContext,
};
use crate::value::ScalarValue;

fn pagination<'a>(
    ctx: &GeneratorContext<'a>,
) -> Result<Option<(&'a SelectStatementContext, PaginationContext)>> {
    let SqlStatementContext::Select(select) = ctx.statement() else {
        return Ok(None);
    };
    Ok(select.pagination(ctx.parameters())?.map(|p| (select, p)))
}

/// Emit a token for a literal, or swap the bound parameter.
fn revise(
    segment: PaginationValueSegment,
    revised: i64,
    parameters: &mut ParameterBuilder,
    token: impl FnOnce(usize, usize, i64) -> SqlToken,
) -> Result<Vec<SqlToken>> {
    match segment.value {
        PaginationValue::Literal(_) => Ok(vec![token(segment.start, segment.stop, revised)]),
        PaginationValue::Parameter(idx) => {
            let builder = parameters
                .as_standard_mut()
                .ok_or_else(|| ShardingError::new("Pagination parameters require a standard parameter builder"))?;
            builder.replace(idx, ScalarValue::Int64(revised));
            Ok(Vec::new())
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OffsetTokenGenerator;

impl TokenGenerator for OffsetTokenGenerator {
    fn name(&self) -> &'static str {
        "offset"
    }

    fn is_applicable(&self, ctx: &GeneratorContext<'_>) -> bool {
        matches!(ctx.statement(), SqlStatementContext::Select(select)
            if select.statement.pagination.is_some_and(|p| p.offset.is_some()))
    }

    fn ignore_for_single_route(&self) -> bool {
        true
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        _previous: &mut [SqlToken],
        parameters: &mut ParameterBuilder,
    ) -> Result<Vec<SqlToken>> {
        let Some((_, pagination)) = pagination(ctx)? else {
            return Ok(Vec::new());
        };
        let Some(segment) = pagination.offset_segment else {
            return Ok(Vec::new());
        };
        revise(segment, pagination.revised_offset(), parameters, |start, stop, revised| {
            SqlToken::Offset { start, stop, revised }
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RowCountTokenGenerator;

impl TokenGenerator for RowCountTokenGenerator {
    fn name(&self) -> &'static str {
        "row_count"
    }

    fn is_applicable(&self, ctx: &GeneratorContext<'_>) -> bool {
        matches!(ctx.statement(), SqlStatementContext::Select(select)
            if select.statement.pagination.is_some_and(|p| p.row_count.is_some()))
    }

    fn ignore_for_single_route(&self) -> bool {
        true
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        _previous: &mut [SqlToken],
        parameters: &mut ParameterBuilder,
    ) -> Result<Vec<SqlToken>> {
        let Some((select, pagination)) = pagination(ctx)? else {
            return Ok(Vec::new());
        };
        let (Some(segment), Some(mut revised)) = (pagination.row_count_segment, pagination.revised_row_count(select))
        else {
            return Ok(Vec::new());
        };
        // An opened row number bound excludes the value as written, so the
        // rendered bound is one past the revised count.
        if segment.bound_opened && pagination.style == PaginationStyle::RowNumber {
            revised = revised.saturating_add(1);
        }
        revise(segment, revised, parameters, |start, stop, revised| SqlToken::RowCount {
            start,
            stop,
            revised,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::parameter::StandardParameterBuilder;
    use crate::statement::segment::TableSegment;
    use crate::statement::select::{PaginationSegment, SelectStatement};
    use crate::testutil;

    #[test]
    fn limit_literals() {
        // SELECT * FROM t_order LIMIT 2, 3
        let stmt = SelectStatement {
            tables: vec![TableSegment::new("t_order", 14)],
            pagination: Some(PaginationSegment {
                style: PaginationStyle::Limit,
                offset: Some(PaginationValueSegment::literal(2, 28, 28)),
                row_count: Some(PaginationValueSegment::literal(3, 31, 31)),
            }),
            ..Default::default()
        };
        let (rule, route) = testutil::route_sql("SELECT * FROM t_order LIMIT 2, 3", stmt, Vec::new());
        let ctx = GeneratorContext::new(&rule, &route);
        let mut parameters = ParameterBuilder::Standard(StandardParameterBuilder::default());

        let offset = OffsetTokenGenerator.generate(&ctx, &mut [], &mut parameters).unwrap();
        assert_eq!(
            vec![SqlToken::Offset {
                start: 28,
                stop: 28,
                revised: 0,
            }],
            offset
        );
        let row_count = RowCountTokenGenerator.generate(&ctx, &mut [], &mut parameters).unwrap();
        assert_eq!(
            vec![SqlToken::RowCount {
                start: 31,
                stop: 31,
                revised: 5,
            }],
            row_count
        );
    }

    #[test]
    fn limit_parameters_replaced() {
        // SELECT * FROM t_order LIMIT ?, ?
        let stmt = SelectStatement {
            tables: vec![TableSegment::new("t_order", 14)],
            pagination: Some(PaginationSegment {
                style: PaginationStyle::Limit,
                offset: Some(PaginationValueSegment::parameter(0, 28)),
                row_count: Some(PaginationValueSegment::parameter(1, 31)),
            }),
            ..Default::default()
        };
        let params = vec![ScalarValue::Int64(10), ScalarValue::Int64(i64::MAX)];
        let (rule, route) = testutil::route_sql("SELECT * FROM t_order LIMIT ?, ?", stmt, params.clone());
        let ctx = GeneratorContext::new(&rule, &route);
        let mut parameters = ParameterBuilder::Standard(StandardParameterBuilder::new(params));

        assert!(OffsetTokenGenerator.generate(&ctx, &mut [], &mut parameters).unwrap().is_empty());
        assert!(RowCountTokenGenerator.generate(&ctx, &mut [], &mut parameters).unwrap().is_empty());
        let ParameterBuilder::Standard(builder) = parameters else {
            panic!("expected standard builder");
        };
        assert_eq!(vec![ScalarValue::Int64(0), ScalarValue::Int64(i64::MAX)], builder.build());
    }

    #[test]
    fn opened_row_number_bound() {
        // SELECT * FROM (SELECT ROWNUM row_, t.* FROM t_order t WHERE ROWNUM < 5) WHERE row_ > 2
        let stmt = SelectStatement {
            tables: vec![TableSegment::new("t_order", 44).with_alias("t")],
            pagination: Some(PaginationSegment {
                style: PaginationStyle::RowNumber,
                offset: Some(PaginationValueSegment::literal(2, 86, 86).opened()),
                row_count: Some(PaginationValueSegment::literal(5, 71, 71).opened()),
            }),
            ..Default::default()
        };
        let (rule, route) = testutil::route_sql(
            "SELECT * FROM (SELECT ROWNUM row_, t.* FROM t_order t WHERE ROWNUM < 5) WHERE row_ > 2",
            stmt,
            Vec::new(),
        );
        let ctx = GeneratorContext::new(&rule, &route);
        let mut parameters = ParameterBuilder::Standard(StandardParameterBuilder::default());
        let row_count = RowCountTokenGenerator.generate(&ctx, &mut [], &mut parameters).unwrap();
        assert_eq!(
            vec![SqlToken::RowCount {
                start: 71,
                stop: 71,
                revised: 5,
            }],
            row_count
        );
    }
}
