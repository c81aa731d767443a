use sharding_error::Result;

use super::{GeneratorContext, TokenGenerator};
use crate::rewrite::parameter::ParameterBuilder;
use crate::rewrite::token::SqlToken;
use crate::statement::SqlStatementContext;
use crate::statement::select::{Projection, SelectStatementContext};

fn select<'a>(ctx: &GeneratorContext<'a>) -> Option<&'a SelectStatementContext> {
    match ctx.statement() {
        SqlStatementContext::Select(select) => Some(select),
        _ => None,
    }
}

/// Appends derived AVG, ORDER BY and GROUP BY columns to the select list.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionsTokenGenerator;

impl TokenGenerator for ProjectionsTokenGenerator {
    fn name(&self) -> &'static str {
        "projections"
    }

    fn is_applicable(&self, ctx: &GeneratorContext<'_>) -> bool {
        select(ctx).is_some_and(|s| !s.derived_projections.is_empty())
    }

    fn ignore_for_single_route(&self) -> bool {
        true
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        _previous: &mut [SqlToken],
        _parameters: &mut ParameterBuilder,
    ) -> Result<Vec<SqlToken>> {
        let Some(select) = select(ctx) else {
            return Ok(Vec::new());
        };
        Ok(vec![SqlToken::Projections {
            start: select.statement.projections.stop + 1,
            items: select.derived_projections.iter().map(|d| d.render()).collect(),
        }])
    }
}

/// Appends an ORDER BY matching GROUP BY so shards return groups sorted and
/// they can be merged as a stream.
#[derive(Debug, Clone, Copy)]
pub struct OrderByTokenGenerator;

impl TokenGenerator for OrderByTokenGenerator {
    fn name(&self) -> &'static str {
        "order_by"
    }

    fn is_applicable(&self, ctx: &GeneratorContext<'_>) -> bool {
        select(ctx).is_some_and(|s| s.order_by_generated && s.statement.group_by_stop.is_some())
    }

    fn ignore_for_single_route(&self) -> bool {
        true
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        _previous: &mut [SqlToken],
        _parameters: &mut ParameterBuilder,
    ) -> Result<Vec<SqlToken>> {
        let Some(select) = select(ctx) else {
            return Ok(Vec::new());
        };
        let (Some(stop), Some(text)) = (select.statement.group_by_stop, select.generated_order_by_text()) else {
            return Ok(Vec::new());
        };
        Ok(vec![SqlToken::OrderBy { start: stop + 1, text }])
    }
}

/// Replaces `AGG(DISTINCT x)` with `x` so the merge can aggregate over
/// distinct values from every shard.
#[derive(Debug, Clone, Copy)]
pub struct AggregationDistinctTokenGenerator;

impl TokenGenerator for AggregationDistinctTokenGenerator {
    fn name(&self) -> &'static str {
        "aggregation_distinct"
    }

    fn is_applicable(&self, ctx: &GeneratorContext<'_>) -> bool {
        select(ctx).is_some_and(|s| s.aggregations.iter().any(|a| a.distinct))
    }

    fn ignore_for_single_route(&self) -> bool {
        true
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        _previous: &mut [SqlToken],
        _parameters: &mut ParameterBuilder,
    ) -> Result<Vec<SqlToken>> {
        let Some(select) = select(ctx) else {
            return Ok(Vec::new());
        };
        let mut tokens = Vec::new();
        for (idx, item) in select.statement.projections.items.iter().enumerate() {
            let Projection::Aggregation {
                distinct: true,
                inner_expression,
                start,
                stop,
                ..
            } = item
            else {
                continue;
            };
            // With a user alias the alias follows the replaced span.
            let text = match select.distinct_alias(idx).filter(|_| item.alias().is_none()) {
                Some(derived) => format!("{inner_expression} AS {derived}"),
                None => inner_expression.clone(),
            };
            tokens.push(SqlToken::AggregationDistinct {
                start: *start,
                stop: *stop,
                text,
            });
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::parameter::StandardParameterBuilder;
    use crate::statement::segment::TableSegment;
    use crate::statement::select::{AggregationKind, OrderByItem, ProjectionsSegment, SelectStatement};
    use crate::testutil;

    fn generate(generator: &dyn TokenGenerator, stmt: SelectStatement, sql: &str) -> Vec<SqlToken> {
        let (rule, route) = testutil::route_sql(sql, stmt, Vec::new());
        let ctx = GeneratorContext::new(&rule, &route);
        assert!(generator.is_applicable(&ctx));
        let mut parameters = ParameterBuilder::Standard(StandardParameterBuilder::default());
        generator.generate(&ctx, &mut [], &mut parameters).unwrap()
    }

    #[test]
    fn avg_and_group_by() {
        let sql = "SELECT AVG(price) FROM t_order GROUP BY user_id";
        let stmt = SelectStatement {
            tables: vec![TableSegment::new("t_order", 23)],
            projections: ProjectionsSegment {
                start: 7,
                stop: 16,
                distinct_row: false,
                items: vec![Projection::aggregation(AggregationKind::Avg, false, "price", "AVG(price)", 7)],
            },
            group_by: vec![OrderByItem::asc("user_id")],
            group_by_stop: Some(46),
            ..Default::default()
        };

        let tokens = generate(&ProjectionsTokenGenerator, stmt.clone(), sql);
        assert_eq!(
            vec![SqlToken::Projections {
                start: 17,
                items: vec![
                    "COUNT(price) AS AVG_DERIVED_COUNT_0".to_string(),
                    "SUM(price) AS AVG_DERIVED_SUM_0".to_string(),
                    "user_id AS ORDER_BY_DERIVED_0".to_string(),
                ],
            }],
            tokens
        );

        let tokens = generate(&OrderByTokenGenerator, stmt, sql);
        assert_eq!(
            vec![SqlToken::OrderBy {
                start: 47,
                text: " ORDER BY user_id ASC".to_string(),
            }],
            tokens
        );
    }

    #[test]
    fn distinct_aggregation() {
        let sql = "SELECT COUNT(DISTINCT user_id), SUM(DISTINCT price) s FROM t_order";
        let stmt = SelectStatement {
            tables: vec![TableSegment::new("t_order", 59)],
            projections: ProjectionsSegment {
                start: 7,
                stop: 52,
                distinct_row: false,
                items: vec![
                    Projection::aggregation(AggregationKind::Count, true, "user_id", "COUNT(DISTINCT user_id)", 7),
                    Projection::aggregation(AggregationKind::Sum, true, "price", "SUM(DISTINCT price)", 32)
                        .with_alias("s"),
                ],
            },
            ..Default::default()
        };
        let tokens = generate(&AggregationDistinctTokenGenerator, stmt, sql);
        assert_eq!(
            vec![
                SqlToken::AggregationDistinct {
                    start: 7,
                    stop: 29,
                    text: "user_id AS AGGREGATION_DISTINCT_DERIVED_0".to_string(),
                },
                SqlToken::AggregationDistinct {
                    start: 32,
                    stop: 50,
                    text: "price".to_string(),
                },
            ],
            tokens
        );
    }
}
