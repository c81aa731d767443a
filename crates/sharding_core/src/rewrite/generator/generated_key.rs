use sharding_error::{Result, ShardingError};

use super::{GeneratorContext, TokenGenerator};
use crate::condition::generated_key::GeneratedKeyContext;
use crate::rewrite::parameter::ParameterBuilder;
use crate::rewrite::token::{InsertTokenValue, SqlToken};
use crate::statement::SqlStatementContext;
use crate::statement::insert::InsertStatementContext;

/// Insert statement and key context when the kernel generated the keys.
fn generated<'a>(ctx: &GeneratorContext<'a>) -> Option<(&'a InsertStatementContext, &'a GeneratedKeyContext)> {
    let SqlStatementContext::Insert(insert) = ctx.statement() else {
        return None;
    };
    let key = ctx.generated_key().filter(|key| key.generated)?;
    Some((insert, key))
}

/// Adds the generated key column to `INSERT INTO t (...) VALUES`.
#[derive(Debug, Clone, Copy)]
pub struct GeneratedKeyInsertColumnTokenGenerator;

impl TokenGenerator for GeneratedKeyInsertColumnTokenGenerator {
    fn name(&self) -> &'static str {
        "generated_key_insert_column"
    }

    fn is_applicable(&self, ctx: &GeneratorContext<'_>) -> bool {
        generated(ctx).is_some_and(|(insert, _)| {
            !insert.is_set_assignment() && insert.statement.columns_stop.is_some()
        })
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        _previous: &mut [SqlToken],
        _parameters: &mut ParameterBuilder,
    ) -> Result<Vec<SqlToken>> {
        let Some((insert, key)) = generated(ctx) else {
            return Ok(Vec::new());
        };
        let Some(start) = insert.statement.columns_stop else {
            return Ok(Vec::new());
        };
        Ok(vec![SqlToken::InsertColumns {
            start,
            columns: vec![key.column.clone()],
        }])
    }
}

/// Adds `, key = value` to `INSERT INTO t SET ...`.
#[derive(Debug, Clone, Copy)]
pub struct GeneratedKeyAssignmentTokenGenerator;

impl TokenGenerator for GeneratedKeyAssignmentTokenGenerator {
    fn name(&self) -> &'static str {
        "generated_key_assignment"
    }

    fn is_applicable(&self, ctx: &GeneratorContext<'_>) -> bool {
        generated(ctx).is_some_and(|(insert, _)| insert.is_set_assignment())
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        _previous: &mut [SqlToken],
        parameters: &mut ParameterBuilder,
    ) -> Result<Vec<SqlToken>> {
        let Some((insert, key)) = generated(ctx) else {
            return Ok(Vec::new());
        };
        let (Some(set), Some(value)) = (&insert.statement.set_assignment, key.values.first()) else {
            return Ok(Vec::new());
        };

        let value = if ctx.parameters().is_empty() {
            InsertTokenValue::Literal(value.clone())
        } else {
            parameters
                .as_standard_mut()
                .ok_or_else(|| ShardingError::new("Insert set assignment requires a standard parameter builder"))?
                .add(value.clone());
            InsertTokenValue::Parameter
        };
        Ok(vec![SqlToken::GeneratedKeyAssignment {
            start: set.stop + 1,
            column: key.column.clone(),
            value,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::parameter::StandardParameterBuilder;
    use crate::statement::insert::{InsertStatement, InsertValueRow, SetAssignmentSegment};
    use crate::statement::segment::{Assignment, ColumnSegment, ExprSegment, TableSegment};
    use crate::testutil;
    use crate::value::ScalarValue;

    #[test]
    fn insert_column_at_close_paren() {
        // INSERT INTO t_order (user_id) VALUES (1)
        let stmt = InsertStatement::values(
            TableSegment::new("t_order", 12),
            vec![ColumnSegment::new("user_id", 21)],
            28,
            vec![InsertValueRow::new(vec![ExprSegment::literal(1, 38, 38)], 37, 39)],
        );
        let (rule, route) = testutil::route_sql("INSERT INTO t_order (user_id) VALUES (1)", stmt, Vec::new());
        let ctx = GeneratorContext::new(&rule, &route);
        assert!(GeneratedKeyInsertColumnTokenGenerator.is_applicable(&ctx));
        assert!(!GeneratedKeyAssignmentTokenGenerator.is_applicable(&ctx));

        let mut parameters = ParameterBuilder::Standard(StandardParameterBuilder::default());
        let tokens = GeneratedKeyInsertColumnTokenGenerator
            .generate(&ctx, &mut [], &mut parameters)
            .unwrap();
        assert_eq!(
            vec![SqlToken::InsertColumns {
                start: 28,
                columns: vec!["order_id".to_string()],
            }],
            tokens
        );
    }

    #[test]
    fn set_assignment_with_parameters() {
        // INSERT INTO t_order SET user_id = ?
        let stmt = InsertStatement {
            table: TableSegment::new("t_order", 12),
            columns: Vec::new(),
            columns_stop: None,
            values: Vec::new(),
            set_assignment: Some(SetAssignmentSegment {
                assignments: vec![Assignment::new(
                    ColumnSegment::new("user_id", 24),
                    ExprSegment::parameter(0, 34),
                )],
                start: 20,
                stop: 34,
            }),
            on_duplicate_key_assignments: Vec::new(),
        };
        let params = vec![ScalarValue::Int64(7)];
        let (rule, route) = testutil::route_sql("INSERT INTO t_order SET user_id = ?", stmt, params.clone());
        let ctx = GeneratorContext::new(&rule, &route);
        assert!(GeneratedKeyAssignmentTokenGenerator.is_applicable(&ctx));

        let mut parameters = ParameterBuilder::Standard(StandardParameterBuilder::new(params));
        let tokens = GeneratedKeyAssignmentTokenGenerator
            .generate(&ctx, &mut [], &mut parameters)
            .unwrap();
        assert_eq!(
            vec![SqlToken::GeneratedKeyAssignment {
                start: 35,
                column: "order_id".to_string(),
                value: InsertTokenValue::Parameter,
            }],
            tokens
        );
        let ParameterBuilder::Standard(builder) = parameters else {
            panic!("expected standard builder");
        };
        assert_eq!(vec![ScalarValue::Int64(7), ScalarValue::Int64(100)], builder.build());
    }
}
