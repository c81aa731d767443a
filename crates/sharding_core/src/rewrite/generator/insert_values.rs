use sharding_error::{Result, ShardingError};

use super::{GeneratorContext, TokenGenerator};
use crate::rewrite::parameter::ParameterBuilder;
use crate::rewrite::token::{InsertTokenValue, InsertValuesTokenRow, SqlToken};
use crate::statement::SqlStatementContext;
use crate::statement::insert::InsertStatementContext;

/// Rewrites the VALUES rows so each unit only receives the rows routed to it,
/// with generated keys appended.
#[derive(Debug, Clone, Copy)]
pub struct InsertValuesTokenGenerator;

fn insert<'a>(ctx: &GeneratorContext<'a>) -> Option<&'a InsertStatementContext> {
    match ctx.statement() {
        SqlStatementContext::Insert(insert) if !insert.is_set_assignment() => Some(insert),
        _ => None,
    }
}

impl TokenGenerator for InsertValuesTokenGenerator {
    fn name(&self) -> &'static str {
        "insert_values"
    }

    fn is_applicable(&self, ctx: &GeneratorContext<'_>) -> bool {
        let Some(insert) = insert(ctx) else {
            return false;
        };
        let table = insert.table_name();
        insert.values_span().is_some()
            && (ctx.rule.is_sharding_table(table)
                || ctx.rule.encrypt_rule().find_table(table).is_some()
                || ctx.generated_key().is_some_and(|key| key.generated))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        _previous: &mut [SqlToken],
        parameters: &mut ParameterBuilder,
    ) -> Result<Vec<SqlToken>> {
        let Some(insert) = insert(ctx) else {
            return Ok(Vec::new());
        };
        let Some((start, stop)) = insert.values_span() else {
            return Ok(Vec::new());
        };
        let generated = ctx.generated_key().filter(|key| key.generated);
        let bind_parameters = !ctx.parameters().is_empty();

        let mut grouped = parameters.as_grouped_mut();
        if let (Some(key), Some(builder)) = (generated, grouped.as_deref_mut()) {
            builder.derived_column_name = Some(key.column.clone());
        }

        let mut rows = Vec::with_capacity(insert.rows.len());
        for (idx, row) in insert.rows.iter().enumerate() {
            let mut values: Vec<InsertTokenValue> = row.exprs.iter().cloned().map(InsertTokenValue::Expr).collect();
            if let Some(key) = generated {
                let value = key.values.get(idx).cloned().ok_or_else(|| {
                    ShardingError::rewrite_contract("Missing generated key for insert row").with_field("row", idx)
                })?;
                if bind_parameters {
                    let builder = grouped.as_deref_mut().ok_or_else(|| {
                        ShardingError::new("Insert values require a grouped parameter builder")
                    })?;
                    builder.add(idx, value);
                    values.push(InsertTokenValue::Parameter);
                } else {
                    values.push(InsertTokenValue::Literal(value));
                }
            }
            rows.push(InsertValuesTokenRow {
                values,
                data_nodes: ctx
                    .route_result()
                    .original_data_nodes
                    .get(idx)
                    .cloned()
                    .unwrap_or_default(),
            });
        }

        Ok(vec![SqlToken::InsertValues { start, stop, rows }])
    }
}
