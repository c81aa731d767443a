use sharding_error::Result;

use super::{GeneratorContext, TokenGenerator};
use crate::rewrite::parameter::ParameterBuilder;
use crate::rewrite::token::SqlToken;
use crate::statement::SqlStatementContext;
use crate::statement::segment::{ColumnSegment, Predicate, TableSegment};
use crate::statement::select::Projection;

/// Replaces sharded logic table names, including where they qualify columns.
#[derive(Debug, Clone, Copy)]
pub struct TableTokenGenerator;

impl TokenGenerator for TableTokenGenerator {
    fn name(&self) -> &'static str {
        "table"
    }

    fn is_applicable(&self, ctx: &GeneratorContext<'_>) -> bool {
        ctx.statement()
            .tables()
            .iter()
            .any(|t| ctx.rule.is_sharding_table(&t.name))
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        _previous: &mut [SqlToken],
        _parameters: &mut ParameterBuilder,
    ) -> Result<Vec<SqlToken>> {
        let tables = ctx.statement().tables();
        let mut tokens: Vec<SqlToken> = tables
            .iter()
            .filter(|t| ctx.rule.is_sharding_table(&t.name))
            .map(|t| SqlToken::TableName {
                start: t.start,
                stop: t.stop,
                logic_table: t.name.clone(),
            })
            .collect();

        let mut push_owner = |owner: Option<&str>, start: usize| {
            if let Some(token) = owner.and_then(|owner| owner_token(ctx, tables, owner, start)) {
                tokens.push(token);
            }
        };

        if let Some(predicate) = ctx.statement().where_predicate() {
            predicate.for_each_leaf(&mut |leaf| {
                if let Some(column) = leaf_column(leaf) {
                    push_owner(column.owner.as_deref(), column.start);
                }
            });
        }
        if let SqlStatementContext::Select(select) = ctx.statement() {
            for item in &select.statement.projections.items {
                match item {
                    Projection::Column { owner, start, .. } | Projection::Shorthand { owner, start, .. } => {
                        push_owner(owner.as_deref(), *start)
                    }
                    _ => (),
                }
            }
        }

        Ok(tokens)
    }
}

fn leaf_column(leaf: &Predicate) -> Option<&ColumnSegment> {
    match leaf {
        Predicate::Compare { column, .. } | Predicate::In { column, .. } | Predicate::Between { column, .. } => {
            Some(column)
        }
        _ => None,
    }
}

/// Token for a column owner naming a sharded table directly. Aliases are left
/// alone.
fn owner_token(ctx: &GeneratorContext<'_>, tables: &[TableSegment], owner: &str, start: usize) -> Option<SqlToken> {
    let table = tables.iter().find(|t| t.name.eq_ignore_ascii_case(owner))?;
    if !ctx.rule.is_sharding_table(&table.name) {
        return None;
    }
    Some(SqlToken::TableName {
        start,
        stop: start + owner.len() - 1,
        logic_table: table.name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::segment::ExprSegment;
    use crate::statement::select::SelectStatement;
    use crate::testutil;

    #[test]
    fn tables_and_qualified_columns() {
        // SELECT * FROM t_order o, t_config WHERE t_order.user_id = 1
        let stmt = SelectStatement {
            tables: vec![TableSegment::new("t_order", 14).with_alias("o"), TableSegment::new("t_config", 25)],
            where_predicate: Some(Predicate::eq(
                ColumnSegment::qualified("t_order", "user_id", 40),
                ExprSegment::literal(1, 58, 58),
            )),
            ..Default::default()
        };
        let (rule, route) =
            testutil::route_sql("SELECT * FROM t_order o, t_config WHERE t_order.user_id = 1", stmt, Vec::new());
        let ctx = GeneratorContext::new(&rule, &route);
        assert!(TableTokenGenerator.is_applicable(&ctx));

        let mut parameters = ParameterBuilder::Standard(Default::default());
        let tokens = TableTokenGenerator.generate(&ctx, &mut [], &mut parameters).unwrap();
        assert_eq!(
            vec![
                SqlToken::TableName {
                    start: 14,
                    stop: 20,
                    logic_table: "t_order".to_string(),
                },
                SqlToken::TableName {
                    start: 40,
                    stop: 46,
                    logic_table: "t_order".to_string(),
                },
            ],
            tokens
        );
    }
}
