//! Rewriting the logical statement into one physical statement per route
//! unit.

pub mod builder;
pub mod generator;
pub mod parameter;
pub mod token;

use builder::SqlBuilder;
use generator::{GeneratorContext, TokenGenerator, default_generators, generate_tokens};
use parameter::{GroupedParameterBuilder, ParameterBuilder, StandardParameterBuilder};
use sharding_error::Result;
use tracing::debug;

use crate::execute::{ExecutionUnit, SqlUnit};
use crate::route::context::RouteContext;
use crate::rule::ShardingRule;
use crate::statement::SqlStatementContext;

#[derive(Debug)]
pub struct SqlRewriteEngine {
    generators: Vec<Box<dyn TokenGenerator>>,
}

impl Default for SqlRewriteEngine {
    fn default() -> Self {
        SqlRewriteEngine {
            generators: default_generators(),
        }
    }
}

impl SqlRewriteEngine {
    /// Engine running a custom generator chain in the given order.
    pub fn with_generators(generators: Vec<Box<dyn TokenGenerator>>) -> Self {
        SqlRewriteEngine { generators }
    }

    /// Produce an execution unit for every route unit.
    pub fn rewrite(&self, rule: &ShardingRule, route: &RouteContext) -> Result<Vec<ExecutionUnit>> {
        let mut parameters = parameter_builder(rule, route);
        let ctx = GeneratorContext::new(rule, route);
        let tokens = generate_tokens(&self.generators, &ctx, &mut parameters)?;
        let builder = SqlBuilder::try_new(&route.logic_sql.sql, &tokens)?;

        let units = route
            .units()
            .iter()
            .map(|unit| {
                Ok(ExecutionUnit::new(
                    unit.data_source.actual_name.clone(),
                    SqlUnit::new(
                        builder.to_sql(Some(unit))?,
                        parameters.parameters_for_unit(unit, &route.route_result),
                    ),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(tokens = tokens.len(), units = units.len(), "rewrote statement");
        Ok(units)
    }
}

/// Inserts whose rows are routed or rewritten individually bind parameters
/// per row.
fn parameter_builder(rule: &ShardingRule, route: &RouteContext) -> ParameterBuilder {
    let parameters = &route.logic_sql.parameters;
    match &route.logic_sql.statement {
        SqlStatementContext::Insert(insert)
            if !insert.is_set_assignment()
                && (rule.is_sharding_table(insert.table_name())
                    || rule.encrypt_rule().find_table(insert.table_name()).is_some()) =>
        {
            ParameterBuilder::Grouped(GroupedParameterBuilder::new(insert, parameters))
        }
        _ => ParameterBuilder::Standard(StandardParameterBuilder::new(parameters.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::insert::{InsertStatement, InsertValueRow};
    use crate::statement::segment::{ColumnSegment, ExprSegment, Predicate, TableSegment};
    use crate::statement::select::SelectStatement;
    use crate::testutil;
    use crate::value::ScalarValue;

    fn sqls(units: &[ExecutionUnit]) -> Vec<String> {
        units
            .iter()
            .map(|u| format!("{}: {}", u.data_source, u.sql_unit.sql))
            .collect()
    }

    #[test]
    fn full_route_renames_tables() {
        let sql = "SELECT * FROM t_order";
        let stmt = SelectStatement {
            tables: vec![TableSegment::new("t_order", 14)],
            ..Default::default()
        };
        let (rule, route) = testutil::route_sql(sql, stmt, Vec::new());
        let units = SqlRewriteEngine::default().rewrite(&rule, &route).unwrap();
        assert_eq!(
            vec![
                "ds_0: SELECT * FROM t_order_0",
                "ds_0: SELECT * FROM t_order_1",
                "ds_1: SELECT * FROM t_order_0",
                "ds_1: SELECT * FROM t_order_1",
            ],
            sqls(&units)
        );
    }

    #[test]
    fn unsharded_table_passes_through() {
        let sql = "SELECT * FROM t_config WHERE id = ?";
        let stmt = SelectStatement {
            tables: vec![TableSegment::new("t_config", 14)],
            where_predicate: Some(Predicate::eq(ColumnSegment::new("id", 29), ExprSegment::parameter(0, 34))),
            ..Default::default()
        };
        let (rule, route) = testutil::route_sql(sql, stmt, vec![ScalarValue::Int64(3)]);
        let units = SqlRewriteEngine::default().rewrite(&rule, &route).unwrap();
        assert_eq!(1, units.len());
        assert_eq!(sql, units[0].sql_unit.sql);
        assert_eq!(vec![ScalarValue::Int64(3)], units[0].sql_unit.parameters);
    }

    #[test]
    fn insert_rows_split_with_generated_keys() {
        let sql = "INSERT INTO t_order (user_id, status) VALUES (?, 'a'), (?, 'b')";
        let stmt = InsertStatement::values(
            TableSegment::new("t_order", 12),
            vec![ColumnSegment::new("user_id", 21), ColumnSegment::new("status", 30)],
            36,
            vec![
                InsertValueRow::new(
                    vec![ExprSegment::parameter(0, 46), ExprSegment::literal("a", 49, 51)],
                    45,
                    52,
                ),
                InsertValueRow::new(
                    vec![ExprSegment::parameter(1, 56), ExprSegment::literal("b", 59, 61)],
                    55,
                    62,
                ),
            ],
        );
        let (rule, route) = testutil::route_sql(sql, stmt, vec![ScalarValue::Int64(10), ScalarValue::Int64(11)]);
        let units = SqlRewriteEngine::default().rewrite(&rule, &route).unwrap();
        assert_eq!(
            vec![
                "ds_0: INSERT INTO t_order_0 (user_id, status, order_id) VALUES (?, 'a', ?)",
                "ds_1: INSERT INTO t_order_1 (user_id, status, order_id) VALUES (?, 'b', ?)",
            ],
            sqls(&units)
        );
        assert_eq!(
            vec![ScalarValue::Int64(10), ScalarValue::Int64(100)],
            units[0].sql_unit.parameters
        );
        assert_eq!(
            vec![ScalarValue::Int64(11), ScalarValue::Int64(101)],
            units[1].sql_unit.parameters
        );
    }
}
