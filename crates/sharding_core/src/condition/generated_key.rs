use sharding_error::{Result, ShardingError};
use tracing::trace;

use crate::rule::ShardingRule;
use crate::statement::insert::InsertStatementContext;
use crate::value::ScalarValue;

/// Key column values for an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKeyContext {
    pub column: String,
    /// If the kernel generated the values because the insert omitted the
    /// column.
    pub generated: bool,
    /// One value per row when generated. Otherwise the resolvable values the
    /// insert supplied.
    pub values: Vec<ScalarValue>,
}

impl GeneratedKeyContext {
    /// Build the key context for an insert into a table with a key
    /// generator. Returns None for tables without one.
    pub fn try_new(
        rule: &ShardingRule,
        insert: &InsertStatementContext,
        parameters: &[ScalarValue],
    ) -> Result<Option<Self>> {
        let table = insert.table_name();
        let Some(column) = rule.generate_key_column(table) else {
            return Ok(None);
        };

        if let Some(idx) = insert.column_index(column) {
            let values = insert
                .rows
                .iter()
                .filter_map(|row| row.exprs.get(idx).and_then(|e| e.resolve(parameters)))
                .collect();
            return Ok(Some(GeneratedKeyContext {
                column: column.to_string(),
                generated: false,
                values,
            }));
        }

        if insert.column_names.is_empty() {
            return Err(ShardingError::unsupported("Insert without a column list cannot have a generated key")
                .with_field("table", table.to_string())
                .with_field("column", column.to_string()));
        }

        let values = rule.generate_keys(table, insert.rows.len())?;
        trace!(%table, %column, count = values.len(), "generated keys");
        Ok(Some(GeneratedKeyContext {
            column: column.to_string(),
            generated: true,
            values,
        }))
    }
}
