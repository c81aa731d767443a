//! Column encryption.
//!
//! Predicates compare against the query column with an encrypted value.
//! Writes store the cipher text plus the assisted query digest and plain text
//! where those columns are configured. Selected encrypted columns read the
//! cipher column under the logic column's label so the merge can decrypt it.

use sharding_error::{Result, ShardingError};

use super::{GeneratorContext, TokenGenerator};
use crate::rewrite::parameter::{GroupedParameterBuilder, ParameterBuilder, StandardParameterBuilder};
use crate::rewrite::token::{InsertTokenValue, SqlToken};
use crate::rule::encrypt::{EncryptColumn, EncryptRule};
use crate::statement::SqlStatementContext;
use crate::statement::insert::InsertStatementContext;
use crate::statement::segment::{Assignment, ColumnSegment, CompareOp, ExprSegment, Predicate, TableSegment};
use crate::statement::select::Projection;
use crate::value::ScalarValue;

#[derive(Debug, Clone, Copy)]
pub struct EncryptTokenGenerator;

impl TokenGenerator for EncryptTokenGenerator {
    fn name(&self) -> &'static str {
        "encrypt"
    }

    fn is_applicable(&self, ctx: &GeneratorContext<'_>) -> bool {
        let encrypt = ctx.rule.encrypt_rule();
        !encrypt.is_empty()
            && ctx
                .statement()
                .tables()
                .iter()
                .any(|t| encrypt.find_table(&t.name).is_some())
    }

    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        previous: &mut [SqlToken],
        parameters: &mut ParameterBuilder,
    ) -> Result<Vec<SqlToken>> {
        let mut generator = EncryptGeneration {
            rule: ctx.rule.encrypt_rule(),
            tables: ctx.statement().tables(),
            parameters: ctx.parameters(),
            tokens: Vec::new(),
        };

        if let Some(predicate) = ctx.statement().where_predicate() {
            generator.predicate(predicate, parameters)?;
        }
        match ctx.statement() {
            SqlStatementContext::Select(select) => {
                for item in &select.statement.projections.items {
                    generator.projection(item);
                }
            }
            SqlStatementContext::Update(update) => {
                generator.assignments(&update.assignments, standard(parameters)?)?;
            }
            SqlStatementContext::Insert(insert) => {
                if let Some(set) = &insert.statement.set_assignment {
                    generator.assignments(&set.assignments, standard(parameters)?)?;
                } else {
                    generator.insert_values(insert, previous, parameters)?;
                }
                if let Some(assignment) = insert
                    .statement
                    .on_duplicate_key_assignments
                    .iter()
                    .find(|a| generator.column(&a.column).is_some())
                {
                    return Err(ShardingError::unsupported(
                        "Encrypted columns cannot be assigned in ON DUPLICATE KEY UPDATE",
                    )
                    .with_field("column", assignment.column.name.clone()));
                }
            }
            SqlStatementContext::Delete(_) | SqlStatementContext::Ddl(_) | SqlStatementContext::Dcl(_) => (),
        }
        Ok(generator.tokens)
    }
}

fn standard(parameters: &mut ParameterBuilder) -> Result<&mut StandardParameterBuilder> {
    parameters
        .as_standard_mut()
        .ok_or_else(|| ShardingError::new("Encrypted assignments require a standard parameter builder"))
}

fn grouped(parameters: &mut ParameterBuilder) -> Result<&mut GroupedParameterBuilder> {
    parameters
        .as_grouped_mut()
        .ok_or_else(|| ShardingError::new("Encrypted insert values require a grouped parameter builder"))
}

/// Span of the bare column name, excluding any owner qualifier. The owner is
/// left to the table token.
fn name_span(column: &ColumnSegment) -> (usize, usize) {
    (column.stop + 1 - column.name.len(), column.stop)
}

struct EncryptGeneration<'a> {
    rule: &'a EncryptRule,
    tables: &'a [TableSegment],
    parameters: &'a [ScalarValue],
    tokens: Vec<SqlToken>,
}

impl<'a> EncryptGeneration<'a> {
    /// Encrypt config for a column, resolving the owner against the statement
    /// tables. Unqualified columns match the first table configuring them.
    fn column(&self, column: &ColumnSegment) -> Option<&'a EncryptColumn> {
        let rule = self.rule;
        match &column.owner {
            Some(owner) => {
                let table = self.tables.iter().find(|t| t.is_referenced_by(owner))?;
                rule.find_column(&table.name, &column.name)
            }
            None => self
                .tables
                .iter()
                .find_map(|t| rule.find_column(&t.name, &column.name)),
        }
    }

    fn predicate(&mut self, predicate: &Predicate, parameters: &mut ParameterBuilder) -> Result<()> {
        let mut leaves = Vec::new();
        predicate.for_each_leaf(&mut |leaf| leaves.push(leaf));
        for leaf in leaves {
            match leaf {
                Predicate::Compare { column, op, right } => {
                    let Some(encrypt) = self.column(column) else {
                        continue;
                    };
                    if !matches!(op, CompareOp::Eq | CompareOp::NotEq) {
                        return Err(range_unsupported(column));
                    }
                    self.query_column(column, encrypt);
                    self.query_value(right, encrypt, parameters)?;
                }
                Predicate::In { column, list, .. } => {
                    let Some(encrypt) = self.column(column) else {
                        continue;
                    };
                    self.query_column(column, encrypt);
                    for expr in list {
                        self.query_value(expr, encrypt, parameters)?;
                    }
                }
                Predicate::Between { column, .. } => {
                    if self.column(column).is_some() {
                        return Err(range_unsupported(column));
                    }
                }
                Predicate::And(_) | Predicate::Or(_) | Predicate::Other => (),
            }
        }
        Ok(())
    }

    fn query_column(&mut self, column: &ColumnSegment, encrypt: &EncryptColumn) {
        let (start, stop) = name_span(column);
        self.tokens.push(SqlToken::Encrypt {
            start,
            stop,
            text: encrypt.query_column().to_string(),
        });
    }

    fn query_value(
        &mut self,
        expr: &ExprSegment,
        encrypt: &EncryptColumn,
        parameters: &mut ParameterBuilder,
    ) -> Result<()> {
        match expr {
            ExprSegment::Literal { value, start, stop } => {
                self.tokens.push(SqlToken::Encrypt {
                    start: *start,
                    stop: *stop,
                    text: encrypt.query_value(value)?.to_sql_literal(),
                });
            }
            ExprSegment::Parameter { index, .. } => {
                let plain = self.parameter(*index)?;
                let builder = parameters
                    .as_standard_mut()
                    .ok_or_else(|| ShardingError::new("Encrypted predicates require a standard parameter builder"))?;
                builder.replace(*index, encrypt.query_value(plain)?);
            }
            ExprSegment::Complex { text, .. } => return Err(complex_unsupported(&encrypt.logic_column, text)),
        }
        Ok(())
    }

    fn parameter(&self, index: usize) -> Result<&'a ScalarValue> {
        self.parameters.get(index).ok_or_else(|| {
            ShardingError::rewrite_contract("Parameter index out of range")
                .with_field("index", index)
                .with_field("parameters", self.parameters.len())
        })
    }

    /// `col = v` becomes `cipher = c, assisted = a, plain = p`.
    fn assignments(&mut self, assignments: &[Assignment], parameters: &mut StandardParameterBuilder) -> Result<()> {
        for assignment in assignments {
            let Some(encrypt) = self.column(&assignment.column) else {
                continue;
            };
            let mut parts = Vec::with_capacity(3);
            match &assignment.value {
                ExprSegment::Literal { value, .. } => {
                    parts.push((&encrypt.cipher_column, encrypt.encryptor.encrypt(value)?.to_sql_literal()));
                    if let (Some(column), Some(assisted)) =
                        (&encrypt.assisted_query_column, encrypt.assisted_query_value(value)?)
                    {
                        parts.push((column, assisted.to_sql_literal()));
                    }
                    if let Some(column) = &encrypt.plain_column {
                        parts.push((column, value.to_sql_literal()));
                    }
                }
                ExprSegment::Parameter { index, .. } => {
                    let plain = self.parameter(*index)?;
                    parameters.replace(*index, encrypt.encryptor.encrypt(plain)?);
                    parts.push((&encrypt.cipher_column, "?".to_string()));
                    let mut inserted = Vec::with_capacity(2);
                    if let (Some(column), Some(assisted)) =
                        (&encrypt.assisted_query_column, encrypt.assisted_query_value(plain)?)
                    {
                        parts.push((column, "?".to_string()));
                        inserted.push(assisted);
                    }
                    if let Some(column) = &encrypt.plain_column {
                        parts.push((column, "?".to_string()));
                        inserted.push(plain.clone());
                    }
                    parameters.insert_after(*index, inserted);
                }
                ExprSegment::Complex { text, .. } => {
                    return Err(complex_unsupported(&encrypt.logic_column, text));
                }
            }
            let text: Vec<String> = parts.into_iter().map(|(col, v)| format!("{col} = {v}")).collect();
            self.tokens.push(SqlToken::Encrypt {
                start: assignment.start(),
                stop: assignment.stop(),
                text: text.join(", "),
            });
        }
        Ok(())
    }

    /// Rename encrypted insert columns to their cipher columns, append the
    /// assisted and plain columns, and encrypt each row's values.
    fn insert_values(
        &mut self,
        insert: &InsertStatementContext,
        previous: &mut [SqlToken],
        parameters: &mut ParameterBuilder,
    ) -> Result<()> {
        let encrypted: Vec<(usize, &EncryptColumn)> = insert
            .statement
            .columns
            .iter()
            .enumerate()
            .filter_map(|(idx, column)| self.column(column).map(|encrypt| (idx, encrypt)))
            .collect();
        if encrypted.is_empty() {
            return Ok(());
        }

        let mut derived_columns = Vec::new();
        for (idx, encrypt) in &encrypted {
            let column = &insert.statement.columns[*idx];
            let (start, stop) = name_span(column);
            self.tokens.push(SqlToken::Encrypt {
                start,
                stop,
                text: encrypt.cipher_column.clone(),
            });
            derived_columns.extend(encrypt.assisted_query_column.iter().cloned());
            derived_columns.extend(encrypt.plain_column.iter().cloned());
        }

        if !derived_columns.is_empty() {
            match previous.iter_mut().find_map(|t| match t {
                SqlToken::InsertColumns { columns, .. } => Some(columns),
                _ => None,
            }) {
                Some(columns) => columns.extend(derived_columns),
                None => {
                    let start = insert.statement.columns_stop.ok_or_else(|| {
                        ShardingError::unsupported("Encrypted insert requires an explicit column list")
                            .with_field("table", insert.table_name().to_string())
                    })?;
                    self.tokens.push(SqlToken::InsertColumns {
                        start,
                        columns: derived_columns,
                    });
                }
            }
        }

        let rows = previous
            .iter_mut()
            .find_map(|t| match t {
                SqlToken::InsertValues { rows, .. } => Some(rows),
                _ => None,
            })
            .ok_or_else(|| ShardingError::rewrite_contract("Encrypted insert is missing its insert values token"))?;

        for (row_idx, (row, token_row)) in insert.rows.iter().zip(rows.iter_mut()).enumerate() {
            for (column_idx, encrypt) in &encrypted {
                let expr = row.exprs.get(*column_idx).ok_or_else(|| {
                    ShardingError::rewrite_contract("Insert row has fewer values than columns")
                        .with_field("row", row_idx)
                        .with_field("column", *column_idx)
                })?;
                match expr {
                    ExprSegment::Literal { value, .. } => {
                        token_row.values[*column_idx] = InsertTokenValue::Literal(encrypt.encryptor.encrypt(value)?);
                        if let Some(assisted) = encrypt.assisted_query_value(value)? {
                            token_row.values.push(InsertTokenValue::Literal(assisted));
                        }
                        if encrypt.plain_column.is_some() {
                            token_row.values.push(InsertTokenValue::Literal(value.clone()));
                        }
                    }
                    ExprSegment::Parameter { index, .. } => {
                        let plain = self.parameter(*index)?;
                        let builder = grouped(parameters)?;
                        builder.replace(row_idx, index - row.parameter_offset, encrypt.encryptor.encrypt(plain)?);
                        if let Some(assisted) = encrypt.assisted_query_value(plain)? {
                            builder.add(row_idx, assisted);
                            token_row.values.push(InsertTokenValue::Parameter);
                        }
                        if encrypt.plain_column.is_some() {
                            builder.add(row_idx, plain.clone());
                            token_row.values.push(InsertTokenValue::Parameter);
                        }
                    }
                    ExprSegment::Complex { text, .. } => {
                        return Err(complex_unsupported(&encrypt.logic_column, text));
                    }
                }
            }
        }
        Ok(())
    }

    /// Selected encrypted columns read the cipher column, labelled with the
    /// logic name.
    fn projection(&mut self, item: &Projection) {
        let Projection::Column {
            owner,
            name,
            alias,
            stop,
            ..
        } = item
        else {
            return;
        };
        let column = ColumnSegment {
            owner: owner.clone(),
            name: name.clone(),
            start: stop + 1 - name.len(),
            stop: *stop,
        };
        let Some(encrypt) = self.column(&column) else {
            return;
        };
        let text = match alias {
            Some(_) => encrypt.cipher_column.clone(),
            None => format!("{} AS {name}", encrypt.cipher_column),
        };
        let (start, stop) = name_span(&column);
        self.tokens.push(SqlToken::Encrypt { start, stop, text });
    }
}

fn range_unsupported(column: &ColumnSegment) -> ShardingError {
    ShardingError::unsupported("Range predicates on encrypted columns are not supported")
        .with_field("column", column.name.clone())
}

fn complex_unsupported(column: &str, expression: &str) -> ShardingError {
    ShardingError::unsupported("Encrypted columns only accept literal or parameter values")
        .with_field("column", column.to_string())
        .with_field("expression", expression.to_string())
}
