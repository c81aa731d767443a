use std::sync::Arc;

use sharding_error::{Result, ShardingError};

use super::result::{MergedResult, QueryResult};
use crate::rule::encrypt::{EncryptRule, Encryptor};
use crate::statement::select::{Projection, SelectStatementContext};
use crate::value::ScalarValue;

/// Encryptor for every result column that holds cipher text, by column
/// index.
///
/// A column is encrypted if its label is the label of an encrypted select
/// column, or if it is named after a cipher column as happens with `*`.
pub fn resolve_decryptors(
    rule: &EncryptRule,
    select: &SelectStatementContext,
    first: &dyn QueryResult,
) -> Vec<Option<Arc<dyn Encryptor>>> {
    let tables = &select.statement.tables;
    (0..first.column_count())
        .map(|idx| {
            let label = first.column_label(idx)?;
            let selected = select.statement.projections.items.iter().find_map(|item| {
                let Projection::Column {
                    owner, name, alias, ..
                } = item
                else {
                    return None;
                };
                if !alias.as_deref().unwrap_or(name).eq_ignore_ascii_case(label) {
                    return None;
                }
                tables
                    .iter()
                    .filter(|t| owner.as_deref().is_none_or(|o| t.is_referenced_by(o)))
                    .find_map(|t| rule.find_column(&t.name, name))
            });
            let column = selected.or_else(|| tables.iter().find_map(|t| rule.find_by_cipher_column(&t.name, label)))?;
            Some(column.encryptor.clone())
        })
        .collect()
}

/// Decrypts cipher columns as they are read.
#[derive(Debug)]
pub struct EncryptDecoratorMergedResult {
    inner: Box<dyn MergedResult>,
    decryptors: Vec<Option<Arc<dyn Encryptor>>>,
}

impl EncryptDecoratorMergedResult {
    pub fn new(inner: Box<dyn MergedResult>, decryptors: Vec<Option<Arc<dyn Encryptor>>>) -> Self {
        EncryptDecoratorMergedResult { inner, decryptors }
    }
}

impl MergedResult for EncryptDecoratorMergedResult {
    fn next(&mut self) -> Result<bool> {
        self.inner.next()
    }

    fn value(&self, column: usize) -> Result<ScalarValue> {
        let value = self.inner.value(column)?;
        match self.decryptors.get(column).and_then(|d| d.as_ref()) {
            Some(encryptor) => encryptor.decrypt(&value).map_err(|err| {
                ShardingError::merge("Failed to decrypt column")
                    .with_field("column", column)
                    .with_source(Box::new(err))
            }),
            None => Ok(value),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
