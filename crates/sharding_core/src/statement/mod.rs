//! Parsed statements as consumed by the kernel.
//!
//! Parsing SQL happens elsewhere. Callers hand over the statement kind, the
//! referenced tables and the positioned segments routing and rewriting need.

pub mod dml;
pub mod insert;
pub mod segment;
pub mod select;

use std::fmt;

use dml::{DclStatement, DdlStatement, DeleteStatement, UpdateStatement};
use insert::{InsertStatement, InsertStatementContext};
use segment::{Predicate, TableSegment};
use select::{SelectStatement, SelectStatementContext};

use crate::value::ScalarValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Dcl,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Ddl => write!(f, "DDL"),
            Self::Dcl => write!(f, "DCL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlStatementContext {
    Select(SelectStatementContext),
    Insert(InsertStatementContext),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    Ddl(DdlStatement),
    Dcl(DclStatement),
}

impl SqlStatementContext {
    pub fn kind(&self) -> StatementKind {
        match self {
            Self::Select(_) => StatementKind::Select,
            Self::Insert(_) => StatementKind::Insert,
            Self::Update(_) => StatementKind::Update,
            Self::Delete(_) => StatementKind::Delete,
            Self::Ddl(_) => StatementKind::Ddl,
            Self::Dcl(_) => StatementKind::Dcl,
        }
    }

    /// Every table segment in source order. May contain the same table more
    /// than once.
    pub fn tables(&self) -> &[TableSegment] {
        match self {
            Self::Select(ctx) => &ctx.statement.tables,
            Self::Insert(ctx) => std::slice::from_ref(&ctx.statement.table),
            Self::Update(stmt) => &stmt.tables,
            Self::Delete(stmt) => &stmt.tables,
            Self::Ddl(stmt) => &stmt.tables,
            Self::Dcl(stmt) => &stmt.tables,
        }
    }

    /// Distinct table names in first-seen order.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for table in self.tables() {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&table.name)) {
                names.push(&table.name);
            }
        }
        names
    }

    pub fn where_predicate(&self) -> Option<&Predicate> {
        match self {
            Self::Select(ctx) => ctx.statement.where_predicate.as_ref(),
            Self::Update(stmt) => stmt.where_predicate.as_ref(),
            Self::Delete(stmt) => stmt.where_predicate.as_ref(),
            Self::Insert(_) | Self::Ddl(_) | Self::Dcl(_) => None,
        }
    }

    /// Reads that can go to a replica.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Select(ctx) if !ctx.statement.lock_for_update)
    }
}

impl From<SelectStatement> for SqlStatementContext {
    fn from(value: SelectStatement) -> Self {
        SqlStatementContext::Select(SelectStatementContext::new(value))
    }
}

impl From<InsertStatement> for SqlStatementContext {
    fn from(value: InsertStatement) -> Self {
        SqlStatementContext::Insert(InsertStatementContext::new(value))
    }
}

impl From<UpdateStatement> for SqlStatementContext {
    fn from(value: UpdateStatement) -> Self {
        SqlStatementContext::Update(value)
    }
}

impl From<DeleteStatement> for SqlStatementContext {
    fn from(value: DeleteStatement) -> Self {
        SqlStatementContext::Delete(value)
    }
}

impl From<DdlStatement> for SqlStatementContext {
    fn from(value: DdlStatement) -> Self {
        SqlStatementContext::Ddl(value)
    }
}

impl From<DclStatement> for SqlStatementContext {
    fn from(value: DclStatement) -> Self {
        SqlStatementContext::Dcl(value)
    }
}

/// A logical statement: SQL text, its parsed context and bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicSql {
    pub sql: String,
    pub statement: SqlStatementContext,
    pub parameters: Vec<ScalarValue>,
}

impl LogicSql {
    pub fn new(sql: impl Into<String>, statement: impl Into<SqlStatementContext>, parameters: Vec<ScalarValue>) -> Self {
        LogicSql {
            sql: sql.into(),
            statement: statement.into(),
            parameters,
        }
    }
}
