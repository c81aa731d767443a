use super::segment::{Assignment, ColumnSegment, ExprSegment, TableSegment};

/// One parenthesized row of `VALUES (...), (...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertValueRow {
    pub exprs: Vec<ExprSegment>,
    /// Position of `(`.
    pub start: usize,
    /// Position of `)`.
    pub stop: usize,
}

impl InsertValueRow {
    pub fn new(exprs: Vec<ExprSegment>, start: usize, stop: usize) -> Self {
        InsertValueRow { exprs, start, stop }
    }

    pub fn parameter_count(&self) -> usize {
        self.exprs.iter().filter(|e| e.parameter_index().is_some()).count()
    }
}

/// `INSERT INTO t SET a = 1, b = ?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetAssignmentSegment {
    pub assignments: Vec<Assignment>,
    pub start: usize,
    pub stop: usize,
}

/// Parsed INSERT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub table: TableSegment,
    /// Explicit column list, empty when omitted.
    pub columns: Vec<ColumnSegment>,
    /// Position of the `)` closing the column list.
    pub columns_stop: Option<usize>,
    pub values: Vec<InsertValueRow>,
    pub set_assignment: Option<SetAssignmentSegment>,
    pub on_duplicate_key_assignments: Vec<Assignment>,
}

impl InsertStatement {
    pub fn values(table: TableSegment, columns: Vec<ColumnSegment>, columns_stop: usize, values: Vec<InsertValueRow>) -> Self {
        InsertStatement {
            table,
            columns,
            columns_stop: Some(columns_stop),
            values,
            set_assignment: None,
            on_duplicate_key_assignments: Vec::new(),
        }
    }
}

/// Values of one logical row along with where its parameters start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertValueContext {
    pub exprs: Vec<ExprSegment>,
    /// Index of the row's first parameter in the flat parameter list.
    pub parameter_offset: usize,
    pub parameter_count: usize,
}

impl InsertValueContext {
    /// Parameters bound to this row.
    pub fn parameters<'a, T>(&self, parameters: &'a [T]) -> &'a [T] {
        let end = (self.parameter_offset + self.parameter_count).min(parameters.len());
        let start = self.parameter_offset.min(end);
        &parameters[start..end]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatementContext {
    pub statement: InsertStatement,
    pub column_names: Vec<String>,
    pub rows: Vec<InsertValueContext>,
}

impl InsertStatementContext {
    pub fn new(statement: InsertStatement) -> Self {
        let (column_names, row_exprs): (Vec<String>, Vec<Vec<ExprSegment>>) = match &statement.set_assignment {
            Some(set) => (
                set.assignments.iter().map(|a| a.column.name.clone()).collect(),
                vec![set.assignments.iter().map(|a| a.value.clone()).collect()],
            ),
            None => (
                statement.columns.iter().map(|c| c.name.clone()).collect(),
                statement.values.iter().map(|row| row.exprs.clone()).collect(),
            ),
        };

        let mut rows = Vec::with_capacity(row_exprs.len());
        let mut offset = 0;
        for exprs in row_exprs {
            let parameter_count = exprs.iter().filter(|e| e.parameter_index().is_some()).count();
            rows.push(InsertValueContext {
                exprs,
                parameter_offset: offset,
                parameter_count,
            });
            offset += parameter_count;
        }

        InsertStatementContext {
            statement,
            column_names,
            rows,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.statement.table.name
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c.eq_ignore_ascii_case(column))
    }

    pub fn is_set_assignment(&self) -> bool {
        self.statement.set_assignment.is_some()
    }

    /// Span covering every VALUES row.
    pub fn values_span(&self) -> Option<(usize, usize)> {
        let first = self.statement.values.first()?;
        let last = self.statement.values.last()?;
        Some((first.start, last.stop))
    }

    /// Total parameters used by VALUES rows. Parameters after these belong to
    /// ON DUPLICATE KEY UPDATE.
    pub fn values_parameter_count(&self) -> usize {
        self.rows.iter().map(|r| r.parameter_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_offsets_per_row() {
        // INSERT INTO t_order (order_id, user_id) VALUES (?, ?), (3, ?)
        let stmt = InsertStatement::values(
            TableSegment::new("t_order", 12),
            vec![ColumnSegment::new("order_id", 21), ColumnSegment::new("user_id", 31)],
            38,
            vec![
                InsertValueRow::new(vec![ExprSegment::parameter(0, 48), ExprSegment::parameter(1, 51)], 47, 52),
                InsertValueRow::new(vec![ExprSegment::literal(3, 56, 56), ExprSegment::parameter(2, 59)], 55, 60),
            ],
        );
        let ctx = InsertStatementContext::new(stmt);
        assert_eq!(vec!["order_id", "user_id"], ctx.column_names);
        assert_eq!(2, ctx.rows[1].parameter_offset);
        assert_eq!(1, ctx.rows[1].parameter_count);
        assert_eq!(&[30][..], ctx.rows[1].parameters(&[10, 20, 30]));
        assert_eq!(Some((47, 60)), ctx.values_span());
        assert_eq!(Some(1), ctx.column_index("USER_ID"));
    }
}
