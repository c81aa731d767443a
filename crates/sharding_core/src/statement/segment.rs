//! Positioned pieces of a parsed statement.
//!
//! Every segment carries `start` and `stop` byte offsets into the original SQL
//! text. `stop` is inclusive.

use crate::value::ScalarValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSegment {
    pub name: String,
    pub alias: Option<String>,
    pub start: usize,
    pub stop: usize,
}

impl TableSegment {
    pub fn new(name: impl Into<String>, start: usize) -> Self {
        let name = name.into();
        let stop = start + name.len() - 1;
        TableSegment {
            name,
            alias: None,
            start,
            stop,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// If `owner` refers to this table by name or alias.
    pub fn is_referenced_by(&self, owner: &str) -> bool {
        self.name.eq_ignore_ascii_case(owner)
            || self
                .alias
                .as_deref()
                .is_some_and(|alias| alias.eq_ignore_ascii_case(owner))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSegment {
    /// Table name or alias qualifying the column.
    pub owner: Option<String>,
    pub name: String,
    pub start: usize,
    pub stop: usize,
}

impl ColumnSegment {
    /// Unqualified column, stop computed from the name length.
    pub fn new(name: impl Into<String>, start: usize) -> Self {
        let name = name.into();
        let stop = start + name.len() - 1;
        ColumnSegment {
            owner: None,
            name,
            start,
            stop,
        }
    }

    /// Qualified `owner.name` column, stop computed from both lengths.
    pub fn qualified(owner: impl Into<String>, name: impl Into<String>, start: usize) -> Self {
        let owner = owner.into();
        let name = name.into();
        let stop = start + owner.len() + name.len();
        ColumnSegment {
            owner: Some(owner),
            name,
            start,
            stop,
        }
    }
}

/// A value expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprSegment {
    Literal {
        value: ScalarValue,
        start: usize,
        stop: usize,
    },
    /// Positional parameter marker, `index` is 0-based in source order.
    Parameter { index: usize, start: usize, stop: usize },
    /// Anything the kernel doesn't interpret, e.g. `now()`.
    Complex { text: String, start: usize, stop: usize },
}

impl ExprSegment {
    pub fn literal(value: impl Into<ScalarValue>, start: usize, stop: usize) -> Self {
        ExprSegment::Literal {
            value: value.into(),
            start,
            stop,
        }
    }

    /// Parameter marker `?` at `start`.
    pub fn parameter(index: usize, start: usize) -> Self {
        ExprSegment::Parameter {
            index,
            start,
            stop: start,
        }
    }

    pub fn start(&self) -> usize {
        match self {
            Self::Literal { start, .. } | Self::Parameter { start, .. } | Self::Complex { start, .. } => *start,
        }
    }

    pub fn stop(&self) -> usize {
        match self {
            Self::Literal { stop, .. } | Self::Parameter { stop, .. } | Self::Complex { stop, .. } => *stop,
        }
    }

    pub fn parameter_index(&self) -> Option<usize> {
        match self {
            Self::Parameter { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Resolve to a concrete value. Complex expressions and out of range
    /// parameter markers resolve to None.
    pub fn resolve(&self, parameters: &[ScalarValue]) -> Option<ScalarValue> {
        match self {
            Self::Literal { value, .. } => Some(value.clone()),
            Self::Parameter { index, .. } => parameters.get(*index).cloned(),
            Self::Complex { .. } => None,
        }
    }

    /// Render for inclusion in rewritten SQL.
    pub fn to_sql(&self) -> String {
        match self {
            Self::Literal { value, .. } => value.to_sql_literal(),
            Self::Parameter { .. } => "?".to_string(),
            Self::Complex { text, .. } => text.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// WHERE clause predicate tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Compare {
        column: ColumnSegment,
        op: CompareOp,
        right: ExprSegment,
    },
    In {
        column: ColumnSegment,
        list: Vec<ExprSegment>,
        not: bool,
    },
    Between {
        column: ColumnSegment,
        low: ExprSegment,
        high: ExprSegment,
        not: bool,
    },
    /// Any predicate the kernel can't narrow on.
    Other,
}

impl Predicate {
    pub fn compare(column: ColumnSegment, op: CompareOp, right: ExprSegment) -> Self {
        Predicate::Compare { column, op, right }
    }

    pub fn eq(column: ColumnSegment, right: ExprSegment) -> Self {
        Self::compare(column, CompareOp::Eq, right)
    }

    /// Top level conjuncts. A non-AND predicate is its own single conjunct.
    pub fn conjuncts(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        self.collect_conjuncts(&mut out);
        out
    }

    fn collect_conjuncts<'a>(&'a self, out: &mut Vec<&'a Predicate>) {
        match self {
            Predicate::And(children) => {
                for child in children {
                    child.collect_conjuncts(out);
                }
            }
            other => out.push(other),
        }
    }

    /// Visit every leaf predicate, including those under OR.
    pub fn for_each_leaf<'a>(&'a self, f: &mut impl FnMut(&'a Predicate)) {
        match self {
            Predicate::And(children) | Predicate::Or(children) => {
                for child in children {
                    child.for_each_leaf(f);
                }
            }
            leaf => f(leaf),
        }
    }
}

/// `column = value` inside SET or ON DUPLICATE KEY UPDATE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub column: ColumnSegment,
    pub value: ExprSegment,
}

impl Assignment {
    pub fn new(column: ColumnSegment, value: ExprSegment) -> Self {
        Assignment { column, value }
    }

    pub fn start(&self) -> usize {
        self.column.start
    }

    pub fn stop(&self) -> usize {
        self.value.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conjuncts_flatten_nested_and() {
        let a = Predicate::eq(ColumnSegment::new("a", 0), ExprSegment::literal(1, 4, 4));
        let b = Predicate::eq(ColumnSegment::new("b", 10), ExprSegment::literal(2, 14, 14));
        let c = Predicate::Or(vec![a.clone(), b.clone()]);
        let pred = Predicate::And(vec![a.clone(), Predicate::And(vec![b.clone(), c.clone()])]);
        assert_eq!(vec![&a, &b, &c], pred.conjuncts());

        let mut leaves = 0;
        pred.for_each_leaf(&mut |_| leaves += 1);
        assert_eq!(4, leaves);
    }

    #[test]
    fn segment_positions() {
        let col = ColumnSegment::qualified("o", "order_id", 7);
        assert_eq!(16, col.stop);
        let table = TableSegment::new("t_order", 14).with_alias("o");
        assert_eq!(20, table.stop);
        assert!(table.is_referenced_by("O"));
    }

    #[test]
    fn resolve_parameter() {
        let params = vec![ScalarValue::Int64(9)];
        assert_eq!(Some(ScalarValue::Int64(9)), ExprSegment::parameter(0, 3).resolve(&params));
        assert_eq!(None, ExprSegment::parameter(1, 3).resolve(&params));
        assert_eq!("'a'", ExprSegment::literal("a", 0, 2).to_sql());
    }
}
