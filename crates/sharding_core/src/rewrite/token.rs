//! Positional edits applied to the logical SQL text.
//!
//! A token either substitutes the inclusive span `start..=stop` or, when it
//! has no stop, inserts its text at `start`.

use std::cmp::Ordering;

use crate::route::context::RouteUnit;
use crate::rule::data_node::DataNode;
use crate::statement::segment::ExprSegment;
use crate::value::ScalarValue;

/// One value of a rewritten insert row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertTokenValue {
    /// Expression as written in the logical statement.
    Expr(ExprSegment),
    /// Value added or replaced by the kernel, rendered inline.
    Literal(ScalarValue),
    /// Value added or replaced by the kernel, bound as a parameter.
    Parameter,
}

impl InsertTokenValue {
    fn render(&self) -> String {
        match self {
            Self::Expr(expr) => expr.to_sql(),
            Self::Literal(value) => value.to_sql_literal(),
            Self::Parameter => "?".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertValuesTokenRow {
    pub values: Vec<InsertTokenValue>,
    /// Nodes this row routed to. Empty means every unit gets the row.
    pub data_nodes: Vec<DataNode>,
}

impl InsertValuesTokenRow {
    fn is_routed_to(&self, unit: &RouteUnit) -> bool {
        self.data_nodes.is_empty() || self.data_nodes.iter().any(|node| unit.contains_data_node(node))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlToken {
    /// Logic table name replaced with the unit's actual table.
    TableName { start: usize, stop: usize, logic_table: String },
    /// Derived select items appended to the select list.
    Projections { start: usize, items: Vec<String> },
    /// ORDER BY generated from GROUP BY.
    OrderBy { start: usize, text: String },
    /// `AGG(DISTINCT x)` replaced with the plain column.
    AggregationDistinct { start: usize, stop: usize, text: String },
    Offset { start: usize, stop: usize, revised: i64 },
    RowCount { start: usize, stop: usize, revised: i64 },
    /// Columns appended to the insert column list.
    InsertColumns { start: usize, columns: Vec<String> },
    /// `, key = value` appended to `INSERT ... SET`.
    GeneratedKeyAssignment { start: usize, column: String, value: InsertTokenValue },
    /// Every VALUES row, filtered per unit.
    InsertValues {
        start: usize,
        stop: usize,
        rows: Vec<InsertValuesTokenRow>,
    },
    /// Column or value replaced for encrypted columns.
    Encrypt { start: usize, stop: usize, text: String },
}

impl SqlToken {
    pub fn start(&self) -> usize {
        match self {
            Self::TableName { start, .. }
            | Self::Projections { start, .. }
            | Self::OrderBy { start, .. }
            | Self::AggregationDistinct { start, .. }
            | Self::Offset { start, .. }
            | Self::RowCount { start, .. }
            | Self::InsertColumns { start, .. }
            | Self::GeneratedKeyAssignment { start, .. }
            | Self::InsertValues { start, .. }
            | Self::Encrypt { start, .. } => *start,
        }
    }

    /// Inclusive stop for substituting tokens, None for insertions.
    pub fn stop(&self) -> Option<usize> {
        match self {
            Self::TableName { stop, .. }
            | Self::AggregationDistinct { stop, .. }
            | Self::Offset { stop, .. }
            | Self::RowCount { stop, .. }
            | Self::InsertValues { stop, .. }
            | Self::Encrypt { stop, .. } => Some(*stop),
            Self::Projections { .. }
            | Self::OrderBy { .. }
            | Self::InsertColumns { .. }
            | Self::GeneratedKeyAssignment { .. } => None,
        }
    }

    pub fn is_substitutable(&self) -> bool {
        self.stop().is_some()
    }

    fn rank(&self) -> u8 {
        match self {
            Self::TableName { .. } => 0,
            Self::Projections { .. } => 1,
            Self::OrderBy { .. } => 2,
            Self::AggregationDistinct { .. } => 3,
            Self::Offset { .. } => 4,
            Self::RowCount { .. } => 5,
            Self::InsertColumns { .. } => 6,
            Self::GeneratedKeyAssignment { .. } => 7,
            Self::InsertValues { .. } => 8,
            Self::Encrypt { .. } => 9,
        }
    }

    /// Order tokens are applied in: by start, then variant, then stop.
    pub fn apply_order(&self, other: &SqlToken) -> Ordering {
        self.start()
            .cmp(&other.start())
            .then_with(|| self.rank().cmp(&other.rank()))
            .then_with(|| self.stop().cmp(&other.stop()))
    }

    /// Text this token renders to for one route unit.
    pub fn render(&self, unit: Option<&RouteUnit>) -> String {
        match self {
            Self::TableName { logic_table, .. } => unit
                .and_then(|u| u.actual_table(logic_table))
                .unwrap_or(logic_table)
                .to_string(),
            Self::Projections { items, .. } => items.iter().map(|item| format!(", {item}")).collect(),
            Self::OrderBy { text, .. } | Self::AggregationDistinct { text, .. } | Self::Encrypt { text, .. } => {
                text.clone()
            }
            Self::Offset { revised, .. } | Self::RowCount { revised, .. } => revised.to_string(),
            Self::InsertColumns { columns, .. } => columns.iter().map(|c| format!(", {c}")).collect(),
            Self::GeneratedKeyAssignment { column, value, .. } => format!(", {column} = {}", value.render()),
            Self::InsertValues { rows, .. } => {
                let rendered: Vec<String> = rows
                    .iter()
                    .filter(|row| unit.is_none_or(|u| row.is_routed_to(u)))
                    .map(|row| {
                        let values: Vec<String> = row.values.iter().map(|v| v.render()).collect();
                        format!("({})", values.join(", "))
                    })
                    .collect();
                rendered.join(", ")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::context::RouteMapper;

    #[test]
    fn insert_values_filtered_by_unit() {
        let token = SqlToken::InsertValues {
            start: 10,
            stop: 30,
            rows: vec![
                InsertValuesTokenRow {
                    values: vec![
                        InsertTokenValue::Expr(ExprSegment::parameter(0, 11)),
                        InsertTokenValue::Literal("a".into()),
                    ],
                    data_nodes: vec![DataNode::new("ds_0", "t_order_0")],
                },
                InsertValuesTokenRow {
                    values: vec![
                        InsertTokenValue::Expr(ExprSegment::parameter(1, 20)),
                        InsertTokenValue::Parameter,
                    ],
                    data_nodes: vec![DataNode::new("ds_1", "t_order_1")],
                },
            ],
        };
        let unit = RouteUnit::new(
            RouteMapper::identity("ds_1"),
            vec![RouteMapper::new("t_order", "t_order_1")],
        );
        assert_eq!("(?, ?)", token.render(Some(&unit)));
        assert_eq!("(?, 'a'), (?, ?)", token.render(None));
    }

    #[test]
    fn insertions_sort_before_substitutions_at_same_start() {
        let insertion = SqlToken::InsertColumns {
            start: 5,
            columns: vec!["id".to_string()],
        };
        let substitution = SqlToken::Encrypt {
            start: 5,
            stop: 9,
            text: "x".to_string(),
        };
        assert_eq!(Ordering::Less, insertion.apply_order(&substitution));
        assert_eq!(Ordering::Greater, substitution.apply_order(&insertion));
    }
}
