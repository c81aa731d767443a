//! Parameter lists for rewritten statements.

use std::collections::BTreeMap;

use crate::route::context::{RouteResult, RouteUnit};
use crate::statement::insert::InsertStatementContext;
use crate::value::ScalarValue;

/// Parameters of a statement rewritten to the same SQL shape for every unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StandardParameterBuilder {
    original: Vec<ScalarValue>,
    replaced: BTreeMap<usize, ScalarValue>,
    /// Values inserted right after the parameter at the key index.
    inserted: BTreeMap<usize, Vec<ScalarValue>>,
    added: Vec<ScalarValue>,
}

impl StandardParameterBuilder {
    pub fn new(original: Vec<ScalarValue>) -> Self {
        StandardParameterBuilder {
            original,
            ..Default::default()
        }
    }

    pub fn replace(&mut self, index: usize, value: ScalarValue) {
        self.replaced.insert(index, value);
    }

    pub fn insert_after(&mut self, index: usize, values: impl IntoIterator<Item = ScalarValue>) {
        self.inserted.entry(index).or_default().extend(values);
    }

    pub fn add(&mut self, value: ScalarValue) {
        self.added.push(value);
    }

    pub fn build(&self) -> Vec<ScalarValue> {
        let mut out = Vec::with_capacity(self.original.len() + self.added.len());
        for (idx, value) in self.original.iter().enumerate() {
            out.push(self.replaced.get(&idx).unwrap_or(value).clone());
            if let Some(values) = self.inserted.get(&idx) {
                out.extend(values.iter().cloned());
            }
        }
        out.extend(self.added.iter().cloned());
        out
    }
}

/// Parameters of an `INSERT ... VALUES` statement, one group per row so that
/// every unit only binds the rows routed to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedParameterBuilder {
    groups: Vec<Vec<ScalarValue>>,
    /// Values appended to each row by the kernel, in the order the row renders
    /// them.
    added: Vec<Vec<ScalarValue>>,
    /// Parameters after the VALUES rows, e.g. ON DUPLICATE KEY UPDATE.
    trailing: Vec<ScalarValue>,
    /// Name of the column a generated key was derived for, if any.
    pub derived_column_name: Option<String>,
}

impl GroupedParameterBuilder {
    pub fn new(insert: &InsertStatementContext, parameters: &[ScalarValue]) -> Self {
        let groups: Vec<Vec<ScalarValue>> = insert.rows.iter().map(|row| row.parameters(parameters).to_vec()).collect();
        let consumed = insert.values_parameter_count().min(parameters.len());
        GroupedParameterBuilder {
            added: vec![Vec::new(); groups.len()],
            groups,
            trailing: parameters[consumed..].to_vec(),
            derived_column_name: None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.groups.len()
    }

    /// Replace the parameter at `position` within `row`.
    pub fn replace(&mut self, row: usize, position: usize, value: ScalarValue) {
        if let Some(slot) = self.groups.get_mut(row).and_then(|g| g.get_mut(position)) {
            *slot = value;
        }
    }

    pub fn add(&mut self, row: usize, value: ScalarValue) {
        if let Some(added) = self.added.get_mut(row) {
            added.push(value);
        }
    }

    /// Parameters of one row including added ones.
    pub fn row_parameters(&self, row: usize) -> Vec<ScalarValue> {
        let mut out = self.groups.get(row).cloned().unwrap_or_default();
        if let Some(added) = self.added.get(row) {
            out.extend(added.iter().cloned());
        }
        out
    }

    /// Parameters for the rows routed to `unit`, followed by the trailing
    /// parameters.
    pub fn parameters_for_unit(&self, unit: &RouteUnit, route_result: &RouteResult) -> Vec<ScalarValue> {
        let mut out = Vec::new();
        for row in 0..self.groups.len() {
            let routed = match route_result.original_data_nodes.get(row) {
                Some(nodes) if !nodes.is_empty() => nodes.iter().any(|node| unit.contains_data_node(node)),
                _ => true,
            };
            if routed {
                out.extend(self.row_parameters(row));
            }
        }
        out.extend(self.trailing.iter().cloned());
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterBuilder {
    Standard(StandardParameterBuilder),
    Grouped(GroupedParameterBuilder),
}

impl ParameterBuilder {
    pub fn parameters_for_unit(&self, unit: &RouteUnit, route_result: &RouteResult) -> Vec<ScalarValue> {
        match self {
            Self::Standard(builder) => builder.build(),
            Self::Grouped(builder) => builder.parameters_for_unit(unit, route_result),
        }
    }

    pub fn as_standard_mut(&mut self) -> Option<&mut StandardParameterBuilder> {
        match self {
            Self::Standard(builder) => Some(builder),
            Self::Grouped(_) => None,
        }
    }

    pub fn as_grouped_mut(&mut self) -> Option<&mut GroupedParameterBuilder> {
        match self {
            Self::Grouped(builder) => Some(builder),
            Self::Standard(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::context::RouteMapper;
    use crate::rule::data_node::DataNode;
    use crate::statement::insert::{InsertStatement, InsertValueRow};
    use crate::statement::segment::{ColumnSegment, ExprSegment, TableSegment};

    #[test]
    fn standard_replace_insert_and_add() {
        let mut builder = StandardParameterBuilder::new(vec![1.into(), 2.into(), 3.into()]);
        builder.replace(1, 20.into());
        builder.insert_after(0, [10.into()]);
        builder.add(99.into());
        assert_eq!(
            vec![
                ScalarValue::Int64(1),
                ScalarValue::Int64(10),
                ScalarValue::Int64(20),
                ScalarValue::Int64(3),
                ScalarValue::Int64(99),
            ],
            builder.build()
        );
    }

    #[test]
    fn grouped_filters_rows_per_unit() {
        let insert = InsertStatementContext::new(InsertStatement::values(
            TableSegment::new("t_order", 12),
            vec![ColumnSegment::new("user_id", 21)],
            28,
            vec![
                InsertValueRow::new(vec![ExprSegment::parameter(0, 38)], 37, 39),
                InsertValueRow::new(vec![ExprSegment::parameter(1, 43)], 42, 44),
            ],
        ));
        let mut builder = GroupedParameterBuilder::new(&insert, &[10.into(), 11.into(), "x".into()]);
        builder.add(0, 100.into());
        builder.add(1, 101.into());

        let route_result = RouteResult {
            units: Vec::new(),
            original_data_nodes: vec![
                vec![DataNode::new("ds_0", "t_order_0")],
                vec![DataNode::new("ds_1", "t_order_1")],
            ],
        };
        let unit = RouteUnit::new(
            RouteMapper::identity("ds_1"),
            vec![RouteMapper::new("t_order", "t_order_1")],
        );
        assert_eq!(
            vec![ScalarValue::Int64(11), ScalarValue::Int64(101), ScalarValue::from("x")],
            builder.parameters_for_unit(&unit, &route_result)
        );
    }
}
