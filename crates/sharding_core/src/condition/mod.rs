//! Sharding condition extraction.
//!
//! Conditions are the column value constraints routing narrows on. INSERTs
//! produce one condition per row. SELECT, UPDATE and DELETE produce at most
//! one condition built from the top level AND conjuncts of WHERE.

pub mod generated_key;

use std::fmt;
use std::ops::Bound;

use generated_key::GeneratedKeyContext;
use sharding_error::{Result, ShardingError};
use tracing::trace;

use crate::rule::ShardingRule;
use crate::rule::algorithm::RangeShardingValue;
use crate::rule::strategy::ShardingValues;
use crate::statement::SqlStatementContext;
use crate::statement::dml::UpdateStatement;
use crate::statement::insert::InsertStatementContext;
use crate::statement::segment::{ColumnSegment, CompareOp, ExprSegment, Predicate, TableSegment};
use crate::value::ScalarValue;

/// Constraint on one sharding column of one logic table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardingConditionValue {
    pub table: String,
    pub column: String,
    pub values: ShardingValues,
    /// Parameter indexes the values came from.
    pub parameter_markers: Vec<usize>,
}

impl fmt::Display for ShardingConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} in {}", self.table, self.column, self.values)
    }
}

/// Constraints that hold together, e.g. one insert row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShardingCondition {
    pub values: Vec<ShardingConditionValue>,
    /// Start of the insert row or WHERE predicate this came from.
    pub start_index: usize,
    pub(crate) always_false: bool,
}

impl ShardingCondition {
    /// A condition no row can satisfy.
    pub fn always_false(start_index: usize) -> Self {
        ShardingCondition {
            values: Vec::new(),
            start_index,
            always_false: true,
        }
    }

    pub fn is_always_false(&self) -> bool {
        self.always_false
    }

    /// Constraint on `column` of `table`.
    pub fn find(&self, table: &str, column: &str) -> Option<&ShardingConditionValue> {
        self.values
            .iter()
            .find(|v| v.table.eq_ignore_ascii_case(table) && v.column.eq_ignore_ascii_case(column))
    }

    /// If this condition narrows `table` at all.
    pub fn has_table(&self, table: &str) -> bool {
        self.values.iter().any(|v| v.table.eq_ignore_ascii_case(table))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShardingConditions {
    pub conditions: Vec<ShardingCondition>,
}

impl ShardingConditions {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Every condition is unsatisfiable. No conditions at all is not always
    /// false, it means no narrowing.
    pub fn is_always_false(&self) -> bool {
        !self.conditions.is_empty() && self.conditions.iter().all(|c| c.is_always_false())
    }
}

/// Extract conditions for a statement.
pub fn extract_conditions(
    rule: &ShardingRule,
    statement: &SqlStatementContext,
    parameters: &[ScalarValue],
    generated_key: Option<&GeneratedKeyContext>,
) -> Result<ShardingConditions> {
    let conditions = match statement {
        SqlStatementContext::Insert(insert) => extract_insert(rule, insert, parameters, generated_key)?,
        SqlStatementContext::Update(update) => {
            let conditions = extract_where(rule, &update.tables, update.where_predicate.as_ref(), parameters)?;
            check_update_sharding_columns(rule, update, &conditions, parameters)?;
            conditions
        }
        SqlStatementContext::Select(_) | SqlStatementContext::Delete(_) => {
            extract_where(rule, statement.tables(), statement.where_predicate(), parameters)?
        }
        SqlStatementContext::Ddl(_) | SqlStatementContext::Dcl(_) => ShardingConditions::default(),
    };
    trace!(conditions = conditions.conditions.len(), "extracted sharding conditions");
    Ok(conditions)
}

fn extract_insert(
    rule: &ShardingRule,
    insert: &InsertStatementContext,
    parameters: &[ScalarValue],
    generated_key: Option<&GeneratedKeyContext>,
) -> Result<ShardingConditions> {
    let table = insert.table_name();
    let Some(table_rule) = rule.find_table_rule(table) else {
        return Ok(ShardingConditions::default());
    };

    if insert.column_names.is_empty() {
        return Err(ShardingError::unsupported("Insert into a sharded table requires a column list")
            .with_field("table", table.to_string()));
    }
    for assignment in &insert.statement.on_duplicate_key_assignments {
        if table_rule.is_sharding_column(&assignment.column.name) {
            return Err(ShardingError::unsupported("Cannot update sharding column on duplicate key")
                .with_field("table", table.to_string())
                .with_field("column", assignment.column.name.clone()));
        }
    }

    let mut conditions = Vec::with_capacity(insert.rows.len());
    for (row_idx, row) in insert.rows.iter().enumerate() {
        let mut condition = ShardingCondition {
            start_index: insert
                .statement
                .values
                .get(row_idx)
                .map(|r| r.start)
                .unwrap_or_default(),
            ..Default::default()
        };

        for (column, expr) in insert.column_names.iter().zip(&row.exprs) {
            if !table_rule.is_sharding_column(column) {
                continue;
            }
            let Some(value) = expr.resolve(parameters) else {
                continue;
            };
            condition.values.push(ShardingConditionValue {
                table: table_rule.logic_table.clone(),
                column: column.clone(),
                values: ShardingValues::List(vec![value]),
                parameter_markers: expr.parameter_index().into_iter().collect(),
            });
        }

        if let Some(key) = generated_key.filter(|k| k.generated) {
            if table_rule.is_sharding_column(&key.column) {
                if let Some(value) = key.values.get(row_idx) {
                    condition.values.push(ShardingConditionValue {
                        table: table_rule.logic_table.clone(),
                        column: key.column.clone(),
                        values: ShardingValues::List(vec![value.clone()]),
                        parameter_markers: Vec::new(),
                    });
                }
            }
        }
        conditions.push(condition);
    }

    Ok(ShardingConditions { conditions })
}

/// Tables a column may belong to.
fn resolve_column_tables<'a>(rule: &ShardingRule, tables: &'a [TableSegment], column: &ColumnSegment) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for table in tables {
        let matches = match &column.owner {
            Some(owner) => table.is_referenced_by(owner),
            None => rule.is_sharding_column(&column.name, &table.name),
        };
        if matches && !out.iter().any(|t| t.eq_ignore_ascii_case(&table.name)) {
            out.push(&table.name);
        }
    }
    out
}

/// Accumulates WHERE constraints per (table, column).
#[derive(Debug, Default)]
struct ConditionBuilder {
    values: Vec<ShardingConditionValue>,
    /// Columns constrained by operators that can't be narrowed on.
    poisoned: Vec<(String, String)>,
    always_false: bool,
}

impl ConditionBuilder {
    fn poison(&mut self, table: &str, column: &str) {
        self.poisoned.push((table.to_lowercase(), column.to_lowercase()));
    }

    fn add(&mut self, table: &str, column: &str, values: ShardingValues, markers: Vec<usize>) {
        let existing = self
            .values
            .iter_mut()
            .find(|v| v.table.eq_ignore_ascii_case(table) && v.column.eq_ignore_ascii_case(column));
        let Some(existing) = existing else {
            if is_empty(&values) {
                self.always_false = true;
            }
            self.values.push(ShardingConditionValue {
                table: table.to_string(),
                column: column.to_string(),
                values,
                parameter_markers: markers,
            });
            return;
        };

        let merged = intersect(&existing.values, &values);
        if is_empty(&merged) {
            self.always_false = true;
        }
        existing.values = merged;
        existing.parameter_markers.extend(markers);
    }

    fn build(self, start_index: usize) -> ShardingConditions {
        if self.always_false {
            return ShardingConditions {
                conditions: vec![ShardingCondition::always_false(start_index)],
            };
        }
        let poisoned = self.poisoned;
        let values: Vec<_> = self
            .values
            .into_iter()
            .filter(|v| {
                !poisoned
                    .iter()
                    .any(|(t, c)| v.table.eq_ignore_ascii_case(t) && v.column.eq_ignore_ascii_case(c))
            })
            .collect();
        if values.is_empty() {
            return ShardingConditions::default();
        }
        ShardingConditions {
            conditions: vec![ShardingCondition {
                values,
                start_index,
                always_false: false,
            }],
        }
    }
}

fn is_empty(values: &ShardingValues) -> bool {
    match values {
        ShardingValues::List(list) => list.is_empty(),
        ShardingValues::Range(range) => range.is_empty(),
    }
}

fn intersect(a: &ShardingValues, b: &ShardingValues) -> ShardingValues {
    match (a, b) {
        (ShardingValues::List(a), ShardingValues::List(b)) => {
            ShardingValues::List(a.iter().filter(|v| b.contains(v)).cloned().collect())
        }
        (ShardingValues::List(list), ShardingValues::Range(range))
        | (ShardingValues::Range(range), ShardingValues::List(list)) => {
            ShardingValues::List(list.iter().filter(|v| range.contains(v)).cloned().collect())
        }
        (ShardingValues::Range(a), ShardingValues::Range(b)) => ShardingValues::Range(a.intersect(b)),
    }
}

fn range_for(op: CompareOp, value: ScalarValue) -> RangeShardingValue {
    match op {
        CompareOp::Lt => RangeShardingValue {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(value),
        },
        CompareOp::LtEq => RangeShardingValue {
            lower: Bound::Unbounded,
            upper: Bound::Included(value),
        },
        CompareOp::Gt => RangeShardingValue {
            lower: Bound::Excluded(value),
            upper: Bound::Unbounded,
        },
        CompareOp::GtEq => RangeShardingValue {
            lower: Bound::Included(value),
            upper: Bound::Unbounded,
        },
        CompareOp::Eq | CompareOp::NotEq => RangeShardingValue::closed(value.clone(), value),
    }
}

fn resolve_all(exprs: &[&ExprSegment], parameters: &[ScalarValue]) -> Option<(Vec<ScalarValue>, Vec<usize>)> {
    let mut values = Vec::with_capacity(exprs.len());
    let mut markers = Vec::new();
    for expr in exprs {
        values.push(expr.resolve(parameters)?);
        markers.extend(expr.parameter_index());
    }
    Some((values, markers))
}

fn extract_where(
    rule: &ShardingRule,
    tables: &[TableSegment],
    predicate: Option<&Predicate>,
    parameters: &[ScalarValue],
) -> Result<ShardingConditions> {
    let Some(predicate) = predicate else {
        return Ok(ShardingConditions::default());
    };

    let mut builder = ConditionBuilder::default();
    for conjunct in predicate.conjuncts() {
        let (column, poisoning) = match conjunct {
            Predicate::Compare { column, op, .. } => (column, *op == CompareOp::NotEq),
            Predicate::In { column, not, .. } | Predicate::Between { column, not, .. } => (column, *not),
            // OR subtrees can't be narrowed on.
            Predicate::Or(_) | Predicate::Other | Predicate::And(_) => continue,
        };

        for table in resolve_column_tables(rule, tables, column) {
            if !rule.is_sharding_column(&column.name, table) {
                continue;
            }
            if poisoning {
                builder.poison(table, &column.name);
                continue;
            }

            let resolved = match conjunct {
                Predicate::Compare { op, right, .. } => resolve_all(&[right], parameters).map(|(mut values, markers)| {
                    let value = values.remove(0);
                    match op {
                        CompareOp::Eq => (ShardingValues::List(vec![value]), markers),
                        op => (ShardingValues::Range(range_for(*op, value)), markers),
                    }
                }),
                Predicate::In { list, .. } => {
                    let exprs: Vec<_> = list.iter().collect();
                    resolve_all(&exprs, parameters).map(|(values, markers)| (ShardingValues::List(values), markers))
                }
                Predicate::Between { low, high, .. } => resolve_all(&[low, high], parameters).map(|(values, markers)| {
                    let mut values = values.into_iter();
                    let low = values.next().unwrap_or_default();
                    let high = values.next().unwrap_or_default();
                    (ShardingValues::Range(RangeShardingValue::closed(low, high)), markers)
                }),
                _ => None,
            };
            if let Some((values, markers)) = resolved {
                builder.add(table, &column.name, values, markers);
            }
        }
    }

    Ok(builder.build(0))
}

fn check_update_sharding_columns(
    rule: &ShardingRule,
    update: &UpdateStatement,
    conditions: &ShardingConditions,
    parameters: &[ScalarValue],
) -> Result<()> {
    for assignment in &update.assignments {
        for table in resolve_column_tables(rule, &update.tables, &assignment.column) {
            if !rule.is_sharding_column(&assignment.column.name, table) {
                continue;
            }
            let assigned = assignment.value.resolve(parameters);
            let unchanged = match (assigned, conditions.conditions.first()) {
                (Some(assigned), Some(condition)) => condition
                    .find(table, &assignment.column.name)
                    .is_some_and(|v| v.values == ShardingValues::List(vec![assigned])),
                _ => false,
            };
            if !unchanged {
                return Err(ShardingError::unsupported("Cannot update sharding column")
                    .with_field("table", table.to_string())
                    .with_field("column", assignment.column.name.clone()));
            }
        }
    }
    Ok(())
}
