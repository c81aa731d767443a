use std::fmt;

use sharding_error::{Result, ShardingError};

use super::segment::{Predicate, TableSegment};
use crate::value::{NullsOrder, ScalarValue};

pub const AVG_DERIVED_COUNT_PREFIX: &str = "AVG_DERIVED_COUNT_";
pub const AVG_DERIVED_SUM_PREFIX: &str = "AVG_DERIVED_SUM_";
pub const ORDER_BY_DERIVED_PREFIX: &str = "ORDER_BY_DERIVED_";
pub const GROUP_BY_DERIVED_PREFIX: &str = "GROUP_BY_DERIVED_";
pub const AGGREGATION_DISTINCT_DERIVED_PREFIX: &str = "AGGREGATION_DISTINCT_DERIVED_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    Count,
    Sum,
    Max,
    Min,
    Avg,
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => write!(f, "COUNT"),
            Self::Sum => write!(f, "SUM"),
            Self::Max => write!(f, "MAX"),
            Self::Min => write!(f, "MIN"),
            Self::Avg => write!(f, "AVG"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Column {
        owner: Option<String>,
        name: String,
        alias: Option<String>,
        start: usize,
        stop: usize,
    },
    Aggregation {
        kind: AggregationKind,
        distinct: bool,
        /// Full expression as written, e.g. `COUNT(DISTINCT user_id)`.
        expression: String,
        /// Expression inside the parentheses without DISTINCT.
        inner_expression: String,
        alias: Option<String>,
        start: usize,
        stop: usize,
    },
    /// `*` or `t.*`.
    Shorthand { owner: Option<String>, start: usize, stop: usize },
    Expression {
        text: String,
        alias: Option<String>,
        start: usize,
        stop: usize,
    },
}

impl Projection {
    pub fn column(name: impl Into<String>, start: usize) -> Self {
        let name = name.into();
        let stop = start + name.len() - 1;
        Projection::Column {
            owner: None,
            name,
            alias: None,
            start,
            stop,
        }
    }

    /// Aggregation spanning the text of `expression` starting at `start`.
    pub fn aggregation(kind: AggregationKind, distinct: bool, inner: &str, expression: &str, start: usize) -> Self {
        Projection::Aggregation {
            kind,
            distinct,
            expression: expression.to_string(),
            inner_expression: inner.to_string(),
            alias: None,
            start,
            stop: start + expression.len() - 1,
        }
    }

    pub fn with_alias(mut self, new_alias: impl Into<String>) -> Self {
        match &mut self {
            Projection::Column { alias, .. }
            | Projection::Aggregation { alias, .. }
            | Projection::Expression { alias, .. } => *alias = Some(new_alias.into()),
            Projection::Shorthand { .. } => (),
        }
        self
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Projection::Column { alias, .. }
            | Projection::Aggregation { alias, .. }
            | Projection::Expression { alias, .. } => alias.as_deref(),
            Projection::Shorthand { .. } => None,
        }
    }

    /// Label a physical result is expected to carry for this projection.
    pub fn label(&self, distinct_alias: Option<&str>) -> Option<String> {
        match self {
            Projection::Column { name, alias, .. } => Some(alias.clone().unwrap_or_else(|| name.clone())),
            Projection::Aggregation {
                distinct: true, alias, ..
            } => alias.clone().or_else(|| distinct_alias.map(|s| s.to_string())),
            Projection::Aggregation {
                expression, alias, ..
            } => Some(alias.clone().unwrap_or_else(|| expression.clone())),
            Projection::Expression { text, alias, .. } => Some(alias.clone().unwrap_or_else(|| text.clone())),
            Projection::Shorthand { .. } => None,
        }
    }
}

/// The select list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectionsSegment {
    pub start: usize,
    /// Stop of the last projection. Derived projections are appended right
    /// after it.
    pub stop: usize,
    /// `SELECT DISTINCT`.
    pub distinct_row: bool,
    pub items: Vec<Projection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderByColumn {
    Column { owner: Option<String>, name: String },
    /// 1-based position in the select list.
    Position(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByItem {
    pub column: OrderByColumn,
    pub direction: OrderDirection,
    /// Explicit NULLS FIRST/LAST. When absent NULL is the smallest value.
    pub nulls: Option<NullsOrder>,
}

impl OrderByItem {
    pub fn asc(name: impl Into<String>) -> Self {
        OrderByItem {
            column: OrderByColumn::Column {
                owner: None,
                name: name.into(),
            },
            direction: OrderDirection::Asc,
            nulls: None,
        }
    }

    pub fn desc(name: impl Into<String>) -> Self {
        OrderByItem {
            direction: OrderDirection::Desc,
            ..Self::asc(name)
        }
    }

    fn render(&self) -> String {
        let column = match &self.column {
            OrderByColumn::Column { owner: Some(owner), name } => format!("{owner}.{name}"),
            OrderByColumn::Column { owner: None, name } => name.clone(),
            OrderByColumn::Position(pos) => pos.to_string(),
        };
        let direction = match self.direction {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        };
        format!("{column} {direction}")
    }

    /// Same column and direction.
    fn same_item(&self, other: &OrderByItem) -> bool {
        let same_column = match (&self.column, &other.column) {
            (OrderByColumn::Column { name: a, .. }, OrderByColumn::Column { name: b, .. }) => a.eq_ignore_ascii_case(b),
            (OrderByColumn::Position(a), OrderByColumn::Position(b)) => a == b,
            _ => false,
        };
        same_column && self.direction == other.direction
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStyle {
    /// `LIMIT n OFFSET m`, `LIMIT m, n`, `OFFSET m ROWS FETCH NEXT n ROWS`.
    Limit,
    /// Oracle style `ROWNUM` bounds.
    RowNumber,
    /// SQL Server `TOP n` with `ROW_NUMBER()` offset.
    Top,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationValue {
    Literal(i64),
    /// 0-based parameter index.
    Parameter(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationValueSegment {
    pub value: PaginationValue,
    pub start: usize,
    pub stop: usize,
    /// Exclusive bound, e.g. `rownum < 5` or `row_ > 2`.
    pub bound_opened: bool,
}

impl PaginationValueSegment {
    pub fn literal(value: i64, start: usize, stop: usize) -> Self {
        PaginationValueSegment {
            value: PaginationValue::Literal(value),
            start,
            stop,
            bound_opened: false,
        }
    }

    pub fn parameter(index: usize, start: usize) -> Self {
        PaginationValueSegment {
            value: PaginationValue::Parameter(index),
            start,
            stop: start,
            bound_opened: false,
        }
    }

    pub fn opened(mut self) -> Self {
        self.bound_opened = true;
        self
    }

    fn resolve(&self, parameters: &[ScalarValue]) -> Result<i64> {
        match self.value {
            PaginationValue::Literal(v) => Ok(v),
            PaginationValue::Parameter(idx) => parameters
                .get(idx)
                .ok_or_else(|| {
                    ShardingError::new("Missing parameter for pagination value").with_field("parameter_index", idx)
                })?
                .try_as_i64(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSegment {
    pub style: PaginationStyle,
    pub offset: Option<PaginationValueSegment>,
    pub row_count: Option<PaginationValueSegment>,
}

/// Pagination with values resolved against the bound parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationContext {
    pub style: PaginationStyle,
    pub offset_segment: Option<PaginationValueSegment>,
    pub row_count_segment: Option<PaginationValueSegment>,
    offset: Option<i64>,
    row_count: Option<i64>,
}

impl PaginationContext {
    pub fn new(segment: &PaginationSegment, parameters: &[ScalarValue]) -> Result<Self> {
        Ok(PaginationContext {
            style: segment.style,
            offset_segment: segment.offset,
            row_count_segment: segment.row_count,
            offset: segment.offset.map(|s| s.resolve(parameters)).transpose()?,
            row_count: segment.row_count.map(|s| s.resolve(parameters)).transpose()?,
        })
    }

    pub fn has_pagination(&self) -> bool {
        self.offset.is_some() || self.row_count.is_some()
    }

    /// Number of logical rows to skip. An opened offset bound excludes the
    /// boundary row itself, so one fewer row is skipped.
    pub fn actual_offset(&self) -> i64 {
        let (Some(segment), Some(offset)) = (self.offset_segment, self.offset) else {
            return 0;
        };
        let offset = if segment.bound_opened { offset - 1 } else { offset };
        offset.max(0)
    }

    /// Row count as written. An opened row number bound is one less.
    pub fn actual_row_count(&self) -> Option<i64> {
        let (segment, row_count) = (self.row_count_segment?, self.row_count?);
        if segment.bound_opened && self.style == PaginationStyle::RowNumber {
            return Some(row_count - 1);
        }
        Some(row_count)
    }

    pub fn revised_offset(&self) -> i64 {
        0
    }

    /// Row count to ask every shard for so that the global window can be cut
    /// out after merging.
    pub fn revised_row_count(&self, select: &SelectStatementContext) -> Option<i64> {
        let row_count = self.actual_row_count()?;
        if select.is_max_row_count() {
            return Some(i64::MAX);
        }
        match self.style {
            PaginationStyle::Limit => Some(self.actual_offset().saturating_add(row_count)),
            PaginationStyle::RowNumber | PaginationStyle::Top => Some(row_count),
        }
    }
}

/// Parsed SELECT.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectStatement {
    pub tables: Vec<TableSegment>,
    pub projections: ProjectionsSegment,
    pub where_predicate: Option<Predicate>,
    pub group_by: Vec<OrderByItem>,
    /// Stop index of the GROUP BY clause, needed to append a derived ORDER BY.
    pub group_by_stop: Option<usize>,
    pub order_by: Vec<OrderByItem>,
    pub pagination: Option<PaginationSegment>,
    /// `SELECT ... FOR UPDATE`, routed like a write.
    pub lock_for_update: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedKind {
    AvgCount,
    AvgSum,
    OrderBy,
    GroupBy,
}

/// A projection the kernel adds to the select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedProjection {
    pub kind: DerivedKind,
    pub expression: String,
    pub alias: String,
}

impl DerivedProjection {
    pub fn render(&self) -> String {
        format!("{} AS {}", self.expression, self.alias)
    }
}

/// Merge relevant view of one aggregation in the select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationProjection {
    pub kind: AggregationKind,
    pub distinct: bool,
    /// Label of the column holding the aggregated (or for DISTINCT, raw)
    /// value.
    pub label: String,
    /// For AVG, labels of the derived COUNT and SUM columns.
    pub avg_derived: Option<(String, String)>,
}

/// A SELECT with derived projections and ordering resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectStatementContext {
    pub statement: SelectStatement,
    pub derived_projections: Vec<DerivedProjection>,
    pub aggregations: Vec<AggregationProjection>,
    /// Effective ORDER BY, the GROUP BY items when only GROUP BY is given.
    pub order_by: Vec<OrderByItem>,
    pub order_by_generated: bool,
    /// Derived aliases for `AGG(DISTINCT x)` projections, by projection
    /// position.
    distinct_aliases: Vec<Option<String>>,
}

impl SelectStatementContext {
    pub fn new(statement: SelectStatement) -> Self {
        let mut derived_projections = Vec::new();
        let mut aggregations = Vec::new();
        let mut distinct_aliases = Vec::with_capacity(statement.projections.items.len());

        let mut avg_idx = 0;
        let mut distinct_idx = 0;
        for item in &statement.projections.items {
            let Projection::Aggregation {
                kind,
                distinct,
                expression,
                inner_expression,
                alias,
                ..
            } = item
            else {
                distinct_aliases.push(None);
                continue;
            };

            if *distinct {
                let derived = format!("{AGGREGATION_DISTINCT_DERIVED_PREFIX}{distinct_idx}");
                distinct_idx += 1;
                aggregations.push(AggregationProjection {
                    kind: *kind,
                    distinct: true,
                    label: alias.clone().unwrap_or_else(|| derived.clone()),
                    avg_derived: None,
                });
                distinct_aliases.push(Some(derived));
                continue;
            }

            distinct_aliases.push(None);
            let mut avg_derived = None;
            if *kind == AggregationKind::Avg {
                let count_alias = format!("{AVG_DERIVED_COUNT_PREFIX}{avg_idx}");
                let sum_alias = format!("{AVG_DERIVED_SUM_PREFIX}{avg_idx}");
                avg_idx += 1;
                derived_projections.push(DerivedProjection {
                    kind: DerivedKind::AvgCount,
                    expression: format!("COUNT({inner_expression})"),
                    alias: count_alias.clone(),
                });
                derived_projections.push(DerivedProjection {
                    kind: DerivedKind::AvgSum,
                    expression: format!("SUM({inner_expression})"),
                    alias: sum_alias.clone(),
                });
                avg_derived = Some((count_alias, sum_alias));
            }
            aggregations.push(AggregationProjection {
                kind: *kind,
                distinct: false,
                label: alias.clone().unwrap_or_else(|| expression.clone()),
                avg_derived,
            });
        }

        let (order_by, order_by_generated) = if statement.order_by.is_empty() && !statement.group_by.is_empty() {
            (statement.group_by.clone(), true)
        } else {
            (statement.order_by.clone(), false)
        };

        let has_shorthand = statement
            .projections
            .items
            .iter()
            .any(|p| matches!(p, Projection::Shorthand { .. }));
        if !has_shorthand {
            let mut order_idx = 0;
            for item in &order_by {
                if let Some(expression) = Self::missing_column(&statement.projections.items, &derived_projections, item)
                {
                    derived_projections.push(DerivedProjection {
                        kind: DerivedKind::OrderBy,
                        expression,
                        alias: format!("{ORDER_BY_DERIVED_PREFIX}{order_idx}"),
                    });
                    order_idx += 1;
                }
            }
            let mut group_idx = 0;
            for item in &statement.group_by {
                if let Some(expression) = Self::missing_column(&statement.projections.items, &derived_projections, item)
                {
                    derived_projections.push(DerivedProjection {
                        kind: DerivedKind::GroupBy,
                        expression,
                        alias: format!("{GROUP_BY_DERIVED_PREFIX}{group_idx}"),
                    });
                    group_idx += 1;
                }
            }
        }

        SelectStatementContext {
            statement,
            derived_projections,
            aggregations,
            order_by,
            order_by_generated,
            distinct_aliases,
        }
    }

    /// Expression to derive if the ORDER BY or GROUP BY column isn't selected.
    fn missing_column(items: &[Projection], derived: &[DerivedProjection], item: &OrderByItem) -> Option<String> {
        let OrderByColumn::Column { owner, name } = &item.column else {
            return None;
        };
        let selected = items.iter().any(|p| match p {
            Projection::Column {
                name: col, alias, ..
            } => col.eq_ignore_ascii_case(name) || alias.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(name)),
            other => other.alias().is_some_and(|a| a.eq_ignore_ascii_case(name)),
        });
        let expression = match owner {
            Some(owner) => format!("{owner}.{name}"),
            None => name.clone(),
        };
        let already_derived = derived.iter().any(|d| d.expression.eq_ignore_ascii_case(&expression));
        if selected || already_derived {
            None
        } else {
            Some(expression)
        }
    }

    pub fn group_by(&self) -> &[OrderByItem] {
        &self.statement.group_by
    }

    pub fn has_aggregation(&self) -> bool {
        !self.aggregations.is_empty()
    }

    pub fn is_distinct_row(&self) -> bool {
        self.statement.projections.distinct_row
    }

    /// GROUP BY is non empty and matches ORDER BY item for item.
    pub fn is_same_group_by_and_order_by(&self) -> bool {
        let group_by = &self.statement.group_by;
        !group_by.is_empty()
            && group_by.len() == self.order_by.len()
            && group_by.iter().zip(&self.order_by).all(|(a, b)| a.same_item(b))
    }

    /// Shards must return every row so that groups can be completed before
    /// paginating.
    pub fn is_max_row_count(&self) -> bool {
        (!self.statement.group_by.is_empty() || self.has_aggregation()) && !self.is_same_group_by_and_order_by()
    }

    pub fn pagination(&self, parameters: &[ScalarValue]) -> Result<Option<PaginationContext>> {
        self.statement
            .pagination
            .as_ref()
            .map(|segment| PaginationContext::new(segment, parameters))
            .transpose()
    }

    /// Derived alias for the `AGG(DISTINCT x)` projection at `position`.
    pub fn distinct_alias(&self, position: usize) -> Option<&str> {
        self.distinct_aliases.get(position).and_then(|a| a.as_deref())
    }

    /// Expected result labels for every non-shorthand projection plus the
    /// derived ones, in select list order.
    pub fn projection_labels(&self) -> Vec<Option<String>> {
        self.statement
            .projections
            .items
            .iter()
            .enumerate()
            .map(|(idx, p)| p.label(self.distinct_alias(idx)))
            .chain(self.derived_projections.iter().map(|d| Some(d.alias.clone())))
            .collect()
    }

    /// Text appended after GROUP BY when the ORDER BY was generated from it.
    pub fn generated_order_by_text(&self) -> Option<String> {
        if !self.order_by_generated {
            return None;
        }
        let items: Vec<_> = self.order_by.iter().map(|item| item.render()).collect();
        Some(format!(" ORDER BY {}", items.join(", ")))
    }
}
