use super::segment::{Assignment, Predicate, TableSegment};

/// Parsed UPDATE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStatement {
    pub tables: Vec<TableSegment>,
    pub assignments: Vec<Assignment>,
    pub where_predicate: Option<Predicate>,
}

/// Parsed DELETE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteStatement {
    pub tables: Vec<TableSegment>,
    pub where_predicate: Option<Predicate>,
}

/// Parsed DDL. Only referenced tables matter for routing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DdlStatement {
    pub tables: Vec<TableSegment>,
}

/// Parsed DCL, e.g. GRANT. May reference no tables at all.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DclStatement {
    pub tables: Vec<TableSegment>,
}
