//! Swaps logical data sources backed by a primary and replicas for the
//! physical data source a statement should run against.

use tracing::trace;

use super::context::{RouteMapper, RouteResult, RouteUnit};
use crate::rule::primary_replica::PrimaryReplicaRule;
use crate::statement::SqlStatementContext;

/// Rewrite the actual data source of every unit routed to a primary replica
/// group. Reads go to a replica, everything else to the primary.
pub fn decorate(rule: &PrimaryReplicaRule, statement: &SqlStatementContext, result: &mut RouteResult) {
    if rule.is_empty() {
        return;
    }
    let read_only = statement.is_read_only();

    if result.units.is_empty() {
        if let [group] = rule.groups() {
            let actual = if read_only { group.read_data_source() } else { group.primary.as_str() };
            result
                .units
                .push(RouteUnit::new(RouteMapper::new(&group.name, actual), Vec::new()));
        }
        return;
    }

    for unit in &mut result.units {
        let Some(group) = rule.find_group(&unit.data_source.logic_name) else {
            continue;
        };
        let actual = if read_only { group.read_data_source() } else { group.primary.as_str() };
        trace!(group = %group.name, %actual, read_only, "replaced data source");
        unit.data_source.actual_name = actual.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::dml::DeleteStatement;
    use crate::statement::segment::TableSegment;
    use crate::statement::select::SelectStatement;
    use crate::testutil;

    fn user_units() -> RouteResult {
        RouteResult::new(vec![
            RouteUnit::new(RouteMapper::identity("ds_0"), vec![RouteMapper::new("t_user", "t_user")]),
            RouteUnit::new(RouteMapper::identity("ds_1"), vec![RouteMapper::new("t_user", "t_user")]),
        ])
    }

    #[test]
    fn select_reads_replica() {
        let rule = testutil::primary_replica_rule();
        let select: SqlStatementContext = SelectStatement {
            tables: vec![TableSegment::new("t_user", 14)],
            ..Default::default()
        }
        .into();
        let mut result = user_units();
        decorate(rule.primary_replica_rule(), &select, &mut result);
        assert_eq!(vec!["replica_0", "replica_1"], result.actual_data_sources());
        assert_eq!("ds_0", result.units[0].data_source.logic_name);
    }

    #[test]
    fn locking_select_and_writes_use_primary() {
        let rule = testutil::primary_replica_rule();
        let locking: SqlStatementContext = SelectStatement {
            tables: vec![TableSegment::new("t_user", 14)],
            lock_for_update: true,
            ..Default::default()
        }
        .into();
        let mut result = user_units();
        decorate(rule.primary_replica_rule(), &locking, &mut result);
        assert_eq!(vec!["primary_0", "primary_1"], result.actual_data_sources());

        let delete: SqlStatementContext = DeleteStatement {
            tables: vec![TableSegment::new("t_user", 12)],
            where_predicate: None,
        }
        .into();
        let mut result = user_units();
        decorate(rule.primary_replica_rule(), &delete, &mut result);
        assert_eq!(vec!["primary_0", "primary_1"], result.actual_data_sources());
    }
}
