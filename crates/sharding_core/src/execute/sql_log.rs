//! Logging of logical and actual SQL when `sql_show` is enabled.

use tracing::info;

use super::ExecutionUnit;

pub const SQL_LOG_TARGET: &str = "sharding::sql";

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlLogger {
    /// Log only the data sources hit instead of every unit.
    pub simple: bool,
}

impl SqlLogger {
    pub fn new(simple: bool) -> Self {
        SqlLogger { simple }
    }

    pub fn log(&self, logic_sql: &str, units: &[ExecutionUnit]) {
        for line in self.lines(logic_sql, units) {
            info!(target: SQL_LOG_TARGET, "{line}");
        }
    }

    fn lines(&self, logic_sql: &str, units: &[ExecutionUnit]) -> Vec<String> {
        let mut lines = Vec::with_capacity(units.len() + 1);
        lines.push(format!("Logic SQL: {logic_sql}"));
        if self.simple {
            let mut sources: Vec<&str> = Vec::new();
            for unit in units {
                if !sources.contains(&unit.data_source.as_str()) {
                    sources.push(&unit.data_source);
                }
            }
            lines.push(format!("Actual SQL(simple): [{}] ::: {}", sources.join(", "), units.len()));
        } else {
            lines.extend(units.iter().map(|unit| format!("Actual SQL: {unit}")));
        }
        lines
    }
}
