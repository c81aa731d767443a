use std::sync::Arc;

use super::data_node::DataNode;
use super::key_generator::KeyGenerator;
use super::strategy::ShardingStrategy;

/// Column filled in by a key generator when an insert omits it.
#[derive(Debug, Clone)]
pub struct GenerateKey {
    pub column: String,
    pub generator: Arc<dyn KeyGenerator>,
}

/// Sharding configuration for one logic table.
#[derive(Debug, Clone)]
pub struct TableRule {
    pub logic_table: String,
    actual_data_nodes: Vec<DataNode>,
    pub database_strategy: ShardingStrategy,
    pub table_strategy: ShardingStrategy,
    pub generate_key: Option<GenerateKey>,
}

impl TableRule {
    pub fn new(
        logic_table: impl Into<String>,
        actual_data_nodes: Vec<DataNode>,
        database_strategy: ShardingStrategy,
        table_strategy: ShardingStrategy,
        generate_key: Option<GenerateKey>,
    ) -> Self {
        TableRule {
            logic_table: logic_table.into(),
            actual_data_nodes,
            database_strategy,
            table_strategy,
            generate_key,
        }
    }

    pub fn actual_data_nodes(&self) -> &[DataNode] {
        &self.actual_data_nodes
    }

    /// Distinct data sources in node order.
    pub fn actual_data_sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for node in &self.actual_data_nodes {
            if !sources.contains(&node.data_source) {
                sources.push(node.data_source.clone());
            }
        }
        sources
    }

    /// Actual tables living in `data_source`, in node order.
    pub fn actual_tables_in(&self, data_source: &str) -> Vec<String> {
        self.actual_data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .map(|node| node.table.clone())
            .collect()
    }

    /// Position of `table` among the actual tables of `data_source`.
    pub fn find_actual_table_index(&self, data_source: &str, table: &str) -> Option<usize> {
        self.actual_data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .position(|node| node.table.eq_ignore_ascii_case(table))
    }

    pub fn is_existed(&self, actual_table: &str) -> bool {
        self.actual_data_nodes
            .iter()
            .any(|node| node.table.eq_ignore_ascii_case(actual_table))
    }

    pub fn is_sharding_column(&self, column: &str) -> bool {
        [&self.database_strategy, &self.table_strategy]
            .into_iter()
            .filter_map(|s| s.sharding_column())
            .any(|c| c.eq_ignore_ascii_case(column))
    }

    pub fn generate_key_column(&self) -> Option<&str> {
        self.generate_key.as_ref().map(|g| g.column.as_str())
    }
}
