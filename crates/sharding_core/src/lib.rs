//! Routing, rewriting and merging of logical SQL over sharded data sources.
pub mod condition;
pub mod config;
pub mod execute;
pub mod kernel;
pub mod merge;
pub mod registry;
pub mod rewrite;
pub mod route;
pub mod rule;
pub mod statement;
pub mod value;

pub use kernel::ShardingKernel;

#[cfg(test)]
pub(crate) mod testutil;
