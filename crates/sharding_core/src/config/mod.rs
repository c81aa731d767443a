pub mod props;
pub mod rule;
