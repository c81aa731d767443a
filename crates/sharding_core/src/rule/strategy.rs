use std::fmt;
use std::sync::Arc;

use sharding_error::Result;

use super::algorithm::{PreciseShardingValue, RangeShardingValue, ShardingAlgorithm};
use crate::value::ScalarValue;

/// Values a sharding column is constrained to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardingValues {
    /// Column equals one of these values.
    List(Vec<ScalarValue>),
    /// Column falls inside a range.
    Range(RangeShardingValue),
}

impl fmt::Display for ShardingValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(values) => {
                write!(f, "[")?;
                for (idx, v) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Self::Range(range) => write!(f, "{range}"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ShardingStrategy {
    /// Shard on a single column.
    Standard {
        column: String,
        algorithm: Arc<dyn ShardingAlgorithm>,
    },
    /// No sharding on this axis, every target is returned.
    None,
}

impl ShardingStrategy {
    pub fn sharding_column(&self) -> Option<&str> {
        match self {
            Self::Standard { column, .. } => Some(column),
            Self::None => None,
        }
    }

    /// Pick targets out of `available`.
    ///
    /// `values` is the constraint on this strategy's sharding column, or None
    /// if the column isn't constrained (full route). Targets are returned in
    /// the order they appear in `available`.
    pub fn do_sharding(
        &self,
        available: &[String],
        logic_table: &str,
        values: Option<&ShardingValues>,
    ) -> Result<Vec<String>> {
        let (column, algorithm) = match self {
            Self::Standard { column, algorithm } => (column, algorithm),
            Self::None => return Ok(available.to_vec()),
        };

        let picked = match values {
            None => return Ok(available.to_vec()),
            Some(ShardingValues::List(values)) => {
                let mut picked = Vec::with_capacity(values.len());
                for value in values {
                    let target = algorithm.do_sharding(
                        available,
                        &PreciseShardingValue {
                            logic_table,
                            column,
                            value,
                        },
                    )?;
                    picked.push(target);
                }
                picked
            }
            Some(ShardingValues::Range(range)) => {
                if range.is_empty() {
                    return Ok(Vec::new());
                }
                algorithm.do_sharding_range(available, range)?
            }
        };

        Ok(available
            .iter()
            .filter(|target| picked.contains(target))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::rule::algorithm::ModShardingAlgorithm;

    fn mod_strategy(column: &str, count: &str) -> ShardingStrategy {
        let props: BTreeMap<_, _> = [("sharding-count".to_string(), count.to_string())].into();
        ShardingStrategy::Standard {
            column: column.to_string(),
            algorithm: Arc::new(ModShardingAlgorithm::try_new(&props).unwrap()),
        }
    }

    fn available() -> Vec<String> {
        vec!["t_0".to_string(), "t_1".to_string(), "t_2".to_string()]
    }

    #[test]
    fn list_values_keep_available_order() {
        let strategy = mod_strategy("order_id", "3");
        let values = ShardingValues::List(vec![5.into(), 3.into(), 8.into()]);
        let targets = strategy.do_sharding(&available(), "t", Some(&values)).unwrap();
        assert_eq!(vec!["t_0", "t_2"], targets);
    }

    #[test]
    fn no_values_full_route() {
        let strategy = mod_strategy("order_id", "3");
        assert_eq!(available(), strategy.do_sharding(&available(), "t", None).unwrap());
        assert_eq!(
            available(),
            ShardingStrategy::None
                .do_sharding(&available(), "t", Some(&ShardingValues::List(vec![1.into()])))
                .unwrap()
        );
    }

    #[test]
    fn empty_range_routes_nowhere() {
        let strategy = mod_strategy("order_id", "3");
        let values = ShardingValues::Range(RangeShardingValue::closed(5.into(), 1.into()));
        assert!(strategy.do_sharding(&available(), "t", Some(&values)).unwrap().is_empty());
    }
}
