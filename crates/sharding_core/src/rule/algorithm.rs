//! Built-in sharding algorithms.
//!
//! Algorithms pick targets (data source names or actual table names) out of
//! the available targets for a logic table. Targets are matched by their
//! trailing number, `t_order_3` is target index 3.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

use sharding_error::{Result, ShardingError};

use crate::value::{NullsOrder, ScalarValue, compare_values};

/// A single value to shard on.
#[derive(Debug, Clone, Copy)]
pub struct PreciseShardingValue<'a> {
    pub logic_table: &'a str,
    pub column: &'a str,
    pub value: &'a ScalarValue,
}

/// A range of values to shard on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeShardingValue {
    pub lower: Bound<ScalarValue>,
    pub upper: Bound<ScalarValue>,
}

impl RangeShardingValue {
    pub const fn unbounded() -> Self {
        RangeShardingValue {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    pub fn closed(lower: ScalarValue, upper: ScalarValue) -> Self {
        RangeShardingValue {
            lower: Bound::Included(lower),
            upper: Bound::Included(upper),
        }
    }

    pub fn contains(&self, value: &ScalarValue) -> bool {
        let above_lower = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(l) => compare_values(value, l, NullsOrder::NullsFirst).is_ge(),
            Bound::Excluded(l) => compare_values(value, l, NullsOrder::NullsFirst).is_gt(),
        };
        let below_upper = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(u) => compare_values(value, u, NullsOrder::NullsFirst).is_le(),
            Bound::Excluded(u) => compare_values(value, u, NullsOrder::NullsFirst).is_lt(),
        };
        above_lower && below_upper
    }

    /// Intersect two ranges, keeping the tighter bound on each side.
    pub fn intersect(&self, other: &RangeShardingValue) -> RangeShardingValue {
        RangeShardingValue {
            lower: tighter_bound(&self.lower, &other.lower, true),
            upper: tighter_bound(&self.upper, &other.upper, false),
        }
    }

    /// If no value can satisfy this range. Integer ranges are compared after
    /// closing their bounds, so `(1, 2)` is empty.
    pub fn is_empty(&self) -> bool {
        let is_int = |bound: &Bound<ScalarValue>| {
            matches!(
                bound,
                Bound::Included(ScalarValue::Int64(_)) | Bound::Excluded(ScalarValue::Int64(_))
            )
        };
        if is_int(&self.lower) && is_int(&self.upper) {
            if let Some((lower, upper)) = self.as_closed_i64() {
                return lower > upper;
            }
        }
        match (&self.lower, &self.upper) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
            (Bound::Included(l), Bound::Included(u)) => compare_values(l, u, NullsOrder::NullsFirst).is_gt(),
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => compare_values(l, u, NullsOrder::NullsFirst).is_ge(),
        }
    }

    /// Get an inclusive integer range if both ends are bounded integers.
    fn as_closed_i64(&self) -> Option<(i64, i64)> {
        let lower = match &self.lower {
            Bound::Included(v) => v.try_as_i64().ok()?,
            Bound::Excluded(v) => v.try_as_i64().ok()?.checked_add(1)?,
            Bound::Unbounded => return None,
        };
        let upper = match &self.upper {
            Bound::Included(v) => v.try_as_i64().ok()?,
            Bound::Excluded(v) => v.try_as_i64().ok()?.checked_sub(1)?,
            Bound::Unbounded => return None,
        };
        Some((lower, upper))
    }
}

fn tighter_bound(a: &Bound<ScalarValue>, b: &Bound<ScalarValue>, is_lower: bool) -> Bound<ScalarValue> {
    let value = |bound: &Bound<ScalarValue>| match bound {
        Bound::Included(v) | Bound::Excluded(v) => Some(v.clone()),
        Bound::Unbounded => None,
    };
    match (value(a), value(b)) {
        (None, _) => b.clone(),
        (_, None) => a.clone(),
        (Some(va), Some(vb)) => match compare_values(&va, &vb, NullsOrder::NullsFirst) {
            std::cmp::Ordering::Equal => {
                // Same value, exclusive wins.
                if matches!(a, Bound::Excluded(_)) { a.clone() } else { b.clone() }
            }
            std::cmp::Ordering::Greater => {
                if is_lower { a.clone() } else { b.clone() }
            }
            std::cmp::Ordering::Less => {
                if is_lower { b.clone() } else { a.clone() }
            }
        },
    }
}

impl fmt::Display for RangeShardingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            Bound::Included(v) => write!(f, "[{v}")?,
            Bound::Excluded(v) => write!(f, "({v}")?,
            Bound::Unbounded => write!(f, "(-inf")?,
        }
        write!(f, "..")?;
        match &self.upper {
            Bound::Included(v) => write!(f, "{v}]"),
            Bound::Excluded(v) => write!(f, "{v})"),
            Bound::Unbounded => write!(f, "+inf)"),
        }
    }
}

pub trait ShardingAlgorithm: fmt::Debug + Sync + Send {
    /// Type name this algorithm is registered under.
    fn algorithm_type(&self) -> &'static str;

    /// Pick exactly one target for a single value.
    fn do_sharding(&self, available: &[String], value: &PreciseShardingValue) -> Result<String>;

    /// Pick every target that may hold values in the range.
    fn do_sharding_range(&self, available: &[String], range: &RangeShardingValue) -> Result<Vec<String>>;
}

/// Parse the trailing number of a target name.
pub fn target_suffix(name: &str) -> Option<u64> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

fn find_target(available: &[String], idx: u64) -> Option<&String> {
    available.iter().find(|name| target_suffix(name) == Some(idx))
}

fn no_target_error(algorithm: &str, value: &PreciseShardingValue, idx: u64) -> ShardingError {
    ShardingError::sharding_algorithm("Sharding failure, cannot find target for sharding value")
        .with_field("algorithm", algorithm.to_string())
        .with_field("table", value.logic_table.to_string())
        .with_field("column", value.column.to_string())
        .with_field("value", value.value)
        .with_field("target_index", idx)
}

fn required_prop<'a>(props: &'a BTreeMap<String, String>, key: &'static str, algorithm: &str) -> Result<&'a str> {
    props.get(key).map(|s| s.as_str()).ok_or_else(|| {
        ShardingError::config("Missing required algorithm property")
            .with_field("algorithm", algorithm.to_string())
            .with_field("property", key)
    })
}

fn parse_positive_prop(props: &BTreeMap<String, String>, key: &'static str, algorithm: &str) -> Result<u64> {
    let count: u64 = required_prop(props, key, algorithm)?.trim().parse()?;
    if count == 0 {
        return Err(ShardingError::config("Algorithm property must be greater than zero")
            .with_field("algorithm", algorithm.to_string())
            .with_field("property", key));
    }
    Ok(count)
}

/// `value mod sharding-count`.
#[derive(Debug, Clone)]
pub struct ModShardingAlgorithm {
    sharding_count: u64,
}

impl ModShardingAlgorithm {
    pub const TYPE: &'static str = "MOD";

    pub fn try_new(props: &BTreeMap<String, String>) -> Result<Self> {
        Ok(ModShardingAlgorithm {
            sharding_count: parse_positive_prop(props, "sharding-count", Self::TYPE)?,
        })
    }

    fn target_index(&self, value: &ScalarValue) -> Result<u64> {
        let v = value.try_as_i64()?;
        Ok(v.rem_euclid(self.sharding_count as i64) as u64)
    }
}

impl ShardingAlgorithm for ModShardingAlgorithm {
    fn algorithm_type(&self) -> &'static str {
        Self::TYPE
    }

    fn do_sharding(&self, available: &[String], value: &PreciseShardingValue) -> Result<String> {
        let idx = self.target_index(value.value)?;
        find_target(available, idx)
            .cloned()
            .ok_or_else(|| no_target_error(Self::TYPE, value, idx))
    }

    fn do_sharding_range(&self, available: &[String], range: &RangeShardingValue) -> Result<Vec<String>> {
        let (lower, upper) = match range.as_closed_i64() {
            Some(bounds) => bounds,
            None => return Ok(available.to_vec()),
        };
        if lower > upper {
            return Ok(Vec::new());
        }
        // Range covers every remainder.
        if (upper as i128 - lower as i128) >= self.sharding_count as i128 - 1 {
            return Ok(available.to_vec());
        }

        let mut indices = Vec::new();
        for v in lower..=upper {
            indices.push(v.rem_euclid(self.sharding_count as i64) as u64);
        }
        Ok(available
            .iter()
            .filter(|name| target_suffix(name).is_some_and(|idx| indices.contains(&idx)))
            .cloned()
            .collect())
    }
}

/// `hash(value) mod sharding-count`, ranges always hit every target.
#[derive(Debug, Clone)]
pub struct HashModShardingAlgorithm {
    sharding_count: u64,
}

impl HashModShardingAlgorithm {
    pub const TYPE: &'static str = "HASH_MOD";

    pub fn try_new(props: &BTreeMap<String, String>) -> Result<Self> {
        Ok(HashModShardingAlgorithm {
            sharding_count: parse_positive_prop(props, "sharding-count", Self::TYPE)?,
        })
    }
}

impl ShardingAlgorithm for HashModShardingAlgorithm {
    fn algorithm_type(&self) -> &'static str {
        Self::TYPE
    }

    fn do_sharding(&self, available: &[String], value: &PreciseShardingValue) -> Result<String> {
        let idx = value.value.sharding_hash() % self.sharding_count;
        find_target(available, idx)
            .cloned()
            .ok_or_else(|| no_target_error(Self::TYPE, value, idx))
    }

    fn do_sharding_range(&self, available: &[String], _range: &RangeShardingValue) -> Result<Vec<String>> {
        Ok(available.to_vec())
    }
}

/// `crc32(value) mod sharding-count`.
#[derive(Debug, Clone)]
pub struct Crc32ModShardingAlgorithm {
    sharding_count: u64,
}

impl Crc32ModShardingAlgorithm {
    pub const TYPE: &'static str = "CRC32_MOD";

    pub fn try_new(props: &BTreeMap<String, String>) -> Result<Self> {
        Ok(Crc32ModShardingAlgorithm {
            sharding_count: parse_positive_prop(props, "sharding-count", Self::TYPE)?,
        })
    }
}

impl ShardingAlgorithm for Crc32ModShardingAlgorithm {
    fn algorithm_type(&self) -> &'static str {
        Self::TYPE
    }

    fn do_sharding(&self, available: &[String], value: &PreciseShardingValue) -> Result<String> {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&value.value.canonical_bytes());
        let idx = hasher.finalize() as u64 % self.sharding_count;
        find_target(available, idx)
            .cloned()
            .ok_or_else(|| no_target_error(Self::TYPE, value, idx))
    }

    fn do_sharding_range(&self, available: &[String], _range: &RangeShardingValue) -> Result<Vec<String>> {
        Ok(available.to_vec())
    }
}

/// Integer partitions, partition `i` maps to target index `i`.
#[derive(Debug, Clone)]
struct RangePartitions {
    /// Sorted boundaries. Partition 0 is `< boundaries[0]`, partition `i` is
    /// `[boundaries[i-1], boundaries[i])`, the last is `>= boundaries[n-1]`.
    boundaries: Vec<i64>,
}

impl RangePartitions {
    fn partition_of(&self, value: i64) -> u64 {
        self.boundaries.partition_point(|b| *b <= value) as u64
    }

    fn partitions_for(&self, range: &RangeShardingValue) -> Result<Vec<u64>> {
        let lower = match &range.lower {
            Bound::Included(v) => Some(v.try_as_i64()?),
            Bound::Excluded(v) => Some(v.try_as_i64()?.saturating_add(1)),
            Bound::Unbounded => None,
        };
        let upper = match &range.upper {
            Bound::Included(v) => Some(v.try_as_i64()?),
            Bound::Excluded(v) => Some(v.try_as_i64()?.saturating_sub(1)),
            Bound::Unbounded => None,
        };
        let first = lower.map(|v| self.partition_of(v)).unwrap_or(0);
        let last = upper
            .map(|v| self.partition_of(v))
            .unwrap_or(self.boundaries.len() as u64);
        if first > last {
            return Ok(Vec::new());
        }
        Ok((first..=last).collect())
    }

    fn targets(&self, available: &[String], partitions: &[u64]) -> Vec<String> {
        available
            .iter()
            .filter(|name| target_suffix(name).is_some_and(|idx| partitions.contains(&idx)))
            .cloned()
            .collect()
    }
}

/// Fixed-volume partitions between `range-lower` and `range-upper`.
#[derive(Debug, Clone)]
pub struct VolumeRangeShardingAlgorithm {
    partitions: RangePartitions,
}

impl VolumeRangeShardingAlgorithm {
    pub const TYPE: &'static str = "VOLUME_RANGE";

    pub fn try_new(props: &BTreeMap<String, String>) -> Result<Self> {
        let lower: i64 = required_prop(props, "range-lower", Self::TYPE)?.trim().parse()?;
        let upper: i64 = required_prop(props, "range-upper", Self::TYPE)?.trim().parse()?;
        let volume = parse_positive_prop(props, "sharding-volume", Self::TYPE)? as i64;
        if lower >= upper {
            return Err(ShardingError::config("Range lower must be less than range upper")
                .with_field("algorithm", Self::TYPE)
                .with_field("range-lower", lower)
                .with_field("range-upper", upper));
        }

        let mut boundaries = Vec::new();
        let mut boundary = lower;
        while boundary < upper {
            boundaries.push(boundary);
            boundary = boundary.saturating_add(volume);
        }
        boundaries.push(upper);

        Ok(VolumeRangeShardingAlgorithm {
            partitions: RangePartitions { boundaries },
        })
    }
}

impl ShardingAlgorithm for VolumeRangeShardingAlgorithm {
    fn algorithm_type(&self) -> &'static str {
        Self::TYPE
    }

    fn do_sharding(&self, available: &[String], value: &PreciseShardingValue) -> Result<String> {
        let idx = self.partitions.partition_of(value.value.try_as_i64()?);
        find_target(available, idx)
            .cloned()
            .ok_or_else(|| no_target_error(Self::TYPE, value, idx))
    }

    fn do_sharding_range(&self, available: &[String], range: &RangeShardingValue) -> Result<Vec<String>> {
        let partitions = self.partitions.partitions_for(range)?;
        Ok(self.partitions.targets(available, &partitions))
    }
}

/// Partitions at explicit boundaries given by `sharding-ranges`.
#[derive(Debug, Clone)]
pub struct BoundaryRangeShardingAlgorithm {
    partitions: RangePartitions,
}

impl BoundaryRangeShardingAlgorithm {
    pub const TYPE: &'static str = "BOUNDARY_RANGE";

    pub fn try_new(props: &BTreeMap<String, String>) -> Result<Self> {
        let ranges = required_prop(props, "sharding-ranges", Self::TYPE)?;
        let mut boundaries = Vec::new();
        for part in ranges.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            boundaries.push(part.parse::<i64>()?);
        }
        if boundaries.is_empty() {
            return Err(ShardingError::config("Sharding ranges cannot be empty").with_field("algorithm", Self::TYPE));
        }
        boundaries.sort_unstable();
        boundaries.dedup();

        Ok(BoundaryRangeShardingAlgorithm {
            partitions: RangePartitions { boundaries },
        })
    }
}

impl ShardingAlgorithm for BoundaryRangeShardingAlgorithm {
    fn algorithm_type(&self) -> &'static str {
        Self::TYPE
    }

    fn do_sharding(&self, available: &[String], value: &PreciseShardingValue) -> Result<String> {
        let idx = self.partitions.partition_of(value.value.try_as_i64()?);
        find_target(available, idx)
            .cloned()
            .ok_or_else(|| no_target_error(Self::TYPE, value, idx))
    }

    fn do_sharding_range(&self, available: &[String], range: &RangeShardingValue) -> Result<Vec<String>> {
        let partitions = self.partitions.partitions_for(range)?;
        Ok(self.partitions.targets(available, &partitions))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sharding_error::ErrorKind;

    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn targets(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    fn precise(value: &ScalarValue) -> PreciseShardingValue<'_> {
        PreciseShardingValue {
            logic_table: "t_order",
            column: "order_id",
            value,
        }
    }

    #[rstest]
    #[case(0, "t_order_0")]
    #[case(5, "t_order_1")]
    #[case(-3, "t_order_1")]
    #[case(10, "t_order_2")]
    fn mod_precise(#[case] value: i64, #[case] expected: &str) {
        let algo = ModShardingAlgorithm::try_new(&props(&[("sharding-count", "4")])).unwrap();
        let value = ScalarValue::Int64(value);
        let target = algo.do_sharding(&targets("t_order_", 4), &precise(&value)).unwrap();
        assert_eq!(expected, target);
    }

    #[test]
    fn mod_does_not_confuse_suffixes() {
        // "t_order_10" ends with "0" but is target 10.
        let algo = ModShardingAlgorithm::try_new(&props(&[("sharding-count", "11")])).unwrap();
        let value = ScalarValue::Int64(10);
        let target = algo.do_sharding(&targets("t_order_", 11), &precise(&value)).unwrap();
        assert_eq!("t_order_10", target);
    }

    #[test]
    fn mod_range_narrows_small_ranges() {
        let algo = ModShardingAlgorithm::try_new(&props(&[("sharding-count", "4")])).unwrap();
        let available = targets("t_", 4);

        let range = RangeShardingValue::closed(1.into(), 2.into());
        assert_eq!(vec!["t_1", "t_2"], algo.do_sharding_range(&available, &range).unwrap());

        let range = RangeShardingValue::closed(1.into(), 100.into());
        assert_eq!(available, algo.do_sharding_range(&available, &range).unwrap());

        let range = RangeShardingValue {
            lower: Bound::Excluded(5.into()),
            upper: Bound::Unbounded,
        };
        assert_eq!(available, algo.do_sharding_range(&available, &range).unwrap());
    }

    #[test]
    fn mod_missing_target() {
        let algo = ModShardingAlgorithm::try_new(&props(&[("sharding-count", "4")])).unwrap();
        let value = ScalarValue::Int64(3);
        let err = algo.do_sharding(&targets("t_", 2), &precise(&value)).unwrap_err();
        assert_eq!(ErrorKind::ShardingAlgorithm, err.kind());
        assert_eq!(Some("3"), err.field("target_index"));
    }

    #[test]
    fn mod_missing_count() {
        let err = ModShardingAlgorithm::try_new(&props(&[])).unwrap_err();
        assert_eq!(ErrorKind::Config, err.kind());
    }

    #[test]
    fn hash_mod_string() {
        let algo = HashModShardingAlgorithm::try_new(&props(&[("sharding-count", "3")])).unwrap();
        // "abc" hashes to 96354, 96354 % 3 == 0
        let value = ScalarValue::from("abc");
        assert_eq!("ds_0", algo.do_sharding(&targets("ds_", 3), &precise(&value)).unwrap());
    }

    #[test]
    fn crc32_mod_is_deterministic() {
        let algo = Crc32ModShardingAlgorithm::try_new(&props(&[("sharding-count", "8")])).unwrap();
        let value = ScalarValue::Int64(1024);
        let first = algo.do_sharding(&targets("t_", 8), &precise(&value)).unwrap();
        let second = algo.do_sharding(&targets("t_", 8), &precise(&value)).unwrap();
        assert_eq!(first, second);
    }

    #[rstest]
    #[case(-5, "t_0")]
    #[case(10, "t_1")]
    #[case(19, "t_1")]
    #[case(20, "t_2")]
    #[case(45, "t_4")]
    #[case(50, "t_5")]
    #[case(1000, "t_5")]
    fn volume_range_precise(#[case] value: i64, #[case] expected: &str) {
        let algo = VolumeRangeShardingAlgorithm::try_new(&props(&[
            ("range-lower", "10"),
            ("range-upper", "50"),
            ("sharding-volume", "10"),
        ]))
        .unwrap();
        let value = ScalarValue::Int64(value);
        assert_eq!(expected, algo.do_sharding(&targets("t_", 6), &precise(&value)).unwrap());
    }

    #[test]
    fn boundary_range_range() {
        let algo = BoundaryRangeShardingAlgorithm::try_new(&props(&[("sharding-ranges", "1, 5, 10")])).unwrap();
        let available = targets("t_", 4);

        let range = RangeShardingValue::closed(2.into(), 7.into());
        assert_eq!(vec!["t_1", "t_2"], algo.do_sharding_range(&available, &range).unwrap());

        let range = RangeShardingValue {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(1.into()),
        };
        assert_eq!(vec!["t_0"], algo.do_sharding_range(&available, &range).unwrap());
    }

    #[test]
    fn range_intersection() {
        let a = RangeShardingValue {
            lower: Bound::Included(1.into()),
            upper: Bound::Unbounded,
        };
        let b = RangeShardingValue {
            lower: Bound::Excluded(1.into()),
            upper: Bound::Included(9.into()),
        };
        let c = a.intersect(&b);
        assert_eq!(Bound::Excluded(ScalarValue::Int64(1)), c.lower);
        assert_eq!(Bound::Included(ScalarValue::Int64(9)), c.upper);
        assert!(!c.contains(&1.into()));
        assert!(c.contains(&9.into()));

        let empty = c.intersect(&RangeShardingValue {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(2.into()),
        });
        assert!(empty.is_empty());
    }

    #[rstest]
    #[case(Bound::Excluded(1.into()), Bound::Excluded(3.into()), false)]
    #[case(Bound::Excluded(1.into()), Bound::Included(1.into()), true)]
    #[case(Bound::Included(2.into()), Bound::Included(2.into()), false)]
    #[case(Bound::Excluded(i64::MAX.into()), Bound::Included(i64::MAX.into()), true)]
    #[case(Bound::Excluded(1.0.into()), Bound::Excluded(2.0.into()), false)]
    fn range_emptiness(#[case] lower: Bound<ScalarValue>, #[case] upper: Bound<ScalarValue>, #[case] empty: bool) {
        assert_eq!(empty, RangeShardingValue { lower, upper }.is_empty());
    }

    #[test]
    fn suffix_parsing() {
        assert_eq!(Some(12), target_suffix("t_order_12"));
        assert_eq!(None, target_suffix("t_order"));
    }
}
