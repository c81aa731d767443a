use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use sharding_error::{Result, ShardingError};

/// A single value flowing through the kernel: bound parameters, literal
/// sharding values, generated keys and cells of physical result rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum ScalarValue {
    #[default]
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Binary(Vec<u8>),
}

/// Where NULLs sort relative to non-NULL values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NullsOrder {
    /// NULL is smaller than every other value.
    #[default]
    NullsFirst,
    /// NULL is larger than every other value.
    NullsLast,
}

impl ScalarValue {
    pub const fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn try_as_i64(&self) -> Result<i64> {
        match self {
            Self::Int64(v) => Ok(*v),
            Self::Float64(v) if v.fract() == 0.0 => Ok(*v as i64),
            Self::Boolean(v) => Ok(*v as i64),
            Self::Utf8(s) => s.trim().parse::<i64>().map_err(|_| {
                ShardingError::new("Value cannot be interpreted as an integer").with_field("value", self)
            }),
            other => Err(
                ShardingError::new("Value cannot be interpreted as an integer").with_field("value", other),
            ),
        }
    }

    pub fn try_as_f64(&self) -> Result<f64> {
        match self {
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Utf8(s) => s.trim().parse::<f64>().map_err(|_| {
                ShardingError::new("Value cannot be interpreted as a number").with_field("value", self)
            }),
            other => Err(ShardingError::new("Value cannot be interpreted as a number").with_field("value", other)),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int64(_) | Self::Float64(_))
    }

    /// Deterministic hash used by hash based sharding algorithms.
    ///
    /// Integers hash to their absolute value so that `HASH_MOD` on integer
    /// keys behaves like plain modulo. Strings use the 31 polynomial rolling
    /// hash (wrapping in 32 bits) which keeps shard placement stable across
    /// processes and versions.
    pub fn sharding_hash(&self) -> u64 {
        match self {
            Self::Null => 0,
            Self::Boolean(b) => *b as u64,
            Self::Int64(v) => v.unsigned_abs(),
            Self::Float64(v) => (v.trunc() as i64).unsigned_abs(),
            Self::Utf8(s) => {
                let mut h: i32 = 0;
                for c in s.encode_utf16() {
                    h = h.wrapping_mul(31).wrapping_add(c as i32);
                }
                (h as i64).unsigned_abs()
            }
            Self::Binary(b) => {
                let mut h: i32 = 1;
                for byte in b {
                    h = h.wrapping_mul(31).wrapping_add(*byte as i8 as i32);
                }
                (h as i64).unsigned_abs()
            }
        }
    }

    /// Canonical byte representation, used for checksums.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Self::Null => Vec::new(),
            Self::Boolean(b) => vec![*b as u8],
            Self::Int64(v) => v.to_be_bytes().to_vec(),
            Self::Float64(v) => v.to_be_bytes().to_vec(),
            Self::Utf8(s) => s.as_bytes().to_vec(),
            Self::Binary(b) => b.clone(),
        }
    }

    /// Render this value as a SQL literal.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Float64(v) => v.to_string(),
            Self::Utf8(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Binary(b) => {
                let mut out = String::with_capacity(b.len() * 2 + 3);
                out.push_str("X'");
                for byte in b {
                    out.push_str(&format!("{byte:02X}"));
                }
                out.push('\'');
                out
            }
        }
    }
}

/// Total ordering over values.
///
/// Integers and floats compare numerically with each other. Values of
/// otherwise incomparable types fall back to ordering by type so that the
/// ordering stays total.
pub fn compare_values(left: &ScalarValue, right: &ScalarValue, nulls: NullsOrder) -> Ordering {
    match (left, right) {
        (ScalarValue::Null, ScalarValue::Null) => Ordering::Equal,
        (ScalarValue::Null, _) => match nulls {
            NullsOrder::NullsFirst => Ordering::Less,
            NullsOrder::NullsLast => Ordering::Greater,
        },
        (_, ScalarValue::Null) => match nulls {
            NullsOrder::NullsFirst => Ordering::Greater,
            NullsOrder::NullsLast => Ordering::Less,
        },
        (ScalarValue::Int64(a), ScalarValue::Int64(b)) => a.cmp(b),
        (ScalarValue::Float64(a), ScalarValue::Float64(b)) => a.total_cmp(b),
        (ScalarValue::Int64(a), ScalarValue::Float64(b)) => (*a as f64).total_cmp(b),
        (ScalarValue::Float64(a), ScalarValue::Int64(b)) => a.total_cmp(&(*b as f64)),
        (ScalarValue::Utf8(a), ScalarValue::Utf8(b)) => a.cmp(b),
        (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => a.cmp(b),
        (ScalarValue::Binary(a), ScalarValue::Binary(b)) => a.cmp(b),
        (a, b) => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &ScalarValue) -> u8 {
    match value {
        ScalarValue::Null => 0,
        ScalarValue::Boolean(_) => 1,
        ScalarValue::Int64(_) | ScalarValue::Float64(_) => 2,
        ScalarValue::Utf8(_) => 3,
        ScalarValue::Binary(_) => 4,
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a.to_bits() == b.to_bits(),
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Binary(a), Self::Binary(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => (),
            Self::Boolean(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => v.to_bits().hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Binary(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::Binary(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int64(value as i64)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(value)
    }
}
