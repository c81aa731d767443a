//! Key generators for columns the kernel fills in on insert.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use sharding_error::{Result, ShardingError};
use tracing::warn;

use crate::value::ScalarValue;

pub trait KeyGenerator: fmt::Debug + Sync + Send {
    fn generator_type(&self) -> &'static str;

    /// Produce the next key. Must be safe to call concurrently.
    fn generate_key(&self) -> Result<ScalarValue>;
}

/// Milliseconds since unix epoch.
pub type ClockFn = fn() -> i64;

fn system_clock() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 64 bit ids: 41 bits of milliseconds since 2016-11-01, 10 bits of worker
/// id and a 12 bit per-millisecond sequence.
pub struct SnowflakeKeyGenerator {
    worker_id: i64,
    max_tolerate_time_difference_ms: i64,
    clock: ClockFn,
    state: Mutex<SnowflakeState>,
}

#[derive(Debug, Default)]
struct SnowflakeState {
    last_ms: i64,
    sequence: i64,
}

impl SnowflakeKeyGenerator {
    pub const TYPE: &'static str = "SNOWFLAKE";

    /// 2016-11-01T00:00:00Z
    pub const EPOCH_MS: i64 = 1_477_958_400_000;

    const SEQUENCE_BITS: i64 = 12;
    const WORKER_ID_BITS: i64 = 10;
    const SEQUENCE_MASK: i64 = (1 << Self::SEQUENCE_BITS) - 1;
    const WORKER_ID_SHIFT: i64 = Self::SEQUENCE_BITS;
    const TIMESTAMP_SHIFT: i64 = Self::WORKER_ID_BITS + Self::SEQUENCE_BITS;
    const MAX_WORKER_ID: i64 = (1 << Self::WORKER_ID_BITS) - 1;

    const DEFAULT_MAX_TOLERATE_MS: i64 = 10;

    pub fn try_new(props: &BTreeMap<String, String>) -> Result<Self> {
        Self::try_new_with_clock(props, system_clock)
    }

    pub fn try_new_with_clock(props: &BTreeMap<String, String>, clock: ClockFn) -> Result<Self> {
        let worker_id: i64 = match props.get("worker-id") {
            Some(v) => v.trim().parse()?,
            None => 0,
        };
        if !(0..=Self::MAX_WORKER_ID).contains(&worker_id) {
            return Err(ShardingError::config("Snowflake worker id out of range")
                .with_field("worker-id", worker_id)
                .with_field("max", Self::MAX_WORKER_ID));
        }
        let max_tolerate_time_difference_ms = match props.get("max-tolerate-time-difference-milliseconds") {
            Some(v) => v.trim().parse()?,
            None => Self::DEFAULT_MAX_TOLERATE_MS,
        };

        Ok(SnowflakeKeyGenerator {
            worker_id,
            max_tolerate_time_difference_ms,
            clock,
            state: Mutex::new(SnowflakeState::default()),
        })
    }

    fn wait_until_after(&self, last_ms: i64) -> i64 {
        let mut now = (self.clock)();
        while now <= last_ms {
            std::thread::yield_now();
            now = (self.clock)();
        }
        now
    }
}

impl fmt::Debug for SnowflakeKeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeKeyGenerator")
            .field("worker_id", &self.worker_id)
            .field("max_tolerate_time_difference_ms", &self.max_tolerate_time_difference_ms)
            .finish_non_exhaustive()
    }
}

impl KeyGenerator for SnowflakeKeyGenerator {
    fn generator_type(&self) -> &'static str {
        Self::TYPE
    }

    fn generate_key(&self) -> Result<ScalarValue> {
        let mut state = self.state.lock();
        let mut now = (self.clock)();

        if now < state.last_ms {
            let diff = state.last_ms - now;
            if diff > self.max_tolerate_time_difference_ms {
                return Err(ShardingError::new("Clock moved backwards beyond tolerance")
                    .with_field("last_ms", state.last_ms)
                    .with_field("now_ms", now)
                    .with_field("tolerance_ms", self.max_tolerate_time_difference_ms));
            }
            warn!(diff_ms = diff, "clock moved backwards, waiting");
            std::thread::sleep(Duration::from_millis(diff as u64));
            now = (self.clock)();
            if now < state.last_ms {
                return Err(ShardingError::new("Clock still behind after waiting")
                    .with_field("last_ms", state.last_ms)
                    .with_field("now_ms", now));
            }
        }

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & Self::SEQUENCE_MASK;
            if state.sequence == 0 {
                now = self.wait_until_after(state.last_ms);
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        let key = ((now - Self::EPOCH_MS) << Self::TIMESTAMP_SHIFT)
            | (self.worker_id << Self::WORKER_ID_SHIFT)
            | state.sequence;
        Ok(ScalarValue::Int64(key))
    }
}

/// Random v4 uuids rendered without hyphens.
#[derive(Debug, Default)]
pub struct UuidKeyGenerator;

impl UuidKeyGenerator {
    pub const TYPE: &'static str = "UUID";
}

impl KeyGenerator for UuidKeyGenerator {
    fn generator_type(&self) -> &'static str {
        Self::TYPE
    }

    fn generate_key(&self) -> Result<ScalarValue> {
        Ok(ScalarValue::Utf8(uuid::Uuid::new_v4().simple().to_string()))
    }
}

/// In-process counter, starting at `initial-value` and moving by `step`.
#[derive(Debug)]
pub struct IncrementKeyGenerator {
    next: AtomicI64,
    step: i64,
}

impl IncrementKeyGenerator {
    pub const TYPE: &'static str = "INCREMENT";

    pub fn try_new(props: &BTreeMap<String, String>) -> Result<Self> {
        let initial: i64 = match props.get("initial-value") {
            Some(v) => v.trim().parse()?,
            None => 1,
        };
        let step: i64 = match props.get("step") {
            Some(v) => v.trim().parse()?,
            None => 1,
        };
        if step <= 0 {
            return Err(ShardingError::config("Increment step must be positive").with_field("step", step));
        }
        Ok(IncrementKeyGenerator {
            next: AtomicI64::new(initial),
            step,
        })
    }
}

impl KeyGenerator for IncrementKeyGenerator {
    fn generator_type(&self) -> &'static str {
        Self::TYPE
    }

    fn generate_key(&self) -> Result<ScalarValue> {
        Ok(ScalarValue::Int64(self.next.fetch_add(self.step, Ordering::SeqCst)))
    }
}
