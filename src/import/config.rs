use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{format_offset, parse_offset};

/// Default number of validation workers
pub const DEFAULT_WORKER_COUNT: usize = 5;
/// Smallest batch handed to a worker
pub const DEFAULT_MIN_BATCH_SIZE: usize = 200;
/// Invalid rows tolerated before validation stops early
pub const DEFAULT_MAX_ERRORS: usize = 100;
/// Largest number of data rows one file may hold
pub const DEFAULT_MAX_ROWS: usize = 50_000;
/// How long stragglers are awaited once validation is stopping
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);
/// Lifetime of a cached validation
pub const DEFAULT_VALIDATION_TTL: Duration = Duration::from_secs(5 * 60);

/// Configuration of an import run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Number of worker threads validating rows
    pub worker_count: usize,
    /// Smallest batch handed to a worker
    pub min_batch_size: usize,
    /// Invalid rows tolerated before validation stops early
    pub max_errors: usize,
    /// Largest number of data rows one file may hold
    pub max_rows: usize,
    /// How long stragglers are awaited once validation is stopping
    #[serde(with = "duration_secs")]
    pub grace_period: Duration,
    /// Offset applied to dates that do not carry one
    #[serde(with = "offset_string")]
    pub default_offset: FixedOffset,
    /// Lifetime of a cached validation
    #[serde(with = "duration_secs")]
    pub validation_ttl: Duration,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            max_errors: DEFAULT_MAX_ERRORS,
            max_rows: DEFAULT_MAX_ROWS,
            grace_period: DEFAULT_GRACE_PERIOD,
            default_offset: Utc.fix(),
            validation_ttl: DEFAULT_VALIDATION_TTL,
        }
    }
}

impl ImportConfig {
    /// Set the worker count (at least one)
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    /// Set the minimum batch size (at least one)
    pub fn with_min_batch_size(mut self, size: usize) -> Self {
        self.min_batch_size = size.max(1);
        self
    }

    /// Set the error budget
    pub fn with_max_errors(mut self, max: usize) -> Self {
        self.max_errors = max;
        self
    }

    /// Set the dataset size limit
    pub fn with_max_rows(mut self, max: usize) -> Self {
        self.max_rows = max;
        self
    }

    /// Set the shutdown grace period
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Set the offset applied to dates without one
    pub fn with_default_offset(mut self, offset: FixedOffset) -> Self {
        self.default_offset = offset;
        self
    }

    /// Set the validation cache lifetime
    pub fn with_validation_ttl(mut self, ttl: Duration) -> Self {
        self.validation_ttl = ttl;
        self
    }

    /// Rows per batch for a file of `total_rows` data rows
    pub fn batch_size(&self, total_rows: usize) -> usize {
        self.min_batch_size
            .max(total_rows / self.worker_count.max(1))
            .max(1)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod offset_string {
    use chrono::FixedOffset;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::{format_offset, parse_offset};

    pub fn serialize<S: Serializer>(value: &FixedOffset, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_offset(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FixedOffset, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_offset(&raw).ok_or_else(|| de::Error::custom(format!("invalid UTC offset '{}'", raw)))
    }
}
