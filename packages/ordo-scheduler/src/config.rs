//! Queue configuration record.
//!
//! The record deserializes from the camelCase keys `eager`, `fnDelay`,
//! `maxWorkers`, `paused`, `verbose`, `name` and `logDelimiter`. Any other key
//! is ignored. Missing keys take their defaults.

use crate::error::QueueError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueConfig {
    /// Dispatch as soon as work is pushed instead of waiting for `process`.
    pub eager: bool,
    /// Minimum spacing between two task launches. Given in milliseconds when
    /// deserialized.
    #[serde(with = "duration_millis")]
    pub fn_delay: Duration,
    /// How many tasks may run at once. Must be at least 1.
    pub max_workers: usize,
    /// Start with dispatch suspended.
    pub paused: bool,
    /// Emit diagnostic messages through the queue's logger.
    pub verbose: bool,
    pub name: String,
    pub log_delimiter: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            eager: false,
            fn_delay: Duration::ZERO,
            max_workers: 1,
            paused: false,
            verbose: true,
            name: "Queue".to_string(),
            log_delimiter: "::".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.max_workers == 0 {
            return Err(QueueError::InvalidConfig(
                "maxWorkers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// `name` followed by the delimiter, e.g. `Queue::`.
    pub fn label(&self) -> String {
        format!("{}{}", self.name, self.log_delimiter)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
