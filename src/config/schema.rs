//! Configuration schema for the query history store.
//!
//! This module defines the configuration structure and validation logic for all
//! user-configurable settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest accepted UTC offset, in minutes (UTC+14:00 / UTC-14:00).
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Main configuration structure for the query history store.
///
/// All settings can be configured under the "query-history" key.
/// Missing settings fall back to sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Upper bound for a single persistence call, in milliseconds.
    ///
    /// Calls that take longer fail with a persistence error. Defaults to
    /// 5000ms. Must be greater than 0.
    #[serde(default = "default_persistence_timeout_ms")]
    pub persistence_timeout_ms: u64,

    /// Fixed offset from UTC used when formatting instance timestamps.
    ///
    /// When absent, the host's local time zone is used.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,

    /// Directory used by the file-backed persistence layer.
    ///
    /// Defaults to "query-history" relative to the working directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            persistence_timeout_ms: default_persistence_timeout_ms(),
            utc_offset_minutes: None,
            data_dir: default_data_dir(),
        }
    }
}

impl HistoryConfig {
    /// Validates the configuration and returns errors if any settings are invalid.
    ///
    /// # Returns
    ///
    /// `Ok(())` if all settings are valid, or `Err` with a descriptive error message.
    pub fn validate(&self) -> Result<(), String> {
        if self.persistence_timeout_ms == 0 {
            return Err("persistenceTimeoutMs must be greater than 0".to_string());
        }

        if let Some(offset) = self.utc_offset_minutes {
            if offset.abs() > MAX_UTC_OFFSET_MINUTES {
                return Err(format!(
                    "utcOffsetMinutes must be within +/-{} (got {})",
                    MAX_UTC_OFFSET_MINUTES, offset
                ));
            }
        }

        if self.data_dir.trim().is_empty() {
            return Err("dataDir must not be empty".to_string());
        }

        Ok(())
    }

    /// Returns the persistence timeout as a `Duration`.
    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_millis(self.persistence_timeout_ms)
    }

    /// Merges another configuration into this one.
    ///
    /// Values from `other` replace the current ones. The offset is only
    /// replaced when `other` sets one.
    pub fn merge(&self, other: &HistoryConfig) -> HistoryConfig {
        HistoryConfig {
            persistence_timeout_ms: other.persistence_timeout_ms,
            utc_offset_minutes: other.utc_offset_minutes.or(self.utc_offset_minutes),
            data_dir: other.data_dir.clone(),
        }
    }
}

fn default_persistence_timeout_ms() -> u64 {
    5000
}

fn default_data_dir() -> String {
    "query-history".to_string()
}
