//! Records exchanged across the persistence boundary.
//!
//! A [`ReadingRecord`] is the immutable snapshot a sensor emits once per due
//! cycle.  It is uniquely identified by `(sensor_id, timestamp)`; the gateway
//! skips rows whose key already exists instead of failing the batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingRecord {
    pub sensor_id: String,
    /// UTC, microsecond precision.
    pub timestamp: DateTime<Utc>,
    /// Whole percent, 0–100.
    pub fill_level_percent: f64,
    /// Rounded to 0.1 °C.
    pub temperature_c: f64,
    /// Rounded to 1 mV.
    pub battery_v: f64,
    pub fill_threshold: u8,
    pub last_emptied: Option<DateTime<Utc>>,
    pub overflow: bool,
    pub overflow_count: u32,
    pub last_overflow: Option<DateTime<Utc>>,
}

impl ReadingRecord {
    /// The natural dedup key.
    pub fn key(&self) -> (&str, DateTime<Utc>) {
        (&self.sensor_id, self.timestamp)
    }
}

/// Result of a bulk append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Rows actually persisted.
    pub written: usize,
    /// Rows ignored because their `(sensor_id, timestamp)` already existed.
    pub skipped: usize,
}

/// Static bin-to-coordinate metadata, managed outside the simulation core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticBin {
    pub bin_id: String,
    pub sensor_id: String,
    pub lat: f64,
    pub lng: f64,
}

/// History query for one sensor (dashboard charts and exports).
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveQuery {
    pub sensor_id: String,
    /// Inclusive lower bound.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub until: Option<DateTime<Utc>>,
    /// Keep at most this many rows (the oldest first).
    pub limit: Option<usize>,
}

impl ArchiveQuery {
    pub fn for_sensor(sensor_id: impl Into<String>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            since: None,
            until: None,
            limit: None,
        }
    }

    /// Whether `record` falls inside this query's sensor and time range.
    pub fn matches(&self, record: &ReadingRecord) -> bool {
        record.sensor_id == self.sensor_id
            && self.since.is_none_or(|s| record.timestamp >= s)
            && self.until.is_none_or(|u| record.timestamp <= u)
    }
}
