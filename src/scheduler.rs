//! Staggered per-sensor scheduler.
//!
//! Every sensor owns a single "next due" instant.  The process loop polls
//! much more often than any sensor reports, and on each poll only the
//! sensors whose due time has passed are advanced.  Random initial offsets
//! and per-cycle jitter spread the writes out instead of having the whole
//! fleet report on the same second.
//!
//! ```text
//!  poll ─┬─────┬─────┬─────┬─────┬─────┬─────┬─────┬─────┬──▶ t
//!        │     │     │     │     │     │     │     │     │
//!  R-001 ●─────────────────────────────●──────────────────────   (interval ± jitter)
//!  R-002 ───────●──────────────────────────────●──────────────
//!  R-003 ────────────────●─────────────────────────────●──────
//! ```

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info};
use rand::Rng;

use crate::config::SimConfig;

/// A rescheduled sensor is never due sooner than this after `now`.
const MIN_LEAD_SECS: i64 = 1;

// ═══════════════════════════════════════════════════════════════
//  Settings
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Nominal reporting interval per sensor.
    pub interval: Duration,
    /// Symmetric bound on the random jitter added at each reschedule.
    pub jitter: Duration,
    /// Push every initial due time out by one full interval.
    pub defer_first: bool,
}

impl ScheduleSettings {
    pub fn from_config(cfg: &SimConfig) -> Self {
        Self {
            interval: cfg.interval(),
            jitter: Duration::from_secs(cfg.schedule_jitter_secs),
            defer_first: cfg.skip_first_cycle,
        }
    }

    fn interval_ms(&self) -> i64 {
        (self.interval.as_millis() as i64).max(1)
    }

    fn jitter_ms(&self) -> i64 {
        self.jitter.as_millis() as i64
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler
// ═══════════════════════════════════════════════════════════════

/// Internal bookkeeping for one sensor.
#[derive(Debug, Clone)]
struct ScheduleEntry {
    sensor_id: String,
    next_due: DateTime<Utc>,
}

pub struct Scheduler {
    settings: ScheduleSettings,
    entries: Vec<ScheduleEntry>,
}

impl Scheduler {
    pub fn new(settings: ScheduleSettings) -> Self {
        Self {
            settings,
            entries: Vec::new(),
        }
    }

    pub fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    /// Add a sensor with a random initial offset in `[0, interval)`.
    /// Re-registering an id replaces its due time.
    pub fn register<R: Rng + ?Sized>(
        &mut self,
        sensor_id: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> DateTime<Utc> {
        let interval_ms = self.settings.interval_ms();
        let mut offset = TimeDelta::milliseconds(rng.random_range(0..interval_ms));
        if self.settings.defer_first {
            offset += TimeDelta::milliseconds(interval_ms);
        }
        let next_due = now + offset;

        match self.entries.iter_mut().find(|e| e.sensor_id == sensor_id) {
            Some(entry) => entry.next_due = next_due,
            None => self.entries.push(ScheduleEntry {
                sensor_id: sensor_id.to_string(),
                next_due,
            }),
        }
        info!(
            "Scheduler: registered '{}' first due in {}s",
            sensor_id,
            offset.num_seconds()
        );
        next_due
    }

    /// Sensors whose due time is at or before `now`, earliest first.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut due: Vec<&ScheduleEntry> =
            self.entries.iter().filter(|e| e.next_due <= now).collect();
        due.sort_by(|a, b| {
            a.next_due
                .cmp(&b.next_due)
                .then_with(|| a.sensor_id.cmp(&b.sensor_id))
        });
        due.into_iter().map(|e| e.sensor_id.clone()).collect()
    }

    /// Move `sensor_id` to `old due + interval ± jitter`, but never less
    /// than one second past `now`.  `None` for an unknown id.
    pub fn reschedule<R: Rng + ?Sized>(
        &mut self,
        sensor_id: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Option<DateTime<Utc>> {
        let interval_ms = self.settings.interval_ms();
        let jitter_ms = self.settings.jitter_ms();
        let entry = self.entries.iter_mut().find(|e| e.sensor_id == sensor_id)?;

        let jitter = if jitter_ms > 0 {
            rng.random_range(-jitter_ms..=jitter_ms)
        } else {
            0
        };
        let proposed = entry.next_due + TimeDelta::milliseconds(interval_ms + jitter);
        entry.next_due = proposed.max(now + TimeDelta::seconds(MIN_LEAD_SECS));

        debug!("Scheduler: '{}' next due {}", sensor_id, entry.next_due);
        Some(entry.next_due)
    }

    pub fn next_due(&self, sensor_id: &str) -> Option<DateTime<Utc>> {
        self.entries
            .iter()
            .find(|e| e.sensor_id == sensor_id)
            .map(|e| e.next_due)
    }

    /// Earliest due time across the fleet.
    pub fn soonest_due(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|e| e.next_due).min()
    }

    /// Simulated minutes since `last_update`, or one interval when the
    /// sensor has never been updated.
    pub fn elapsed_minutes(&self, last_update: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        match last_update {
            Some(last) => (now - last).num_milliseconds() as f64 / 60_000.0,
            None => self.settings.interval.as_secs_f64() / 60.0,
        }
    }

    /// How long the loop may sleep: until the soonest due sensor, but never
    /// less than `min_sleep`.
    pub fn sleep_duration(&self, now: DateTime<Utc>, min_sleep: Duration) -> Duration {
        let until_due = self
            .soonest_due()
            .and_then(|due| (due - now).to_std().ok())
            .unwrap_or(Duration::ZERO);
        until_due.max(min_sleep)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
