//! Sensor state model: pure per-bin state transitions, zero I/O.
//!
//! ```text
//!            fill ≥ 100 (rising edge: overflow_count += 1)
//!   Filling ───────────────────────────────────────────▶ Overflowing
//!      ▲                                                     │
//!      └──────────── empty event (fill ≥ threshold) ─────────┘
//! ```
//!
//! An empty event may also fire from `Filling` once fill has reached the
//! bin's threshold.  Everything random is drawn from a caller-supplied
//! [`rand::Rng`], so a seeded generator replays a run exactly.

pub mod bin;
pub mod temperature;
pub mod traffic;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::reading::ReadingRecord;

pub use bin::BinSensor;

// ───────────────────────────────────────────────────────────────
// Physical parameters
// ───────────────────────────────────────────────────────────────

/// Physical constants shared by every bin in a fleet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorParams {
    // --- Fill ---
    /// Fill growth per hour at sensitivity 1 and traffic factor 1.0 (%).
    pub base_rate_per_hour: f64,
    /// Symmetric noise bound on the hourly fill rate (%).
    pub noise_per_hour: f64,
    /// Fill level an empty event leaves behind (%).
    pub empty_residue_percent: f64,

    // --- Battery ---
    /// Idle drain (V/hour).
    pub battery_drain_per_hour: f64,
    /// Radio cost of one report (V).
    pub tx_drain_per_report: f64,
    /// Battery never reads below this (V).
    pub battery_floor_v: f64,

    // --- Diurnal temperature ---
    pub temp_mean_c: f64,
    pub temp_amplitude_c: f64,
    /// Symmetric jitter bound (°C).
    pub temp_noise_c: f64,
    /// Local hour of the daily maximum.
    pub temp_peak_hour: f64,
    /// Zone the diurnal cycle and traffic profile are evaluated in.
    pub timezone: Tz,
}

impl Default for SensorParams {
    fn default() -> Self {
        Self {
            base_rate_per_hour: 3.0,
            noise_per_hour: 0.1,
            empty_residue_percent: 0.0,

            battery_drain_per_hour: 5e-6,
            tx_drain_per_report: 3e-7,
            battery_floor_v: 2.8,

            temp_mean_c: 15.0,
            temp_amplitude_c: 7.0,
            temp_noise_c: 0.2,
            temp_peak_hour: 15.0,
            timezone: chrono_tz::Australia::Melbourne,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Outcomes
// ───────────────────────────────────────────────────────────────

/// Coarse bin state used by dashboards and the cycle log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinState {
    Filling,
    Overflowing,
}

/// What [`SensorModel::advance`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdvanceOutcome {
    /// Elapsed time was zero or negative; nothing changed.
    Skipped,
    Advanced {
        /// Fill actually added this step (after clamping at 100).
        delta: f64,
        /// True only on the Filling → Overflowing rising edge.
        overflow_started: bool,
    },
}

/// What [`SensorModel::maybe_empty`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyOutcome {
    /// Fill is under the threshold; no draw was made.
    BelowThreshold,
    /// The draw did not trigger.
    Held,
    /// The bin was serviced.
    Emptied,
}

/// What [`SensorModel::apply_nudge`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NudgeOutcome {
    /// Percentage points added.
    pub amount: f64,
    /// The nudge carried the bin to 100 while it was not yet overflowing.
    pub overflow_started: bool,
}

// ───────────────────────────────────────────────────────────────
// Capability trait
// ───────────────────────────────────────────────────────────────

/// The one capability the scheduler and service need from a simulated
/// device.  [`BinSensor`] is the default implementation.
pub trait SensorModel {
    fn id(&self) -> &str;

    /// Time of the last state update, `None` for a never-updated device.
    fn last_update(&self) -> Option<DateTime<Utc>>;

    fn fill_level(&self) -> f64;

    /// Overflow / empty trigger level.
    fn fill_threshold(&self) -> f64;

    fn is_overflowing(&self) -> bool;

    /// Grow fill, drain battery and stamp `now` for `elapsed_minutes`.
    fn advance<R: Rng + ?Sized>(
        &mut self,
        elapsed_minutes: f64,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> AdvanceOutcome;

    /// One independent draw for a collection event.
    fn maybe_empty<R: Rng + ?Sized>(
        &mut self,
        base_threshold: f64,
        empty_chance: f64,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> EmptyOutcome;

    /// Recompute the simulated temperature for `now`.  Returns the new value.
    fn update_temperature<R: Rng + ?Sized>(&mut self, now: DateTime<Utc>, rng: &mut R) -> f64;

    /// Replace the simulated temperature with an observed one.
    fn override_temperature(&mut self, celsius: f64);

    /// Push fill forward when the reported value would otherwise stall.
    /// A nudge that reaches 100 overflows exactly like [`advance`](Self::advance).
    fn apply_nudge(
        &mut self,
        prev_reported_fill: f64,
        min: f64,
        max: f64,
        now: DateTime<Utc>,
    ) -> Option<NudgeOutcome>;

    /// Snapshot for persistence; `None` until the first state update.
    fn report(&self) -> Option<ReadingRecord>;

    fn state(&self) -> BinState {
        if self.is_overflowing() {
            BinState::Overflowing
        } else {
            BinState::Filling
        }
    }

    /// Fill as it would appear in a reading (whole percent, 0–100).
    fn reported_fill(&self) -> f64 {
        self.fill_level().clamp(0.0, 100.0).round()
    }
}

// ───────────────────────────────────────────────────────────────
// Helpers
// ───────────────────────────────────────────────────────────────

/// Round `value` to `decimals` places.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Deterministic forward nudge for a stalled reading.
///
/// When `current` still rounds to `prev_reported`, returns the amount that
/// carries it to the next whole percent, clamped to `[min, max]` and never
/// past 100.  `None` when the reading already moved or the bin is full.
pub fn fill_nudge(prev_reported: f64, current: f64, min: f64, max: f64) -> Option<f64> {
    if current >= 100.0 || current.round() != prev_reported {
        return None;
    }
    let needed = (prev_reported + 0.5 - current).max(0.0) + 1e-9;
    let nudge = needed.clamp(min, max).min(100.0 - current);
    (nudge > 0.0).then_some(nudge)
}
