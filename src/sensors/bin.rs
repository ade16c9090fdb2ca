//! Simulated ultrasonic fill-level sensor (Netvox R718X class).
//!
//! One [`BinSensor`] per physical bin.  The device reports fill level,
//! ambient temperature and battery voltage; overflow and empty events are
//! derived from the fill trajectory.

use chrono::{DateTime, Timelike, Utc};
use rand::Rng;

use super::temperature::{diurnal_base, local_hour};
use super::traffic::traffic_factor;
use super::{
    AdvanceOutcome, EmptyOutcome, NudgeOutcome, SensorModel, SensorParams, fill_nudge, round_to,
};
use crate::reading::ReadingRecord;

/// Per-unit fill sensitivity bounds.
pub const MIN_SENSITIVITY: u8 = 1;
pub const MAX_SENSITIVITY: u8 = 10;

/// Overfill span (percentage points above threshold) over which the empty
/// probability ramps from the base chance to certainty.
const OVERFILL_RAMP: f64 = 20.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BinSensor {
    pub sensor_id: String,
    /// 0–100 at rest.
    pub fill_level_percent: f64,
    pub temperature_c: f64,
    pub battery_v: f64,
    pub fill_threshold: u8,
    pub overflow: bool,
    pub overflow_count: u32,
    pub last_emptied: Option<DateTime<Utc>>,
    pub last_overflow: Option<DateTime<Utc>>,
    /// Last state update; `None` until the first advance.
    pub timestamp: Option<DateTime<Utc>>,
    /// 1–10 multiplier on the base fill rate.
    pub fill_sensitivity: u8,
    pub enable_traffic: bool,
    pub params: SensorParams,
}

impl BinSensor {
    pub fn new(sensor_id: impl Into<String>, params: SensorParams) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            fill_level_percent: 0.0,
            temperature_c: 22.0,
            battery_v: 3.6,
            fill_threshold: 85,
            overflow: false,
            overflow_count: 0,
            last_emptied: None,
            last_overflow: None,
            timestamp: None,
            fill_sensitivity: 3,
            enable_traffic: true,
            params,
        }
    }

    /// Manual empty event (collection truck serviced the bin).
    pub fn empty(&mut self, now: DateTime<Utc>) {
        self.fill_level_percent = self.params.empty_residue_percent.clamp(0.0, 100.0);
        self.last_emptied = Some(now);
        self.overflow = false;
    }

    /// Store `proposed` fill, clamped to 0–100.  Reaching 100 raises the
    /// overflow flag; returns `true` only on the rising edge.
    fn set_fill(&mut self, proposed: f64, now: DateTime<Utc>) -> bool {
        if proposed < 100.0 {
            self.fill_level_percent = proposed.max(0.0);
            return false;
        }
        self.fill_level_percent = 100.0;
        if self.overflow {
            return false;
        }
        self.overflow = true;
        self.overflow_count = self.overflow_count.saturating_add(1);
        self.last_overflow = Some(now);
        true
    }

    fn sensitivity(&self) -> f64 {
        self.fill_sensitivity.clamp(MIN_SENSITIVITY, MAX_SENSITIVITY) as f64
    }

    fn drain_battery(&mut self, elapsed_minutes: f64) {
        let p = &self.params;
        if self.battery_v <= p.battery_floor_v {
            return;
        }
        let dv = p.battery_drain_per_hour * (elapsed_minutes / 60.0) + p.tx_drain_per_report;
        self.battery_v = (self.battery_v - dv).max(p.battery_floor_v);
    }
}

impl SensorModel for BinSensor {
    fn id(&self) -> &str {
        &self.sensor_id
    }

    fn last_update(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    fn fill_level(&self) -> f64 {
        self.fill_level_percent
    }

    fn fill_threshold(&self) -> f64 {
        self.fill_threshold as f64
    }

    fn is_overflowing(&self) -> bool {
        self.overflow
    }

    fn advance<R: Rng + ?Sized>(
        &mut self,
        elapsed_minutes: f64,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> AdvanceOutcome {
        // Also rejects NaN.
        if !(elapsed_minutes > 0.0) {
            return AdvanceOutcome::Skipped;
        }

        let p = self.params;
        let hour = now.with_timezone(&p.timezone).hour();
        let traffic = traffic_factor(hour, self.enable_traffic);
        let noise = rng.random_range(-p.noise_per_hour..=p.noise_per_hour);

        // Noise may push the hourly rate negative; fill never drains here.
        let rate_per_hour = (p.base_rate_per_hour * self.sensitivity() * traffic + noise).max(0.0);
        let before = self.fill_level_percent;
        let overflow_started = self.set_fill(before + rate_per_hour * (elapsed_minutes / 60.0), now);

        self.drain_battery(elapsed_minutes);
        self.timestamp = Some(now);

        AdvanceOutcome::Advanced {
            delta: (self.fill_level_percent - before).max(0.0),
            overflow_started,
        }
    }

    fn maybe_empty<R: Rng + ?Sized>(
        &mut self,
        base_threshold: f64,
        empty_chance: f64,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> EmptyOutcome {
        if !(self.fill_level_percent >= base_threshold) {
            return EmptyOutcome::BelowThreshold;
        }

        let overfill = ((self.fill_level_percent - base_threshold) / OVERFILL_RAMP).min(1.0);
        let chance = empty_chance.clamp(0.0, 1.0);
        let probability = chance + overfill * (1.0 - chance);

        if rng.random::<f64>() < probability {
            self.empty(now);
            EmptyOutcome::Emptied
        } else {
            EmptyOutcome::Held
        }
    }

    fn update_temperature<R: Rng + ?Sized>(&mut self, now: DateTime<Utc>, rng: &mut R) -> f64 {
        let p = &self.params;
        let hour = local_hour(now, p.timezone);
        let base = diurnal_base(p.temp_mean_c, p.temp_amplitude_c, p.temp_peak_hour, hour);
        let jitter = rng.random_range(-p.temp_noise_c..=p.temp_noise_c);
        self.temperature_c = round_to(base + jitter, 2);
        self.temperature_c
    }

    fn override_temperature(&mut self, celsius: f64) {
        if celsius.is_finite() {
            self.temperature_c = round_to(celsius, 2);
        }
    }

    fn apply_nudge(
        &mut self,
        prev_reported_fill: f64,
        min: f64,
        max: f64,
        now: DateTime<Utc>,
    ) -> Option<NudgeOutcome> {
        let amount = fill_nudge(prev_reported_fill, self.fill_level_percent, min, max)?;
        let overflow_started = self.set_fill(self.fill_level_percent + amount, now);
        Some(NudgeOutcome {
            amount,
            overflow_started,
        })
    }

    fn report(&self) -> Option<ReadingRecord> {
        Some(ReadingRecord {
            sensor_id: self.sensor_id.clone(),
            timestamp: self.timestamp?,
            fill_level_percent: self.reported_fill(),
            temperature_c: round_to(self.temperature_c, 1),
            battery_v: round_to(self.battery_v, 3),
            fill_threshold: self.fill_threshold,
            last_emptied: self.last_emptied,
            overflow: self.overflow,
            overflow_count: self.overflow_count,
            last_overflow: self.last_overflow,
        })
    }
}
