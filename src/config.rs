//! Process configuration.
//!
//! All tunable parameters for the simulator.  Values come from
//! `SMARTBINS_*` environment variables; everything except the store path
//! has a default.  Invalid values are rejected, never silently clamped.

use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sensors::SensorParams;

/// Prefix shared by every recognised variable.
pub const ENV_PREFIX: &str = "SMARTBINS_";

/// Longest accepted reporting interval (one week).
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 3600;
/// Longest accepted enrichment cache lifetime (one day).
pub const MAX_ENRICHMENT_TTL_SECS: u64 = 24 * 3600;

/// Core simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    // --- Store ---
    /// SQLite database file (`:memory:` for a throwaway store).
    pub db_path: String,

    // --- Fleet ---
    pub fleet_size: usize,
    /// Hydrate sensors from the latest persisted readings.
    pub warm_start: bool,

    // --- Scheduling ---
    /// Per-sensor reporting interval (seconds).
    pub interval_secs: u64,
    /// Poll cadence of the process loop (seconds).  Finer than the interval.
    pub poll_secs: u64,
    /// Floor on the sleep between polls (seconds).
    pub min_sleep_secs: u64,
    /// Symmetric jitter bound added on every reschedule (seconds).
    pub schedule_jitter_secs: u64,
    /// Defer every sensor's first report by one interval.
    pub skip_first_cycle: bool,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,

    // --- Events ---
    /// Base empty probability once fill reaches the bin threshold.
    pub empty_chance: f64,
    /// Bounds for the stalled-reading nudge (%).
    pub nudge_min: f64,
    pub nudge_max: f64,

    // --- Enrichment ---
    pub enrichment_enabled: bool,
    /// Symmetric jitter added to observed temperatures (°C).
    pub enrichment_jitter_c: f64,
    pub enrichment_ttl_secs: u64,
    pub enrichment_timeout_secs: u64,

    // --- Physics ---
    pub sensor: SensorParams,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            db_path: String::new(),

            fleet_size: 12,
            warm_start: true,

            interval_secs: 900, // 15 min
            poll_secs: 1,
            min_sleep_secs: 1,
            schedule_jitter_secs: 30,
            skip_first_cycle: false,
            seed: None,

            empty_chance: 0.005,
            nudge_min: 0.1,
            nudge_max: 1.0,

            enrichment_enabled: false,
            enrichment_jitter_c: 0.3,
            enrichment_ttl_secs: 600,
            enrichment_timeout_secs: 5,

            sensor: SensorParams::default(),
        }
    }
}

impl SimConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load from `(key, value)` pairs.  Unknown keys are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut cfg = Self::default();
        let mut db_path = None;

        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let raw = value.as_ref().trim();
            match name {
                "DB_PATH" => db_path = Some(raw.to_string()).filter(|p| !p.is_empty()),
                "FLEET_SIZE" => cfg.fleet_size = parse(key.as_ref(), raw)?,
                "WARM_START" => cfg.warm_start = parse_bool(key.as_ref(), raw)?,
                "INTERVAL_SECS" => cfg.interval_secs = parse(key.as_ref(), raw)?,
                "POLL_SECS" => cfg.poll_secs = parse(key.as_ref(), raw)?,
                "MIN_SLEEP_SECS" => cfg.min_sleep_secs = parse(key.as_ref(), raw)?,
                "SCHEDULE_JITTER_SECS" => cfg.schedule_jitter_secs = parse(key.as_ref(), raw)?,
                "SKIP_FIRST_CYCLE" => cfg.skip_first_cycle = parse_bool(key.as_ref(), raw)?,
                "SEED" => cfg.seed = Some(parse(key.as_ref(), raw)?),
                "EMPTY_CHANCE" => cfg.empty_chance = parse(key.as_ref(), raw)?,
                "EMPTY_RESIDUE" => cfg.sensor.empty_residue_percent = parse(key.as_ref(), raw)?,
                "NUDGE_MIN" => cfg.nudge_min = parse(key.as_ref(), raw)?,
                "NUDGE_MAX" => cfg.nudge_max = parse(key.as_ref(), raw)?,
                "ENRICHMENT" => cfg.enrichment_enabled = parse_bool(key.as_ref(), raw)?,
                "ENRICHMENT_JITTER_C" => cfg.enrichment_jitter_c = parse(key.as_ref(), raw)?,
                "ENRICHMENT_TTL_SECS" => cfg.enrichment_ttl_secs = parse(key.as_ref(), raw)?,
                "ENRICHMENT_TIMEOUT_SECS" => {
                    cfg.enrichment_timeout_secs = parse(key.as_ref(), raw)?;
                }
                "TZ" => cfg.sensor.timezone = parse::<Tz>(key.as_ref(), raw)?,
                _ => log::debug!("config: ignoring unknown variable {}", key.as_ref()),
            }
        }

        cfg.db_path = db_path.ok_or(ConfigError::Missing("SMARTBINS_DB_PATH"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Range-check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.is_empty() {
            return Err(ConfigError::Missing("SMARTBINS_DB_PATH"));
        }
        if !(1..=10_000).contains(&self.fleet_size) {
            return Err(ConfigError::ValidationFailed("fleet_size must be 1–10000"));
        }
        if !(1..=MAX_INTERVAL_SECS).contains(&self.interval_secs) {
            return Err(ConfigError::ValidationFailed("interval_secs must be 1–604800"));
        }
        if self.poll_secs == 0 || self.poll_secs > self.interval_secs {
            return Err(ConfigError::ValidationFailed(
                "poll_secs must be > 0 and no coarser than interval_secs",
            ));
        }
        if self.min_sleep_secs > self.interval_secs {
            return Err(ConfigError::ValidationFailed(
                "min_sleep_secs must not exceed interval_secs",
            ));
        }
        if self.schedule_jitter_secs >= self.interval_secs {
            return Err(ConfigError::ValidationFailed(
                "schedule_jitter_secs must be < interval_secs",
            ));
        }
        if !(0.0..=1.0).contains(&self.empty_chance) {
            return Err(ConfigError::ValidationFailed("empty_chance must be 0.0–1.0"));
        }
        if !(self.nudge_min >= 0.0 && self.nudge_min <= self.nudge_max && self.nudge_max <= 5.0) {
            return Err(ConfigError::ValidationFailed(
                "nudge bounds must satisfy 0 <= nudge_min <= nudge_max <= 5",
            ));
        }
        if !(self.enrichment_jitter_c >= 0.0 && self.enrichment_jitter_c <= 5.0) {
            return Err(ConfigError::ValidationFailed(
                "enrichment_jitter_c must be 0.0–5.0",
            ));
        }
        if self.enrichment_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "enrichment_timeout_secs must be > 0",
            ));
        }
        if self.enrichment_ttl_secs > MAX_ENRICHMENT_TTL_SECS {
            return Err(ConfigError::ValidationFailed(
                "enrichment_ttl_secs must be <= 86400",
            ));
        }

        let s = &self.sensor;
        if !(0.0..=100.0).contains(&s.empty_residue_percent) {
            return Err(ConfigError::ValidationFailed("empty_residue must be 0–100"));
        }
        if !(s.base_rate_per_hour >= 0.0 && s.noise_per_hour >= 0.0) {
            return Err(ConfigError::ValidationFailed(
                "fill rate and noise must be non-negative",
            ));
        }
        if !(s.battery_floor_v > 0.0
            && s.battery_drain_per_hour >= 0.0
            && s.tx_drain_per_report >= 0.0)
        {
            return Err(ConfigError::ValidationFailed(
                "battery floor must be positive and drains non-negative",
            ));
        }
        if !(s.temp_noise_c >= 0.0 && (0.0..24.0).contains(&s.temp_peak_hour)) {
            return Err(ConfigError::ValidationFailed(
                "temp_noise_c must be >= 0 and temp_peak_hour 0–24",
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }

    pub fn min_sleep(&self) -> Duration {
        Duration::from_secs(self.min_sleep_secs)
    }
}

fn parse<T: core::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}
