//! Fleet construction.
//!
//! Sensors are created once at startup, either from randomized defaults
//! (cold) or hydrated from the most recent persisted reading (warm).  A
//! warm-start field that fails validation falls back to its cold default on
//! its own; the rest of the record is kept.

use std::collections::HashMap;

use log::{info, warn};
use rand::Rng;

use crate::config::SimConfig;
use crate::reading::{ReadingRecord, StaticBin};
use crate::sensors::{BinSensor, SensorParams};

/// Default overflow / empty trigger level for new bins.
pub const DEFAULT_THRESHOLD: u8 = 85;
/// Fresh battery voltage.
pub const FRESH_BATTERY_V: f64 = 3.6;
/// Highest plausible reading for the lithium cell these devices carry.
const MAX_BATTERY_V: f64 = 4.2;
/// Plausible ambient range for a street bin (°C).
const TEMP_RANGE_C: (f64, f64) = (-40.0, 70.0);

/// Site bounding box new bins are scattered across.
const SITE_LAT: (f64, f64) = (-37.7942, -37.7923);
const SITE_LNG: (f64, f64) = (144.8988, 144.9002);

pub fn sensor_id(index: usize) -> String {
    format!("R718X-{index:03}")
}

pub fn bin_id(index: usize) -> String {
    format!("BIN-{index:03}")
}

/// The constructed fleet plus how many sensors came from persisted state.
#[derive(Debug, Clone)]
pub struct Fleet {
    pub sensors: Vec<BinSensor>,
    pub warm: usize,
}

/// Build `cfg.fleet_size` sensors, hydrating from `snapshot` when warm
/// start is enabled.
pub fn build_fleet<R: Rng + ?Sized>(
    cfg: &SimConfig,
    snapshot: &HashMap<String, ReadingRecord>,
    rng: &mut R,
) -> Fleet {
    let mut warm = 0;
    let sensors = (1..=cfg.fleet_size)
        .map(|i| {
            let id = sensor_id(i);
            match snapshot.get(&id).filter(|_| cfg.warm_start) {
                Some(record) => {
                    warm += 1;
                    hydrate(record, cfg.sensor, rng)
                }
                None => cold_sensor(&id, cfg.sensor, rng),
            }
        })
        .collect();

    info!(
        "Fleet: {} sensors ({} warm, {} cold)",
        cfg.fleet_size,
        warm,
        cfg.fleet_size - warm
    );
    Fleet { sensors, warm }
}

/// A never-reported sensor with randomized starting state.
pub fn cold_sensor<R: Rng + ?Sized>(id: &str, params: SensorParams, rng: &mut R) -> BinSensor {
    let mut s = BinSensor::new(id, params);
    s.fill_level_percent = random_fill(rng);
    s.temperature_c = random_temperature(rng);
    s.battery_v = FRESH_BATTERY_V;
    s.fill_threshold = DEFAULT_THRESHOLD;
    s.fill_sensitivity = rng.random_range(1..=5);
    s.enable_traffic = true;
    s
}

/// Rebuild a sensor from its latest persisted reading.
pub fn hydrate<R: Rng + ?Sized>(
    record: &ReadingRecord,
    params: SensorParams,
    rng: &mut R,
) -> BinSensor {
    let id = record.sensor_id.as_str();
    let mut s = cold_sensor(id, params, rng);

    let fill = record.fill_level_percent;
    if fill.is_finite() && (0.0..=100.0).contains(&fill) {
        s.fill_level_percent = fill;
    } else {
        warn!("Warm start: {} fill_level_percent={} invalid, using default", id, fill);
    }

    let temp = record.temperature_c;
    if temp.is_finite() && (TEMP_RANGE_C.0..=TEMP_RANGE_C.1).contains(&temp) {
        s.temperature_c = temp;
    } else {
        warn!("Warm start: {} temperature_c={} invalid, using default", id, temp);
    }

    let battery = record.battery_v;
    if battery.is_finite() && (params.battery_floor_v..=MAX_BATTERY_V).contains(&battery) {
        s.battery_v = battery;
    } else {
        warn!("Warm start: {} battery_v={} invalid, using default", id, battery);
    }

    if (1..=100).contains(&record.fill_threshold) {
        s.fill_threshold = record.fill_threshold;
    } else {
        warn!(
            "Warm start: {} fill_threshold={} invalid, using default",
            id, record.fill_threshold
        );
    }

    let overflow = s.fill_level_percent >= 100.0;
    if record.overflow != overflow {
        warn!(
            "Warm start: {} overflow={} disagrees with fill {}, using {}",
            id, record.overflow, s.fill_level_percent, overflow
        );
    }
    s.overflow = overflow;
    s.overflow_count = record.overflow_count;
    s.last_emptied = record.last_emptied;
    s.last_overflow = record.last_overflow;
    s.timestamp = Some(record.timestamp);
    s
}

/// Metadata for every id in `sensor_ids` that `existing` does not already
/// cover, with coordinates scattered over the site.
pub fn missing_static_bins<R: Rng + ?Sized>(
    sensor_ids: &[String],
    existing: &[StaticBin],
    rng: &mut R,
) -> Vec<StaticBin> {
    sensor_ids
        .iter()
        .enumerate()
        .filter(|(_, id)| !existing.iter().any(|b| &b.sensor_id == *id))
        .map(|(i, id)| StaticBin {
            bin_id: bin_id(i + 1),
            sensor_id: id.clone(),
            lat: rng.random_range(SITE_LAT.0..=SITE_LAT.1),
            lng: rng.random_range(SITE_LNG.0..=SITE_LNG.1),
        })
        .collect()
}

fn random_fill<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.random_range(1..=100u8) as f64
}

fn random_temperature<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.random_range(15.0..=25.0)
}
