//! Diurnal ambient temperature model.
//!
//! A sinusoid with one peak per day:
//!
//! ```text
//! T(h) = mean + amplitude · sin(2π (h − peak) / 24 + π/2) + U[−noise, noise]
//! ```
//!
//! `h` is the fractional hour in the configured local zone, so the peak
//! lands at the same wall-clock time regardless of the UTC storage zone.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use core::f64::consts::PI;

/// Fractional local hour (includes minutes and seconds) of `now` in `tz`.
pub fn local_hour(now: DateTime<Utc>, tz: Tz) -> f64 {
    let local = now.with_timezone(&tz);
    local.hour() as f64 + local.minute() as f64 / 60.0 + local.second() as f64 / 3600.0
}

/// Noise-free diurnal temperature at fractional hour `hour`.
pub fn diurnal_base(mean: f64, amplitude: f64, peak_hour: f64, hour: f64) -> f64 {
    let angle = 2.0 * PI * (hour - peak_hour) / 24.0 + PI / 2.0;
    mean + amplitude * angle.sin()
}
