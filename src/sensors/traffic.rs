//! Time-of-day fill modulation.
//!
//! Bins near foot traffic fill faster mid-morning through lunch and slow
//! right down overnight.  The profile is a fixed 24-entry table indexed by
//! local hour.

/// Fill-rate multiplier per local hour (0 = midnight).
pub const TRAFFIC_PROFILE: [f64; 24] = [
    0.60, 0.55, 0.50, 0.50, 0.55, 0.60, // 00–05
    0.75, 0.90, 1.05, 1.15, 1.25, 1.35, // 06–11
    1.40, 1.40, 1.30, 1.15, 1.00, 0.90, // 12–17
    0.80, 0.75, 0.70, 0.65, 0.60, 0.60, // 18–23
];

/// Multiplier for `hour` (0–23, wrapped).  Constant 1.0 when disabled.
pub fn traffic_factor(hour: u32, enabled: bool) -> f64 {
    if !enabled {
        return 1.0;
    }
    TRAFFIC_PROFILE[(hour % 24) as usize]
}
