//! Outbound application events.
//!
//! The [`SimulationService`](super::service::SimulationService) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on the
//! other side decide what to do with them (log lines today, a message bus
//! tomorrow).

use chrono::{DateTime, Utc};

/// Structured events emitted by the simulation core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service is about to enter its loop.
    Started {
        fleet_size: usize,
        /// Sensors hydrated from persisted readings.
        warm: usize,
    },

    /// A bin crossed 100% (rising edge only).
    Overflow {
        sensor_id: String,
        overflow_count: u32,
        at: DateTime<Utc>,
    },

    /// A bin was serviced.
    Emptied { sensor_id: String, at: DateTime<Utc> },

    /// One polling tick completed.
    Cycle(CycleSummary),
}

/// Per-cycle tallies, logged once per tick that had due sensors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Sensors whose due time had passed.
    pub due: usize,
    /// Sensors whose state actually moved forward.
    pub advanced: usize,
    /// Rows the gateway persisted.
    pub written: usize,
    /// Rows the gateway ignored as duplicates.
    pub skipped: usize,
    pub overflows: usize,
    pub empties: usize,
    /// Sensors whose temperature came from the enrichment collaborator.
    pub enriched: usize,
    /// Stalled readings pushed forward.
    pub nudged: usize,
    /// Isolated failures (persistence, enrichment) this cycle.
    pub errors: usize,
}

impl CycleSummary {
    pub fn is_idle(&self) -> bool {
        self.due == 0
    }
}
