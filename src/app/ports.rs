//! Port traits: the hexagonal boundary between the simulation core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ SimulationService (domain)
//! ```
//!
//! Driven adapters (store, weather, clock, event sinks) implement these
//! traits.  The [`SimulationService`](super::service::SimulationService)
//! takes them as explicit arguments, so nothing in the core reaches for a
//! process-wide connection or cache.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{EnrichmentError, PersistenceError};
use crate::reading::{AppendOutcome, ArchiveQuery, ReadingRecord, StaticBin};

// ───────────────────────────────────────────────────────────────
// Persistence gateway (driven adapter: domain ↔ time-series store)
// ───────────────────────────────────────────────────────────────

/// Durable storage for readings and bin metadata.
///
/// # Contract
///
/// - `append` of an empty slice is a no-op returning `{0, 0}`.
/// - Rows whose `(sensor_id, timestamp)` already exists are skipped and
///   counted, never reported as an error.  Replaying a batch is therefore
///   idempotent.
/// - No retries happen behind this trait's back.
pub trait PersistenceGateway {
    /// Guarantee the `(sensor_id, timestamp)` uniqueness constraint exists.
    /// Safe to call any number of times.
    fn ensure_dedup_index(&mut self) -> Result<(), PersistenceError>;

    /// Bulk insert, skipping duplicates.
    fn append(&mut self, rows: &[ReadingRecord]) -> Result<AppendOutcome, PersistenceError>;

    /// Most recent reading for every sensor that ever reported.
    fn latest_snapshot(&self) -> Result<HashMap<String, ReadingRecord>, PersistenceError>;

    /// Most recent reading per sensor, restricted to rows newer than
    /// `now - window`.
    fn latest_snapshot_within(
        &self,
        window: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, ReadingRecord>, PersistenceError>;

    /// One sensor's history, oldest first.
    fn archive(&self, query: &ArchiveQuery) -> Result<Vec<ReadingRecord>, PersistenceError>;

    /// Insert or replace bin metadata keyed on `bin_id`.
    fn upsert_static_bins(&mut self, bins: &[StaticBin]) -> Result<usize, PersistenceError>;

    fn static_bins(&self) -> Result<Vec<StaticBin>, PersistenceError>;
}

// ───────────────────────────────────────────────────────────────
// Enrichment (driven adapter: external observations → domain)
// ───────────────────────────────────────────────────────────────

/// Optional live temperature override.
///
/// The result is partial: any id missing from the map keeps its simulated
/// value.  An `Err` means nothing usable came back this time; callers log
/// it and carry on.
pub trait EnrichmentPort {
    fn fetch_temperatures(
        &mut self,
        sensor_ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, f64>, EnrichmentError>;
}

/// A single upstream weather lookup by coordinate.
pub trait WeatherSource {
    /// Current air temperature (°C) at `(lat, lng)`.
    fn current_temperature(&self, lat: f64, lng: f64) -> Result<f64, EnrichmentError>;
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Wall-clock source.  Swapped for a manual clock in tests.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

// ───────────────────────────────────────────────────────────────
// Event sink (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}
