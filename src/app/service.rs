//! Simulation service: the hexagonal core.
//!
//! [`SimulationService`] owns the fleet and the scheduler.  Every polling
//! tick it advances only the sensors that are due, optionally overrides
//! their temperature from the enrichment port, hands the resulting readings
//! to the persistence gateway and reschedules them.
//!
//! ```text
//!   Scheduler ──▶ SensorModel ──▶ EnrichmentPort ──▶ PersistenceGateway
//!       ▲          (advance,        (optional,          (append,
//!       │           empty, temp)     never fatal)        dedup)
//!       └──────────────────── reschedule ◀──────────────────┘
//! ```
//!
//! State mutation is unconditional and local.  A failing write or
//! enrichment call only affects durability or temperature for that one
//! cycle; in-memory state keeps moving forward either way.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rand::Rng;

use crate::config::SimConfig;
use crate::reading::ReadingRecord;
use crate::scheduler::{ScheduleSettings, Scheduler};
use crate::sensors::{AdvanceOutcome, BinSensor, EmptyOutcome, SensorModel};

use super::events::{AppEvent, CycleSummary};
use super::ports::{EnrichmentPort, EventSink, PersistenceGateway};

// ───────────────────────────────────────────────────────────────
// Settings
// ───────────────────────────────────────────────────────────────

/// Per-cycle knobs, derived from [`SimConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleSettings {
    pub empty_chance: f64,
    pub nudge_min: f64,
    pub nudge_max: f64,
    /// Symmetric jitter added to observed temperatures (°C).
    pub enrichment_jitter_c: f64,
    pub min_sleep: Duration,
}

impl CycleSettings {
    pub fn from_config(cfg: &SimConfig) -> Self {
        Self {
            empty_chance: cfg.empty_chance,
            nudge_min: cfg.nudge_min,
            nudge_max: cfg.nudge_max,
            enrichment_jitter_c: cfg.enrichment_jitter_c,
            min_sleep: cfg.min_sleep(),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// SimulationService
// ───────────────────────────────────────────────────────────────

pub struct SimulationService<S: SensorModel = BinSensor> {
    sensors: Vec<S>,
    /// sensor id → position in `sensors`.
    index: HashMap<String, usize>,
    scheduler: Scheduler,
    settings: CycleSettings,
    cycles: u64,
}

impl<S: SensorModel> SimulationService<S> {
    /// Take ownership of `sensors` and register each with `scheduler`,
    /// staggering their first due times from `now`.
    pub fn new<R: Rng + ?Sized>(
        sensors: Vec<S>,
        mut scheduler: Scheduler,
        settings: CycleSettings,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Self {
        let mut index = HashMap::with_capacity(sensors.len());
        for (i, s) in sensors.iter().enumerate() {
            scheduler.register(s.id(), now, rng);
            index.insert(s.id().to_string(), i);
        }
        Self {
            sensors,
            index,
            scheduler,
            settings,
            cycles: 0,
        }
    }

    pub fn from_config<R: Rng + ?Sized>(
        cfg: &SimConfig,
        sensors: Vec<S>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Self {
        let scheduler = Scheduler::new(ScheduleSettings::from_config(cfg));
        Self::new(sensors, scheduler, CycleSettings::from_config(cfg), now, rng)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Announce the fleet.  `warm` is how many sensors were hydrated.
    pub fn start(&self, warm: usize, sink: &mut (impl EventSink + ?Sized)) {
        sink.emit(&AppEvent::Started {
            fleet_size: self.sensors.len(),
            warm,
        });
        info!(
            "SimulationService started: {} sensors, soonest due {:?}",
            self.sensors.len(),
            self.scheduler.soonest_due()
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one polling tick at `now`.
    ///
    /// 1. Ask the scheduler who is due.
    /// 2. Advance each due sensor, update its temperature, draw for an
    ///    empty event and nudge stalled readings.
    /// 3. Override temperatures from `enrichment`, if any.
    /// 4. Append the readings through `gateway`.
    /// 5. Reschedule every due sensor.
    pub fn run_cycle<G, K, R>(
        &mut self,
        now: DateTime<Utc>,
        gateway: &mut G,
        enrichment: Option<&mut dyn EnrichmentPort>,
        sink: &mut K,
        rng: &mut R,
    ) -> CycleSummary
    where
        G: PersistenceGateway + ?Sized,
        K: EventSink + ?Sized,
        R: Rng + ?Sized,
    {
        let due = self.scheduler.due(now);
        let mut summary = CycleSummary {
            due: due.len(),
            ..CycleSummary::default()
        };
        if due.is_empty() {
            return summary;
        }
        self.cycles += 1;

        // 1–2. Advance due sensors.
        let mut advanced = BTreeSet::new();
        for id in &due {
            if self.advance_one(id, now, sink, rng, &mut summary) {
                advanced.insert(id.clone());
            }
        }

        // 3. Optional temperature override.
        if let Some(port) = enrichment {
            if !advanced.is_empty() {
                self.enrich(port, &advanced, rng, &mut summary);
            }
        }

        // 4. Durable write, isolated from in-memory state.
        let rows: Vec<ReadingRecord> = due
            .iter()
            .filter(|id| advanced.contains(*id))
            .filter_map(|id| self.sensor(id).and_then(|s| s.report()))
            .collect();
        match gateway.append(&rows) {
            Ok(outcome) => {
                summary.written = outcome.written;
                summary.skipped = outcome.skipped;
            }
            Err(e) => {
                error!(
                    "Persistence failed, dropping {} readings this cycle: {}",
                    rows.len(),
                    e
                );
                summary.errors += 1;
            }
        }

        // 5. Reschedule.
        for id in &due {
            self.scheduler.reschedule(id, now, rng);
        }

        sink.emit(&AppEvent::Cycle(summary));
        summary
    }

    // ── Queries ───────────────────────────────────────────────

    /// How long the process loop may sleep after a tick at `now`.
    pub fn sleep_duration(&self, now: DateTime<Utc>) -> Duration {
        self.scheduler.sleep_duration(now, self.settings.min_sleep)
    }

    pub fn sensors(&self) -> &[S] {
        &self.sensors
    }

    pub fn sensor(&self, id: &str) -> Option<&S> {
        self.index.get(id).map(|&i| &self.sensors[i])
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Ticks that had at least one due sensor.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    // ── Internal ──────────────────────────────────────────────

    /// Advance one sensor.  Returns `true` when its state moved forward.
    fn advance_one<K, R>(
        &mut self,
        id: &str,
        now: DateTime<Utc>,
        sink: &mut K,
        rng: &mut R,
        summary: &mut CycleSummary,
    ) -> bool
    where
        K: EventSink + ?Sized,
        R: Rng + ?Sized,
    {
        let Some(&i) = self.index.get(id) else {
            warn!("Scheduler returned unknown sensor '{}'", id);
            return false;
        };
        let elapsed = self.scheduler.elapsed_minutes(self.sensors[i].last_update(), now);
        let settings = self.settings;
        let sensor = &mut self.sensors[i];
        let prev_fill = sensor.reported_fill();

        let overflow_started = match sensor.advance(elapsed, now, rng) {
            AdvanceOutcome::Skipped => {
                debug!("{}: {:.2} min elapsed, nothing to advance", id, elapsed);
                return false;
            }
            AdvanceOutcome::Advanced { overflow_started, .. } => overflow_started,
        };
        summary.advanced += 1;

        if overflow_started {
            emit_overflow(sensor, now, sink, summary);
        }

        sensor.update_temperature(now, rng);

        let threshold = sensor.fill_threshold();
        match sensor.maybe_empty(threshold, settings.empty_chance, now, rng) {
            EmptyOutcome::Emptied => {
                summary.empties += 1;
                sink.emit(&AppEvent::Emptied {
                    sensor_id: id.to_string(),
                    at: now,
                });
            }
            EmptyOutcome::Held | EmptyOutcome::BelowThreshold => {
                let nudge = sensor.apply_nudge(prev_fill, settings.nudge_min, settings.nudge_max, now);
                if let Some(n) = nudge {
                    debug!("{}: reading stalled at {}%, nudged by {:.3}", id, prev_fill, n.amount);
                    summary.nudged += 1;
                    if n.overflow_started {
                        emit_overflow(sensor, now, sink, summary);
                    }
                }
            }
        }

        debug!(
            "{}: fill={:.2}% state={:?} elapsed={:.2}min",
            id,
            sensor.fill_level(),
            sensor.state(),
            elapsed
        );
        true
    }

    fn enrich<R: Rng + ?Sized>(
        &mut self,
        port: &mut dyn EnrichmentPort,
        ids: &BTreeSet<String>,
        rng: &mut R,
        summary: &mut CycleSummary,
    ) {
        let observed = match port.fetch_temperatures(ids) {
            Ok(observed) => observed,
            Err(e) => {
                warn!("Enrichment failed, keeping simulated temperatures: {}", e);
                summary.errors += 1;
                return;
            }
        };

        let bound = self.settings.enrichment_jitter_c;
        for (id, celsius) in observed {
            if !ids.contains(&id) {
                continue;
            }
            let Some(&i) = self.index.get(&id) else {
                continue;
            };
            let jitter = if bound > 0.0 {
                rng.random_range(-bound..=bound)
            } else {
                0.0
            };
            self.sensors[i].override_temperature(celsius + jitter);
            summary.enriched += 1;
        }
    }
}

fn emit_overflow<S, K>(sensor: &S, now: DateTime<Utc>, sink: &mut K, summary: &mut CycleSummary)
where
    S: SensorModel,
    K: EventSink + ?Sized,
{
    summary.overflows += 1;
    if let Some(record) = sensor.report() {
        sink.emit(&AppEvent::Overflow {
            sensor_id: record.sensor_id,
            overflow_count: record.overflow_count,
            at: now,
        });
    }
}
