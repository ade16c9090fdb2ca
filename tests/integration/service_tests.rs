//! Integration tests for the Scheduler → Sensor → Enrichment → Gateway
//! pipeline driven through `SimulationService::run_cycle`.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;

use smartbins::app::events::{AppEvent, CycleSummary};
use smartbins::app::fleet::build_fleet;
use smartbins::app::ports::{EnrichmentPort, PersistenceGateway};
use smartbins::app::service::{CycleSettings, SimulationService};
use smartbins::config::SimConfig;
use smartbins::scheduler::{ScheduleSettings, Scheduler};
use smartbins::sensors::{BinSensor, SensorModel, SensorParams};

use crate::mock_store::{MemoryGateway, RecordingSink, StubEnrichment, t0};

fn config(n: usize, jitter_secs: u64) -> SimConfig {
    SimConfig {
        db_path: ":memory:".into(),
        fleet_size: n,
        schedule_jitter_secs: jitter_secs,
        ..SimConfig::default()
    }
}

fn cold_service(cfg: &SimConfig, rng: &mut StdRng) -> SimulationService {
    let fleet = build_fleet(cfg, &HashMap::new(), rng);
    SimulationService::from_config(cfg, fleet.sensors, t0(), rng)
}

/// Tick once per second over `[from, until)`.
#[allow(clippy::too_many_arguments)]
fn drive(
    svc: &mut SimulationService,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
    gw: &mut MemoryGateway,
    mut enrichment: Option<&mut StubEnrichment>,
    sink: &mut RecordingSink,
    rng: &mut StdRng,
) -> Vec<CycleSummary> {
    let mut out = Vec::new();
    let mut now = from;
    while now < until {
        let port = enrichment.as_deref_mut().map(|e| e as &mut dyn EnrichmentPort);
        let s = svc.run_cycle(now, gw, port, sink, rng);
        if !s.is_idle() {
            out.push(s);
        }
        now += TimeDelta::seconds(1);
    }
    out
}

// ── Staggering ────────────────────────────────────────────────

#[test]
fn each_sensor_reports_once_in_first_interval_at_distinct_times() {
    let mut rng = StdRng::seed_from_u64(11);
    let cfg = config(5, 0);
    let mut svc = cold_service(&cfg, &mut rng);
    let mut gw = MemoryGateway::new();
    let mut sink = RecordingSink::new();

    drive(&mut svc, t0(), t0() + TimeDelta::seconds(900), &mut gw, None, &mut sink, &mut rng);

    assert_eq!(gw.rows.len(), 5);
    let ids: BTreeSet<_> = gw.rows.iter().map(|r| r.sensor_id.as_str()).collect();
    assert_eq!(ids.len(), 5, "every sensor exactly once");
    let stamps: BTreeSet<_> = gw.rows.iter().map(|r| r.timestamp).collect();
    assert_eq!(stamps.len(), 5, "reports are staggered, not simultaneous");
}

#[test]
fn gaps_between_reports_stay_within_jitter() {
    let mut rng = StdRng::seed_from_u64(12);
    let cfg = config(4, 30);
    let mut svc = cold_service(&cfg, &mut rng);
    let mut gw = MemoryGateway::new();
    let mut sink = RecordingSink::new();

    drive(&mut svc, t0(), t0() + TimeDelta::hours(3), &mut gw, None, &mut sink, &mut rng);

    for id in ["R718X-001", "R718X-002", "R718X-003", "R718X-004"] {
        let rows = gw.rows_for(id);
        assert!(rows.len() >= 11, "{id}: {} reports in 3h", rows.len());
        for pair in rows.windows(2) {
            let gap = (pair[1].timestamp - pair[0].timestamp).num_seconds();
            assert!((869..=931).contains(&gap), "{id}: gap {gap}s");
        }
    }
}

#[test]
fn deferred_first_cycle_is_quiet() {
    let mut rng = StdRng::seed_from_u64(13);
    let mut cfg = config(3, 0);
    cfg.skip_first_cycle = true;
    let mut svc = cold_service(&cfg, &mut rng);
    let mut gw = MemoryGateway::new();
    let mut sink = RecordingSink::new();

    drive(&mut svc, t0(), t0() + TimeDelta::seconds(900), &mut gw, None, &mut sink, &mut rng);
    assert!(gw.rows.is_empty());

    drive(
        &mut svc,
        t0() + TimeDelta::seconds(900),
        t0() + TimeDelta::seconds(1800),
        &mut gw,
        None,
        &mut sink,
        &mut rng,
    );
    assert_eq!(gw.rows.len(), 3);
}

// ── Day-long invariants ───────────────────────────────────────

#[test]
fn day_of_readings_respects_invariants() {
    let mut rng = StdRng::seed_from_u64(14);
    let cfg = config(6, 30);
    let mut svc = cold_service(&cfg, &mut rng);
    let mut gw = MemoryGateway::new();
    let mut sink = RecordingSink::new();

    let summaries = drive(&mut svc, t0(), t0() + TimeDelta::hours(24), &mut gw, None, &mut sink, &mut rng);
    assert!(summaries.iter().all(|s| s.errors == 0 && s.skipped == 0));

    for s in svc.sensors() {
        let rows = gw.rows_for(s.id());
        assert!(rows.len() >= 90, "{}: {} reports", s.id(), rows.len());
        for r in &rows {
            assert!((0.0..=100.0).contains(&r.fill_level_percent));
            assert_eq!(r.fill_level_percent, r.fill_level_percent.round());
            assert!(r.battery_v >= cfg.sensor.battery_floor_v);
        }
        for pair in rows.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
            assert!(pair[1].battery_v <= pair[0].battery_v);
            assert!(pair[1].overflow_count >= pair[0].overflow_count);
            let emptied = pair[1].last_emptied != pair[0].last_emptied;
            if !emptied {
                assert!(
                    pair[1].fill_level_percent >= pair[0].fill_level_percent,
                    "{}: fill fell without an empty event",
                    s.id()
                );
            }
        }
    }
}

// ── Overflow edge ─────────────────────────────────────────────

#[test]
fn overflow_is_counted_once_while_bin_stays_full() {
    let mut rng = StdRng::seed_from_u64(15);
    let mut s = BinSensor::new("R718X-001", SensorParams::default());
    s.fill_level_percent = 99.9;
    s.fill_threshold = 100;
    s.fill_sensitivity = 10;

    let scheduler = Scheduler::new(ScheduleSettings {
        interval: Duration::from_secs(900),
        jitter: Duration::ZERO,
        defer_first: false,
    });
    let settings = CycleSettings {
        empty_chance: 0.0,
        nudge_min: 0.1,
        nudge_max: 1.0,
        enrichment_jitter_c: 0.0,
        min_sleep: Duration::from_secs(1),
    };
    let mut svc = SimulationService::new(vec![s], scheduler, settings, t0(), &mut rng);
    let mut gw = MemoryGateway::new();
    let mut sink = RecordingSink::new();

    drive(&mut svc, t0(), t0() + TimeDelta::hours(2), &mut gw, None, &mut sink, &mut rng);

    assert_eq!(sink.overflows(), 1);
    let rows = gw.rows_for("R718X-001");
    assert!(rows.len() >= 7);
    assert!(rows.iter().all(|r| r.overflow && r.overflow_count == 1));
    assert!(rows.iter().all(|r| r.fill_level_percent == 100.0));
}

#[test]
fn stalled_reading_nudged_to_full_overflows_in_same_report() {
    let mut rng = StdRng::seed_from_u64(21);
    // 02:00 in Melbourne (UTC+11): slowest traffic, so the advance alone
    // stays short of 100 and the nudge carries it over.
    let start = Utc.with_ymd_and_hms(2025, 2, 28, 15, 0, 0).unwrap();
    let mut s = BinSensor::new("R718X-001", SensorParams::default());
    s.fill_level_percent = 99.55;
    s.fill_threshold = 100;
    s.fill_sensitivity = 1;

    let scheduler = Scheduler::new(ScheduleSettings {
        interval: Duration::from_secs(900),
        jitter: Duration::ZERO,
        defer_first: false,
    });
    let settings = CycleSettings {
        empty_chance: 0.0,
        nudge_min: 0.1,
        nudge_max: 1.0,
        enrichment_jitter_c: 0.0,
        min_sleep: Duration::from_secs(1),
    };
    let mut svc = SimulationService::new(vec![s], scheduler, settings, start, &mut rng);
    let mut gw = MemoryGateway::new();
    let mut sink = RecordingSink::new();

    let summaries = drive(&mut svc, start, start + TimeDelta::seconds(900), &mut gw, None, &mut sink, &mut rng);

    assert_eq!(summaries.iter().map(|s| s.nudged).sum::<usize>(), 1);
    assert_eq!(summaries.iter().map(|s| s.overflows).sum::<usize>(), 1);
    assert_eq!(sink.overflows(), 1);
    let rows = gw.rows_for("R718X-001");
    assert_eq!(rows.len(), 1);
    let first = rows[0];
    assert_eq!(first.fill_level_percent, 100.0);
    assert!(first.overflow);
    assert_eq!(first.overflow_count, 1);
    assert_eq!(first.last_overflow, Some(first.timestamp));
}

// ── Failure isolation ─────────────────────────────────────────

#[test]
fn persistence_failure_does_not_stop_state() {
    let mut rng = StdRng::seed_from_u64(16);
    let cfg = config(3, 0);
    let mut svc = cold_service(&cfg, &mut rng);
    let mut gw = MemoryGateway::failing();
    let mut sink = RecordingSink::new();
    let end = t0() + TimeDelta::seconds(900);

    let summaries = drive(&mut svc, t0(), end, &mut gw, None, &mut sink, &mut rng);
    assert!(gw.rows.is_empty());
    assert!(summaries.iter().all(|s| s.errors == 1 && s.written == 0));
    assert_eq!(summaries.iter().map(|s| s.advanced).sum::<usize>(), 3);
    let stamped: Vec<_> = svc.sensors().iter().map(|s| s.last_update()).collect();
    assert!(stamped.iter().all(Option::is_some));

    // Store recovers: the next cycle persists and time keeps moving.
    gw.failing = false;
    drive(&mut svc, end, end + TimeDelta::seconds(900), &mut gw, None, &mut sink, &mut rng);
    assert_eq!(gw.rows.len(), 3);
    for (s, before) in svc.sensors().iter().zip(stamped) {
        assert!(s.last_update() > before);
    }
}

#[test]
fn enrichment_overrides_temperature_within_jitter() {
    let mut rng = StdRng::seed_from_u64(17);
    let cfg = config(4, 0);
    let mut svc = cold_service(&cfg, &mut rng);
    let mut gw = MemoryGateway::new();
    let mut sink = RecordingSink::new();
    let mut stub = StubEnrichment::returning(30.0);

    let summaries = drive(
        &mut svc,
        t0(),
        t0() + TimeDelta::seconds(900),
        &mut gw,
        Some(&mut stub),
        &mut sink,
        &mut rng,
    );

    assert_eq!(summaries.iter().map(|s| s.enriched).sum::<usize>(), 4);
    // Only sensors that advanced this cycle are requested.
    assert!(stub.requests.iter().all(|ids| !ids.is_empty()));
    for r in &gw.rows {
        assert!((29.7..=30.3).contains(&r.temperature_c), "{}", r.temperature_c);
    }
}

#[test]
fn enrichment_failure_keeps_simulated_temperature() {
    let mut rng = StdRng::seed_from_u64(18);
    let cfg = config(4, 0);
    let mut svc = cold_service(&cfg, &mut rng);
    let mut gw = MemoryGateway::new();
    let mut sink = RecordingSink::new();
    let mut stub = StubEnrichment::failing();

    let summaries = drive(
        &mut svc,
        t0(),
        t0() + TimeDelta::seconds(900),
        &mut gw,
        Some(&mut stub),
        &mut sink,
        &mut rng,
    );

    assert_eq!(gw.rows.len(), 4, "readings still persisted");
    assert!(summaries.iter().all(|s| s.errors == 1 && s.enriched == 0));
    // 11:00 Melbourne in March: diurnal model sits near the mean, far from 30.
    for r in &gw.rows {
        assert!((5.0..=25.0).contains(&r.temperature_c), "{}", r.temperature_c);
    }
}

// ── Dedup through the port ────────────────────────────────────

#[test]
fn replaying_snapshot_is_skipped() {
    let mut rng = StdRng::seed_from_u64(19);
    let cfg = config(3, 0);
    let mut svc = cold_service(&cfg, &mut rng);
    let mut gw = MemoryGateway::new();
    let mut sink = RecordingSink::new();
    drive(&mut svc, t0(), t0() + TimeDelta::seconds(900), &mut gw, None, &mut sink, &mut rng);

    let replay: Vec<_> = svc.sensors().iter().filter_map(|s| s.report()).collect();
    let outcome = gw.append(&replay).unwrap();
    assert_eq!(outcome.written, 0);
    assert_eq!(outcome.skipped, 3);
    assert_eq!(gw.rows.len(), 3);
}

#[test]
fn cycle_events_mirror_summaries() {
    let mut rng = StdRng::seed_from_u64(20);
    let cfg = config(2, 0);
    let mut svc = cold_service(&cfg, &mut rng);
    let mut gw = MemoryGateway::new();
    let mut sink = RecordingSink::new();
    svc.start(0, &mut sink);

    let summaries = drive(&mut svc, t0(), t0() + TimeDelta::seconds(900), &mut gw, None, &mut sink, &mut rng);

    assert_eq!(sink.events[0], AppEvent::Started { fleet_size: 2, warm: 0 });
    let cycles: Vec<_> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::Cycle(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(cycles, summaries);
    assert_eq!(svc.cycles() as usize, summaries.len());
}
