//! End-to-end runs against the SQLite gateway on a temporary file.

use std::collections::HashMap;

use chrono::TimeDelta;
use rand::SeedableRng;
use rand::rngs::StdRng;

use smartbins::adapters::sqlite::SqliteGateway;
use smartbins::app::fleet::{build_fleet, missing_static_bins};
use smartbins::app::ports::PersistenceGateway;
use smartbins::app::service::SimulationService;
use smartbins::config::SimConfig;
use smartbins::reading::ArchiveQuery;
use smartbins::sensors::SensorModel;

use crate::mock_store::{RecordingSink, t0};

fn config(path: &std::path::Path, n: usize) -> SimConfig {
    SimConfig {
        db_path: path.display().to_string(),
        fleet_size: n,
        ..SimConfig::default()
    }
}

#[test]
fn run_close_reopen_and_resume() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readings.db");
    let cfg = config(&path, 3);
    let mut rng = StdRng::seed_from_u64(41);

    let written = {
        let mut gw = SqliteGateway::open(&path).unwrap();
        gw.ensure_dedup_index().unwrap();
        let fleet = build_fleet(&cfg, &HashMap::new(), &mut rng);
        let mut svc = SimulationService::from_config(&cfg, fleet.sensors, t0(), &mut rng);
        let mut sink = RecordingSink::new();

        let mut written = 0;
        let mut now = t0();
        while now < t0() + TimeDelta::hours(2) {
            written += svc.run_cycle(now, &mut gw, None, &mut sink, &mut rng).written;
            now += TimeDelta::seconds(1);
        }
        gw.close().unwrap();
        written
    };

    let gw = SqliteGateway::open(&path).unwrap();
    assert_eq!(gw.reading_count().unwrap(), written);

    let snapshot = gw.latest_snapshot().unwrap();
    assert_eq!(snapshot.len(), 3);
    let fleet = build_fleet(&cfg, &snapshot, &mut rng);
    assert_eq!(fleet.warm, 3);
    for s in &fleet.sensors {
        let history = gw.archive(&ArchiveQuery::for_sensor(s.id())).unwrap();
        assert_eq!(history.last(), snapshot.get(s.id()));
    }
}

#[test]
fn archive_replay_is_fully_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replay.db");
    let cfg = config(&path, 2);
    let mut rng = StdRng::seed_from_u64(42);

    let mut gw = SqliteGateway::open(&path).unwrap();
    gw.ensure_dedup_index().unwrap();
    let fleet = build_fleet(&cfg, &HashMap::new(), &mut rng);
    let mut svc = SimulationService::from_config(&cfg, fleet.sensors, t0(), &mut rng);
    let mut sink = RecordingSink::new();
    let mut now = t0();
    while now < t0() + TimeDelta::hours(1) {
        svc.run_cycle(now, &mut gw, None, &mut sink, &mut rng);
        now += TimeDelta::seconds(1);
    }

    let history = gw.archive(&ArchiveQuery::for_sensor("R718X-001")).unwrap();
    assert!(!history.is_empty());
    let outcome = gw.append(&history).unwrap();
    assert_eq!(outcome.written, 0);
    assert_eq!(outcome.skipped, history.len());
}

#[test]
fn static_bins_are_created_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut gw = SqliteGateway::open(dir.path().join("bins.db")).unwrap();
    let mut rng = StdRng::seed_from_u64(43);
    let ids: Vec<String> = (1..=4).map(smartbins::app::fleet::sensor_id).collect();

    let first = missing_static_bins(&ids, &gw.static_bins().unwrap(), &mut rng);
    assert_eq!(gw.upsert_static_bins(&first).unwrap(), 4);

    let second = missing_static_bins(&ids, &gw.static_bins().unwrap(), &mut rng);
    assert!(second.is_empty());
    assert_eq!(gw.static_bins().unwrap(), first);
}

#[test]
fn unopenable_path_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("nested").join("x.db");
    assert!(matches!(
        SqliteGateway::open(&path),
        Err(smartbins::error::PersistenceError::Unavailable(_))
    ));
}
