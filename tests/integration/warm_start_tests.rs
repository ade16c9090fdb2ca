//! Warm start: a restarted fleet continues from the latest persisted
//! readings instead of re-randomizing.

use std::collections::HashMap;

use chrono::TimeDelta;
use rand::SeedableRng;
use rand::rngs::StdRng;

use smartbins::app::fleet::build_fleet;
use smartbins::app::ports::PersistenceGateway;
use smartbins::app::service::SimulationService;
use smartbins::config::SimConfig;
use smartbins::sensors::SensorModel;

use crate::mock_store::{MemoryGateway, RecordingSink, t0};

fn config(n: usize) -> SimConfig {
    SimConfig {
        db_path: ":memory:".into(),
        fleet_size: n,
        schedule_jitter_secs: 0,
        ..SimConfig::default()
    }
}

/// Run a cold fleet for `hours`, returning the populated store.
fn history(cfg: &SimConfig, hours: i64, rng: &mut StdRng) -> MemoryGateway {
    let fleet = build_fleet(cfg, &HashMap::new(), rng);
    let mut svc = SimulationService::from_config(cfg, fleet.sensors, t0(), rng);
    let mut gw = MemoryGateway::new();
    let mut sink = RecordingSink::new();
    let mut now = t0();
    while now < t0() + TimeDelta::hours(hours) {
        svc.run_cycle(now, &mut gw, None, &mut sink, rng);
        now += TimeDelta::seconds(1);
    }
    gw
}

#[test]
fn restart_hydrates_from_latest_readings() {
    let mut rng = StdRng::seed_from_u64(31);
    let cfg = config(4);
    let gw = history(&cfg, 1, &mut rng);
    let snapshot = gw.latest_snapshot().unwrap();
    assert_eq!(snapshot.len(), 4);

    let fleet = build_fleet(&cfg, &snapshot, &mut rng);
    assert_eq!(fleet.warm, 4);
    for s in &fleet.sensors {
        let last = &snapshot[s.id()];
        assert_eq!(s.report().as_ref(), Some(last), "{} resumes verbatim", s.id());
    }
}

#[test]
fn restarted_sensor_accounts_for_downtime() {
    let mut rng = StdRng::seed_from_u64(32);
    let cfg = config(3);
    let mut gw = history(&cfg, 1, &mut rng);
    let snapshot = gw.latest_snapshot().unwrap();

    // Process comes back six hours later.
    let restart = t0() + TimeDelta::hours(7);
    let fleet = build_fleet(&cfg, &snapshot, &mut rng);
    let mut svc = SimulationService::from_config(&cfg, fleet.sensors, restart, &mut rng);
    let mut sink = RecordingSink::new();
    let before = gw.rows.len();

    let mut now = restart;
    while gw.rows.len() < before + 3 {
        svc.run_cycle(now, &mut gw, None, &mut sink, &mut rng);
        now += TimeDelta::seconds(1);
        assert!(now <= restart + TimeDelta::seconds(901), "all sensors due within an interval");
    }

    for (id, last) in &snapshot {
        let next = gw.rows_for(id).into_iter().next_back().unwrap();
        assert!(next.timestamp - last.timestamp >= TimeDelta::hours(6));
        let emptied = next.last_emptied != last.last_emptied;
        assert!(emptied || next.fill_level_percent >= last.fill_level_percent);
    }
}

#[test]
fn cold_start_when_warm_start_disabled() {
    let mut rng = StdRng::seed_from_u64(33);
    let mut cfg = config(2);
    let gw = history(&cfg, 1, &mut rng);
    cfg.warm_start = false;

    let fleet = build_fleet(&cfg, &gw.latest_snapshot().unwrap(), &mut rng);
    assert_eq!(fleet.warm, 0);
    assert!(fleet.sensors.iter().all(|s| s.last_update().is_none()));
}

#[test]
fn partial_snapshot_mixes_warm_and_cold() {
    let mut rng = StdRng::seed_from_u64(34);
    let gw = history(&config(2), 1, &mut rng);

    let fleet = build_fleet(&config(5), &gw.latest_snapshot().unwrap(), &mut rng);
    assert_eq!(fleet.warm, 2);
    assert!(fleet.sensors[..2].iter().all(|s| s.last_update().is_some()));
    assert!(fleet.sensors[2..].iter().all(|s| s.last_update().is_none()));
}
