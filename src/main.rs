//! Smart bin fleet simulator: main entry point.
//!
//! Hexagonal layout with a single polling loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SqliteGateway        WeatherEnricher     LogEventSink         │
//! │  (PersistenceGateway) (EnrichmentPort)    (EventSink)          │
//! │  SystemClock          OpenMeteoSource                          │
//! │  (Clock)              (WeatherSource)                          │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            SimulationService (pure logic)              │    │
//! │  │  Scheduler · BinSensor fleet                           │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use smartbins::adapters::log_sink::LogEventSink;
use smartbins::adapters::sqlite::SqliteGateway;
use smartbins::adapters::time::SystemClock;
use smartbins::app::fleet::{build_fleet, missing_static_bins};
use smartbins::app::ports::{Clock, EnrichmentPort, PersistenceGateway};
use smartbins::app::service::SimulationService;
use smartbins::config::SimConfig;
use smartbins::reading::StaticBin;
use smartbins::sensors::SensorModel;

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("╔══════════════════════════════════════╗");
    info!("║  smartbins-sim v{}                ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration (fatal on error) ─────────────────────
    let cfg = SimConfig::from_env().context("loading SMARTBINS_* configuration")?;
    info!(
        "Config: {} sensors, interval {}s, jitter ±{}s, poll {}s, enrichment {}",
        cfg.fleet_size,
        cfg.interval_secs,
        cfg.schedule_jitter_secs,
        cfg.poll_secs,
        if cfg.enrichment_enabled { "on" } else { "off" }
    );

    let mut rng = match cfg.seed {
        Some(seed) => {
            info!("RNG: fixed seed {}", seed);
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_os_rng(),
    };
    let clock = SystemClock;

    // ── 3. Store ──────────────────────────────────────────────
    let mut gateway = SqliteGateway::open_indexed(&cfg.db_path)
        .with_context(|| format!("opening indexed store at {}", cfg.db_path))?;

    // ── 4. Fleet (warm start from the latest snapshot) ────────
    let snapshot = if cfg.warm_start {
        gateway.latest_snapshot().unwrap_or_else(|e| {
            warn!("Snapshot load failed ({}), starting cold", e);
            Default::default()
        })
    } else {
        Default::default()
    };
    let fleet = build_fleet(&cfg, &snapshot, &mut rng);
    let warm = fleet.warm;

    // ── 5. Bin metadata ───────────────────────────────────────
    let ids: Vec<String> = fleet.sensors.iter().map(|s| s.id().to_string()).collect();
    let bins = ensure_static_bins(&mut gateway, &ids, &mut rng);

    // ── 6. Enrichment (optional) ──────────────────────────────
    let mut enricher = build_enricher(&cfg, &bins);

    // ── 7. Service ────────────────────────────────────────────
    let mut sink = LogEventSink::new();
    let mut service = SimulationService::from_config(&cfg, fleet.sensors, clock.now(), &mut rng);
    service.start(warm, &mut sink);

    // ── 8. Shutdown flag ──────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("installing interrupt handler")?;
    }

    // ── 9. Main loop ──────────────────────────────────────────
    let poll = cfg.poll();
    while !shutdown.load(Ordering::SeqCst) {
        let port: Option<&mut dyn EnrichmentPort> = match enricher.as_mut() {
            Some(e) => Some(e.as_mut()),
            None => None,
        };
        service.run_cycle(clock.now(), &mut gateway, port, &mut sink, &mut rng);

        let wait = service.sleep_duration(clock.now());
        sleep_until(wait, poll, &shutdown);
    }

    // ── 10. Clean shutdown ────────────────────────────────────
    info!("Shutdown requested after {} cycles, closing store", service.cycles());
    gateway.close().context("closing store")?;
    Ok(())
}

/// Sleep for `total`, waking every `slice` to check `shutdown`.
fn sleep_until(total: Duration, slice: Duration, shutdown: &AtomicBool) {
    let mut left = total;
    while !left.is_zero() && !shutdown.load(Ordering::SeqCst) {
        let step = left.min(slice);
        std::thread::sleep(step);
        left = left.saturating_sub(step);
    }
}

/// Fill in coordinates for sensors that have none yet.  Failures only cost
/// enrichment coverage, so they are logged and the known bins returned.
fn ensure_static_bins(
    gateway: &mut SqliteGateway,
    ids: &[String],
    rng: &mut StdRng,
) -> Vec<StaticBin> {
    let mut bins = gateway.static_bins().unwrap_or_else(|e| {
        warn!("Static bin load failed: {}", e);
        Vec::new()
    });
    let missing = missing_static_bins(ids, &bins, rng);
    if missing.is_empty() {
        return bins;
    }
    match gateway.upsert_static_bins(&missing) {
        Ok(n) => info!("Static bins: {} created", n),
        Err(e) => warn!("Static bin upsert failed: {}", e),
    }
    bins.extend(missing);
    bins
}

#[cfg(feature = "weather")]
fn build_enricher(cfg: &SimConfig, bins: &[StaticBin]) -> Option<Box<dyn EnrichmentPort>> {
    use smartbins::adapters::weather::{OpenMeteoSource, WeatherEnricher};

    if !cfg.enrichment_enabled {
        return None;
    }
    let source = OpenMeteoSource::new(Duration::from_secs(cfg.enrichment_timeout_secs));
    let ttl = chrono::TimeDelta::seconds(cfg.enrichment_ttl_secs as i64);
    let enricher = WeatherEnricher::from_static_bins(source, SystemClock, ttl, bins);
    info!("Enrichment: Open-Meteo for {} sensors", enricher.known_sensors());
    Some(Box::new(enricher))
}

#[cfg(not(feature = "weather"))]
fn build_enricher(cfg: &SimConfig, _bins: &[StaticBin]) -> Option<Box<dyn EnrichmentPort>> {
    if cfg.enrichment_enabled {
        warn!("Enrichment requested but built without the `weather` feature");
    }
    None
}
