//! Weather enrichment adapter.
//!
//! [`WeatherEnricher`] implements [`EnrichmentPort`] on top of any
//! [`WeatherSource`].  It maps sensors to their bin coordinates, asks the
//! source once per distinct coordinate and caches each answer for a TTL
//! measured on an injected [`Clock`].
//!
//! [`OpenMeteoSource`] is the production source (feature `weather`).

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, warn};

use crate::app::ports::{Clock, EnrichmentPort, WeatherSource};
use crate::error::EnrichmentError;
use crate::reading::StaticBin;

/// Coordinates closer than this share one cache slot (about 11 m).
const COORD_SCALE: f64 = 1e4;

type CoordKey = (i64, i64);

fn coord_key(lat: f64, lng: f64) -> CoordKey {
    ((lat * COORD_SCALE).round() as i64, (lng * COORD_SCALE).round() as i64)
}

#[derive(Debug, Clone, Copy)]
struct CachedTemp {
    celsius: f64,
    fetched_at: DateTime<Utc>,
}

// ───────────────────────────────────────────────────────────────
// WeatherEnricher
// ───────────────────────────────────────────────────────────────

pub struct WeatherEnricher<S: WeatherSource, C: Clock> {
    source: S,
    clock: C,
    ttl: TimeDelta,
    coords: HashMap<String, (f64, f64)>,
    cache: HashMap<CoordKey, CachedTemp>,
}

impl<S: WeatherSource, C: Clock> WeatherEnricher<S, C> {
    pub fn new(source: S, clock: C, ttl: TimeDelta) -> Self {
        Self {
            source,
            clock,
            ttl,
            coords: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    /// Build with the sensor → coordinate map taken from `bins`.
    pub fn from_static_bins(source: S, clock: C, ttl: TimeDelta, bins: &[StaticBin]) -> Self {
        let mut e = Self::new(source, clock, ttl);
        for b in bins {
            e.set_location(&b.sensor_id, b.lat, b.lng);
        }
        e
    }

    pub fn set_location(&mut self, sensor_id: &str, lat: f64, lng: f64) {
        self.coords.insert(sensor_id.to_string(), (lat, lng));
    }

    pub fn known_sensors(&self) -> usize {
        self.coords.len()
    }

    fn fresh(&self, key: CoordKey, now: DateTime<Utc>) -> Option<f64> {
        self.cache
            .get(&key)
            .filter(|c| now - c.fetched_at < self.ttl)
            .map(|c| c.celsius)
    }
}

impl<S: WeatherSource, C: Clock> EnrichmentPort for WeatherEnricher<S, C> {
    fn fetch_temperatures(
        &mut self,
        sensor_ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, f64>, EnrichmentError> {
        // Group requested sensors by coordinate.
        let mut wanted: HashMap<CoordKey, ((f64, f64), Vec<&str>)> = HashMap::new();
        for id in sensor_ids {
            match self.coords.get(id) {
                Some(&(lat, lng)) => wanted
                    .entry(coord_key(lat, lng))
                    .or_insert_with(|| ((lat, lng), Vec::new()))
                    .1
                    .push(id.as_str()),
                None => debug!("Enrichment: no coordinates for {}", id),
            }
        }
        if wanted.is_empty() {
            return Err(EnrichmentError::NoCoordinates);
        }

        let now = self.clock.now();
        let mut out = HashMap::new();
        let mut attempted = 0;
        let mut failed = 0;

        for (key, ((lat, lng), ids)) in wanted {
            let celsius = match self.fresh(key, now) {
                Some(c) => c,
                None => {
                    attempted += 1;
                    match self.source.current_temperature(lat, lng) {
                        Ok(c) => {
                            self.cache.insert(
                                key,
                                CachedTemp {
                                    celsius: c,
                                    fetched_at: now,
                                },
                            );
                            c
                        }
                        Err(e) => {
                            warn!("Enrichment: ({:.4}, {:.4}) failed: {}", lat, lng, e);
                            failed += 1;
                            continue;
                        }
                    }
                }
            };
            for id in ids {
                out.insert(id.to_string(), celsius);
            }
        }

        if out.is_empty() && failed > 0 {
            return Err(EnrichmentError::AllFailed { attempted });
        }
        debug!(
            "Enrichment: {} sensors, {} fetched, {} failed",
            out.len(),
            attempted - failed,
            failed
        );
        Ok(out)
    }
}

// ───────────────────────────────────────────────────────────────
// Open-Meteo
// ───────────────────────────────────────────────────────────────

#[cfg(feature = "weather")]
pub use open_meteo::OpenMeteoSource;

#[cfg(feature = "weather")]
mod open_meteo {
    use std::time::Duration;

    use serde::Deserialize;

    use crate::app::ports::WeatherSource;
    use crate::error::EnrichmentError;

    const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

    #[derive(Debug, Deserialize)]
    struct Forecast {
        current: Current,
    }

    #[derive(Debug, Deserialize)]
    struct Current {
        temperature_2m: f64,
    }

    /// Current air temperature from the Open-Meteo forecast API.
    pub struct OpenMeteoSource {
        agent: ureq::Agent,
        url: String,
    }

    impl OpenMeteoSource {
        pub fn new(timeout: Duration) -> Self {
            Self::with_url(FORECAST_URL, timeout)
        }

        pub fn with_url(url: impl Into<String>, timeout: Duration) -> Self {
            Self {
                agent: ureq::AgentBuilder::new().timeout(timeout).build(),
                url: url.into(),
            }
        }
    }

    impl WeatherSource for OpenMeteoSource {
        fn current_temperature(&self, lat: f64, lng: f64) -> Result<f64, EnrichmentError> {
            let resp = self
                .agent
                .get(&self.url)
                .query("latitude", &format!("{lat:.4}"))
                .query("longitude", &format!("{lng:.4}"))
                .query("current", "temperature_2m")
                .call()
                .map_err(|e| EnrichmentError::Request(e.to_string()))?;

            let body: Forecast = resp
                .into_json()
                .map_err(|e| EnrichmentError::BadPayload(e.to_string()))?;
            let t = body.current.temperature_2m;
            if t.is_finite() {
                Ok(t)
            } else {
                Err(EnrichmentError::BadPayload(format!("temperature_2m={t}")))
            }
        }
    }

}
