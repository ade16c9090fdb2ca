//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements           | Connects to                   |
//! |------------|----------------------|-------------------------------|
//! | `sqlite`   | PersistenceGateway   | SQLite file via rusqlite      |
//! | `weather`  | EnrichmentPort       | any WeatherSource + TTL cache |
//! |            | WeatherSource        | Open-Meteo (feature `weather`)|
//! | `log_sink` | EventSink            | `log` facade                  |
//! | `time`     | Clock                | host wall clock / manual      |

pub mod log_sink;
pub mod sqlite;
pub mod time;
pub mod weather;
