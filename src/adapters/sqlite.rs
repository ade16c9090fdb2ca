//! SQLite persistence adapter.
//!
//! Implements [`PersistenceGateway`] on a single `rusqlite` connection.
//! Timestamps are stored as UTC microseconds since the epoch, which keeps
//! ordering and range queries on plain integer comparisons.
//!
//! | Table             | Key                        | Contents                 |
//! |-------------------|----------------------------|--------------------------|
//! | `readings`        | `(sensor_id, ts_micros)`   | one row per report       |
//! | `static_bin_data` | `bin_id`                   | bin ↔ sensor ↔ location  |

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::app::ports::PersistenceGateway;
use crate::error::PersistenceError;
use crate::reading::{AppendOutcome, ArchiveQuery, ReadingRecord, StaticBin};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS readings (
        sensor_id            TEXT    NOT NULL,
        ts_micros            INTEGER NOT NULL,
        fill_level_percent   REAL    NOT NULL,
        temperature_c        REAL    NOT NULL,
        battery_v            REAL    NOT NULL,
        fill_threshold       INTEGER NOT NULL,
        last_emptied_micros  INTEGER,
        overflow             INTEGER NOT NULL,
        overflow_count       INTEGER NOT NULL,
        last_overflow_micros INTEGER
    );
    CREATE TABLE IF NOT EXISTS static_bin_data (
        bin_id    TEXT PRIMARY KEY,
        sensor_id TEXT NOT NULL,
        lat       REAL NOT NULL,
        lng       REAL NOT NULL
    );
";

const DEDUP_INDEX: &str = "readings_sensor_ts";

const COLUMNS: &str = "sensor_id, ts_micros, fill_level_percent, temperature_c, battery_v, \
                       fill_threshold, last_emptied_micros, overflow, overflow_count, \
                       last_overflow_micros";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistence gateway backed by an SQLite file (or `:memory:`).
pub struct SqliteGateway {
    conn: Connection,
    indexed: bool,
}

impl SqliteGateway {
    /// Open (creating if needed) the store at `path` and ensure the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| PersistenceError::Unavailable(format!("{}: {e}", path.display())))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;

        let indexed = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1",
                [DEDUP_INDEX],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        info!("SqliteGateway: opened {} (dedup index: {})", path.display(), indexed);
        Ok(Self { conn, indexed })
    }

    /// [`open`](Self::open) plus [`ensure_dedup_index`](PersistenceGateway::ensure_dedup_index),
    /// the store as the process loop expects it.
    pub fn open_indexed(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let mut gateway = Self::open(path)?;
        gateway.ensure_dedup_index()?;
        Ok(gateway)
    }

    /// Throwaway in-memory store.
    pub fn in_memory() -> Result<Self, PersistenceError> {
        Self::open(":memory:")
    }

    /// Flush and close the connection.
    pub fn close(self) -> Result<(), PersistenceError> {
        self.conn.close().map_err(|(_, e)| PersistenceError::from(e))
    }

    /// Total stored readings across all sensors.
    pub fn reading_count(&self) -> Result<usize, PersistenceError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM readings", [], |r| r.get(0))?;
        Ok(n.max(0) as usize)
    }

    fn snapshot_since(
        &self,
        min_micros: i64,
    ) -> Result<HashMap<String, ReadingRecord>, PersistenceError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM readings r
             JOIN (SELECT sensor_id AS sid, MAX(ts_micros) AS ts
                   FROM readings WHERE ts_micros >= ?1 GROUP BY sensor_id) m
               ON r.sensor_id = m.sid AND r.ts_micros = m.ts"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([min_micros], RawReading::from_row)?;

        let mut out = HashMap::new();
        for raw in rows {
            match raw?.into_record() {
                Ok(record) => {
                    out.insert(record.sensor_id.clone(), record);
                }
                Err(e) => warn!("SqliteGateway: skipping snapshot row: {}", e),
            }
        }
        debug!("SqliteGateway: snapshot of {} sensors", out.len());
        Ok(out)
    }
}

impl PersistenceGateway for SqliteGateway {
    fn ensure_dedup_index(&mut self) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;
        // Rows written before the index existed may collide; keep the first.
        let removed = tx.execute(
            "DELETE FROM readings WHERE rowid NOT IN
               (SELECT MIN(rowid) FROM readings GROUP BY sensor_id, ts_micros)",
            [],
        )?;
        tx.execute_batch(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {DEDUP_INDEX} ON readings (sensor_id, ts_micros)"
        ))?;
        tx.commit()?;

        if removed > 0 {
            warn!("SqliteGateway: removed {} duplicate readings", removed);
        }
        self.indexed = true;
        Ok(())
    }

    fn append(&mut self, rows: &[ReadingRecord]) -> Result<AppendOutcome, PersistenceError> {
        if rows.is_empty() {
            return Ok(AppendOutcome::default());
        }
        if !self.indexed {
            self.ensure_dedup_index()?;
        }

        let mut outcome = AppendOutcome::default();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT OR IGNORE INTO readings ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ))?;
            for r in rows {
                let changed = stmt.execute(params![
                    r.sensor_id,
                    r.timestamp.timestamp_micros(),
                    r.fill_level_percent,
                    r.temperature_c,
                    r.battery_v,
                    r.fill_threshold,
                    r.last_emptied.map(|t| t.timestamp_micros()),
                    r.overflow,
                    r.overflow_count,
                    r.last_overflow.map(|t| t.timestamp_micros()),
                ])?;
                if changed == 0 {
                    outcome.skipped += 1;
                } else {
                    outcome.written += 1;
                }
            }
        }
        tx.commit()?;

        if outcome.skipped > 0 {
            debug!("SqliteGateway: {} duplicate readings skipped", outcome.skipped);
        }
        Ok(outcome)
    }

    fn latest_snapshot(&self) -> Result<HashMap<String, ReadingRecord>, PersistenceError> {
        self.snapshot_since(i64::MIN)
    }

    fn latest_snapshot_within(
        &self,
        window: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, ReadingRecord>, PersistenceError> {
        self.snapshot_since((now - window).timestamp_micros())
    }

    fn archive(&self, query: &ArchiveQuery) -> Result<Vec<ReadingRecord>, PersistenceError> {
        let since = query.since.map_or(i64::MIN, |t| t.timestamp_micros());
        let until = query.until.map_or(i64::MAX, |t| t.timestamp_micros());
        // SQLite treats a negative LIMIT as unbounded.
        let limit = query.limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM readings
             WHERE sensor_id = ?1 AND ts_micros >= ?2 AND ts_micros <= ?3
             ORDER BY ts_micros ASC LIMIT ?4"
        ))?;
        let rows = stmt.query_map(
            params![query.sensor_id, since, until, limit],
            RawReading::from_row,
        )?;

        let mut out = Vec::new();
        for raw in rows {
            match raw?.into_record() {
                Ok(record) => out.push(record),
                Err(e) => warn!("SqliteGateway: skipping archive row: {}", e),
            }
        }
        Ok(out)
    }

    fn upsert_static_bins(&mut self, bins: &[StaticBin]) -> Result<usize, PersistenceError> {
        let tx = self.conn.transaction()?;
        let mut n = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO static_bin_data (bin_id, sensor_id, lat, lng)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(bin_id) DO UPDATE SET
                     sensor_id = excluded.sensor_id,
                     lat = excluded.lat,
                     lng = excluded.lng",
            )?;
            for b in bins {
                n += stmt.execute(params![b.bin_id, b.sensor_id, b.lat, b.lng])?;
            }
        }
        tx.commit()?;
        Ok(n)
    }

    fn static_bins(&self) -> Result<Vec<StaticBin>, PersistenceError> {
        let mut stmt = self
            .conn
            .prepare("SELECT bin_id, sensor_id, lat, lng FROM static_bin_data ORDER BY bin_id")?;
        let rows = stmt.query_map([], |r| {
            Ok(StaticBin {
                bin_id: r.get(0)?,
                sensor_id: r.get(1)?,
                lat: r.get(2)?,
                lng: r.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ───────────────────────────────────────────────────────────────
// Row decoding
// ───────────────────────────────────────────────────────────────

/// Column values as stored, before timestamp and range conversion.
struct RawReading {
    sensor_id: String,
    ts_micros: i64,
    fill_level_percent: f64,
    temperature_c: f64,
    battery_v: f64,
    fill_threshold: i64,
    last_emptied_micros: Option<i64>,
    overflow: bool,
    overflow_count: i64,
    last_overflow_micros: Option<i64>,
}

impl RawReading {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sensor_id: row.get(0)?,
            ts_micros: row.get(1)?,
            fill_level_percent: row.get(2)?,
            temperature_c: row.get(3)?,
            battery_v: row.get(4)?,
            fill_threshold: row.get(5)?,
            last_emptied_micros: row.get(6)?,
            overflow: row.get(7)?,
            overflow_count: row.get(8)?,
            last_overflow_micros: row.get(9)?,
        })
    }

    /// Out-of-range integer fields decode to `0` so that warm-start
    /// validation can fall back on them field by field.
    fn into_record(self) -> Result<ReadingRecord, PersistenceError> {
        let timestamp = micros_to_utc(self.ts_micros).ok_or_else(|| {
            PersistenceError::Decode(format!("{}: bad timestamp {}", self.sensor_id, self.ts_micros))
        })?;
        // Out-of-range integers decode to 0; the warm-start path treats a
        // zero threshold as malformed and falls back.
        let fill_threshold = u8::try_from(self.fill_threshold).unwrap_or_else(|_| {
            warn!("{}: fill_threshold {} out of range, decoding as 0", self.sensor_id, self.fill_threshold);
            0
        });
        let overflow_count = u32::try_from(self.overflow_count).unwrap_or_else(|_| {
            warn!("{}: overflow_count {} out of range, decoding as 0", self.sensor_id, self.overflow_count);
            0
        });
        Ok(ReadingRecord {
            timestamp,
            fill_level_percent: self.fill_level_percent,
            temperature_c: self.temperature_c,
            battery_v: self.battery_v,
            fill_threshold,
            last_emptied: self.last_emptied_micros.and_then(micros_to_utc),
            overflow: self.overflow,
            overflow_count,
            last_overflow: self.last_overflow_micros.and_then(micros_to_utc),
            sensor_id: self.sensor_id,
        })
    }
}

fn micros_to_utc(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}
