use super::{window_start, SampleStore};
use crate::aggregate::bucketize;
use crate::error::StorageError;
use crate::types::{AggregateBucket, Granularity, Sample};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use chrono_tz::Tz;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

// How long a connection waits on a WAL lock held by another connection.
const LOCK_WAIT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS battery_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts_ms INTEGER NOT NULL,
    battery_level INTEGER NOT NULL,
    temperature REAL NOT NULL,
    voltage REAL NOT NULL,
    is_charging INTEGER NOT NULL,
    since_last_minutes INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS battery_history_ts_idx ON battery_history (ts_ms);
"#;

const SELECT_COLUMNS: &str =
    "id, ts_ms, battery_level, temperature, voltage, is_charging, since_last_minutes";

/// Durable store on a single SQLite file in WAL mode.
///
/// One writer connection behind a mutex serializes appends. Every query opens
/// its own read-only connection, so readers run concurrently with the writer
/// and each query sees a consistent snapshot.
pub struct SqliteSampleStore {
    path: PathBuf,
    writer: Mutex<Connection>,
    zone: Tz,
}

#[derive(Debug)]
struct SampleRow {
    id: i64,
    ts_ms: i64,
    battery_level: i64,
    temperature: f64,
    voltage: f64,
    is_charging: bool,
    since_last_minutes: i64,
}

impl SampleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ts_ms: row.get(1)?,
            battery_level: row.get(2)?,
            temperature: row.get(3)?,
            voltage: row.get(4)?,
            is_charging: row.get(5)?,
            since_last_minutes: row.get(6)?,
        })
    }

    fn into_sample(self) -> Result<Sample, StorageError> {
        let corrupt = |reason: String| StorageError::Corrupt {
            row_id: self.id,
            reason,
        };
        let timestamp = Utc
            .timestamp_millis_opt(self.ts_ms)
            .single()
            .ok_or_else(|| corrupt(format!("timestamp {} out of range", self.ts_ms)))?;
        let level_percent = u8::try_from(self.battery_level)
            .ok()
            .filter(|level| *level <= 100)
            .ok_or_else(|| corrupt(format!("battery level {}", self.battery_level)))?;
        let since_last_sample_minutes = u32::try_from(self.since_last_minutes)
            .map_err(|_| corrupt(format!("elapsed minutes {}", self.since_last_minutes)))?;
        Ok(Sample {
            timestamp,
            level_percent,
            temperature_c: self.temperature,
            voltage_v: self.voltage,
            is_charging: self.is_charging,
            since_last_sample_minutes,
        })
    }
}

impl SqliteSampleStore {
    pub fn open(path: impl AsRef<Path>, zone: Tz) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(LOCK_WAIT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!(
            path = %path.display(),
            journal_mode = %mode,
            zone = zone.name(),
            "opened sample store"
        );

        Ok(Self {
            path,
            writer: Mutex::new(conn),
            zone,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&self) -> Result<Connection, StorageError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(LOCK_WAIT)?;
        Ok(conn)
    }

    fn select_between(
        &self,
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Sample>, StorageError> {
        let conn = self.reader()?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM battery_history \
             WHERE ts_ms >= ?1 AND ts_ms <= ?2 \
             ORDER BY ts_ms DESC, id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let until_ms = until.map(|ts| ts.timestamp_millis()).unwrap_or(i64::MAX);
        let rows = stmt.query_map(
            params![since.timestamp_millis(), until_ms],
            SampleRow::from_row,
        )?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_sample()?);
        }
        Ok(out)
    }
}

impl SampleStore for SqliteSampleStore {
    fn append(&self, sample: &Sample) -> Result<(), StorageError> {
        let conn = self.writer.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute(
            r#"
            INSERT INTO battery_history
                (ts_ms, battery_level, temperature, voltage, is_charging, since_last_minutes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                sample.timestamp.timestamp_millis(),
                sample.level_percent,
                sample.temperature_c,
                sample.voltage_v,
                sample.is_charging,
                sample.since_last_sample_minutes,
            ],
        )?;
        Ok(())
    }

    fn query_range(&self, since: DateTime<Utc>) -> Result<Vec<Sample>, StorageError> {
        self.select_between(since, None)
    }

    fn latest(&self) -> Result<Option<Sample>, StorageError> {
        let conn = self.reader()?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM battery_history ORDER BY ts_ms DESC, id DESC LIMIT 1"
        );
        let row = conn
            .query_row(&sql, [], SampleRow::from_row)
            .optional()?;
        row.map(SampleRow::into_sample).transpose()
    }

    fn bucket_zone(&self) -> Tz {
        self.zone
    }

    fn query_bucketed(
        &self,
        window: ChronoDuration,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Result<Vec<AggregateBucket>, StorageError> {
        let samples = self.select_between(window_start(now, window), Some(now))?;
        Ok(bucketize(&samples, granularity, &self.zone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample_at(ts: DateTime<Utc>, level: u8, since: u32) -> Sample {
        Sample {
            timestamp: ts,
            level_percent: level,
            temperature_c: 30.5,
            voltage_v: 3.95,
            is_charging: level % 2 == 0,
            since_last_sample_minutes: since,
        }
    }

    #[test]
    fn append_then_reopen_keeps_samples() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("history.sqlite3");
        let ts = Utc.with_ymd_and_hms(2024, 6, 2, 10, 15, 30).unwrap();

        {
            let store = SqliteSampleStore::open(&path, Tz::UTC).unwrap();
            store.append(&sample_at(ts, 77, 0)).unwrap();
            store
                .append(&sample_at(ts + Duration::minutes(5), 76, 5))
                .unwrap();
        }

        let store = SqliteSampleStore::open(&path, Tz::UTC).unwrap();
        let samples = store.query_range(ts).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].level_percent, 76);
        assert_eq!(samples[0].since_last_sample_minutes, 5);
        assert_eq!(samples[1], sample_at(ts, 77, 0));

        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.timestamp, ts + Duration::minutes(5));
    }

    #[test]
    fn empty_store_queries_are_empty() {
        let dir = TempDir::new().unwrap();
        let store = SqliteSampleStore::open(dir.path().join("h.sqlite3"), Tz::UTC).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 10, 0, 0).unwrap();
        assert!(store.query_range(now - Duration::days(30)).unwrap().is_empty());
        assert!(store.latest().unwrap().is_none());
        assert!(store
            .query_bucketed(Duration::hours(24), Granularity::Hour, now)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn bucketed_query_excludes_samples_outside_window() {
        let dir = TempDir::new().unwrap();
        let store = SqliteSampleStore::open(dir.path().join("h.sqlite3"), Tz::UTC).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();

        store
            .append(&sample_at(now - Duration::days(8), 10, 0))
            .unwrap();
        store
            .append(&sample_at(now - Duration::days(2), 40, 0))
            .unwrap();
        store
            .append(&sample_at(now - Duration::days(1), 60, 0))
            .unwrap();
        store
            .append(&sample_at(now + Duration::minutes(1), 99, 0))
            .unwrap();

        let buckets = store
            .query_bucketed(Duration::days(7), Granularity::Day, now)
            .unwrap();
        let keys: Vec<&str> = buckets.iter().map(|b| b.bucket_key.as_str()).collect();
        assert_eq!(keys, vec!["2024-06-09", "2024-06-08"]);
    }

    #[test]
    fn oversized_window_reads_whole_log() {
        let dir = TempDir::new().unwrap();
        let store = SqliteSampleStore::open(dir.path().join("h.sqlite3"), Tz::UTC).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        store
            .append(&sample_at(now - Duration::days(900), 30, 0))
            .unwrap();
        store
            .append(&sample_at(now - Duration::hours(2), 31, 0))
            .unwrap();

        let buckets = store
            .query_bucketed(Duration::days(365 * 300_000), Granularity::Day, now)
            .unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets.iter().map(|b| b.sample_count).sum::<usize>(), 2);
    }

    #[test]
    fn corrupt_rows_surface_as_storage_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h.sqlite3");
        let store = SqliteSampleStore::open(&path, Tz::UTC).unwrap();
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute(
                "INSERT INTO battery_history (ts_ms, battery_level, temperature, voltage, is_charging, since_last_minutes) VALUES (0, 140, 20.0, 4.0, 0, 0)",
                [],
            )
            .unwrap();
        }

        let err = store
            .query_range(Utc.timestamp_millis_opt(0).unwrap())
            .unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn concurrent_readers_see_completed_appends() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            SqliteSampleStore::open(dir.path().join("h.sqlite3"), Tz::UTC).unwrap(),
        );
        let base = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    store
                        .append(&sample_at(base + Duration::seconds(i), 50, 0))
                        .unwrap();
                }
            })
        };
        let reader = {
            let store = store.clone();
            std::thread::spawn(move || {
                let mut last_seen = 0;
                for _ in 0..20 {
                    let seen = store.query_range(base).unwrap().len();
                    assert!(seen >= last_seen);
                    last_seen = seen;
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();

        assert_eq!(store.query_range(base).unwrap().len(), 50);
    }
}
