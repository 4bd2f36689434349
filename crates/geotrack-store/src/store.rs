//! Main store implementation.

use std::io::Write;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row};
use tokio::sync::watch;
use tracing::{debug, info};

use geotrack_types::{CacheStats, now_millis};

use crate::error::{Error, Result};
use crate::models::{NewSample, Sample};
use crate::schema;

const SAMPLE_COLUMNS: &str = "id, device_id, latitude, longitude, accuracy, altitude, speed, \
     bearing, provider, fix_timestamp, created_at, uploaded";

/// SQLite-based queue of position samples.
///
/// Every mutating call that changes at least one row bumps a change
/// generation published on a [`watch`] channel; see [`Store::subscribe`].
pub struct Store {
    conn: Connection,
    changes: watch::Sender<u64>,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening sample store at {}", path.display());
        let conn = Connection::open(path)?;

        // FULL sync: a sample must be on disk before any upload can see it.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self::from_connection(conn))
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        let (changes, _) = watch::channel(0);
        Self { conn, changes }
    }

    /// Subscribe to change notifications.
    ///
    /// The receiver holds a generation counter that increases after every
    /// append, flag update or delete that touched a row. Receivers detach
    /// when dropped.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Current change generation.
    pub fn generation(&self) -> u64 {
        *self.changes.borrow()
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }
}

fn row_to_sample(row: &Row<'_>) -> rusqlite::Result<Sample> {
    Ok(Sample {
        id: row.get(0)?,
        device_id: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        accuracy: row.get(4)?,
        altitude: row.get(5)?,
        speed: row.get(6)?,
        bearing: row.get(7)?,
        provider: row.get(8)?,
        fix_timestamp: row.get(9)?,
        created_at: row.get(10)?,
        uploaded: row.get(11)?,
    })
}

// Append operations
impl Store {
    /// Append a sample, stamping `created_at` with the current time.
    ///
    /// Returns the assigned id. Identical payloads are stored twice.
    pub fn append(&self, sample: &NewSample) -> Result<i64> {
        self.append_at(sample, now_millis())
    }

    /// Append a sample with an explicit `created_at` (epoch millis).
    pub fn append_at(&self, sample: &NewSample, created_at: i64) -> Result<i64> {
        let id = self.insert_row(sample, created_at)?;
        self.notify_changed();
        debug!(
            "Stored sample {}: lat={}, lng={}",
            id, sample.latitude, sample.longitude
        );
        Ok(id)
    }

    /// Append several samples.
    ///
    /// Each row is committed on its own. If a row fails, the rows before it
    /// stay committed and the error is [`Error::PartialBatch`] carrying their
    /// ids; the remaining rows are not attempted.
    pub fn append_batch(&self, samples: &[NewSample]) -> Result<Vec<i64>> {
        let created_at = now_millis();
        let mut inserted = Vec::with_capacity(samples.len());

        for (index, sample) in samples.iter().enumerate() {
            match self.insert_row(sample, created_at) {
                Ok(id) => inserted.push(id),
                Err(e) => {
                    if !inserted.is_empty() {
                        self.notify_changed();
                    }
                    return Err(Error::PartialBatch {
                        inserted,
                        failed_index: index,
                        source: Box::new(e),
                    });
                }
            }
        }

        if !inserted.is_empty() {
            self.notify_changed();
        }
        debug!("Stored batch of {} samples", inserted.len());
        Ok(inserted)
    }

    fn insert_row(&self, sample: &NewSample, created_at: i64) -> Result<i64> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO samples (device_id, latitude, longitude, accuracy, altitude,
             speed, bearing, provider, fix_timestamp, created_at, uploaded)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)",
        )?;
        stmt.execute(rusqlite::params![
            sample.device_id,
            sample.latitude,
            sample.longitude,
            sample.accuracy,
            sample.altitude,
            sample.speed,
            sample.bearing,
            sample.provider,
            sample.fix_timestamp,
            created_at,
        ])?;
        Ok(self.conn.last_insert_rowid())
    }
}

// Query operations
impl Store {
    /// Samples not yet confirmed by the collector, oldest first.
    ///
    /// Ordered by `created_at` then `id`, so samples appended in the same
    /// millisecond keep their insertion order.
    pub fn list_unuploaded(&self) -> Result<Vec<Sample>> {
        let sql = format!(
            "SELECT {SAMPLE_COLUMNS} FROM samples WHERE uploaded = 0 \
             ORDER BY created_at ASC, id ASC"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let samples = stmt
            .query_map([], row_to_sample)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    /// Every stored sample, newest first.
    pub fn list_all(&self) -> Result<Vec<Sample>> {
        self.list_recent(None)
    }

    /// The newest samples, optionally limited.
    pub fn list_recent(&self, limit: Option<u32>) -> Result<Vec<Sample>> {
        let mut sql =
            format!("SELECT {SAMPLE_COLUMNS} FROM samples ORDER BY created_at DESC, id DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let samples = stmt
            .query_map([], row_to_sample)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    /// Get a sample by id.
    pub fn get(&self, id: i64) -> Result<Option<Sample>> {
        let sql = format!("SELECT {SAMPLE_COLUMNS} FROM samples WHERE id = ?");
        let sample = self
            .conn
            .query_row(&sql, [id], row_to_sample)
            .optional()?;
        Ok(sample)
    }

    /// Total number of stored samples.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Number of samples waiting for upload.
    pub fn count_unuploaded(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM samples WHERE uploaded = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Derived cache counts.
    pub fn cache_stats(&self) -> Result<CacheStats> {
        Ok(CacheStats::new(self.count()?, self.count_unuploaded()?))
    }

    /// Write every sample as one JSON object per line, oldest first.
    ///
    /// Returns the number of samples written.
    pub fn export_jsonl<W: Write>(&self, mut writer: W) -> Result<usize> {
        let sql = format!("SELECT {SAMPLE_COLUMNS} FROM samples ORDER BY created_at ASC, id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_sample)?;

        let mut written = 0;
        for sample in rows {
            serde_json::to_writer(&mut writer, &sample?)?;
            writer.write_all(b"\n")?;
            written += 1;
        }
        writer.flush()?;

        info!("Exported {} samples", written);
        Ok(written)
    }
}

// Sync and retention operations
impl Store {
    /// Flag the given samples as uploaded.
    ///
    /// Unknown ids and ids already flagged are ignored, so repeating a call is
    /// a no-op. Returns how many rows changed from unuploaded to uploaded.
    pub fn mark_uploaded(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut changed = 0;
        {
            let mut stmt =
                tx.prepare_cached("UPDATE samples SET uploaded = 1 WHERE id = ? AND uploaded = 0")?;
            for id in ids {
                changed += stmt.execute([id])?;
            }
        }
        tx.commit()?;

        if changed > 0 {
            self.notify_changed();
        }
        debug!("Marked {} of {} samples as uploaded", changed, ids.len());
        Ok(changed)
    }

    /// Delete uploaded samples created before `cutoff` (epoch millis).
    ///
    /// Unuploaded samples are never deleted, however old they are.
    pub fn delete_uploaded_older_than(&self, cutoff: i64) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM samples WHERE uploaded = 1 AND created_at < ?",
            [cutoff],
        )?;

        if deleted > 0 {
            self.notify_changed();
        }
        debug!("Deleted {} uploaded samples created before {}", deleted, cutoff);
        Ok(deleted)
    }
}
