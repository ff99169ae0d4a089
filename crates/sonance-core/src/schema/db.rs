use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::{HashVector, SubFingerprint, SubFingerprintId, Track, TrackId};

use super::migrations::MIGRATIONS;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const HASH_TABLES_KEY: &str = "hash_tables";

/// SQLite-backed LSH index of tracks and their sub-fingerprints.
///
/// Every persisted sub-fingerprint has exactly `hash_tables` rows in the
/// `hashes` table, which is indexed on `(hash_table, hash_bin)`.
#[derive(Debug)]
pub struct FingerprintStore {
    conn: Connection,
    hash_tables: usize,
}

impl FingerprintStore {
    /// Open (or create) a store at the given path and apply migrations.
    ///
    /// The hash table count is recorded on first open; reopening with a
    /// different count fails.
    pub fn open(path: impl AsRef<Path>, hash_tables: usize) -> Result<Self> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("Opened fingerprint store (journal_mode={})", mode);
        Self::init(conn, hash_tables)
    }

    /// Open an in-memory store (for tests).
    pub fn open_in_memory(hash_tables: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, hash_tables)
    }

    fn init(conn: Connection, hash_tables: usize) -> Result<Self> {
        if hash_tables == 0 {
            return Err(Error::InvalidData(
                "hash table count must be positive".to_string(),
            ));
        }

        // Foreign keys are a per-connection setting in SQLite.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let store = Self { conn, hash_tables };
        store.apply_migrations()?;
        store.check_hash_tables()?;
        Ok(store)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// The number of hash tables (`L`) every hash vector must have.
    #[must_use]
    pub const fn hash_tables(&self) -> usize {
        self.hash_tables
    }

    fn apply_migrations(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")?;
        let applied: Vec<u32> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                log::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                self.conn.execute_batch(migration.sql)?;
                self.conn.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    params![migration.version, migration.name],
                )?;
            }
        }

        Ok(())
    }

    fn check_hash_tables(&self) -> Result<()> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM store_settings WHERE key = ?1",
                [HASH_TABLES_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            None => {
                self.conn.execute(
                    "INSERT INTO store_settings (key, value) VALUES (?1, ?2)",
                    params![HASH_TABLES_KEY, self.hash_tables.to_string()],
                )?;
                Ok(())
            }
            Some(value) => {
                let stored: usize = value.parse().map_err(|_| {
                    Error::InvalidData(format!("invalid stored hash table count: {value}"))
                })?;
                if stored == self.hash_tables {
                    Ok(())
                } else {
                    Err(Error::HashTablesMismatch {
                        stored,
                        requested: self.hash_tables,
                    })
                }
            }
        }
    }

    fn check_hash_vector(&self, sequence_number: u32, hashes: &HashVector) -> Result<()> {
        if hashes.len() == self.hash_tables {
            Ok(())
        } else {
            Err(Error::HashVectorLength {
                sequence_number,
                expected: self.hash_tables,
                actual: hashes.len(),
            })
        }
    }
}

// Ingest
impl FingerprintStore {
    /// Persist a track with all of its sub-fingerprints and hash rows.
    ///
    /// Runs in a single transaction: on any error nothing is visible.
    pub fn insert(&mut self, track: &Track, sub_fingerprints: &[SubFingerprint]) -> Result<()> {
        for sub in sub_fingerprints {
            if sub.track_id != track.id {
                return Err(Error::ForeignTrack {
                    sequence_number: sub.sequence_number,
                    expected: track.id.to_string(),
                    found: sub.track_id.to_string(),
                });
            }
            self.check_hash_vector(sub.sequence_number, &sub.hashes)?;
        }

        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO tracks (
                id, artist, title, isrc, album, release_year, length_secs, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                track.id.to_string(),
                track.artist,
                track.title,
                track.isrc,
                track.album,
                track.release_year,
                track.length_secs,
                track.created_at.to_rfc3339(),
            ],
        )?;

        {
            let mut sub_stmt = tx.prepare_cached(
                "INSERT INTO sub_fingerprints (
                    id, track_id, sequence_number, sequences_count, sequence_at
                ) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut hash_stmt = tx.prepare_cached(
                "INSERT INTO hashes (sub_fingerprint_id, track_id, hash_table, hash_bin)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;

            let track_id = track.id.to_string();
            for sub in sub_fingerprints {
                let sub_id = sub.id.to_string();
                sub_stmt.execute(params![
                    sub_id,
                    track_id,
                    sub.sequence_number,
                    sub.sequences_count,
                    sub.sequence_at,
                ])?;

                for hash in sub.hash_rows() {
                    hash_stmt.execute(params![sub_id, track_id, hash.hash_table, hash.hash_bin])?;
                }
            }
        }

        tx.commit()?;

        log::debug!(
            "Stored track {} ({}) with {} sub-fingerprints",
            track.id,
            track.title,
            sub_fingerprints.len()
        );
        Ok(())
    }

    /// Delete a track; its sub-fingerprints and hash rows cascade.
    pub fn delete_track(&mut self, id: TrackId) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM tracks WHERE id = ?1", [id.to_string()])?;
        if deleted == 0 {
            return Err(Error::NotFound {
                entity: "track",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

// Query
impl FingerprintStore {
    /// Count bucket collisions per track.
    ///
    /// For each table `i`, every stored sub-fingerprint whose bucket `i`
    /// equals `hashes[i]` adds one to its track's count. Each lookup is an
    /// index scan on `(hash_table, hash_bin)`.
    pub fn query(&self, hashes: &HashVector) -> Result<HashMap<TrackId, u32>> {
        if hashes.len() != self.hash_tables {
            return Err(Error::InvalidData(format!(
                "query has {} hashes, store expects {}",
                hashes.len(),
                self.hash_tables
            )));
        }

        let mut stmt = self
            .conn
            .prepare_cached("SELECT track_id FROM hashes WHERE hash_table = ?1 AND hash_bin = ?2")?;

        let mut counts = HashMap::new();
        for (table, bin) in hashes.tables() {
            let mut rows = stmt.query(params![table, bin])?;
            while let Some(row) = rows.next()? {
                let track_id: TrackId = id_column(row, 0)?;
                *counts.entry(track_id).or_insert(0) += 1;
            }
        }

        Ok(counts)
    }
}

// Track lookup
impl FingerprintStore {
    const TRACK_COLUMNS: &'static str =
        "id, artist, title, isrc, album, release_year, length_secs, created_at";

    /// Get a track by id.
    pub fn get_track(&self, id: TrackId) -> Result<Option<Track>> {
        let sql = format!("SELECT {} FROM tracks WHERE id = ?1", Self::TRACK_COLUMNS);
        let track = self
            .conn
            .query_row(&sql, [id.to_string()], row_to_track)
            .optional()?;
        Ok(track)
    }

    /// Find tracks with exactly this title.
    pub fn find_tracks_by_title(&self, title: &str) -> Result<Vec<Track>> {
        let sql = format!(
            "SELECT {} FROM tracks WHERE title = ?1 ORDER BY created_at",
            Self::TRACK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let tracks = stmt
            .query_map([title], row_to_track)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    /// List all tracks ordered by title.
    pub fn list_tracks(&self) -> Result<Vec<Track>> {
        let sql = format!("SELECT {} FROM tracks ORDER BY title, id", Self::TRACK_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let tracks = stmt
            .query_map([], row_to_track)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    /// Load a track's sub-fingerprints in sequence order, rebuilding each
    /// hash vector from its hash rows.
    pub fn sub_fingerprints_for_track(&self, track_id: TrackId) -> Result<Vec<SubFingerprint>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.sequence_number, s.sequences_count, s.sequence_at, h.hash_bin
             FROM sub_fingerprints s
             JOIN hashes h ON h.sub_fingerprint_id = s.id
             WHERE s.track_id = ?1
             ORDER BY s.sequence_number, h.hash_table",
        )?;

        let mut subs: Vec<SubFingerprint> = Vec::new();
        let mut bins: Vec<u32> = Vec::with_capacity(self.hash_tables);
        let mut rows = stmt.query([track_id.to_string()])?;

        while let Some(row) = rows.next()? {
            let id: SubFingerprintId = id_column(row, 0)?;
            if subs.last().map_or(true, |last| last.id != id) {
                if let Some(last) = subs.last_mut() {
                    last.hashes = HashVector::new(std::mem::take(&mut bins));
                }
                subs.push(SubFingerprint {
                    id,
                    track_id,
                    sequence_number: row.get(1)?,
                    sequences_count: row.get(2)?,
                    sequence_at: row.get(3)?,
                    hashes: HashVector::new(Vec::new()),
                });
            }
            bins.push(row.get(4)?);
        }
        if let Some(last) = subs.last_mut() {
            last.hashes = HashVector::new(bins);
        }

        Ok(subs)
    }

    pub fn track_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn sub_fingerprint_count(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM sub_fingerprints", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn id_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = uuid::Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_track(row: &Row) -> rusqlite::Result<Track> {
    use chrono::DateTime;

    let created_at_str: String = row.get(7)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

    Ok(Track {
        id: id_column(row, 0)?,
        artist: row.get(1)?,
        title: row.get(2)?,
        isrc: row.get(3)?,
        album: row.get(4)?,
        release_year: row.get(5)?,
        length_secs: row.get(6)?,
        created_at: created_at.into(),
    })
}
