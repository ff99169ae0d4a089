/// A schema migration.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATION_001: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Store-wide settings (hash table count)
CREATE TABLE IF NOT EXISTS store_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Indexed recordings
CREATE TABLE IF NOT EXISTS tracks (
    id TEXT PRIMARY KEY,
    artist TEXT,
    title TEXT NOT NULL,
    isrc TEXT,
    album TEXT,
    release_year INTEGER,
    length_secs REAL NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tracks_title ON tracks(title);
CREATE INDEX IF NOT EXISTS idx_tracks_isrc ON tracks(isrc);

-- One row per analysis window-block
CREATE TABLE IF NOT EXISTS sub_fingerprints (
    id TEXT PRIMARY KEY,
    track_id TEXT NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
    sequence_number INTEGER NOT NULL,
    sequences_count INTEGER NOT NULL,
    sequence_at REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sub_fingerprints_track_id ON sub_fingerprints(track_id);

-- Inverted LSH index: exactly one row per (sub-fingerprint, hash table)
CREATE TABLE IF NOT EXISTS hashes (
    sub_fingerprint_id TEXT NOT NULL REFERENCES sub_fingerprints(id) ON DELETE CASCADE,
    track_id TEXT NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
    hash_table INTEGER NOT NULL,
    hash_bin INTEGER NOT NULL,
    PRIMARY KEY (sub_fingerprint_id, hash_table)
);

CREATE INDEX IF NOT EXISTS idx_hashes_table_bin ON hashes(hash_table, hash_bin);
CREATE INDEX IF NOT EXISTS idx_hashes_track_id ON hashes(track_id);
"#;

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: MIGRATION_001,
}];
