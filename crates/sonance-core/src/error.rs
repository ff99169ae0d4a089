use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A sub-fingerprint carries a different number of hashes than the
    /// store's hash table count.
    #[error("sub-fingerprint {sequence_number} has {actual} hashes, store expects {expected}")]
    HashVectorLength {
        sequence_number: u32,
        expected: usize,
        actual: usize,
    },

    /// The store was created with a different hash table count.
    #[error("store was created with {stored} hash tables, opened with {requested}")]
    HashTablesMismatch { stored: usize, requested: usize },

    /// A sub-fingerprint references a track other than the one being inserted.
    #[error("sub-fingerprint {sequence_number} belongs to track {found}, not {expected}")]
    ForeignTrack {
        sequence_number: u32,
        expected: String,
        found: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
