use sonance_etl::{CodecError, FingerprintError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("failed to decode query audio: {0}")]
    Codec(#[from] CodecError),

    #[error("failed to fingerprint query audio: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("store error: {0}")]
    Store(#[from] sonance_core::Error),

    /// The store and the fingerprinter disagree on the number of hash
    /// tables, so their hashes cannot be compared.
    #[error("store has {store} hash tables, fingerprinter produces {fingerprinter}")]
    TableMismatch { store: usize, fingerprinter: usize },

    #[error("invalid query options: {0}")]
    InvalidOptions(String),
}
