//! Error types for decoding, fingerprinting and ingest.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while decoding a container into PCM.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A magic number, chunk tag or encoding is unrecognized or unsupported.
    #[error("unsupported format: {0}")]
    Format(String),

    /// Fewer bytes remain than a chunk header declares.
    #[error("truncated {context}: expected {expected} bytes, {available} available")]
    TruncatedData {
        context: &'static str,
        expected: u64,
        available: u64,
    },

    /// The stream is empty or unreadable, or a call argument is invalid.
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The delegated MP3/Ogg decoder failed.
    #[error("decoder error: {0}")]
    Decoder(String),
}

impl CodecError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    pub(crate) fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }
}

/// Errors raised by the fingerprint extractor and hash encoder.
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("invalid fingerprint configuration: {0}")]
    InvalidConfig(String),

    #[error("FFT failed: {0}")]
    Transform(String),

    /// A spectral image does not have the shape the encoder was built for.
    #[error("spectral image is {frames}x{bands}, encoder expects {expected_frames}x{expected_bands}")]
    ImageShape {
        frames: usize,
        bands: usize,
        expected_frames: usize,
        expected_bands: usize,
    },
}

/// Errors raised by the bounded resource pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The wait queue is at its maximum depth.
    #[error("pool wait queue is full ({waiting} waiting)")]
    QueueFull { waiting: usize },

    /// The pool is draining and accepts no new acquisitions.
    #[error("pool is draining")]
    Draining,

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// Building a new resource failed.
    #[error("failed to create pooled resource: {0}")]
    Create(String),
}

/// Errors that abort the ingest of one file.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("decode failed: {0}")]
    Codec(#[from] CodecError),

    #[error("fingerprinting failed: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("store error: {0}")]
    Store(#[from] sonance_core::Error),

    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// The audio is shorter than one fingerprint block.
    #[error("no fingerprints extracted from {}", path.display())]
    NoFingerprints { path: PathBuf },

    #[error("ingest task failed: {0}")]
    Task(String),
}

/// Convenience alias for codec results.
pub type CodecResult<T> = std::result::Result<T, CodecError>;
