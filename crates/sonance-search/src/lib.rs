//! Similarity queries for sonance.
//!
//! A query clip is decoded, fingerprinted and hashed exactly as ingest
//! does; each query hash vector then votes for the stored tracks whose
//! buckets it collides with. No temporal alignment is attempted.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod engine;
pub mod error;

pub use engine::{QueryEngine, QueryOptions, SimilarTrack};
pub use error::SearchError;
