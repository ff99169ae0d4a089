//! Core data model and fingerprint store for sonance.
//!
//! This crate defines the Track / SubFingerprint / Hash model and the
//! SQLite-backed [`FingerprintStore`](schema::FingerprintStore) that keeps
//! the locality-sensitive hash index and answers bucket-match queries.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod schema;

pub use error::{Error, Result};
pub use model::{Hash, HashVector, SubFingerprint, SubFingerprintId, Track, TrackId};
