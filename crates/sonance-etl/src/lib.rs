//! Decoding, spectral fingerprinting and ingest for sonance.
//!
//! Audio flows through the crate in one direction:
//!
//! 1. [`codec`] turns WAV, AIFF/AIFC, MP3 and Ogg Vorbis streams into
//!    interleaved `f32` PCM.
//! 2. [`dsp`] down-mixes, resamples, windows and transforms it.
//! 3. [`fingerprint`] builds spectral images and hashes each one into a
//!    locality-sensitive hash vector.
//! 4. [`ingest`] stores the hashed fingerprints of a file as one track.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod codec;
pub mod config;
pub mod dsp;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod pool;
pub mod scan;

pub use codec::{decode, decode_file, AudioFormat, AudioSource, ByteStream, ContainerKind, DecodedAudio};
pub use config::Config;
pub use error::{CodecError, CodecResult, FingerprintError, IngestError, PoolError};
pub use fingerprint::{FingerprintConfig, Fingerprinter, HashedFingerprint};
pub use ingest::{ingest_all, ingest_file, IngestReport};
pub use pool::{BoundedPool, PoolConfig, Pooled};
pub use scan::{discover_audio_files, read_track_metadata, TrackMetadata};
