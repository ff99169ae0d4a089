//! Spectral fingerprints and their locality-sensitive hashes.
//!
//! [`Fingerprinter`] is the entry point used by ingest and query: it
//! down-mixes and resamples decoded audio, extracts spectral images with
//! [`FingerprintExtractor`] and hashes each one with [`HashEncoder`].

pub mod config;
pub mod extractor;
pub mod hashing;
pub mod rng;
pub mod wavelet;

use log::debug;
use sonance_core::{HashVector, SubFingerprint, TrackId};

pub use config::{FingerprintConfig, HashingConfig, Stride};
pub use extractor::{Fingerprint, FingerprintExtractor, Fingerprints, SpectralImage};
pub use hashing::HashEncoder;

use crate::codec::DecodedAudio;
use crate::dsp;
use crate::error::FingerprintError;

/// A fingerprint reduced to its hash vector.
#[derive(Debug, Clone, PartialEq)]
pub struct HashedFingerprint {
    pub sequence_number: u32,
    pub sequences_count: u32,
    pub sequence_at: f64,
    pub hashes: HashVector,
}

impl HashedFingerprint {
    #[must_use]
    pub fn into_sub_fingerprint(self, track_id: TrackId) -> SubFingerprint {
        SubFingerprint::new(
            track_id,
            self.sequence_number,
            self.sequences_count,
            self.sequence_at,
            self.hashes,
        )
    }
}

/// Extraction and hashing with one shared configuration.
///
/// Building one plans the FFT and draws every min-hash permutation, so
/// instances are meant to be reused (see [`crate::pool::BoundedPool`]).
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    extractor: FingerprintExtractor,
    encoder: HashEncoder,
}

impl Fingerprinter {
    pub fn new(config: FingerprintConfig) -> Result<Self, FingerprintError> {
        let encoder = HashEncoder::new(&config)?;
        let extractor = FingerprintExtractor::new(config)?;
        Ok(Self { extractor, encoder })
    }

    #[must_use]
    pub const fn config(&self) -> &FingerprintConfig {
        self.extractor.config()
    }

    /// Length of every hash vector this fingerprinter produces.
    #[must_use]
    pub const fn tables(&self) -> usize {
        self.encoder.tables()
    }

    /// Hash mono samples already at the configured sample rate, cut at the
    /// stored-track stride.
    pub fn fingerprint_samples(
        &self,
        samples: &[f32],
    ) -> Result<Vec<HashedFingerprint>, FingerprintError> {
        self.hash_all(self.extractor.extract(samples))
    }

    /// [`fingerprint_samples`](Self::fingerprint_samples) at the denser
    /// query stride.
    pub fn query_fingerprint_samples(
        &self,
        samples: &[f32],
    ) -> Result<Vec<HashedFingerprint>, FingerprintError> {
        self.hash_all(self.extractor.extract_query(samples))
    }

    fn hash_all(
        &self,
        fingerprints: Fingerprints<'_>,
    ) -> Result<Vec<HashedFingerprint>, FingerprintError> {
        fingerprints
            .map(|fingerprint| {
                let fingerprint = fingerprint?;
                Ok(HashedFingerprint {
                    sequence_number: fingerprint.sequence_number,
                    sequences_count: fingerprint.sequences_count,
                    sequence_at: fingerprint.sequence_at,
                    hashes: self.encoder.encode(&fingerprint.image)?,
                })
            })
            .collect()
    }

    /// Down-mix, resample and hash decoded audio for storage.
    ///
    /// Audio shorter than one spectral image yields an empty vector.
    pub fn create_fingerprints(
        &self,
        audio: &DecodedAudio,
    ) -> Result<Vec<HashedFingerprint>, FingerprintError> {
        let samples = dsp::prepare(audio, self.config().sample_rate);
        let hashed = self.fingerprint_samples(&samples)?;
        debug!(
            "Hashed {} fingerprints from {:.2}s of audio",
            hashed.len(),
            audio.duration_secs()
        );
        Ok(hashed)
    }

    /// Down-mix, resample and hash a query clip.
    pub fn create_query_fingerprints(
        &self,
        audio: &DecodedAudio,
    ) -> Result<Vec<HashedFingerprint>, FingerprintError> {
        let samples = dsp::prepare(audio, self.config().sample_rate);
        let hashed = self.query_fingerprint_samples(&samples)?;
        debug!(
            "Hashed {} query fingerprints from {:.2}s of audio",
            hashed.len(),
            audio.duration_secs()
        );
        Ok(hashed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AudioFormat, ByteOrder, Encoding};
    use crate::fingerprint::rng::Xoshiro256;

    fn noise(seed: u64, len: usize) -> Vec<f32> {
        let mut rng = Xoshiro256::new(seed);
        (0..len)
            .map(|_| rng.below(2001) as f32 / 1000.0 - 1.0)
            .map(|v| v * 0.5)
            .collect()
    }

    fn mono(samples: Vec<f32>, sample_rate: u32) -> DecodedAudio {
        let frames = samples.len() as u64;
        DecodedAudio {
            samples,
            format: AudioFormat {
                encoding: Encoding::Float(ByteOrder::Little),
                channels: 1,
                sample_rate,
                bits_per_sample: 32,
                block_align: 4,
                data_range: None,
                frames: Some(frames),
            },
        }
    }

    #[test]
    fn test_every_vector_has_table_count() {
        let fingerprinter = Fingerprinter::new(FingerprintConfig::default()).unwrap();
        let hashed = fingerprinter.fingerprint_samples(&noise(1, 5512 * 3)).unwrap();
        assert!(!hashed.is_empty());
        assert!(hashed.iter().all(|h| h.hashes.len() == fingerprinter.tables()));
    }

    #[test]
    fn test_short_audio_is_empty() {
        let fingerprinter = Fingerprinter::new(FingerprintConfig::default()).unwrap();
        let audio = mono(noise(2, 4000), 5512);
        assert!(fingerprinter.create_fingerprints(&audio).unwrap().is_empty());
    }

    #[test]
    fn test_gain_does_not_change_hashes() {
        let fingerprinter = Fingerprinter::new(FingerprintConfig::default()).unwrap();
        let loud = noise(3, 5512 * 3);
        let quiet: Vec<f32> = loud.iter().map(|v| v * 0.5).collect();
        assert_eq!(
            fingerprinter.fingerprint_samples(&loud).unwrap(),
            fingerprinter.fingerprint_samples(&quiet).unwrap()
        );
    }

    #[test]
    fn test_query_fingerprints_cover_every_stored_start() {
        let fingerprinter = Fingerprinter::new(FingerprintConfig::default()).unwrap();
        let samples = noise(5, 5512 * 3);
        let stored = fingerprinter.fingerprint_samples(&samples).unwrap();
        let query = fingerprinter.query_fingerprint_samples(&samples).unwrap();

        // Same signal, same grid: every stored image reappears among the
        // query images.
        assert!(query.len() > stored.len());
        for s in &stored {
            assert!(query.iter().any(|q| q.hashes == s.hashes));
        }
    }

    #[test]
    fn test_into_sub_fingerprint_keeps_position() {
        let track_id = TrackId::new();
        let hashed = HashedFingerprint {
            sequence_number: 3,
            sequences_count: 9,
            sequence_at: 0.25,
            hashes: HashVector::new(vec![1, 2]),
        };
        let sub = hashed.into_sub_fingerprint(track_id);
        assert_eq!(sub.track_id, track_id);
        assert_eq!(sub.sequence_number, 3);
        assert_eq!(sub.sequences_count, 9);
        assert_eq!(sub.hashes.as_slice(), &[1, 2]);
    }
}
