//! Locality-sensitive hashing of spectral images.
//!
//! An image is reduced to a sparse bit vector (the signs of its strongest
//! Haar coefficients), min-hashed under `L * K` fixed permutations, and the
//! min-hash values are grouped into `L` bands of `K` bytes. Each band packs
//! into one `u32` bucket: two images land in the same bucket of table `i`
//! only if all `K` min-hashes of band `i` agree.

use sonance_core::HashVector;

use crate::error::FingerprintError;
use crate::fingerprint::config::FingerprintConfig;
use crate::fingerprint::extractor::SpectralImage;
use crate::fingerprint::rng::Xoshiro256;
use crate::fingerprint::wavelet::{haar_2d, top_coefficients};

/// Positions of each permutation that are examined. A min-hash value of
/// `PERMUTATION_DEPTH` means no set bit was found within that prefix.
pub const PERMUTATION_DEPTH: usize = 255;

/// Coefficients below this fraction of the largest one are never kept.
const RELATIVE_FLOOR: f32 = 1e-3;

/// Encodes spectral images of one fixed shape into hash vectors.
#[derive(Debug, Clone)]
pub struct HashEncoder {
    frames: usize,
    bands: usize,
    top_wavelets: usize,
    tables: usize,
    keys_per_table: usize,
    /// `tables * keys_per_table` permutation prefixes over the bit vector.
    permutations: Vec<Vec<u32>>,
}

impl HashEncoder {
    pub fn new(config: &FingerprintConfig) -> Result<Self, FingerprintError> {
        config.validate()?;

        let frames = config.image_frames;
        let bands = config.bands;
        let bits = 2 * frames * bands;
        let bits_u32 = u32::try_from(bits).map_err(|_| {
            FingerprintError::InvalidConfig(format!("spectral image of {bits} bits is too large"))
        })?;

        let count = config.hashing.tables * config.hashing.keys_per_table;
        let depth = PERMUTATION_DEPTH.min(bits);
        let mut rng = Xoshiro256::new(config.hashing.seed);
        let permutations = (0..count)
            .map(|_| partial_shuffle(bits_u32, depth, &mut rng))
            .collect();

        Ok(Self {
            frames,
            bands,
            top_wavelets: config.top_wavelets,
            tables: config.hashing.tables,
            keys_per_table: config.hashing.keys_per_table,
            permutations,
        })
    }

    /// Number of hash tables `L`.
    #[must_use]
    pub const fn tables(&self) -> usize {
        self.tables
    }

    pub fn encode(&self, image: &SpectralImage) -> Result<HashVector, FingerprintError> {
        if image.frames() != self.frames || image.bands() != self.bands {
            return Err(FingerprintError::ImageShape {
                frames: image.frames(),
                bands: image.bands(),
                expected_frames: self.frames,
                expected_bands: self.bands,
            });
        }

        let bits = self.signature(image);
        let min_hashes: Vec<u8> = self
            .permutations
            .iter()
            .map(|permutation| min_hash(&bits, permutation))
            .collect();

        let buckets = min_hashes
            .chunks_exact(self.keys_per_table)
            .map(|band| {
                band.iter()
                    .enumerate()
                    .fold(0u32, |bucket, (k, &value)| bucket | (u32::from(value) << (8 * k)))
            })
            .collect();
        Ok(HashVector::new(buckets))
    }

    /// Two bits per coefficient: `10` for a kept positive coefficient, `01`
    /// for a kept negative one, `00` otherwise.
    fn signature(&self, image: &SpectralImage) -> Vec<bool> {
        let mut coefficients = image.as_slice().to_vec();
        haar_2d(&mut coefficients, self.frames, self.bands);

        let mut bits = vec![false; coefficients.len() * 2];
        for index in top_coefficients(&coefficients, self.top_wavelets, RELATIVE_FLOOR) {
            if coefficients[index] > 0.0 {
                bits[2 * index] = true;
            } else {
                bits[2 * index + 1] = true;
            }
        }
        bits
    }
}

/// The first `depth` entries of a Fisher-Yates shuffle of `0..n`.
fn partial_shuffle(n: u32, depth: usize, rng: &mut Xoshiro256) -> Vec<u32> {
    let mut values: Vec<u32> = (0..n).collect();
    for i in 0..depth {
        let j = i + rng.below((values.len() - i) as u64) as usize;
        values.swap(i, j);
    }
    values.truncate(depth);
    values
}

fn min_hash(bits: &[bool], permutation: &[u32]) -> u8 {
    permutation
        .iter()
        .position(|&index| bits[index as usize])
        .map_or(PERMUTATION_DEPTH as u8, |position| position as u8)
}
