use serde::{Deserialize, Serialize};

use crate::dsp::WindowKind;
use crate::error::FingerprintError;

/// Distance between the starts of consecutive spectral images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Stride {
    /// A fixed number of samples.
    Static { samples: usize },
    /// Uniformly drawn from `min..=max` samples with a seeded generator.
    Random { min: usize, max: usize, seed: u64 },
}

impl Default for Stride {
    fn default() -> Self {
        Self::Static { samples: 512 }
    }
}

impl Stride {
    fn validate(&self, name: &str) -> Result<(), FingerprintError> {
        match *self {
            Self::Static { samples: 0 } => Err(FingerprintError::InvalidConfig(format!(
                "{name} must be positive"
            ))),
            Self::Random { min, max, .. } if min == 0 || min > max => {
                Err(FingerprintError::InvalidConfig(format!(
                    "{name} range {min}..={max} is empty or zero"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// LSH parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Number of hash tables `L`; the length of every hash vector.
    pub tables: usize,
    /// Min-hash values packed into each table's bucket (1..=4 bytes).
    pub keys_per_table: usize,
    /// Seed for the min-hash permutations.
    pub seed: u64,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            tables: 25,
            keys_per_table: 4,
            seed: 42,
        }
    }
}

/// Parameters of spectral image extraction and hashing.
///
/// Ingest and query must use the same configuration; otherwise their hashes
/// do not collide. Only the stride differs between the two: stored tracks
/// are cut at `stride`, query clips at the denser `query_stride`, so some
/// query image starts within half a hop of every stored image a clip
/// covers, wherever the clip begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Rate audio is resampled to before analysis.
    pub sample_rate: u32,
    /// FFT frame length in samples.
    pub frame_size: usize,
    /// Distance between consecutive frames in samples.
    pub hop_size: usize,
    pub window: WindowKind,
    /// Lower edge of the lowest band in Hz.
    pub min_frequency: f32,
    /// Upper edge of the highest band in Hz.
    pub max_frequency: f32,
    /// Logarithmically spaced bands per frame.
    pub bands: usize,
    /// Consecutive frames per spectral image.
    pub image_frames: usize,
    /// Distance between stored images.
    pub stride: Stride,
    /// Distance between query images.
    pub query_stride: Stride,
    /// Wavelet coefficients kept per image.
    pub top_wavelets: usize,
    pub hashing: HashingConfig,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            sample_rate: 5512,
            frame_size: 2048,
            hop_size: 64,
            window: WindowKind::Hann,
            min_frequency: 318.0,
            max_frequency: 2000.0,
            bands: 32,
            image_frames: 128,
            stride: Stride::default(),
            query_stride: Stride::Static { samples: 64 },
            top_wavelets: 200,
            hashing: HashingConfig::default(),
        }
    }
}

impl FingerprintConfig {
    pub fn validate(&self) -> Result<(), FingerprintError> {
        let invalid = |msg: String| Err(FingerprintError::InvalidConfig(msg));

        if self.sample_rate == 0 {
            return invalid("sample_rate must be positive".into());
        }
        if self.frame_size < 2 || self.hop_size == 0 {
            return invalid(format!(
                "frame_size ({}) must be at least 2 and hop_size ({}) positive",
                self.frame_size, self.hop_size
            ));
        }
        if self.bands == 0 || self.image_frames == 0 || self.top_wavelets == 0 {
            return invalid("bands, image_frames and top_wavelets must be positive".into());
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if !(self.min_frequency > 0.0
            && self.min_frequency < self.max_frequency
            && self.max_frequency <= nyquist)
        {
            return invalid(format!(
                "frequency range {}..{} Hz must be increasing, positive and below Nyquist ({nyquist} Hz)",
                self.min_frequency, self.max_frequency
            ));
        }
        self.stride.validate("stride")?;
        self.query_stride.validate("query_stride")?;
        if self.hashing.tables == 0 {
            return invalid("hashing.tables must be positive".into());
        }
        if !(1..=4).contains(&self.hashing.keys_per_table) {
            return invalid(format!(
                "hashing.keys_per_table ({}) must be between 1 and 4",
                self.hashing.keys_per_table
            ));
        }
        Ok(())
    }

    /// Samples covered by one spectral image.
    #[must_use]
    pub const fn image_span(&self) -> usize {
        (self.image_frames - 1) * self.hop_size + self.frame_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FingerprintConfig::default();
        config.validate().unwrap();
        assert_eq!(config.hashing.tables, 25);
        assert_eq!(config.image_span(), 127 * 64 + 2048);
    }

    #[test]
    fn test_rejects_inverted_frequencies() {
        let config = FingerprintConfig {
            min_frequency: 2000.0,
            max_frequency: 318.0,
            ..FingerprintConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_frequency_above_nyquist() {
        let config = FingerprintConfig {
            max_frequency: 3000.0,
            ..FingerprintConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_wide_buckets() {
        let mut config = FingerprintConfig::default();
        config.hashing.keys_per_table = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_random_stride() {
        let config = FingerprintConfig {
            stride: Stride::Random {
                min: 600,
                max: 500,
                seed: 1,
            },
            ..FingerprintConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_query_stride() {
        let config = FingerprintConfig {
            query_stride: Stride::Static { samples: 0 },
            ..FingerprintConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_query_stride_defaults_to_one_hop() {
        let config = FingerprintConfig::default();
        assert_eq!(
            config.query_stride,
            Stride::Static {
                samples: config.hop_size
            }
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let config: FingerprintConfig = toml::from_str(
            r#"
            bands = 32
            [stride]
            kind = "random"
            min = 256
            max = 1024
            seed = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.hop_size, 64);
        assert_eq!(config.stride, Stride::Random { min: 256, max: 1024, seed: 3 });
        assert_eq!(config.query_stride, Stride::Static { samples: 64 });
    }
}
