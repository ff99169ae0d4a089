//! Spectral image extraction.
//!
//! Frames of `frame_size` samples are taken every `hop_size` samples,
//! windowed and transformed, and their magnitudes summed into
//! logarithmically spaced bands. A spectral image is `image_frames`
//! consecutive band vectors; images start at stride-separated frames.
//! Stored tracks and query clips differ only in their stride.

use std::collections::VecDeque;
use std::ops::Range;

use log::debug;
use rayon::prelude::*;

use crate::dsp::{magnitude, SpectralTransform};
use crate::error::FingerprintError;
use crate::fingerprint::config::{FingerprintConfig, Stride};
use crate::fingerprint::rng::Xoshiro256;

/// A `frames x bands` matrix of band energies, row-major by frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralImage {
    frames: usize,
    bands: usize,
    data: Vec<f32>,
}

impl SpectralImage {
    pub fn new(frames: usize, bands: usize, data: Vec<f32>) -> Result<Self, FingerprintError> {
        if data.len() != frames * bands {
            return Err(FingerprintError::InvalidConfig(format!(
                "{} values cannot form a {frames}x{bands} image",
                data.len()
            )));
        }
        Ok(Self { frames, bands, data })
    }

    #[must_use]
    pub const fn frames(&self) -> usize {
        self.frames
    }

    #[must_use]
    pub const fn bands(&self) -> usize {
        self.bands
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Band energies of frame `frame`.
    #[must_use]
    pub fn frame(&self, frame: usize) -> &[f32] {
        &self.data[frame * self.bands..(frame + 1) * self.bands]
    }
}

/// One spectral image and its place in the track.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub sequence_number: u32,
    pub sequences_count: u32,
    /// Offset of the image's first sample, in seconds.
    pub sequence_at: f64,
    pub image: SpectralImage,
}

/// Lazily yields the spectral images of one signal, in order.
///
/// Band rows are computed when the first image covering them is requested
/// and dropped once the next image starts past them, so only about one
/// image worth of frames is held at a time. Single pass: re-extraction
/// starts again from the samples.
#[derive(Debug)]
pub struct Fingerprints<'a> {
    extractor: &'a FingerprintExtractor,
    samples: &'a [f32],
    starts: Vec<usize>,
    next: usize,
    /// Band rows of frames `first_row..first_row + rows.len()`.
    rows: VecDeque<Vec<f32>>,
    first_row: usize,
}

impl Fingerprints<'_> {
    /// Make `rows` hold exactly the frames `start..start + image_frames`.
    fn slide_to(&mut self, start: usize) -> Result<(), FingerprintError> {
        while self.first_row < start && !self.rows.is_empty() {
            self.rows.pop_front();
            self.first_row += 1;
        }
        if self.rows.is_empty() {
            self.first_row = start;
        }

        let end = start + self.extractor.config.image_frames;
        let computed = self.first_row + self.rows.len();
        if computed < end {
            let fresh = self.extractor.band_rows(self.samples, computed..end)?;
            self.rows.extend(fresh);
        }
        Ok(())
    }
}

impl Iterator for Fingerprints<'_> {
    type Item = Result<Fingerprint, FingerprintError>;

    fn next(&mut self) -> Option<Self::Item> {
        let &start = self.starts.get(self.next)?;
        let sequence_number = self.next;
        self.next += 1;

        if let Err(e) = self.slide_to(start) {
            self.next = self.starts.len();
            return Some(Err(e));
        }

        let config = &self.extractor.config;
        let data: Vec<f32> = self.rows.iter().flatten().copied().collect();
        Some(Ok(Fingerprint {
            sequence_number: sequence_number as u32,
            sequences_count: self.starts.len() as u32,
            sequence_at: (start * config.hop_size) as f64 / f64::from(config.sample_rate),
            image: SpectralImage {
                frames: config.image_frames,
                bands: config.bands,
                data,
            },
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.starts.len() - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Fingerprints<'_> {}

/// Turns mono PCM at the configured sample rate into spectral images.
#[derive(Debug, Clone)]
pub struct FingerprintExtractor {
    config: FingerprintConfig,
    transform: SpectralTransform,
    window: Vec<f32>,
    /// `bands + 1` FFT bin edges; band `b` covers `edges[b]..edges[b + 1]`.
    band_edges: Vec<usize>,
}

impl FingerprintExtractor {
    pub fn new(config: FingerprintConfig) -> Result<Self, FingerprintError> {
        config.validate()?;
        let transform = SpectralTransform::new(config.frame_size)?;
        let window = config.window.coefficients(config.frame_size);
        let band_edges = log_band_edges(&config);
        Ok(Self {
            config,
            transform,
            window,
            band_edges,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// Spectral images of a track to be stored, `stride` apart.
    ///
    /// Signals shorter than one image yield no fingerprints.
    #[must_use]
    pub fn extract<'a>(&'a self, samples: &'a [f32]) -> Fingerprints<'a> {
        self.extract_with(samples, &self.config.stride)
    }

    /// Spectral images of a query clip, `query_stride` apart.
    #[must_use]
    pub fn extract_query<'a>(&'a self, samples: &'a [f32]) -> Fingerprints<'a> {
        self.extract_with(samples, &self.config.query_stride)
    }

    fn extract_with<'a>(&'a self, samples: &'a [f32], stride: &Stride) -> Fingerprints<'a> {
        let frame_count = if samples.len() < self.config.frame_size {
            0
        } else {
            (samples.len() - self.config.frame_size) / self.config.hop_size + 1
        };
        let starts = self.image_starts(frame_count, stride);
        debug!(
            "{} frames, {} images from {} samples",
            frame_count,
            starts.len(),
            samples.len()
        );

        Fingerprints {
            extractor: self,
            samples,
            starts,
            next: 0,
            rows: VecDeque::with_capacity(self.config.image_frames),
            first_row: 0,
        }
    }

    /// Band energies of every frame in `frames`, transformed in parallel.
    fn band_rows(
        &self,
        samples: &[f32],
        frames: Range<usize>,
    ) -> Result<Vec<Vec<f32>>, FingerprintError> {
        frames
            .into_par_iter()
            .map_init(
                || self.transform.make_scratch(),
                |scratch, frame| self.band_energies(samples, frame, scratch),
            )
            .collect()
    }

    fn band_energies(
        &self,
        samples: &[f32],
        frame: usize,
        scratch: &mut crate::dsp::FftScratch,
    ) -> Result<Vec<f32>, FingerprintError> {
        let packed = self.transform.forward_with_scratch(
            samples,
            frame * self.config.hop_size,
            &self.window,
            scratch,
        )?;
        Ok(self
            .band_edges
            .windows(2)
            .map(|edge| (edge[0]..edge[1]).map(|k| magnitude(&packed, k)).sum())
            .collect())
    }

    /// First frame of every image under `stride`.
    fn image_starts(&self, frame_count: usize, stride: &Stride) -> Vec<usize> {
        let image_frames = self.config.image_frames;
        if frame_count < image_frames {
            return Vec::new();
        }
        let last_start = frame_count - image_frames;
        let hop = self.config.hop_size;
        let to_frames = |samples: usize| samples.div_ceil(hop).max(1);

        let mut starts = Vec::new();
        let mut position = 0;
        match stride {
            Stride::Static { samples } => {
                let step = to_frames(*samples);
                while position <= last_start {
                    starts.push(position);
                    position += step;
                }
            }
            Stride::Random { min, max, seed } => {
                let mut rng = Xoshiro256::new(*seed);
                while position <= last_start {
                    starts.push(position);
                    let stride = rng.between(*min as u64, *max as u64) as usize;
                    position += to_frames(stride);
                }
            }
        }
        starts
    }
}

/// Bin edges of `bands` logarithmically spaced bands between the
/// configured frequencies. Every band spans at least one bin.
fn log_band_edges(config: &FingerprintConfig) -> Vec<usize> {
    let bin_hz = f64::from(config.sample_rate) / config.frame_size as f64;
    let max_bin = config.frame_size / 2;
    let min = f64::from(config.min_frequency);
    let ratio = f64::from(config.max_frequency) / min;

    let mut edges = Vec::with_capacity(config.bands + 1);
    for b in 0..=config.bands {
        let hz = min * ratio.powf(b as f64 / config.bands as f64);
        let mut bin = ((hz / bin_hz).round() as usize).min(max_bin + 1);
        if let Some(&previous) = edges.last() {
            bin = bin.max(previous + 1);
        }
        edges.push(bin);
    }
    edges
}
