//! Real-input FFT over fixed-size frames.

use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use crate::error::FingerprintError;

/// Working buffers for one in-flight transform.
///
/// Keep one per thread; a transform never shares buffers between calls.
#[derive(Debug)]
pub struct FftScratch {
    input: Vec<f32>,
    output: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

/// A planned forward real FFT of a fixed length.
///
/// Output is packed into `len` floats:
/// `[Re X0, Re X(n/2), Re X1, Im X1, Re X2, Im X2, ...]` for even `n`, and
/// `[Re X0, Re X1, Im X1, ...]` for odd `n`. The imaginary parts of `X0`
/// (and of `X(n/2)` for even `n`) are always zero and are not stored.
#[derive(Clone)]
pub struct SpectralTransform {
    len: usize,
    fft: Arc<dyn RealToComplex<f32>>,
}

impl std::fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralTransform").field("len", &self.len).finish()
    }
}

impl SpectralTransform {
    pub fn new(len: usize) -> Result<Self, FingerprintError> {
        if len == 0 {
            return Err(FingerprintError::InvalidConfig(
                "FFT length must be positive".to_string(),
            ));
        }
        let mut planner = RealFftPlanner::<f32>::new();
        Ok(Self {
            len,
            fft: planner.plan_fft_forward(len),
        })
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn make_scratch(&self) -> FftScratch {
        FftScratch {
            input: self.fft.make_input_vec(),
            output: self.fft.make_output_vec(),
            scratch: self.fft.make_scratch_vec(),
        }
    }

    /// Transform the frame of `len()` samples starting at `start`.
    ///
    /// Samples past the end of `samples` are zero. The overlapping prefix of
    /// `window` weights the frame; a window longer than the frame is cut.
    pub fn forward(
        &self,
        samples: &[f32],
        start: usize,
        window: &[f32],
    ) -> Result<Vec<f32>, FingerprintError> {
        let mut scratch = self.make_scratch();
        self.forward_with_scratch(samples, start, window, &mut scratch)
    }

    /// [`forward`](Self::forward) reusing caller-owned buffers.
    pub fn forward_with_scratch(
        &self,
        samples: &[f32],
        start: usize,
        window: &[f32],
        scratch: &mut FftScratch,
    ) -> Result<Vec<f32>, FingerprintError> {
        let available = samples.get(start..).unwrap_or_default();
        for (i, slot) in scratch.input.iter_mut().enumerate() {
            let sample = available.get(i).copied().unwrap_or(0.0);
            *slot = window.get(i).map_or(sample, |w| sample * w);
        }

        self.fft
            .process_with_scratch(&mut scratch.input, &mut scratch.output, &mut scratch.scratch)
            .map_err(|e| FingerprintError::Transform(e.to_string()))?;

        Ok(pack(&scratch.output, self.len))
    }
}

fn pack(spectrum: &[Complex<f32>], len: usize) -> Vec<f32> {
    let mut packed = Vec::with_capacity(len);
    packed.push(spectrum[0].re);
    if len % 2 == 0 {
        if len > 1 {
            packed.push(spectrum[len / 2].re);
        }
        for bin in &spectrum[1..len / 2] {
            packed.push(bin.re);
            packed.push(bin.im);
        }
    } else {
        for bin in &spectrum[1..=len / 2] {
            packed.push(bin.re);
            packed.push(bin.im);
        }
    }
    packed
}

/// Magnitude of bin `k` of a packed spectrum of length `n`.
///
/// Bins above `n / 2` mirror their conjugate; bins at or past `n` are zero.
#[must_use]
pub fn magnitude(packed: &[f32], k: usize) -> f32 {
    let n = packed.len();
    if n == 0 || k >= n {
        return 0.0;
    }
    let k = if k > n / 2 { n - k } else { k };

    if k == 0 {
        return packed[0].abs();
    }
    if n % 2 == 0 {
        if k == n / 2 {
            return packed[1].abs();
        }
        norm(packed[2 * k], packed[2 * k + 1])
    } else {
        norm(packed[2 * k - 1], packed[2 * k])
    }
}

fn norm(re: f32, im: f32) -> f32 {
    re.mul_add(re, im * im).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::window::WindowKind;
    use std::f32::consts::PI;

    #[test]
    fn test_packed_layout_even() {
        let fft = SpectralTransform::new(8).unwrap();
        // DC 1 plus a cosine at bin 2 (amplitude 1) plus Nyquist.
        let samples: Vec<f32> = (0..8)
            .map(|i| {
                let i = i as f32;
                1.0 + (2.0 * PI * 2.0 * i / 8.0).cos() + if i as usize % 2 == 0 { 0.5 } else { -0.5 }
            })
            .collect();
        let packed = fft.forward(&samples, 0, &[]).unwrap();
        assert_eq!(packed.len(), 8);
        assert!((packed[0] - 8.0).abs() < 1e-4);
        assert!((packed[1] - 4.0).abs() < 1e-4);
        assert!((magnitude(&packed, 2) - 4.0).abs() < 1e-4);
        assert!(magnitude(&packed, 1) < 1e-4);
        assert!((magnitude(&packed, 6) - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_packed_layout_odd() {
        let fft = SpectralTransform::new(5).unwrap();
        let samples: Vec<f32> = (0..5).map(|i| (2.0 * PI * i as f32 / 5.0).sin()).collect();
        let packed = fft.forward(&samples, 0, &[]).unwrap();
        assert_eq!(packed.len(), 5);
        assert!(packed[0].abs() < 1e-4);
        // sin at bin 1: X1 = -i n/2.
        assert!(packed[1].abs() < 1e-4);
        assert!((packed[2] + 2.5).abs() < 1e-4);
        assert!((magnitude(&packed, 1) - 2.5).abs() < 1e-4);
    }

    #[test]
    fn test_zero_padding_past_end() {
        let fft = SpectralTransform::new(4).unwrap();
        let packed = fft.forward(&[1.0, 1.0], 1, &[]).unwrap();
        // Frame is [1, 0, 0, 0]: flat spectrum.
        for k in 0..=2 {
            assert!((magnitude(&packed, k) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_window_prefix_only() {
        let fft = SpectralTransform::new(4).unwrap();
        let packed = fft.forward(&[1.0, 1.0, 1.0, 1.0], 0, &[0.0, 0.0]).unwrap();
        // Frame is [0, 0, 1, 1].
        assert!((packed[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_repeated_calls_bit_identical() {
        let fft = SpectralTransform::new(2048).unwrap();
        let window = WindowKind::Hann.coefficients(2048);
        let samples: Vec<f32> = (0..4096).map(|i| ((i * 7919) % 257) as f32 / 257.0 - 0.5).collect();

        let first = fft.forward(&samples, 100, &window).unwrap();
        let mut scratch = fft.make_scratch();
        for _ in 0..3 {
            let again = fft.forward_with_scratch(&samples, 100, &window, &mut scratch).unwrap();
            assert_eq!(
                first.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
                again.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
            );
        }

        let replanned = SpectralTransform::new(2048).unwrap();
        let other = replanned.forward(&samples, 100, &window).unwrap();
        assert_eq!(
            first.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            other.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(SpectralTransform::new(0).is_err());
    }
}
