use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Frame weighting applied before the FFT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// `0.54 - 0.46 cos(2πi / N)`
    Hamming,
    /// `0.5 (1 - cos(2πi / (N - 1)))`
    #[default]
    Hann,
}

impl WindowKind {
    /// Coefficients for a frame of `size` samples.
    #[must_use]
    pub fn coefficients(self, size: usize) -> Vec<f32> {
        if size <= 1 {
            return vec![1.0; size];
        }
        let n = size as f64;
        (0..size)
            .map(|i| {
                let i = i as f64;
                let w = match self {
                    Self::Hamming => 0.54 - 0.46 * (2.0 * PI * i / n).cos(),
                    Self::Hann => 0.5 * (1.0 - (2.0 * PI * i / (n - 1.0)).cos()),
                };
                w as f32
            })
            .collect()
    }
}

/// Weight the frame of `coefficients.len()` samples starting at `offset`.
///
/// Positions past the end of `samples` are zero.
#[must_use]
pub fn apply(samples: &[f32], offset: usize, coefficients: &[f32]) -> Vec<f32> {
    let available = samples.get(offset..).unwrap_or_default();
    coefficients
        .iter()
        .enumerate()
        .map(|(i, w)| available.get(i).map_or(0.0, |s| s * w))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_endpoints_and_peak() {
        let w = WindowKind::Hann.coefficients(9);
        assert_eq!(w.len(), 9);
        assert!(w[0].abs() < 1e-7);
        assert!(w[8].abs() < 1e-7);
        assert!((w[4] - 1.0).abs() < 1e-7);
        assert!((w[2] - w[6]).abs() < 1e-7);
    }

    #[test]
    fn test_hamming_formula() {
        let w = WindowKind::Hamming.coefficients(8);
        assert!((w[0] - 0.08).abs() < 1e-6);
        assert!((w[4] - 1.0).abs() < 1e-6);
        assert!((w[2] - 0.54).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_sizes() {
        assert!(WindowKind::Hann.coefficients(0).is_empty());
        assert_eq!(WindowKind::Hann.coefficients(1), vec![1.0]);
    }

    #[test]
    fn test_apply_offset_and_padding() {
        let samples = [1.0, 2.0, 3.0, 4.0];
        let frame = apply(&samples, 2, &[0.5, 0.5, 0.5]);
        assert_eq!(frame, vec![1.5, 2.0, 0.0]);

        assert_eq!(apply(&samples, 10, &[1.0, 1.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_default_is_hann() {
        assert_eq!(WindowKind::default(), WindowKind::Hann);
    }
}
