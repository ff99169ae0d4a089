//! Standard 2-D Haar decomposition and top-coefficient selection.

use std::f32::consts::FRAC_1_SQRT_2;

/// Full orthonormal 1-D Haar decomposition in place.
///
/// Each level writes pairwise averages to the front half and differences
/// to the back half, then recurses on the averages. An odd trailing
/// element is carried into the next level unchanged.
pub fn haar_1d(data: &mut [f32], scratch: &mut Vec<f32>) {
    let mut len = data.len();
    while len > 1 {
        let pairs = len / 2;
        let carry = len % 2;
        scratch.clear();
        scratch.extend_from_slice(&data[..len]);

        for i in 0..pairs {
            let (a, b) = (scratch[2 * i], scratch[2 * i + 1]);
            data[i] = (a + b) * FRAC_1_SQRT_2;
            data[pairs + carry + i] = (a - b) * FRAC_1_SQRT_2;
        }
        if carry == 1 {
            data[pairs] = scratch[len - 1];
        }
        len = pairs + carry;
    }
}

/// Standard decomposition of a row-major `rows x cols` matrix: every row is
/// fully decomposed, then every column.
pub fn haar_2d(data: &mut [f32], rows: usize, cols: usize) {
    debug_assert_eq!(data.len(), rows * cols);
    let mut scratch = Vec::with_capacity(rows.max(cols));

    for row in data.chunks_exact_mut(cols) {
        haar_1d(row, &mut scratch);
    }

    let mut column = vec![0f32; rows];
    for c in 0..cols {
        for (r, slot) in column.iter_mut().enumerate() {
            *slot = data[r * cols + c];
        }
        haar_1d(&mut column, &mut scratch);
        for (r, value) in column.iter().enumerate() {
            data[r * cols + c] = *value;
        }
    }
}

/// Indices of the `count` largest-magnitude coefficients whose magnitude
/// exceeds `relative_floor` times the largest magnitude.
///
/// Ties keep the lower index. Non-finite coefficients are ignored.
#[must_use]
pub fn top_coefficients(coefficients: &[f32], count: usize, relative_floor: f32) -> Vec<usize> {
    let max = coefficients
        .iter()
        .filter(|c| c.is_finite())
        .fold(0f32, |acc, c| acc.max(c.abs()));
    if max == 0.0 {
        return Vec::new();
    }
    let floor = max * relative_floor;

    let mut indices: Vec<usize> = (0..coefficients.len())
        .filter(|&i| coefficients[i].is_finite() && coefficients[i].abs() > floor)
        .collect();
    indices.sort_by(|&a, &b| {
        coefficients[b]
            .abs()
            .total_cmp(&coefficients[a].abs())
            .then(a.cmp(&b))
    });
    indices.truncate(count);
    indices
}
