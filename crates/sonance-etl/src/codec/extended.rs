//! IEEE 754 80-bit extended precision floats, as used for the AIFF sample
//! rate field.
//!
//! Layout (big-endian): bit 79 sign, bits 64..79 biased exponent (bias
//! 16383), bits 0..64 mantissa with an explicit integer bit.

const EXPONENT_BIAS: i32 = 16383;
const EXPONENT_MAX: u16 = 0x7FFF;

/// Decode a 10-byte extended float.
///
/// An all-zero exponent and mantissa decode to zero; an all-ones exponent
/// decodes to NaN regardless of the mantissa.
#[must_use]
pub fn extended_to_f64(bytes: [u8; 10]) -> f64 {
    let negative = bytes[0] & 0x80 != 0;
    let exponent = u16::from_be_bytes([bytes[0] & 0x7F, bytes[1]]);
    let hi = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    let lo = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);

    let value = if exponent == 0 && hi == 0 && lo == 0 {
        0.0
    } else if exponent == EXPONENT_MAX {
        f64::NAN
    } else {
        let e = i32::from(exponent) - EXPONENT_BIAS;
        ldexp(f64::from(hi), e - 31) + ldexp(f64::from(lo), e - 63)
    };

    if negative {
        -value
    } else {
        value
    }
}

/// Encode an `f64` as a 10-byte extended float.
///
/// Exact for every finite value. Infinities are written with the all-ones
/// exponent and therefore read back as NaN.
#[must_use]
pub fn f64_to_extended(value: f64) -> [u8; 10] {
    let sign: u16 = if value.is_sign_negative() { 0x8000 } else { 0 };
    let mut out = [0u8; 10];

    if value.is_nan() || value.is_infinite() {
        out[..2].copy_from_slice(&(sign | EXPONENT_MAX).to_be_bytes());
        out[2] = if value.is_nan() { 0xC0 } else { 0x80 };
        return out;
    }
    if value == 0.0 {
        out[..2].copy_from_slice(&sign.to_be_bytes());
        return out;
    }

    let bits = value.abs().to_bits();
    let biased = ((bits >> 52) & 0x7FF) as i32;
    let fraction = bits & ((1u64 << 52) - 1);

    let (exponent, mantissa) = if biased == 0 {
        // Subnormal: fraction * 2^-1074, normalize so the top bit is set.
        let shift = fraction.leading_zeros();
        (-1011 - shift as i32, fraction << shift)
    } else {
        (biased - 1023, (1u64 << 63) | (fraction << 11))
    };

    let stored = (exponent + EXPONENT_BIAS) as u16;
    out[..2].copy_from_slice(&(sign | stored).to_be_bytes());
    out[2..].copy_from_slice(&mantissa.to_be_bytes());
    out
}

/// `x * 2^exp`, applied in steps so large exponents neither overflow nor
/// flush the intermediate power of two.
fn ldexp(mut x: f64, mut exp: i32) -> f64 {
    const STEP: i32 = 1000;

    while exp > STEP && x.is_finite() {
        x *= 2f64.powi(STEP);
        exp -= STEP;
    }
    while exp < -STEP && x != 0.0 {
        x *= 2f64.powi(-STEP);
        exp += STEP;
    }
    x * 2f64.powi(exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(prefix: &[u8]) -> [u8; 10] {
        let mut out = [0u8; 10];
        out[..prefix.len()].copy_from_slice(prefix);
        out
    }

    #[test]
    fn test_zero() {
        assert_eq!(extended_to_f64([0; 10]), 0.0);
    }

    #[test]
    fn test_common_sample_rates() {
        assert_eq!(extended_to_f64(bytes(&[0x40, 0x0E, 0xAC, 0x44])), 44100.0);
        assert_eq!(extended_to_f64(bytes(&[0x40, 0x0B, 0xFA])), 8000.0);
        assert_eq!(extended_to_f64(bytes(&[0x40, 0x0E, 0xBB, 0x80])), 48000.0);
    }

    #[test]
    fn test_sign_flip() {
        assert_eq!(extended_to_f64(bytes(&[0xBF, 0xFF, 0x80])), -1.0);
        assert_eq!(extended_to_f64(bytes(&[0xC0, 0x0E, 0xAC, 0x44])), -44100.0);
    }

    #[test]
    fn test_fractions() {
        assert_eq!(extended_to_f64(bytes(&[0x3F, 0xFE, 0x80])), 0.5);
        assert_eq!(extended_to_f64(bytes(&[0x3F, 0xFF, 0xC0])), 1.5);
    }

    #[test]
    fn test_low_mantissa_half_contributes() {
        let value = extended_to_f64([0x3F, 0xFF, 0x80, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00]);
        assert_eq!(value, 1.0 + 2f64.powi(-40));
    }

    #[test]
    fn test_all_ones_exponent_is_nan() {
        assert!(extended_to_f64(bytes(&[0x7F, 0xFF])).is_nan());
        assert!(extended_to_f64(bytes(&[0x7F, 0xFF, 0x80])).is_nan());
        assert!(extended_to_f64(bytes(&[0xFF, 0xFF, 0xC0])).is_nan());
    }

    #[test]
    fn test_encode_known_patterns() {
        assert_eq!(f64_to_extended(44100.0), bytes(&[0x40, 0x0E, 0xAC, 0x44]));
        assert_eq!(f64_to_extended(-1.0), bytes(&[0xBF, 0xFF, 0x80]));
        assert_eq!(f64_to_extended(0.0), [0; 10]);
    }

    #[test]
    fn test_encode_decode_preserves_finite_values() {
        for value in [
            1.0,
            -0.75,
            5512.0,
            22050.0,
            96000.0,
            1.0e-300,
            4.9e-324,
            1.7e308,
            std::f64::consts::PI,
        ] {
            assert_eq!(extended_to_f64(f64_to_extended(value)), value, "{value}");
        }
    }

    #[test]
    fn test_ldexp_large_exponents() {
        assert_eq!(ldexp(1.0, 1023), 2f64.powi(1023));
        assert_eq!(ldexp(2f64.powi(1000), -2000), 2f64.powi(-1000));
    }
}
