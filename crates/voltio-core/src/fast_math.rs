//! Fast mathematical approximations for metering and histogram bucketing.
//!
//! These trade full IEEE 754 precision for speed. Each function documents
//! its maximum error and valid input range.
//!
//! | Function | Replaces | Max error |
//! |----------|----------|-----------|
//! | [`fast_log2`] | `libm::log2f` | < 0.003 absolute |
//! | [`fast_exp2`] | `libm::exp2f` | < 0.2% relative |
//! | [`fast_db_to_linear`] | `10^(dB/20)` | < 0.05 dB |
//! | [`fast_linear_to_db`] | `20·log10` | < 0.05 dB |
//!
//! These are intended for level metering and loudness bucketing, where the
//! perceptual resolution budget (≈ 0.01 LU per histogram bucket) comfortably
//! exceeds the approximation error. Do not use them for audio-rate
//! waveshaping.

use libm::floorf;

/// Fast base-2 logarithm via IEEE 754 float decomposition.
///
/// Extracts the exponent directly from the float bit representation, then
/// applies a 2nd-order minimax polynomial to the mantissa.
///
/// # Accuracy
///
/// Maximum absolute error: < 0.003 for x > 0.
/// In dB context (`× 20/log₂(10)`): < 0.05 dB.
///
/// # Arguments
///
/// * `x` - Input value. Must be > 0. Returns garbage for x ≤ 0.
///
/// # Examples
///
/// ```
/// use voltio_core::fast_math::fast_log2;
///
/// assert!((fast_log2(1.0) - 0.0).abs() < 0.01);
/// assert!((fast_log2(2.0) - 1.0).abs() < 0.01);
/// assert!((fast_log2(0.5) - (-1.0)).abs() < 0.01);
/// ```
#[inline]
pub fn fast_log2(x: f32) -> f32 {
    let bits = x.to_bits();
    let exponent = ((bits >> 23) & 0xFF) as i32 - 127;
    // Reconstruct mantissa in [1.0, 2.0)
    let m = f32::from_bits((bits & 0x007F_FFFF) | 0x3F80_0000);
    // Minimax 2nd-order polynomial for log2(m), m ∈ [1, 2)
    exponent as f32 + (m * (m * -0.344_845_6 + 2.024_094) - 1.674_094)
}

/// Fast base-2 exponential via polynomial approximation.
///
/// Decomposes `x` into integer and fractional parts: `2^x = 2^⌊x⌋ · 2^frac(x)`.
/// The integer part uses IEEE 754 bit manipulation (exact), the fractional
/// part uses a 3rd-order minimax polynomial.
///
/// # Accuracy
///
/// Maximum relative error: < 0.2% for x ∈ \[-126, 126\].
///
/// # Examples
///
/// ```
/// use voltio_core::fast_math::fast_exp2;
///
/// assert!((fast_exp2(0.0) - 1.0).abs() < 0.01);
/// assert!((fast_exp2(1.0) - 2.0).abs() < 0.01);
/// assert!((fast_exp2(-1.0) - 0.5).abs() < 0.01);
/// ```
#[inline]
pub fn fast_exp2(x: f32) -> f32 {
    let x = x.clamp(-126.0, 126.0);
    let i = floorf(x) as i32;
    let f = x - i as f32;
    // 3rd-order minimax polynomial for 2^f, f ∈ [0, 1)
    let p = 1.0 + f * (core::f32::consts::LN_2 + f * (0.240_226 + f * 0.055_504_1));
    // Multiply by 2^i via IEEE 754 exponent manipulation
    f32::from_bits(((i + 127) as u32) << 23) * p
}

/// Fast dB-to-linear gain conversion.
///
/// Equivalent to `10^(dB/20)`, using [`fast_exp2`]:
/// `10^(dB/20) = 2^(dB · log₂(10)/20)`.
///
/// # Accuracy
///
/// Maximum error: < 0.05 dB (< 0.6% linear gain error).
///
/// # Examples
///
/// ```
/// use voltio_core::fast_math::fast_db_to_linear;
///
/// assert!((fast_db_to_linear(0.0) - 1.0).abs() < 0.01);
/// assert!((fast_db_to_linear(-20.0) - 0.1).abs() < 0.01);
/// ```
#[inline]
pub fn fast_db_to_linear(db: f32) -> f32 {
    const FACTOR: f32 = core::f32::consts::LOG2_10 / 20.0;
    fast_exp2(db * FACTOR)
}

/// Fast linear-gain-to-dB conversion.
///
/// Equivalent to `20 · log₁₀(x)`, using [`fast_log2`]:
/// `20·log₁₀(x) = 20·log₂(x)/log₂(10)`.
///
/// # Accuracy
///
/// Maximum error: < 0.05 dB for the audio range (1e-6 to 10.0).
///
/// # Arguments
///
/// * `linear` - Linear gain value. Must be > 0. Values ≤ 1e-10 are clamped.
///
/// # Examples
///
/// ```
/// use voltio_core::fast_math::fast_linear_to_db;
///
/// assert!((fast_linear_to_db(1.0) - 0.0).abs() < 0.1);
/// assert!((fast_linear_to_db(0.1) - (-20.0)).abs() < 0.1);
/// ```
#[inline]
pub fn fast_linear_to_db(linear: f32) -> f32 {
    const FACTOR: f32 = 20.0 / core::f32::consts::LOG2_10;
    fast_log2(linear.max(1e-10)) * FACTOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log2_powers_of_two() {
        for e in -20..20 {
            let x = libm::exp2f(e as f32);
            assert!(
                (fast_log2(x) - e as f32).abs() < 0.005,
                "fast_log2({x}) = {}, expected {e}",
                fast_log2(x)
            );
        }
    }

    #[test]
    fn test_log2_sweep() {
        let mut x = 1e-8f32;
        while x < 1e4 {
            let exact = libm::log2f(x);
            assert!(
                (fast_log2(x) - exact).abs() < 0.003,
                "fast_log2({x}): {} vs {exact}",
                fast_log2(x)
            );
            x *= 1.0371;
        }
    }

    #[test]
    fn test_exp2_roundtrip() {
        for i in -60..60 {
            let x = i as f32 * 0.37;
            let y = fast_exp2(x);
            let exact = libm::exp2f(x);
            let rel = (y - exact).abs() / exact;
            assert!(rel < 0.002, "fast_exp2({x}): rel err {rel}");
        }
    }

    #[test]
    fn test_db_conversions_consistent() {
        for db in [-60.0f32, -20.0, -6.0, 0.0, 6.0, 20.0] {
            let lin = fast_db_to_linear(db);
            let back = fast_linear_to_db(lin);
            assert!((back - db).abs() < 0.1, "roundtrip {db} -> {lin} -> {back}");
        }
    }
}
