//! Mathematical utilities shared by the engine crates.
//!
//! Everything here is allocation-free and suitable for `no_std`:
//!
//! - [`db_to_linear`] / [`linear_to_db`] - exact dB conversions
//! - [`flush_denormal`] - denormal protection for recursive filters
//! - [`ramp_scale`] / [`ramp_copy`] - linear gain ramps (crossfades)
//! - [`block_peak`] / [`block_mean_square`] - metering reductions

use libm::{expf, logf};

/// Convert decibels to linear gain.
///
/// # Example
/// ```rust
/// use voltio_core::db_to_linear;
///
/// assert!((db_to_linear(0.0) - 1.0).abs() < 0.001);
/// assert!((db_to_linear(-6.02) - 0.5).abs() < 0.01);
/// ```
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    // 10^(dB/20) = e^(dB * ln(10)/20)
    const FACTOR: f32 = core::f32::consts::LN_10 / 20.0;
    expf(db * FACTOR)
}

/// Convert linear gain to decibels.
///
/// Values ≤ 1e-10 are clamped to avoid `-inf`.
///
/// # Example
/// ```rust
/// use voltio_core::linear_to_db;
///
/// assert!((linear_to_db(1.0) - 0.0).abs() < 0.001);
/// assert!((linear_to_db(0.5) - (-6.02)).abs() < 0.01);
/// ```
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    const FACTOR: f32 = 20.0 / core::f32::consts::LN_10;
    logf(linear.max(1e-10)) * FACTOR
}

/// Flush denormal values to zero.
///
/// Denormal floats cause severe performance penalties on most CPUs.
/// Recursive filter states decay through the denormal range and must be
/// flushed. The 1e-15 threshold is far below audibility (-300 dB).
#[inline]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < 1e-15 { 0.0 } else { x }
}

/// Scale a slice in place with a linear gain ramp from `g0` to `g1`.
///
/// Sample `i` of `n` is scaled by `g0 + (g1 - g0) * i / n`, so a subsequent
/// ramp starting at `g1` continues seamlessly. The loop is a plain
/// multiply-accumulate over contiguous memory and autovectorizes.
///
/// An empty slice is a no-op.
#[inline]
pub fn ramp_scale(buf: &mut [f32], g0: f32, g1: f32) {
    if buf.is_empty() {
        return;
    }
    let step = (g1 - g0) / buf.len() as f32;
    let mut g = g0;
    for x in buf.iter_mut() {
        *x *= g;
        g += step;
    }
}

/// Copy `src` into `dst` with a linear gain ramp from `g0` to `g1`.
///
/// Same ramp semantics as [`ramp_scale`]. Only the first
/// `min(src.len(), dst.len())` samples are written.
#[inline]
pub fn ramp_copy(dst: &mut [f32], src: &[f32], g0: f32, g1: f32) {
    let n = dst.len().min(src.len());
    if n == 0 {
        return;
    }
    let step = (g1 - g0) / n as f32;
    let mut g = g0;
    for (d, s) in dst[..n].iter_mut().zip(&src[..n]) {
        *d = *s * g;
        g += step;
    }
}

/// Absolute peak of a slice.
///
/// Returns 0.0 for an empty slice.
#[inline]
pub fn block_peak(buf: &[f32]) -> f32 {
    let mut peak = 0.0f32;
    for &x in buf {
        let a = x.abs();
        if a > peak {
            peak = a;
        }
    }
    peak
}

/// Mean of squared samples over a slice.
///
/// Returns 0.0 for an empty slice. Accumulates in `f64` so long blocks do
/// not lose precision.
#[inline]
pub fn block_mean_square(buf: &[f32]) -> f32 {
    if buf.is_empty() {
        return 0.0;
    }
    let mut acc = 0.0f64;
    for &x in buf {
        acc += f64::from(x) * f64::from(x);
    }
    (acc / buf.len() as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_denormal() {
        assert_eq!(flush_denormal(1e-20), 0.0);
        assert_eq!(flush_denormal(-1e-20), 0.0);
        assert_eq!(flush_denormal(0.5), 0.5);
        assert_eq!(flush_denormal(-0.5), -0.5);
    }

    #[test]
    fn test_ramp_scale_endpoints() {
        let mut buf = [1.0f32; 8];
        ramp_scale(&mut buf, 1.0, 0.0);
        assert_eq!(buf[0], 1.0);
        // Last sample carries gain g1 - step, not g1 itself, so the next
        // ramp picks up exactly where this one left off.
        assert!((buf[7] - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_ramp_scale_constant() {
        let mut buf = [2.0f32; 16];
        ramp_scale(&mut buf, 0.5, 0.5);
        for &x in &buf {
            assert!((x - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_ramp_copy_matches_scale() {
        let src: [f32; 32] = core::array::from_fn(|i| (i as f32 * 0.37).sin());
        let mut a = src;
        ramp_scale(&mut a, 0.0, 1.0);
        let mut b = [0.0f32; 32];
        ramp_copy(&mut b, &src, 0.0, 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_block_peak() {
        assert_eq!(block_peak(&[]), 0.0);
        assert_eq!(block_peak(&[0.1, -0.9, 0.5]), 0.9);
    }

    #[test]
    fn test_block_mean_square() {
        let ms = block_mean_square(&[1.0, -1.0, 1.0, -1.0]);
        assert!((ms - 1.0).abs() < 1e-7);
        let ms = block_mean_square(&[0.5; 8]);
        assert!((ms - 0.25).abs() < 1e-7);
    }
}
