//! 4-unit state-variable filter core with latency-trading block topologies.
//!
//! # Topology
//!
//! Implements the linear trapezoidal SVF in state-increment form after
//! Simper ("Linear Trapezoidal State Variable Filter", 2014), the same
//! discretization family as Zavalishin's TPT SVF: the analog integrators
//! are replaced by trapezoidal ones, preserving the prototype's frequency
//! response under modulation. The core holds **four** independent 2-pole
//! units and only iterates the recurrence; coefficients are derived
//! externally (see [`svf_coefs`]).
//!
//! # Processing topologies
//!
//! The four units can be scheduled three ways:
//!
//! - **Parallel**: four independent filters on four signals in lockstep.
//!   No latency.
//! - **2×2**: two cascades (units 0→1 and 2→3) on two signals, giving two
//!   independent 4-pole filters.
//! - **Serial**: one 4-stage cascade (8-pole) on a single signal.
//!
//! The cascaded topologies exist in two block forms. The `_lat` form runs a
//! software-pipelined steady-state loop in which every unit advances once
//! per iteration, the shape a 4-lane SIMD unit executes as a single fused
//! step, at the cost of 1 (2×2) or 3 (serial) samples of latency. The
//! `_imm` form brackets that same loop with pre-roll and post-roll fixup
//! passes that fill and flush the pipeline, so it has **zero latency and is
//! bit-identical to calling the per-sample variant**. That equivalence is
//! the core correctness property of this module, relied on by tests.
//!
//! # State discipline
//!
//! The pipeline scratch persisted by the `_lat` variants is part of the
//! filter history. Switching between topologies on one instance without
//! [`reset`](SvfCore4::reset) (or explicitly draining the pipeline)
//! corrupts that history; the core does not check for it.

use libm::tanf;

use crate::math::flush_denormal;

/// Output mix weights applied to the raw SVF taps.
///
/// The per-sample output of a unit is `v0m·v0 + v1m·v1 + v2m·v2` where `v0`
/// is the input, `v1` the bandpass tap and `v2` the lowpass tap. Standard
/// responses are built with [`svf_mix_lowpass`], [`svf_mix_bandpass`] and
/// [`svf_mix_highpass`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SvfMix {
    /// Weight on the input tap.
    pub v0: f32,
    /// Weight on the bandpass tap.
    pub v1: f32,
    /// Weight on the lowpass tap.
    pub v2: f32,
}

/// Lowpass output mix (pure `v2` tap).
pub fn svf_mix_lowpass() -> SvfMix {
    SvfMix {
        v0: 0.0,
        v1: 0.0,
        v2: 1.0,
    }
}

/// Bandpass output mix (pure `v1` tap).
pub fn svf_mix_bandpass() -> SvfMix {
    SvfMix {
        v0: 0.0,
        v1: 1.0,
        v2: 0.0,
    }
}

/// Highpass output mix: `v0 - v1/q - v2`.
pub fn svf_mix_highpass(q: f32) -> SvfMix {
    SvfMix {
        v0: 1.0,
        v1: -1.0 / q,
        v2: -1.0,
    }
}

/// Derive state-increment coefficients `(g0, g1, g2)` from cutoff and Q.
///
/// With `g = tan(π·f/sr)`, `k = 1/q` and `a = 1/(1 + g·(g + k))`:
/// `g0 = g·a`, `g1 = a − 1`, `g2 = g²·a`. These reproduce the TPT SVF
/// response exactly; see the module docs for the recurrence they feed.
///
/// `cutoff` must be below Nyquist; callers clamp to their own range.
pub fn svf_coefs(cutoff: f32, q: f32, sample_rate: f32) -> (f32, f32, f32) {
    let g = tanf(core::f32::consts::PI * cutoff / sample_rate);
    let k = 1.0 / q;
    let a = 1.0 / (1.0 + g * (g + k));
    (g * a, a - 1.0, g * g * a)
}

/// Four-unit trapezoidal SVF core.
///
/// Plain-old-data: coefficients (`g0,g1,g2`), mix weights (`v0m,v1m,v2m`)
/// and integrator state (`ic1eq`, `ic2eq`) for each of the 4 units, plus
/// the pipeline scratch used only by the `_lat` topologies.
///
/// # Example
///
/// ```rust
/// use voltio_core::{SvfCore4, svf_coefs, svf_mix_lowpass};
///
/// let mut core = SvfCore4::new();
/// let (g0, g1, g2) = svf_coefs(1000.0, 0.707, 48000.0);
/// for unit in 0..4 {
///     core.set_coefs(unit, g0, g1, g2);
///     core.set_mix(unit, svf_mix_lowpass());
/// }
///
/// // One 8-pole lowpass on a single signal:
/// let y = core.process_sample_ser(0.5);
/// assert!(y.is_finite());
/// ```
#[derive(Clone, Debug)]
pub struct SvfCore4 {
    g0: [f32; 4],
    g1: [f32; 4],
    g2: [f32; 4],
    v0m: [f32; 4],
    v1m: [f32; 4],
    v2m: [f32; 4],
    ic1: [f32; 4],
    ic2: [f32; 4],
    /// In-flight unit outputs for the latency-trading loops.
    y: [f32; 3],
}

impl Default for SvfCore4 {
    fn default() -> Self {
        Self::new()
    }
}

impl SvfCore4 {
    /// Pipeline latency of the 2×2 `_lat` topology, in samples.
    pub const LATENCY_2X2: usize = 1;
    /// Pipeline latency of the serial `_lat` topology, in samples.
    pub const LATENCY_SERIAL: usize = 3;

    /// Create a core with unity-bypass mix and neutral coefficients.
    pub fn new() -> Self {
        Self {
            g0: [0.0; 4],
            g1: [0.0; 4],
            g2: [0.0; 4],
            v0m: [1.0; 4],
            v1m: [0.0; 4],
            v2m: [0.0; 4],
            ic1: [0.0; 4],
            ic2: [0.0; 4],
            y: [0.0; 3],
        }
    }

    /// Set the recurrence coefficients of one unit.
    ///
    /// # Panics
    ///
    /// Panics if `unit >= 4`.
    pub fn set_coefs(&mut self, unit: usize, g0: f32, g1: f32, g2: f32) {
        self.g0[unit] = g0;
        self.g1[unit] = g1;
        self.g2[unit] = g2;
    }

    /// Set the output mix weights of one unit.
    ///
    /// # Panics
    ///
    /// Panics if `unit >= 4`.
    pub fn set_mix(&mut self, unit: usize, mix: SvfMix) {
        self.v0m[unit] = mix.v0;
        self.v1m[unit] = mix.v1;
        self.v2m[unit] = mix.v2;
    }

    /// Clear integrator state and pipeline scratch, keeping coefficients.
    pub fn reset(&mut self) {
        self.ic1 = [0.0; 4];
        self.ic2 = [0.0; 4];
        self.y = [0.0; 3];
    }

    /// Advance one unit by one sample.
    ///
    /// The recurrence (normative; block topologies must match it bit for
    /// bit):
    ///
    /// ```text
    /// t0 = v0 - ic2eq
    /// t1 = g0·t0 + g1·ic1eq
    /// t2 = g2·t0 + g0·ic1eq
    /// v1 = t1 + ic1eq;  v2 = t2 + ic2eq
    /// ic1eq += 2·t1;    ic2eq += 2·t2
    /// out = v0m·v0 + v1m·v1 + v2m·v2
    /// ```
    #[inline]
    fn step(&mut self, u: usize, v0: f32) -> f32 {
        let t0 = v0 - self.ic2[u];
        let t1 = self.g0[u] * t0 + self.g1[u] * self.ic1[u];
        let t2 = self.g2[u] * t0 + self.g0[u] * self.ic1[u];
        let v1 = t1 + self.ic1[u];
        let v2 = t2 + self.ic2[u];
        self.ic1[u] = flush_denormal(self.ic1[u] + 2.0 * t1);
        self.ic2[u] = flush_denormal(self.ic2[u] + 2.0 * t2);
        self.v0m[u] * v0 + self.v1m[u] * v1 + self.v2m[u] * v2
    }

    /// Advance all four units by one sample, one input per lane.
    ///
    /// This is the fused kernel the steady-state loops are built from; on a
    /// 4-lane SIMD unit it is a single vector step. Per-lane arithmetic is
    /// exactly [`step`](Self::step), so pipelined loops stay bit-identical
    /// to sequential per-sample processing.
    #[inline]
    fn step4(&mut self, x: [f32; 4]) -> [f32; 4] {
        let mut out = [0.0f32; 4];
        for u in 0..4 {
            out[u] = self.step(u, x[u]);
        }
        out
    }

    // ---- Parallel topology ----

    /// Process one frame of four independent signals.
    #[inline]
    pub fn process_sample_par(&mut self, x: [f32; 4]) -> [f32; 4] {
        self.step4(x)
    }

    /// Process a block of four-lane frames. No latency.
    ///
    /// # Panics
    ///
    /// Debug-asserts `dst.len() == src.len()`.
    pub fn process_block_par(&mut self, dst: &mut [[f32; 4]], src: &[[f32; 4]]) {
        debug_assert_eq!(dst.len(), src.len());
        for (d, s) in dst.iter_mut().zip(src) {
            *d = self.step4(*s);
        }
    }

    // ---- 2x2 topology: units 0→1 and 2→3 cascaded on two signals ----

    /// Process one frame of two signals through the two 2-unit cascades.
    #[inline]
    pub fn process_sample_2x2(&mut self, x: [f32; 2]) -> [f32; 2] {
        let a = self.step(0, x[0]);
        let b = self.step(2, x[1]);
        [self.step(1, a), self.step(3, b)]
    }

    /// Process a block through the 2×2 cascades with zero latency.
    ///
    /// Bit-identical to calling [`process_sample_2x2`](Self::process_sample_2x2)
    /// per frame. Blocks shorter than `LATENCY_2X2 + 1` fall back to
    /// per-sample processing.
    ///
    /// # Panics
    ///
    /// Debug-asserts `dst.len() == src.len()`.
    pub fn process_block_2x2_imm(&mut self, dst: &mut [[f32; 2]], src: &[[f32; 2]]) {
        debug_assert_eq!(dst.len(), src.len());
        let n = src.len();
        if n < Self::LATENCY_2X2 + 1 {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = self.process_sample_2x2(*s);
            }
            return;
        }
        // Pre-roll: prime the pipeline with the first-stage outputs of
        // frame 0.
        let mut ya = self.step(0, src[0][0]);
        let mut yb = self.step(2, src[0][1]);
        // Steady state: first stages consume frame i while second stages
        // finish frame i-1, one step4 per iteration.
        for i in 1..n {
            let out = self.step4([src[i][0], ya, src[i][1], yb]);
            dst[i - 1] = [out[1], out[3]];
            ya = out[0];
            yb = out[2];
        }
        // Post-roll: flush the last frame out of the pipeline.
        dst[n - 1] = [self.step(1, ya), self.step(3, yb)];
    }

    /// Process a block through the 2×2 cascades with 1 sample of latency.
    ///
    /// The pipeline persists in the core's scratch across calls, so the
    /// steady-state loop never needs fixup passes: `dst[i]` is the filter
    /// output for `src[i - 1]` (the first output after a reset is the
    /// response to a zero frame).
    ///
    /// # Panics
    ///
    /// Debug-asserts `dst.len() == src.len()`.
    pub fn process_block_2x2_lat(&mut self, dst: &mut [[f32; 2]], src: &[[f32; 2]]) {
        debug_assert_eq!(dst.len(), src.len());
        for (d, s) in dst.iter_mut().zip(src) {
            let out = self.step4([s[0], self.y[0], s[1], self.y[1]]);
            *d = [out[1], out[3]];
            self.y[0] = out[0];
            self.y[1] = out[2];
        }
    }

    // ---- Serial topology: units 0→1→2→3 cascaded on one signal ----

    /// Process one sample through the 4-unit cascade.
    #[inline]
    pub fn process_sample_ser(&mut self, x: f32) -> f32 {
        let a = self.step(0, x);
        let b = self.step(1, a);
        let c = self.step(2, b);
        self.step(3, c)
    }

    /// Process a block through the 4-unit cascade with zero latency.
    ///
    /// Bit-identical to calling [`process_sample_ser`](Self::process_sample_ser)
    /// per sample. Blocks shorter than `LATENCY_SERIAL + 1` fall back to
    /// per-sample processing.
    ///
    /// # Panics
    ///
    /// Debug-asserts `dst.len() == src.len()`.
    pub fn process_block_ser_imm(&mut self, dst: &mut [f32], src: &[f32]) {
        debug_assert_eq!(dst.len(), src.len());
        let n = src.len();
        if n < Self::LATENCY_SERIAL + 1 {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = self.process_sample_ser(*s);
            }
            return;
        }
        // Pre-roll: stage the first three samples partway down the cascade.
        // Each unit still consumes its inputs in arrival order, which is
        // what keeps the result bit-identical to per-sample processing.
        let mut p1 = self.step(0, src[0]);
        let mut p2 = self.step(1, p1);
        p1 = self.step(0, src[1]);
        let mut p3 = self.step(2, p2);
        p2 = self.step(1, p1);
        p1 = self.step(0, src[2]);
        // Steady state: all four units advance once per iteration.
        for i in 3..n {
            let out = self.step4([src[i], p1, p2, p3]);
            dst[i - 3] = out[3];
            p3 = out[2];
            p2 = out[1];
            p1 = out[0];
        }
        // Post-roll: drain the last three samples from the pipeline.
        dst[n - 3] = self.step(3, p3);
        p3 = self.step(2, p2);
        p2 = self.step(1, p1);
        dst[n - 2] = self.step(3, p3);
        p3 = self.step(2, p2);
        dst[n - 1] = self.step(3, p3);
    }

    /// Process a block through the 4-unit cascade with 3 samples of latency.
    ///
    /// The pipeline persists in the core's scratch across calls; `dst[i]`
    /// is the filter output for `src[i - 3]`.
    ///
    /// # Panics
    ///
    /// Debug-asserts `dst.len() == src.len()`.
    pub fn process_block_ser_lat(&mut self, dst: &mut [f32], src: &[f32]) {
        debug_assert_eq!(dst.len(), src.len());
        for (d, s) in dst.iter_mut().zip(src) {
            let out = self.step4([*s, self.y[0], self.y[1], self.y[2]]);
            *d = out[3];
            self.y[2] = out[2];
            self.y[1] = out[1];
            self.y[0] = out[0];
        }
    }
}
