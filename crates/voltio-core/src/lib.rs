//! Voltio Core - DSP primitives for the real-time audio engine
//!
//! This crate provides the numeric building blocks shared by the rest of the
//! workspace, designed for hard real-time use: no allocation, no blocking,
//! no panics in the audio path.
//!
//! # Contents
//!
//! ## Filters
//!
//! - [`SvfCore4`] - 4-unit trapezoidal state-variable filter core with
//!   parallel, 2×2-cascade, and serial-cascade block topologies. The
//!   latency-trading block loops are bracketed by fixup passes that keep
//!   block output bit-identical to per-sample output.
//!
//! ## Fade kernels
//!
//! - [`ramp_scale`] / [`ramp_copy`] - linear gain ramps over a slice, the
//!   crossfade primitive used for click-free program switching.
//!
//! ## Level utilities
//!
//! - [`block_peak`] / [`block_mean_square`] - slice reductions for metering
//! - [`db_to_linear`] / [`linear_to_db`] - exact conversions (libm)
//! - [`fast_log2`], [`fast_exp2`], [`fast_linear_to_db`],
//!   [`fast_db_to_linear`] - bit-decomposition approximations for metering
//!   and histogram bucketing, with documented error bounds
//!
//! # no_std Support
//!
//! The crate is `no_std` compatible. Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! voltio-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: no allocations in processing paths
//! - **Deterministic**: block and per-sample processing produce identical
//!   bit patterns, so pipelined variants can be swapped in freely
//! - **`libm` for math**: no dependency on `std` float intrinsics

#![cfg_attr(not(feature = "std"), no_std)]

pub mod fast_math;
pub mod math;
pub mod svf_core;

pub use fast_math::{fast_db_to_linear, fast_exp2, fast_linear_to_db, fast_log2};
pub use math::{
    block_mean_square, block_peak, db_to_linear, flush_denormal, linear_to_db, ramp_copy,
    ramp_scale,
};
pub use svf_core::{SvfCore4, SvfMix, svf_coefs, svf_mix_bandpass, svf_mix_highpass, svf_mix_lowpass};
