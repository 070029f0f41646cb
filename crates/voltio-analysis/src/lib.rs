//! Loudness and level measurement for voltio.
//!
//! Implements the ITU-R BS.1770 K-weighting and measurement chain with
//! EBU R128 gating: momentary and short-term loudness, gated integrated
//! loudness, loudness range and sample peak, all computed incrementally
//! with O(1) work per sample. [`LoudnessMeter`] is the assembled chain;
//! the individual stages are exported for callers that need only a
//! piece of it.

mod channel;
mod histogram;
mod k_filter;
mod meters;
mod moving_sum;
mod segment;

pub use channel::ChannelMerger;
pub use histogram::{
    lufs_from_mean_square, mean_square_from_lufs, LoudnessHistogram, SILENCE_FLOOR,
};
pub use k_filter::KWeighting;
pub use meters::{LoudnessMeter, MOMENTARY_SECONDS, SHORT_TERM_SECONDS};
pub use moving_sum::{MeanSquare, MovingSum};
pub use segment::SegmentHelper;
