//! Per-channel K-weighting and cross-channel merge.

use crate::k_filter::KWeighting;
use crate::moving_sum::MeanSquare;

/// K-filters each channel, tracks a per-channel mean-square window and
/// merges the channels with caller-supplied weights (1.0 for front
/// channels, 1.41 for surrounds per BS.1770).
pub struct ChannelMerger {
    filters: Vec<KWeighting>,
    windows: Vec<MeanSquare>,
    weights: Vec<f64>,
}

impl ChannelMerger {
    /// Builds a merger for `weights.len()` channels with a shared
    /// window of `window_len` samples.
    #[must_use]
    pub fn new(sample_rate: f64, weights: &[f64], window_len: usize) -> Self {
        Self {
            filters: vec![KWeighting::new(sample_rate); weights.len()],
            windows: (0..weights.len()).map(|_| MeanSquare::new(window_len)).collect(),
            weights: weights.to_vec(),
        }
    }

    /// Number of channels.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.weights.len()
    }

    /// Filters one frame (one sample per channel) and advances every
    /// window. Returns the weighted sum of squared filtered samples so
    /// callers can maintain additional windows over the same signal.
    #[inline]
    pub fn process(&mut self, frame: &[f32]) -> f64 {
        debug_assert_eq!(frame.len(), self.filters.len());
        let mut weighted = 0.0;
        for ((filter, window), (&x, &w)) in self
            .filters
            .iter_mut()
            .zip(&mut self.windows)
            .zip(frame.iter().zip(&self.weights))
        {
            let y = filter.process(f64::from(x));
            let sq = y * y;
            window.push_squared(sq);
            weighted += w * sq;
        }
        weighted
    }

    /// Weighted sum of the per-channel window mean squares.
    #[must_use]
    pub fn mean_square(&self) -> f64 {
        self.windows
            .iter()
            .zip(&self.weights)
            .map(|(window, &w)| w * window.mean())
            .sum()
    }

    /// Clears filter and window state.
    pub fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
        for window in &mut self.windows {
            window.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_sums_channel_power() {
        // Identical DC-free signals on both channels: merged power is
        // twice the per-channel power.
        let mut stereo = ChannelMerger::new(48_000.0, &[1.0, 1.0], 4_800);
        let mut mono = ChannelMerger::new(48_000.0, &[1.0], 4_800);
        for i in 0..9_600 {
            let x = (f64::from(i) * 0.13).sin() as f32;
            stereo.process(&[x, x]);
            mono.process(&[x]);
        }
        let ratio = stereo.mean_square() / mono.mean_square();
        assert!((ratio - 2.0).abs() < 1e-9, "ratio {ratio}");
    }

    #[test]
    fn surround_weight_scales_power() {
        let mut front = ChannelMerger::new(48_000.0, &[1.0], 1_000);
        let mut surround = ChannelMerger::new(48_000.0, &[1.41], 1_000);
        for i in 0..2_000 {
            let x = (f64::from(i) * 0.21).sin() as f32;
            front.process(&[x]);
            surround.process(&[x]);
        }
        let ratio = surround.mean_square() / front.mean_square();
        assert!((ratio - 1.41).abs() < 1e-9);
    }
}
