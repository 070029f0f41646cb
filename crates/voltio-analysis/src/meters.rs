//! The full loudness meter: momentary, short-term, integrated, range
//! and sample peak in one incremental pass.

use crate::channel::ChannelMerger;
use crate::histogram::{lufs_from_mean_square, LoudnessHistogram, SILENCE_FLOOR};
use crate::moving_sum::MeanSquare;
use crate::segment::SegmentHelper;

/// Momentary loudness window in seconds.
pub const MOMENTARY_SECONDS: f64 = 0.4;

/// Short-term loudness window in seconds.
pub const SHORT_TERM_SECONDS: f64 = 3.0;

/// Incremental BS.1770 / R128 meter.
///
/// Feed audio in blocks of any size; all measurements update at the
/// 100 ms gating boundary and are available at any time, no finalize
/// step. Gating blocks are 400 ms mean squares taken every 100 ms
/// (75 percent overlap); loudness range gates over the 3 s short-term
/// values per R128. Internal accumulation is `f64`, outputs are `f32`.
pub struct LoudnessMeter {
    merger: ChannelMerger,
    short_term_window: MeanSquare,
    segmenter: SegmentHelper,
    integrated_hist: LoudnessHistogram,
    range_hist: LoudnessHistogram,
    frame: Vec<f32>,
    samples_seen: u64,
    momentary_len: u64,
    short_term_len: u64,
    momentary_lufs: f32,
    short_term_lufs: f32,
    peak: f32,
}

impl LoudnessMeter {
    /// Creates a meter for `weights.len()` channels.
    #[must_use]
    pub fn new(sample_rate: f64, weights: &[f64]) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let momentary_len = ((sample_rate * MOMENTARY_SECONDS).round() as usize).max(1);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let short_term_len = ((sample_rate * SHORT_TERM_SECONDS).round() as usize).max(1);
        Self {
            merger: ChannelMerger::new(sample_rate, weights, momentary_len),
            short_term_window: MeanSquare::new(short_term_len),
            segmenter: SegmentHelper::new(sample_rate),
            integrated_hist: LoudnessHistogram::new(),
            range_hist: LoudnessHistogram::new(),
            frame: vec![0.0; weights.len()],
            samples_seen: 0,
            momentary_len: momentary_len as u64,
            short_term_len: short_term_len as u64,
            momentary_lufs: SILENCE_FLOOR,
            short_term_lufs: SILENCE_FLOOR,
            peak: 0.0,
        }
    }

    /// Number of channels the meter was built for.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.merger.channels()
    }

    /// Feeds one block, one slice per channel, all the same length.
    pub fn process_block(&mut self, channels: &[&[f32]]) {
        debug_assert_eq!(channels.len(), self.channels());
        let Some(len) = channels.first().map(|c| c.len()) else {
            return;
        };
        debug_assert!(channels.iter().all(|c| c.len() == len));
        if len == 0 {
            return;
        }

        let mut offset = 0;
        while offset < len {
            let (run, boundary) = self.segmenter.next_run(len - offset);
            for i in offset..offset + run {
                for (slot, channel) in self.frame.iter_mut().zip(channels) {
                    let x = channel[i];
                    self.peak = self.peak.max(x.abs());
                    *slot = x;
                }
                let weighted_sq = self.merger.process(&self.frame);
                self.short_term_window.push_squared(weighted_sq);
            }
            self.samples_seen += run as u64;
            if boundary {
                self.snapshot();
            }
            offset += run;
        }
    }

    /// Takes the 100 ms gating snapshot: refreshes the windowed
    /// readings and feeds both histograms once their window is full.
    fn snapshot(&mut self) {
        let momentary = self.merger.mean_square();
        self.momentary_lufs = lufs_from_mean_square(momentary);
        if self.samples_seen >= self.momentary_len {
            self.integrated_hist.add(momentary);
        }
        let short = self.short_term_window.mean();
        self.short_term_lufs = lufs_from_mean_square(short);
        if self.samples_seen >= self.short_term_len {
            self.range_hist.add(short);
        }
    }

    /// Momentary loudness (400 ms) in LUFS at the last gating boundary.
    #[must_use]
    pub fn momentary(&self) -> f32 {
        self.momentary_lufs
    }

    /// Short-term loudness (3 s) in LUFS at the last gating boundary.
    #[must_use]
    pub fn short_term(&self) -> f32 {
        self.short_term_lufs
    }

    /// Gated integrated loudness in LUFS over everything fed so far.
    #[must_use]
    pub fn integrated(&self) -> f32 {
        self.integrated_hist.integrated()
    }

    /// Loudness range in LU over everything fed so far.
    #[must_use]
    pub fn loudness_range(&self) -> f32 {
        self.range_hist.loudness_range()
    }

    /// Highest absolute sample value seen since the last reset.
    #[must_use]
    pub fn sample_peak(&self) -> f32 {
        self.peak
    }

    /// Clears all measurement state.
    pub fn reset(&mut self) {
        self.merger.reset();
        self.short_term_window.reset();
        self.segmenter.reset();
        self.integrated_hist.reset();
        self.range_hist.reset();
        self.samples_seen = 0;
        self.momentary_lufs = SILENCE_FLOOR;
        self.short_term_lufs = SILENCE_FLOOR;
        self.peak = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_reads_floor() {
        let mut meter = LoudnessMeter::new(48_000.0, &[1.0, 1.0]);
        let silence = vec![0.0_f32; 48_000];
        meter.process_block(&[&silence, &silence]);
        assert_eq!(meter.momentary(), SILENCE_FLOOR);
        assert_eq!(meter.integrated(), SILENCE_FLOOR);
        assert_eq!(meter.loudness_range(), 0.0);
        assert_eq!(meter.sample_peak(), 0.0);
    }

    #[test]
    fn peak_tracks_raw_samples() {
        let mut meter = LoudnessMeter::new(48_000.0, &[1.0]);
        let mut block = vec![0.0_f32; 4_800];
        block[123] = -0.8;
        block[999] = 0.6;
        meter.process_block(&[&block]);
        assert!((meter.sample_peak() - 0.8).abs() < 1e-7);
    }

    #[test]
    fn empty_block_is_a_no_op() {
        let mut meter = LoudnessMeter::new(48_000.0, &[1.0]);
        meter.process_block(&[&[]]);
        assert_eq!(meter.momentary(), SILENCE_FLOOR);
    }
}
