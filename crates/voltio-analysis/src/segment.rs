//! Frame-boundary splitting for block-size independent gating.

/// Splits arbitrary-length blocks on fixed frame boundaries (100 ms for
/// the R128 update rate), so gating snapshots land on the same sample
/// positions no matter how the caller chops up the stream.
#[derive(Debug, Clone, Copy)]
pub struct SegmentHelper {
    frame_len: usize,
    pos: usize,
}

impl SegmentHelper {
    /// R128 gating update period in seconds.
    pub const FRAME_PERIOD: f64 = 0.1;

    /// Creates a helper with the standard 100 ms frame at the given
    /// sample rate.
    #[must_use]
    pub fn new(sample_rate: f64) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let frame_len = ((sample_rate * Self::FRAME_PERIOD).round() as usize).max(1);
        Self { frame_len, pos: 0 }
    }

    /// Frame length in samples.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Length of the next run given `remaining` unprocessed samples,
    /// and whether that run ends exactly on a frame boundary.
    pub fn next_run(&mut self, remaining: usize) -> (usize, bool) {
        debug_assert!(remaining > 0);
        let run = remaining.min(self.frame_len - self.pos);
        self.pos += run;
        let boundary = self.pos == self.frame_len;
        if boundary {
            self.pos = 0;
        }
        (run, boundary)
    }

    /// Restarts mid-frame position tracking.
    pub fn reset(&mut self) {
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_independent_of_block_size() {
        // Feed 10 frames worth of samples in odd-sized blocks and
        // collect the absolute sample positions of every boundary.
        let frame = SegmentHelper::new(480.0).frame_len();
        let total = frame * 10;
        let mut positions_a = Vec::new();
        let mut helper = SegmentHelper::new(480.0);
        let mut absolute = 0;
        for block in [7_usize, 130, 48, 313].iter().cycle() {
            if absolute >= total {
                break;
            }
            let mut remaining = (*block).min(total - absolute);
            while remaining > 0 {
                let (run, boundary) = helper.next_run(remaining);
                absolute += run;
                remaining -= run;
                if boundary {
                    positions_a.push(absolute);
                }
            }
        }
        let expected: Vec<usize> = (1..=10).map(|i| i * frame).collect();
        assert_eq!(positions_a, expected);
    }

    #[test]
    fn frame_length_follows_sample_rate() {
        assert_eq!(SegmentHelper::new(48_000.0).frame_len(), 4_800);
        assert_eq!(SegmentHelper::new(44_100.0).frame_len(), 4_410);
    }
}
