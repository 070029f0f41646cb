//! Gated loudness histogram for integrated loudness and loudness range.

use voltio_core::fast_log2;

/// Loudness reported for silence instead of negative infinity.
pub const SILENCE_FLOOR: f32 = -999.0;

/// `10 * log10(2)`: decibels per power-of-two of mean square.
const DB_PER_OCTAVE: f64 = 3.010_299_956_639_812;

/// Histogram resolution, about 0.012 LU per bucket.
const BUCKETS_PER_OCTAVE: usize = 256;

/// Lowest representable `log2(mean_square)`, just under the -70 LUFS
/// absolute gate.
const MIN_LOG2: f64 = -24.0;

/// Octaves covered; the top sits comfortably above full scale.
const OCTAVES: usize = 26;

const BUCKET_COUNT: usize = OCTAVES * BUCKETS_PER_OCTAVE;

/// Converts a mean-square power to LUFS. Uses the fast base-2 log;
/// the error is well under the gating bucket width.
#[must_use]
pub fn lufs_from_mean_square(msq: f64) -> f32 {
    if msq < 1e-10 {
        return SILENCE_FLOOR;
    }
    #[allow(clippy::cast_possible_truncation)]
    let log2 = f64::from(fast_log2(msq as f32));
    #[allow(clippy::cast_possible_truncation)]
    let lufs = (DB_PER_OCTAVE * log2 - 0.691) as f32;
    lufs
}

/// Inverse of [`lufs_from_mean_square`], used to turn gate thresholds
/// back into mean-square space.
#[must_use]
pub fn mean_square_from_lufs(lufs: f32) -> f64 {
    2.0_f64.powf((f64::from(lufs) + 0.691) / DB_PER_OCTAVE)
}

/// Histogram of gating-block mean squares, bucketed by `log2`.
///
/// Blocks below the -70 LUFS absolute gate are dropped on entry; the
/// relative gates of [`LoudnessHistogram::integrated`] and
/// [`LoudnessHistogram::loudness_range`] run over the stored buckets.
/// Each bucket keeps both a count and a mean-square total so gated
/// means need no second pass over the data.
#[derive(Clone)]
pub struct LoudnessHistogram {
    counts: Vec<u64>,
    msq_sums: Vec<f64>,
    count_total: u64,
    msq_total: f64,
    absolute_gate: f64,
}

impl Default for LoudnessHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LoudnessHistogram {
    /// Creates an empty histogram.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: vec![0; BUCKET_COUNT],
            msq_sums: vec![0.0; BUCKET_COUNT],
            count_total: 0,
            msq_total: 0.0,
            absolute_gate: mean_square_from_lufs(-70.0),
        }
    }

    fn bucket_index(msq: f64) -> usize {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let idx = ((f64::from(fast_log2(msq as f32)) - MIN_LOG2) * BUCKETS_PER_OCTAVE as f64)
            .max(0.0) as usize;
        idx.min(BUCKET_COUNT - 1)
    }

    /// Loudness at the lower edge of a bucket.
    fn bucket_floor_lufs(idx: usize) -> f64 {
        let log2 = MIN_LOG2 + idx as f64 / BUCKETS_PER_OCTAVE as f64;
        DB_PER_OCTAVE * log2 - 0.691
    }

    /// Adds one gating-block mean square. Blocks below the absolute
    /// gate are discarded.
    pub fn add(&mut self, msq: f64) {
        if msq < self.absolute_gate {
            return;
        }
        let idx = Self::bucket_index(msq);
        self.counts[idx] += 1;
        self.msq_sums[idx] += msq;
        self.count_total += 1;
        self.msq_total += msq;
    }

    /// Number of blocks that survived the absolute gate.
    #[must_use]
    pub fn block_count(&self) -> u64 {
        self.count_total
    }

    /// First bucket at or above a loudness threshold.
    fn gate_start(threshold_lufs: f32) -> usize {
        Self::bucket_index(mean_square_from_lufs(threshold_lufs))
    }

    /// Integrated loudness with -70 LUFS absolute and -10 LU relative
    /// gating. Returns [`SILENCE_FLOOR`] when nothing survives.
    #[must_use]
    pub fn integrated(&self) -> f32 {
        if self.count_total == 0 {
            return SILENCE_FLOOR;
        }
        #[allow(clippy::cast_precision_loss)]
        let ungated = lufs_from_mean_square(self.msq_total / self.count_total as f64);
        let start = Self::gate_start(ungated - 10.0);
        let mut count = 0_u64;
        let mut msq = 0.0;
        for idx in start..BUCKET_COUNT {
            count += self.counts[idx];
            msq += self.msq_sums[idx];
        }
        if count == 0 {
            return SILENCE_FLOOR;
        }
        #[allow(clippy::cast_precision_loss)]
        lufs_from_mean_square(msq / count as f64)
    }

    /// Loudness range in LU: -20 LU relative gate, then the spread
    /// between the 10th and 95th percentiles with linear interpolation
    /// inside a bucket. Returns `0.0` when nothing survives.
    #[must_use]
    pub fn loudness_range(&self) -> f32 {
        if self.count_total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ungated = lufs_from_mean_square(self.msq_total / self.count_total as f64);
        let start = Self::gate_start(ungated - 20.0);
        let gated_total: u64 = self.counts[start..].iter().sum();
        if gated_total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let low = self.percentile(start, 0.10 * gated_total as f64);
        #[allow(clippy::cast_precision_loss)]
        let high = self.percentile(start, 0.95 * gated_total as f64);
        #[allow(clippy::cast_possible_truncation)]
        let range = (high - low).max(0.0) as f32;
        range
    }

    /// Loudness at a cumulative-count target, assuming blocks spread
    /// evenly inside each bucket.
    fn percentile(&self, start: usize, target: f64) -> f64 {
        let width = DB_PER_OCTAVE / BUCKETS_PER_OCTAVE as f64;
        let mut cumulative = 0.0;
        for idx in start..BUCKET_COUNT {
            #[allow(clippy::cast_precision_loss)]
            let here = self.counts[idx] as f64;
            if here > 0.0 && cumulative + here >= target {
                let fraction = ((target - cumulative) / here).clamp(0.0, 1.0);
                return Self::bucket_floor_lufs(idx) + fraction * width;
            }
            cumulative += here;
        }
        Self::bucket_floor_lufs(BUCKET_COUNT - 1) + width
    }

    /// Empties the histogram.
    pub fn reset(&mut self) {
        self.counts.fill(0);
        self.msq_sums.fill(0.0);
        self.count_total = 0;
        self.msq_total = 0.0;
    }
}
