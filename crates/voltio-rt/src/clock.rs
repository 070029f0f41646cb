//! Callback timing measurement.

use std::time::Instant;

/// Monotonic microsecond clock. Abstracted so tests can drive the
/// period tracker deterministically.
pub trait ClockSource: Send {
    /// Microseconds since an arbitrary fixed origin.
    fn now_us(&mut self) -> u64;
}

/// Wall-clock source backed by [`Instant`].
pub struct StdClock {
    origin: Instant,
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl StdClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl ClockSource for StdClock {
    fn now_us(&mut self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

/// Tracks the ratio of actual to expected callback period. A ratio far
/// from 1.0 means the audio driver is delivering blocks irregularly.
pub struct PeriodTracker {
    sample_rate: f64,
    last_us: Option<u64>,
    ratio: f64,
}

impl PeriodTracker {
    #[must_use]
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            last_us: None,
            ratio: 1.0,
        }
    }

    /// Records a block callback at `now_us` covering `samples` frames
    /// and returns the period ratio (1.0 = exactly on time). The first
    /// call has no period and reports 1.0.
    pub fn on_block(&mut self, now_us: u64, samples: usize) -> f64 {
        if let Some(last) = self.last_us {
            #[allow(clippy::cast_precision_loss)]
            let actual = now_us.saturating_sub(last) as f64;
            #[allow(clippy::cast_precision_loss)]
            let expected = samples as f64 / self.sample_rate * 1e6;
            if expected > 0.0 {
                self.ratio = actual / expected;
            }
        }
        self.last_us = Some(now_us);
        self.ratio
    }

    /// Last computed period ratio.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Forgets the previous callback time.
    pub fn reset(&mut self) {
        self.last_us = None;
        self.ratio = 1.0;
    }
}
