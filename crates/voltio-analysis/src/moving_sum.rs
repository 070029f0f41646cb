//! O(1) windowed sums used by the mean-square stages.

/// Moving sum over the last `len` pushed values.
///
/// The running total is maintained by add/subtract against a stored
/// window, with a second accumulator rebuilding the sum from the fresh
/// values of the current pass. The two swap roles every time the window
/// wraps, so the total is recomputed exactly once per window and
/// floating-point drift stays bounded by a single pass.
#[derive(Debug, Clone)]
pub struct MovingSum {
    window: Vec<f64>,
    pos: usize,
    /// Running total over the last `len` values.
    active: f64,
    /// Sum of values pushed since the last wrap.
    building: f64,
}

impl MovingSum {
    /// Creates a sum over a window of `len` values, initially all zero.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero.
    #[must_use]
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "window length must be non-zero");
        Self {
            window: vec![0.0; len],
            pos: 0,
            active: 0.0,
            building: 0.0,
        }
    }

    /// Window length in values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Whether the window has length zero. Never true; present for the
    /// conventional `len`/`is_empty` pairing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Pushes a value, dropping the oldest one.
    #[inline]
    pub fn push(&mut self, value: f64) {
        self.active += value - self.window[self.pos];
        self.building += value;
        self.window[self.pos] = value;
        self.pos += 1;
        if self.pos == self.window.len() {
            self.pos = 0;
            self.active = self.building;
            self.building = 0.0;
        }
    }

    /// Sum of the last `len` values.
    #[inline]
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.active
    }

    /// Zeroes the window and both accumulators.
    pub fn reset(&mut self) {
        self.window.fill(0.0);
        self.pos = 0;
        self.active = 0.0;
        self.building = 0.0;
    }
}

/// Mean square of the last `len` samples, built on [`MovingSum`].
#[derive(Debug, Clone)]
pub struct MeanSquare {
    sum: MovingSum,
    inv_len: f64,
}

impl MeanSquare {
    /// Creates a mean-square window of `len` samples.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            sum: MovingSum::new(len),
            inv_len: 1.0 / len as f64,
        }
    }

    /// Pushes one (already weighted) squared value.
    #[inline]
    pub fn push_squared(&mut self, squared: f64) {
        self.sum.push(squared);
    }

    /// Squares and pushes one sample.
    #[inline]
    pub fn push(&mut self, sample: f64) {
        self.sum.push(sample * sample);
    }

    /// Mean square over the window.
    #[inline]
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.sum.sum() * self.inv_len
    }

    /// Window length in samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sum.len()
    }

    /// Conventional pairing for [`MeanSquare::len`]; never true.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sum.is_empty()
    }

    /// Zeroes the window.
    pub fn reset(&mut self) {
        self.sum.reset();
    }
}
