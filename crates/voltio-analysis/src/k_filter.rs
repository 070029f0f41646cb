//! ITU-R BS.1770 K-weighting filter.
//!
//! The standard publishes z-domain coefficients that are only valid at
//! 48 kHz. Both stages are therefore re-derived from the analog
//! prototype behind that table (a high shelf and a high pass with fixed
//! center frequency, gain and Q) via the bilinear transform, which
//! reproduces the published table at 48 kHz and stays on the intended
//! response at any other rate.

/// High-shelf prototype: center frequency, gain and Q recovered from
/// the 48 kHz table.
const SHELF_HZ: f64 = 1_681.974_450_955_533;
const SHELF_DB: f64 = 3.999_843_853_973_347;
const SHELF_Q: f64 = 0.707_175_236_955_419_6;

/// High-pass prototype.
const HIGHPASS_HZ: f64 = 38.135_470_876_024_44;
const HIGHPASS_Q: f64 = 0.500_327_037_323_877_3;

/// Exponent relating the shelf's mid-band gain to its peak gain in the
/// prototype derivation.
const SHELF_VB_EXPONENT: f64 = 0.499_666_774_154_541_6;

/// Direct-form biquad in `f64` (transposed form II).
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

fn shelf_stage(sample_rate: f64) -> Biquad {
    let vh = 10.0_f64.powf(SHELF_DB / 20.0);
    let vb = vh.powf(SHELF_VB_EXPONENT);
    let k = (std::f64::consts::PI * SHELF_HZ / sample_rate).tan();
    let k2 = k * k;
    let kq = k / SHELF_Q;
    let a0 = 1.0 + kq + k2;
    Biquad {
        b0: (vh + vb * kq + k2) / a0,
        b1: 2.0 * (k2 - vh) / a0,
        b2: (vh - vb * kq + k2) / a0,
        a1: 2.0 * (k2 - 1.0) / a0,
        a2: (1.0 - kq + k2) / a0,
        z1: 0.0,
        z2: 0.0,
    }
}

fn highpass_stage(sample_rate: f64) -> Biquad {
    let k = (std::f64::consts::PI * HIGHPASS_HZ / sample_rate).tan();
    let k2 = k * k;
    let kq = k / HIGHPASS_Q;
    let a0 = 1.0 + kq + k2;
    Biquad {
        b0: 1.0,
        b1: -2.0,
        b2: 1.0,
        a1: 2.0 * (k2 - 1.0) / a0,
        a2: (1.0 - kq + k2) / a0,
        z1: 0.0,
        z2: 0.0,
    }
}

/// Two-stage K-weighting filter for one channel.
#[derive(Debug, Clone, Copy)]
pub struct KWeighting {
    shelf: Biquad,
    highpass: Biquad,
}

impl KWeighting {
    /// Builds the cascade for `sample_rate`.
    #[must_use]
    pub fn new(sample_rate: f64) -> Self {
        Self {
            shelf: shelf_stage(sample_rate),
            highpass: highpass_stage(sample_rate),
        }
    }

    /// Filters one sample.
    #[inline]
    #[must_use]
    pub fn process(&mut self, x: f64) -> f64 {
        self.highpass.process(self.shelf.process(x))
    }

    /// Clears filter state without touching coefficients.
    pub fn reset(&mut self) {
        self.shelf.reset();
        self.highpass.reset();
    }
}
