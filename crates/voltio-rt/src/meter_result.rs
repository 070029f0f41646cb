//! Lock-free meter snapshot shared with UI and telemetry threads.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use voltio_analysis::SILENCE_FLOOR;

/// Level above which a sample counts as clipped.
pub const CLIP_THRESHOLD: f32 = 1.0;

/// Float published through an `AtomicU32` bit cast, latest write wins.
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Per-channel level readings.
struct ChannelMeter {
    peak: AtomicF32,
    rms: AtomicF32,
    clip: AtomicBool,
}

impl ChannelMeter {
    fn new() -> Self {
        Self {
            peak: AtomicF32::new(0.0),
            rms: AtomicF32::new(0.0),
            clip: AtomicBool::new(false),
        }
    }
}

/// Meter values written by the audio thread, read by anyone.
///
/// Peak and RMS are latest-wins; clip flags are sticky until read.
/// There is no sequencing across fields: a reader may see peak from one
/// block and RMS from the next, which is fine for a UI meter.
pub struct MeterResultSet {
    input: [ChannelMeter; 2],
    output: [ChannelMeter; 2],
    momentary_lufs: AtomicF32,
    short_term_lufs: AtomicF32,
}

impl Default for MeterResultSet {
    fn default() -> Self {
        Self::new()
    }
}

impl MeterResultSet {
    /// Creates a zeroed meter set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            input: [ChannelMeter::new(), ChannelMeter::new()],
            output: [ChannelMeter::new(), ChannelMeter::new()],
            momentary_lufs: AtomicF32::new(SILENCE_FLOOR),
            short_term_lufs: AtomicF32::new(SILENCE_FLOOR),
        }
    }

    pub(crate) fn publish_input(&self, channel: usize, peak: f32, rms: f32) {
        let m = &self.input[channel];
        m.peak.store(peak);
        m.rms.store(rms);
        if peak > CLIP_THRESHOLD {
            m.clip.store(true, Ordering::Relaxed);
        }
    }

    pub(crate) fn publish_output(&self, channel: usize, peak: f32, rms: f32) {
        let m = &self.output[channel];
        m.peak.store(peak);
        m.rms.store(rms);
        if peak > CLIP_THRESHOLD {
            m.clip.store(true, Ordering::Relaxed);
        }
    }

    pub(crate) fn publish_loudness(&self, momentary: f32, short_term: f32) {
        self.momentary_lufs.store(momentary);
        self.short_term_lufs.store(short_term);
    }

    /// Latest input peak for a channel.
    #[must_use]
    pub fn input_peak(&self, channel: usize) -> f32 {
        self.input[channel].peak.load()
    }

    /// Latest input RMS for a channel.
    #[must_use]
    pub fn input_rms(&self, channel: usize) -> f32 {
        self.input[channel].rms.load()
    }

    /// Latest output peak for a channel.
    #[must_use]
    pub fn output_peak(&self, channel: usize) -> f32 {
        self.output[channel].peak.load()
    }

    /// Latest output RMS for a channel.
    #[must_use]
    pub fn output_rms(&self, channel: usize) -> f32 {
        self.output[channel].rms.load()
    }

    /// Consumes the input clip flag: returns whether any sample clipped
    /// since the last call and clears it.
    #[must_use]
    pub fn take_input_clip(&self, channel: usize) -> bool {
        self.input[channel].clip.swap(false, Ordering::Relaxed)
    }

    /// Consumes the output clip flag.
    #[must_use]
    pub fn take_output_clip(&self, channel: usize) -> bool {
        self.output[channel].clip.swap(false, Ordering::Relaxed)
    }

    /// Latest momentary loudness in LUFS, if loudness metering is on.
    #[must_use]
    pub fn momentary_lufs(&self) -> f32 {
        self.momentary_lufs.load()
    }

    /// Latest short-term loudness in LUFS.
    #[must_use]
    pub fn short_term_lufs(&self) -> f32 {
        self.short_term_lufs.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_is_sticky_until_read() {
        let m = MeterResultSet::new();
        m.publish_output(0, 1.4, 0.9);
        m.publish_output(0, 0.2, 0.1);
        // Peak is latest-wins but the clip survives until consumed.
        assert!((m.output_peak(0) - 0.2).abs() < 1e-7);
        assert!(m.take_output_clip(0));
        assert!(!m.take_output_clip(0));
    }

    #[test]
    fn peak_rms_latest_wins() {
        let m = MeterResultSet::new();
        m.publish_input(1, 0.5, 0.3);
        m.publish_input(1, 0.7, 0.4);
        assert!((m.input_peak(1) - 0.7).abs() < 1e-7);
        assert!((m.input_rms(1) - 0.4).abs() < 1e-7);
        assert!(!m.take_input_clip(1));
    }
}
