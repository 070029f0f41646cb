//! The audio-thread orchestrator.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, warn};

use voltio_analysis::LoudnessMeter;
use voltio_core::{block_mean_square, block_peak, ramp_scale};

use crate::buffer_pack::BufferPack;
use crate::clock::{ClockSource, PeriodTracker, StdClock};
use crate::context::{CtxStep, NodeStatus, ProcInfo, ProcessingContext};
use crate::error::EngineError;
use crate::messages::{InputEvent, Msg, SwitchMode};
use crate::meter_result::MeterResultSet;
use crate::switcher::{FadePhase, ProgramSwitcher};

/// Period ratio beyond which a callback is logged as a timing anomaly.
const PERIOD_ANOMALY_RATIO: f64 = 2.0;

/// Engine construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Largest block `process_block` will ever be called with.
    pub max_block_size: usize,
    /// Number of stereo buffers in the pack.
    pub buffer_count: usize,
    /// Capacity of each message queue.
    pub queue_capacity: usize,
    /// Messages drained per queue per block.
    pub drain_cap: usize,
    /// Run the full loudness chain on the output. Peak/RMS/clip
    /// metering is always on.
    pub loudness: bool,
}

impl EngineConfig {
    /// Defaults for a given sample rate.
    #[must_use]
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            max_block_size: 4_096,
            buffer_count: 8,
            queue_capacity: 64,
            drain_cap: 32,
            loudness: true,
        }
    }
}

/// Command-side handle: everything the non-audio threads use to talk
/// to a running [`AudioEngine`].
pub struct EngineHandle {
    msg_tx: Sender<Msg>,
    input_tx: Sender<InputEvent>,
    retired_rx: Receiver<Box<ProcessingContext>>,
    meters: Arc<MeterResultSet>,
}

impl EngineHandle {
    /// Sends a new processing context.
    pub fn send_context(
        &self,
        ctx: Box<ProcessingContext>,
        mode: SwitchMode,
    ) -> Result<(), EngineError> {
        self.msg_tx
            .try_send(Msg::Ctx { ctx, mode })
            .map_err(|_| EngineError::QueueFull)
    }

    /// Sends a normalized parameter change.
    pub fn send_param(&self, node: usize, index: u32, value: f32) -> Result<(), EngineError> {
        self.msg_tx
            .try_send(Msg::Param { node, index, value })
            .map_err(|_| EngineError::QueueFull)
    }

    /// Sends a tempo change.
    pub fn send_tempo(&self, bpm: f64) -> Result<(), EngineError> {
        self.msg_tx
            .try_send(Msg::Tempo { bpm })
            .map_err(|_| EngineError::QueueFull)
    }

    /// Requests a full pipeline reset.
    pub fn send_reset(&self) -> Result<(), EngineError> {
        self.msg_tx
            .try_send(Msg::Reset)
            .map_err(|_| EngineError::QueueFull)
    }

    /// Forwards a raw input-device event.
    pub fn send_input_event(&self, event: InputEvent) -> Result<(), EngineError> {
        self.input_tx
            .try_send(event)
            .map_err(|_| EngineError::QueueFull)
    }

    /// Takes one retired context, if any came back.
    #[must_use]
    pub fn try_recv_retired(&self) -> Option<Box<ProcessingContext>> {
        self.retired_rx.try_recv().ok()
    }

    /// Shared meter snapshot.
    #[must_use]
    pub fn meters(&self) -> &MeterResultSet {
        &self.meters
    }
}

/// Per-block orchestrator. Lives on the audio thread; everything in
/// [`AudioEngine::process_block`] is allocation-free and non-blocking.
pub struct AudioEngine {
    pack: BufferPack,
    switcher: ProgramSwitcher,
    meters: Arc<MeterResultSet>,
    msg_rx: Receiver<Msg>,
    input_rx: Receiver<InputEvent>,
    input_events: Vec<InputEvent>,
    loudness: Option<LoudnessMeter>,
    clock: Box<dyn ClockSource>,
    period: PeriodTracker,
    sample_rate: f64,
    max_block_size: usize,
    drain_cap: usize,
    tempo_bpm: f64,
    pending_reset: bool,
}

impl AudioEngine {
    /// Builds an engine and its command-side handle with the default
    /// wall clock.
    pub fn new(config: EngineConfig) -> Result<(Self, EngineHandle), EngineError> {
        Self::with_clock(config, Box::new(StdClock::new()))
    }

    /// Builds an engine with a caller-supplied clock.
    pub fn with_clock(
        config: EngineConfig,
        clock: Box<dyn ClockSource>,
    ) -> Result<(Self, EngineHandle), EngineError> {
        if !config.sample_rate.is_finite() || config.sample_rate <= 0.0 {
            return Err(EngineError::InvalidConfig("sample rate must be positive"));
        }
        if config.max_block_size == 0 {
            return Err(EngineError::InvalidConfig("max block size must be non-zero"));
        }
        if config.buffer_count == 0 {
            return Err(EngineError::InvalidConfig("buffer count must be non-zero"));
        }
        if config.queue_capacity == 0 || config.drain_cap == 0 {
            return Err(EngineError::InvalidConfig(
                "queue capacity and drain cap must be non-zero",
            ));
        }

        let (msg_tx, msg_rx) = bounded(config.queue_capacity);
        let (input_tx, input_rx) = bounded(config.queue_capacity);
        let (retired_tx, retired_rx) = bounded(config.queue_capacity);

        let mut pack = BufferPack::new(config.buffer_count);
        pack.set_max_block_size(config.max_block_size);

        let meters = Arc::new(MeterResultSet::new());
        let engine = Self {
            pack,
            switcher: ProgramSwitcher::new(config.sample_rate, config.queue_capacity, retired_tx),
            meters: Arc::clone(&meters),
            msg_rx,
            input_rx,
            input_events: Vec::with_capacity(config.drain_cap),
            loudness: config
                .loudness
                .then(|| LoudnessMeter::new(config.sample_rate, &[1.0, 1.0])),
            clock,
            period: PeriodTracker::new(config.sample_rate),
            sample_rate: config.sample_rate,
            max_block_size: config.max_block_size,
            drain_cap: config.drain_cap,
            tempo_bpm: 120.0,
            pending_reset: false,
        };
        let handle = EngineHandle {
            msg_tx,
            input_tx,
            retired_rx,
            meters,
        };
        Ok((engine, handle))
    }

    /// Crossfade length used for context switches, in samples.
    #[must_use]
    pub fn fade_len(&self) -> usize {
        self.switcher.fade_len()
    }

    /// Ratio of actual to expected callback period measured at the
    /// last block.
    #[must_use]
    pub fn period_ratio(&self) -> f64 {
        self.period.ratio()
    }

    fn drain_messages(&mut self) {
        for _ in 0..self.drain_cap {
            let Ok(msg) = self.msg_rx.try_recv() else {
                break;
            };
            match msg {
                Msg::Ctx { ctx, mode } => self.install_context(ctx, mode),
                Msg::Param { node, index, value } => {
                    if let Some(active) = self.switcher.active_mut() {
                        if let Some(n) = active.node_mut(node) {
                            n.set_param(index, value);
                        } else {
                            debug!(node, "parameter for unknown node dropped");
                        }
                    }
                }
                Msg::Tempo { bpm } => {
                    self.tempo_bpm = bpm;
                    if let Some(active) = self.switcher.active_mut() {
                        active.for_each_node(|n| n.set_tempo(bpm));
                    }
                }
                Msg::Reset => {
                    debug!("reset requested");
                    self.pending_reset = true;
                }
            }
        }
        self.input_events.clear();
        for _ in 0..self.drain_cap {
            let Ok(event) = self.input_rx.try_recv() else {
                break;
            };
            self.input_events.push(event);
        }
    }

    fn install_context(&mut self, mut ctx: Box<ProcessingContext>, mode: SwitchMode) {
        let verdict = ctx.validate(self.pack.buffer_count()).and_then(|()| {
            // Relative tolerance: rates that round-tripped through f32
            // still match, a genuinely different rate does not.
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            if (ctx.sample_rate() - self.sample_rate).abs() > self.sample_rate * 1e-6 {
                Err(EngineError::SampleRateMismatch {
                    context: ctx.sample_rate() as u32,
                    engine: self.sample_rate as u32,
                })
            } else {
                Ok(())
            }
        });
        if let Err(err) = verdict {
            // Rejected contexts still go back whole through the
            // retirement queue; the sender may hold state keyed to it.
            warn!(%err, "rejecting context");
            self.switcher.retire_unused(ctx);
            return;
        }
        let bpm = self.tempo_bpm;
        ctx.for_each_node(|n| n.set_tempo(bpm));
        self.switcher.install(ctx, mode);
    }

    fn reset_pipeline(&mut self) {
        debug!("pipeline reset");
        if let Some(active) = self.switcher.active_mut() {
            active.for_each_node(|n| n.reset());
        }
        self.pack.clear_all();
        if let Some(meter) = &mut self.loudness {
            meter.reset();
        }
    }

    fn meter_input(&self, left: &[f32], right: &[f32]) {
        self.meters
            .publish_input(0, block_peak(left), block_mean_square(left).sqrt());
        self.meters
            .publish_input(1, block_peak(right), block_mean_square(right).sqrt());
    }

    fn meter_output(&mut self, left: &[f32], right: &[f32]) {
        self.meters
            .publish_output(0, block_peak(left), block_mean_square(left).sqrt());
        self.meters
            .publish_output(1, block_peak(right), block_mean_square(right).sqrt());
        if let Some(meter) = &mut self.loudness {
            meter.process_block(&[left, right]);
            self.meters
                .publish_loudness(meter.momentary(), meter.short_term());
        }
    }

    /// Processes one block. Consumes exactly `left_in.len()` frames and
    /// fills both output slices completely. Never allocates, blocks or
    /// panics in release builds; a missing or faulted context produces
    /// silence.
    pub fn process_block(
        &mut self,
        left_in: &[f32],
        right_in: &[f32],
        left_out: &mut [f32],
        right_out: &mut [f32],
    ) {
        let n = left_out.len();
        debug_assert_eq!(right_out.len(), n);
        debug_assert_eq!(left_in.len(), n);
        debug_assert_eq!(right_in.len(), n);
        if n == 0 {
            return;
        }
        if n > self.max_block_size {
            warn!(n, max = self.max_block_size, "block too large, silencing");
            left_out.fill(0.0);
            right_out.fill(0.0);
            return;
        }

        let now = self.clock.now_us();
        let ratio = self.period.on_block(now, n);
        if ratio > PERIOD_ANOMALY_RATIO {
            debug!(ratio, "callback period anomaly");
        }

        self.drain_messages();
        let phase = self.switcher.begin_block();
        if self.pending_reset {
            self.reset_pipeline();
            self.pending_reset = false;
        }

        self.meter_input(left_in, right_in);

        let fade_len = self.switcher.fade_len().min(n);
        let mut fault = false;

        // Execute the schedule. The context stays inside the switcher;
        // steps index into the pack and the node list.
        let Some(ctx) = self.switcher.active_mut() else {
            left_out.fill(0.0);
            right_out.fill(0.0);
            self.meter_output(left_out, right_out);
            return;
        };
        let step_count = ctx.steps().len();
        for si in 0..step_count {
            let step = ctx.steps()[si];
            match step {
                CtxStep::CopyInput { dst } => {
                    self.pack.write_input(dst, &left_in[..n], &right_in[..n]);
                    if phase == FadePhase::FadeOut {
                        let (l, r) = self.pack.channels_mut(dst, n);
                        ramp_scale(&mut l[n - fade_len..], 1.0, 0.0);
                        ramp_scale(&mut r[n - fade_len..], 1.0, 0.0);
                    }
                }
                CtxStep::Process { node, buffer } => {
                    let (l, r) = self.pack.channels_mut(buffer, n);
                    let info = ProcInfo {
                        left: l,
                        right: r,
                        sample_rate: self.sample_rate,
                        events: &self.input_events,
                    };
                    let status = ctx
                        .node_mut(node)
                        .map_or(NodeStatus::ResetRequest, |nd| nd.process(info));
                    if status == NodeStatus::ResetRequest {
                        fault = true;
                        break;
                    }
                }
                CtxStep::Copy { dst, src } => self.pack.copy(dst, src, n),
                CtxStep::Mix { dst, src } => self.pack.mix(dst, src, n),
                CtxStep::Clear { buffer } => self.pack.clear(buffer, n),
                CtxStep::ReadOutput { src } => {
                    self.pack.read_output(src, left_out, right_out);
                    if phase == FadePhase::FadeIn {
                        ramp_scale(&mut left_out[..fade_len], 0.0, 1.0);
                        ramp_scale(&mut right_out[..fade_len], 0.0, 1.0);
                    }
                }
            }
        }

        if fault {
            warn!("node fault, silencing block and scheduling reset");
            left_out.fill(0.0);
            right_out.fill(0.0);
            self.pending_reset = true;
        }

        self.meter_output(left_out, right_out);
    }
}
