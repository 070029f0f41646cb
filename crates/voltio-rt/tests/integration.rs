//! Engine-level tests: context lifecycle, crossfades, fault recovery
//! and a full circuit-simulation node driven through the schedule.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use voltio_circuit::{DiodeModel, Part, PartId, Simulator, GROUND};
use voltio_rt::{
    AudioEngine, CtxStep, EngineConfig, EngineHandle, NodeStatus, ProcInfo, ProcNode,
    ProcessingContext, SwitchMode,
};

fn engine(sample_rate: f64) -> (AudioEngine, EngineHandle) {
    let config = EngineConfig {
        loudness: false,
        ..EngineConfig::new(sample_rate)
    };
    AudioEngine::new(config).expect("engine config is valid")
}

struct Gain {
    gain: f32,
    resets: Arc<AtomicUsize>,
}

impl Gain {
    fn new(gain: f32) -> Self {
        Self {
            gain,
            resets: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ProcNode for Gain {
    fn process(&mut self, info: ProcInfo<'_>) -> NodeStatus {
        for x in info.left.iter_mut() {
            *x *= self.gain;
        }
        for x in info.right.iter_mut() {
            *x *= self.gain;
        }
        NodeStatus::Ok
    }

    fn set_param(&mut self, _index: u32, value: f32) {
        self.gain = value;
    }

    fn reset(&mut self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }
}

fn gain_ctx(sample_rate: f64, gain: f32) -> Box<ProcessingContext> {
    let mut ctx = ProcessingContext::new(sample_rate);
    let node = ctx.add_node(Box::new(Gain::new(gain)));
    ctx.push_step(CtxStep::CopyInput { dst: 0 });
    ctx.push_step(CtxStep::Process { node, buffer: 0 });
    ctx.push_step(CtxStep::ReadOutput { src: 0 });
    Box::new(ctx)
}

fn run_block(engine: &mut AudioEngine, input: f32, n: usize) -> Vec<f32> {
    let left_in = vec![input; n];
    let right_in = vec![input; n];
    let mut left_out = vec![0.0; n];
    let mut right_out = vec![0.0; n];
    engine.process_block(&left_in, &right_in, &mut left_out, &mut right_out);
    left_out
}

#[test]
fn no_context_means_silence() {
    let (mut engine, _handle) = engine(48_000.0);
    let out = run_block(&mut engine, 1.0, 64);
    assert!(out.iter().all(|&x| x == 0.0));
}

#[test]
fn gain_chain_processes_input() {
    let (mut engine, handle) = engine(48_000.0);
    handle
        .send_context(gain_ctx(48_000.0, 0.5), SwitchMode::Direct)
        .unwrap();
    let out = run_block(&mut engine, 1.0, 64);
    assert!(out.iter().all(|&x| (x - 0.5).abs() < 1e-6));
}

#[test]
fn every_context_sent_is_eventually_returned() {
    let (mut engine, handle) = engine(48_000.0);
    let sent = 5;
    for _ in 0..sent {
        handle
            .send_context(gain_ctx(48_000.0, 1.0), SwitchMode::Direct)
            .unwrap();
    }
    run_block(&mut engine, 0.0, 64);
    let mut returned = 0;
    while handle.try_recv_retired().is_some() {
        returned += 1;
    }
    // One context is still live; dropping the engine sends it home.
    assert_eq!(returned, sent - 1);
    drop(engine);
    while handle.try_recv_retired().is_some() {
        returned += 1;
    }
    assert_eq!(returned, sent);
}

#[test]
fn crossfade_switch_is_continuous() {
    let (mut engine, handle) = engine(48_000.0);
    let fade_len = engine.fade_len();
    let n = 128;
    assert!(fade_len <= n);

    handle
        .send_context(gain_ctx(48_000.0, 0.5), SwitchMode::Direct)
        .unwrap();
    let mut stream = run_block(&mut engine, 1.0, n);
    handle
        .send_context(gain_ctx(48_000.0, 0.25), SwitchMode::FadeOutIn)
        .unwrap();
    for _ in 0..3 {
        stream.extend(run_block(&mut engine, 1.0, n));
    }

    // No per-sample jump can exceed the fade ramp rate at the louder
    // program's level.
    #[allow(clippy::cast_precision_loss)]
    let bound = 0.5 / fade_len as f32 + 1e-4;
    for pair in stream.windows(2) {
        let delta = (pair[1] - pair[0]).abs();
        assert!(delta <= bound, "delta {delta} exceeds {bound}");
    }
    // It ends up on the new program.
    assert!((stream.last().unwrap() - 0.25).abs() < 1e-6);
    // The old context came back through the retirement queue.
    assert!(handle.try_recv_retired().is_some());
}

struct Faulty {
    armed: bool,
    resets: Arc<AtomicUsize>,
}

impl ProcNode for Faulty {
    fn process(&mut self, info: ProcInfo<'_>) -> NodeStatus {
        if self.armed {
            self.armed = false;
            return NodeStatus::ResetRequest;
        }
        for x in info.left.iter_mut() {
            *x += 0.1;
        }
        for x in info.right.iter_mut() {
            *x += 0.1;
        }
        NodeStatus::Ok
    }

    fn reset(&mut self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn node_fault_silences_block_then_resets() {
    let (mut engine, handle) = engine(48_000.0);
    let resets = Arc::new(AtomicUsize::new(0));
    let mut ctx = ProcessingContext::new(48_000.0);
    let node = ctx.add_node(Box::new(Faulty {
        armed: true,
        resets: Arc::clone(&resets),
    }));
    ctx.push_step(CtxStep::CopyInput { dst: 0 });
    ctx.push_step(CtxStep::Process { node, buffer: 0 });
    ctx.push_step(CtxStep::ReadOutput { src: 0 });
    handle.send_context(Box::new(ctx), SwitchMode::Direct).unwrap();

    // Fault block: silence, no reset yet.
    let out = run_block(&mut engine, 0.5, 64);
    assert!(out.iter().all(|&x| x == 0.0));
    assert_eq!(resets.load(Ordering::Relaxed), 0);

    // Next block: reset ran, processing is back.
    let out = run_block(&mut engine, 0.5, 64);
    assert_eq!(resets.load(Ordering::Relaxed), 1);
    assert!(out.iter().all(|&x| (x - 0.6).abs() < 1e-6));
}

#[test]
fn param_messages_reach_the_node() {
    let (mut engine, handle) = engine(48_000.0);
    handle
        .send_context(gain_ctx(48_000.0, 1.0), SwitchMode::Direct)
        .unwrap();
    run_block(&mut engine, 1.0, 32);
    handle.send_param(0, 0, 0.125).unwrap();
    let out = run_block(&mut engine, 1.0, 32);
    assert!(out.iter().all(|&x| (x - 0.125).abs() < 1e-6));
}

struct TempoProbe {
    bpm_bits: Arc<AtomicU32>,
}

impl ProcNode for TempoProbe {
    fn process(&mut self, _info: ProcInfo<'_>) -> NodeStatus {
        NodeStatus::Ok
    }

    fn set_tempo(&mut self, bpm: f64) {
        #[allow(clippy::cast_possible_truncation)]
        self.bpm_bits.store((bpm as f32).to_bits(), Ordering::Relaxed);
    }

    fn reset(&mut self) {}
}

#[test]
fn tempo_broadcast_reaches_nodes() {
    let (mut engine, handle) = engine(48_000.0);
    let bpm_bits = Arc::new(AtomicU32::new(0));
    let mut ctx = ProcessingContext::new(48_000.0);
    ctx.add_node(Box::new(TempoProbe {
        bpm_bits: Arc::clone(&bpm_bits),
    }));
    handle.send_context(Box::new(ctx), SwitchMode::Direct).unwrap();
    run_block(&mut engine, 0.0, 16);
    handle.send_tempo(93.5).unwrap();
    run_block(&mut engine, 0.0, 16);
    let bpm = f32::from_bits(bpm_bits.load(Ordering::Relaxed));
    assert!((bpm - 93.5).abs() < 1e-4);
}

#[test]
fn invalid_context_comes_straight_back() {
    let (mut engine, handle) = engine(48_000.0);
    let mut ctx = ProcessingContext::new(48_000.0);
    ctx.push_step(CtxStep::Clear { buffer: 99 });
    handle.send_context(Box::new(ctx), SwitchMode::Direct).unwrap();
    let out = run_block(&mut engine, 1.0, 32);
    // Rejected: engine stays silent and the context is returned.
    assert!(out.iter().all(|&x| x == 0.0));
    assert!(handle.try_recv_retired().is_some());
}

#[test]
fn f32_derived_sample_rate_is_accepted() {
    // A context whose rate round-tripped through f32 differs from the
    // engine rate in the low bits; it must still install.
    let (mut engine, handle) = engine(48_000.1);
    handle
        .send_context(gain_ctx(f64::from(48_000.1_f32), 0.5), SwitchMode::Direct)
        .unwrap();
    let out = run_block(&mut engine, 1.0, 32);
    assert!(out.iter().all(|&x| (x - 0.5).abs() < 1e-6));
    assert!(handle.try_recv_retired().is_none());

    // A genuinely different rate is still rejected.
    handle
        .send_context(gain_ctx(44_100.0, 0.5), SwitchMode::Direct)
        .unwrap();
    let out = run_block(&mut engine, 1.0, 32);
    assert!(out.iter().all(|&x| (x - 0.5).abs() < 1e-6));
    assert!(handle.try_recv_retired().is_some());
}

#[test]
fn output_meters_and_clip_flag() {
    let (mut engine, handle) = engine(48_000.0);
    handle
        .send_context(gain_ctx(48_000.0, 2.0), SwitchMode::Direct)
        .unwrap();
    run_block(&mut engine, 0.75, 64);
    let meters = handle.meters();
    assert!((meters.output_peak(0) - 1.5).abs() < 1e-5);
    assert!(meters.take_output_clip(0));
    assert!(!meters.take_output_clip(0));
    assert!((meters.input_peak(0) - 0.75).abs() < 1e-5);
    assert!(!meters.take_input_clip(0));
}

/// Diode-clamped RC network as a processing node: +1 V drive clips at
/// the diode knee instead of passing through, and the capacitor sets
/// the decay after the drive stops.
struct ClipperNode {
    sim: Simulator,
    input: PartId,
}

impl ClipperNode {
    fn new(sample_rate: f64) -> Self {
        let mut sim = Simulator::new();
        let input = sim
            .add_part(Part::VoltageSource {
                plus: 1,
                minus: GROUND,
                volts: 0.0,
            })
            .unwrap();
        sim.add_part(Part::Resistor {
            a: 1,
            b: 2,
            ohms: 1_000.0,
        })
        .unwrap();
        sim.add_part(Part::Capacitor {
            a: 2,
            b: GROUND,
            farads: 47e-9,
        })
        .unwrap();
        sim.add_part(Part::DiodePair {
            a: 2,
            b: GROUND,
            model: DiodeModel::silicon(),
        })
        .unwrap();
        sim.prepare(sample_rate).unwrap();
        Self { sim, input }
    }
}

impl ProcNode for ClipperNode {
    fn process(&mut self, info: ProcInfo<'_>) -> NodeStatus {
        for i in 0..info.left.len() {
            self.sim.set_source_voltage(self.input, f64::from(info.left[i]));
            self.sim.process_sample();
            #[allow(clippy::cast_possible_truncation)]
            let v = self.sim.node_voltage(2) as f32;
            info.left[i] = v;
            info.right[i] = v;
        }
        NodeStatus::Ok
    }

    fn reset(&mut self) {
        self.sim.clear_buffers();
    }
}

#[test]
fn end_to_end_diode_clamp_and_rc_decay() {
    let (mut engine, handle) = engine(48_000.0);
    let mut ctx = ProcessingContext::new(48_000.0);
    let node = ctx.add_node(Box::new(ClipperNode::new(48_000.0)));
    ctx.push_step(CtxStep::CopyInput { dst: 0 });
    ctx.push_step(CtxStep::Process { node, buffer: 0 });
    ctx.push_step(CtxStep::ReadOutput { src: 0 });
    handle.send_context(Box::new(ctx), SwitchMode::Direct).unwrap();

    let n = 64;
    let mut left_in = vec![0.0_f32; n];
    let mut right_in = vec![0.0_f32; n];
    for i in 0..4 {
        left_in[i] = 1.0;
        right_in[i] = 1.0;
    }
    let mut left_out = vec![0.0; n];
    let mut right_out = vec![0.0; n];
    engine.process_block(&left_in, &right_in, &mut left_out, &mut right_out);

    // The +1 V drive never reaches the output; the diode pair clamps
    // it at the knee.
    let peak = left_out.iter().fold(0.0_f32, |a, &b| a.max(b));
    assert!(peak < 0.9, "peak {peak} not clamped");
    assert!(peak > 0.4, "peak {peak} suspiciously low");
    assert!(left_out[3] > 0.4, "still driven at sample 3");

    // After the drive the capacitor discharges toward zero,
    // monotonically once the diode is out of conduction.
    for i in 5..20 {
        assert!(
            left_out[i] <= left_out[i - 1] + 1e-6,
            "decay not monotonic at {i}"
        );
    }
    assert!(left_out[20].abs() < 0.05, "tail {}", left_out[20]);
    // RC is about 2.3 samples here: successive tail samples shrink by
    // a stable factor well below 1.
    let r1 = left_out[6] / left_out[5];
    assert!(r1 > 0.0 && r1 < 0.9, "decay ratio {r1}");
}
