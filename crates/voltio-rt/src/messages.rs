//! Cross-thread message types.
//!
//! All queues are bounded `crossbeam-channel` channels created at setup
//! time. The audio thread only ever uses the non-blocking `try_*`
//! operations on them; senders see [`crate::EngineError::QueueFull`]
//! instead of blocking when a queue is saturated.

use crate::context::ProcessingContext;

/// How a new context replaces the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchMode {
    /// Swap immediately, no fade. Audible click possible; intended for
    /// setup, not live switching.
    Direct,
    /// Short crossfade: the outgoing context's input is faded out over
    /// one block, the incoming context's output faded in at the next.
    FadeOutIn,
}

/// Command-thread message to the audio thread.
pub enum Msg {
    /// Install a new processing context.
    Ctx {
        ctx: Box<ProcessingContext>,
        mode: SwitchMode,
    },
    /// Normalized parameter change for one node of the active context.
    Param { node: usize, index: u32, value: f32 },
    /// Tempo change, broadcast to every node.
    Tempo { bpm: f64 },
    /// Full pipeline reset at the next block boundary.
    Reset,
}

/// Physical control kind of an input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEventKind {
    /// Momentary or latching footswitch.
    Switch,
    /// Detented rotary encoder, `value` is the signed step count.
    Rotary,
    /// Continuous potentiometer, `value` in `[0, 1]`.
    Pot,
}

/// Raw event from the input-device thread. The engine does not
/// interpret these; they are forwarded to the nodes with their
/// timestamps intact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputEvent {
    /// What kind of control produced the event.
    pub kind: InputEventKind,
    /// Control index on the device.
    pub index: u32,
    /// Kind-dependent payload.
    pub value: f32,
    /// Capture time in microseconds, device clock.
    pub timestamp_us: u64,
}
