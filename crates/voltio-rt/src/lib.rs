//! Real-time audio engine for voltio.
//!
//! [`AudioEngine`] is the per-callback orchestrator: it drains bounded
//! message queues, switches processing contexts click-free through the
//! [`ProgramSwitcher`], executes the active context's flat schedule over
//! a preallocated [`BufferPack`], meters input and output into a
//! lock-free [`MeterResultSet`], and returns retired contexts to the
//! command thread. Nothing on the audio path allocates, blocks, or
//! returns errors; faults degrade to a silent block plus an automatic
//! reset.
//!
//! Construction and configuration happen off the audio thread through
//! [`EngineHandle`], which owns the sending side of every queue.

mod buffer_pack;
mod clock;
mod context;
mod engine;
mod error;
mod messages;
mod meter_result;
mod switcher;

pub use buffer_pack::BufferPack;
pub use clock::{ClockSource, PeriodTracker, StdClock};
pub use context::{CtxStep, NodeStatus, ProcInfo, ProcNode, ProcessingContext};
pub use engine::{AudioEngine, EngineConfig, EngineHandle};
pub use error::EngineError;
pub use messages::{InputEvent, InputEventKind, Msg, SwitchMode};
pub use meter_result::{MeterResultSet, CLIP_THRESHOLD};
pub use switcher::{FadePhase, ProgramSwitcher};
