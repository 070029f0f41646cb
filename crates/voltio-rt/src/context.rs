//! Processing contexts: the plugin graph the audio thread executes.

use crate::error::EngineError;
use crate::messages::InputEvent;

/// Outcome of one node processing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Block processed normally.
    Ok,
    /// The node hit an internal fault. The engine silences the block
    /// and schedules a full pipeline reset for the next one.
    ResetRequest,
}

/// Everything a node sees for one block: its stereo working buffer in
/// place, the engine sample rate and the raw input events drained this
/// block (uninterpreted by the engine, forwarded for nodes that map
/// hardware controls themselves).
pub struct ProcInfo<'a> {
    /// Left channel, processed in place.
    pub left: &'a mut [f32],
    /// Right channel, processed in place.
    pub right: &'a mut [f32],
    /// Engine sample rate in Hz.
    pub sample_rate: f64,
    /// Input-device events drained this block.
    pub events: &'a [InputEvent],
}

/// A DSP node in the processing graph.
///
/// `process` runs on the audio thread and must not allocate or block.
pub trait ProcNode: Send {
    /// Processes one block in place.
    fn process(&mut self, info: ProcInfo<'_>) -> NodeStatus;

    /// Normalized parameter update, `value` in `[0, 1]`.
    fn set_param(&mut self, index: u32, value: f32) {
        let _ = (index, value);
    }

    /// Host tempo update.
    fn set_tempo(&mut self, bpm: f64) {
        let _ = bpm;
    }

    /// Drops all internal state (filter histories, circuit charge).
    fn reset(&mut self);
}

/// One instruction of the flattened processing schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtxStep {
    /// Copy the engine input channels into a buffer.
    CopyInput { dst: usize },
    /// Run a node in place on a buffer.
    Process { node: usize, buffer: usize },
    /// Copy one buffer to another.
    Copy { dst: usize, src: usize },
    /// Add one buffer into another.
    Mix { dst: usize, src: usize },
    /// Zero a buffer.
    Clear { buffer: usize },
    /// Copy a buffer to the engine output channels.
    ReadOutput { src: usize },
}

/// A fully prepared processing graph for one sample rate.
///
/// Built off the audio thread, sent to the engine as an owned box, and
/// returned whole through the retirement queue once the engine stops
/// using it. The audio thread only ever executes it; it never builds
/// or frees one.
pub struct ProcessingContext {
    nodes: Vec<Box<dyn ProcNode>>,
    steps: Vec<CtxStep>,
    sample_rate: f64,
}

impl ProcessingContext {
    /// Creates an empty context for `sample_rate`.
    #[must_use]
    pub fn new(sample_rate: f64) -> Self {
        Self {
            nodes: Vec::new(),
            steps: Vec::new(),
            sample_rate,
        }
    }

    /// Adds a node, returning its index for [`CtxStep::Process`] and
    /// parameter messages.
    pub fn add_node(&mut self, node: Box<dyn ProcNode>) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Appends a schedule step.
    pub fn push_step(&mut self, step: CtxStep) {
        self.steps.push(step);
    }

    /// Sample rate the graph was prepared for.
    #[must_use]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn steps(&self) -> &[CtxStep] {
        &self.steps
    }

    pub(crate) fn node_mut(&mut self, index: usize) -> Option<&mut Box<dyn ProcNode>> {
        self.nodes.get_mut(index)
    }

    pub(crate) fn for_each_node(&mut self, mut f: impl FnMut(&mut dyn ProcNode)) {
        for node in &mut self.nodes {
            f(node.as_mut());
        }
    }

    /// Checks every step against the engine's buffer pack and this
    /// context's node list. Run at install time, off the hot path.
    pub fn validate(&self, buffer_count: usize) -> Result<(), EngineError> {
        let check_buf = |index: usize| {
            if index < buffer_count {
                Ok(())
            } else {
                Err(EngineError::BufferIndexOutOfRange {
                    index,
                    count: buffer_count,
                })
            }
        };
        for (i, step) in self.steps.iter().enumerate() {
            match *step {
                CtxStep::CopyInput { dst } => check_buf(dst)?,
                CtxStep::Clear { buffer } => check_buf(buffer)?,
                CtxStep::ReadOutput { src } => check_buf(src)?,
                CtxStep::Process { node, buffer } => {
                    check_buf(buffer)?;
                    if node >= self.nodes.len() {
                        return Err(EngineError::NodeIndexOutOfRange {
                            index: node,
                            count: self.nodes.len(),
                        });
                    }
                }
                CtxStep::Copy { dst, src } | CtxStep::Mix { dst, src } => {
                    check_buf(dst)?;
                    check_buf(src)?;
                    if dst == src {
                        return Err(EngineError::AliasedBuffers {
                            step: i,
                            buffer: dst,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
