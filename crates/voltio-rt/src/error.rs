//! Setup-time errors. The audio path itself never returns errors.

use thiserror::Error;

/// Errors raised while configuring the engine or validating a
/// processing context. All of these happen off the audio thread.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// An engine configuration field outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// A context step references a buffer the pack does not have.
    #[error("buffer index {index} out of range (pack holds {count})")]
    BufferIndexOutOfRange { index: usize, count: usize },

    /// A context step references a node outside the node list.
    #[error("node index {index} out of range ({count} nodes)")]
    NodeIndexOutOfRange { index: usize, count: usize },

    /// A copy or mix step with identical source and destination.
    #[error("step {step} copies buffer {buffer} onto itself")]
    AliasedBuffers { step: usize, buffer: usize },

    /// The context was built for a different sample rate than the
    /// engine runs at.
    #[error("context sample rate {context} does not match engine rate {engine}")]
    SampleRateMismatch { context: u32, engine: u32 },

    /// A bounded queue rejected a message.
    #[error("message queue is full")]
    QueueFull,
}
