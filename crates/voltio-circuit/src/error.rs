//! Error type for circuit construction and preparation.

use thiserror::Error;

use crate::part::{NodeId, PartId};

/// Errors raised while building or preparing a circuit. The per-sample
/// solve path never returns errors; numerical trouble at audio rate is
/// reported through [`crate::SolveOutcome`] instead.
#[derive(Debug, Error, PartialEq)]
pub enum CircuitError {
    /// `prepare` was called on a simulator with no parts.
    #[error("circuit has no parts")]
    EmptyCircuit,

    /// `prepare` was called twice.
    #[error("circuit is already prepared")]
    AlreadyPrepared,

    /// A part was added after `prepare`.
    #[error("cannot add parts after prepare")]
    Sealed,

    /// A part value outside its physical range, e.g. a non-positive
    /// resistance or capacitance.
    #[error("part {part:?} has an invalid value")]
    InvalidValue { part: PartId },

    /// A CCCS control handle that does not refer to a voltage source.
    #[error("CCCS control {ctrl:?} is not a voltage source")]
    InvalidControl { ctrl: PartId },

    /// The circuit references no node besides ground, or a node is
    /// used only by parts that cannot define its voltage.
    #[error("node {node} has no connection to the rest of the circuit")]
    FloatingNode { node: NodeId },

    /// A non-positive sample rate was passed to `prepare`.
    #[error("sample rate {0} is not positive")]
    InvalidSampleRate(f64),
}
