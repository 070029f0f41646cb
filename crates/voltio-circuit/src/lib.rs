//! Nonlinear analog circuit simulation at audio rate.
//!
//! Circuits are described as a netlist of [`Part`]s over user-chosen
//! node labels, prepared once for a sample rate, then stepped one
//! sample at a time. Modified nodal analysis builds the system matrix,
//! Newton-Raphson with junction step damping handles diodes and
//! transistors, and capacitors are discretized with the trapezoidal
//! rule.
//!
//! ```
//! use voltio_circuit::{DiodeModel, Part, Simulator, GROUND};
//!
//! let mut sim = Simulator::new();
//! let input = sim.add_part(Part::VoltageSource {
//!     plus: 1,
//!     minus: GROUND,
//!     volts: 0.0,
//! })?;
//! sim.add_part(Part::Resistor { a: 1, b: 2, ohms: 4_700.0 })?;
//! sim.add_part(Part::DiodePair { a: 2, b: GROUND, model: DiodeModel::silicon() })?;
//! sim.prepare(48_000.0)?;
//!
//! sim.set_source_voltage(input, 2.0);
//! let outcome = sim.process_sample();
//! assert!(outcome.converged);
//! assert!(sim.node_voltage(2) < 1.0);
//! # Ok::<(), voltio_circuit::CircuitError>(())
//! ```

mod error;
mod matrix;
mod part;
mod simulator;

pub use error::CircuitError;
pub use matrix::{MnaSystem, NodeIdx};
pub use part::{BjtParams, DiodeModel, NodeId, Part, PartId, GROUND};
pub use simulator::{
    Simulator, SolveOutcome, SolveStats, CONVERGENCE_TOLERANCE, MAX_ITERATIONS,
};

/// Thermal voltage `kT/q` at room temperature, in volts.
pub const THERMAL_VOLTAGE: f64 = 0.025_852;
