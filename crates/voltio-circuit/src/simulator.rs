//! Sample-rate circuit simulator built on the MNA system.
//!
//! The simulator is used in two phases. Parts are added with
//! [`Simulator::add_part`], then [`Simulator::prepare`] flattens
//! compound devices, assigns matrix rows and discretizes capacitors.
//! After that [`Simulator::process_sample`] runs one Newton-Raphson
//! solve per audio sample and never allocates or returns errors; a
//! sample that fails to converge or hits a singular matrix is reported
//! through [`SolveOutcome`] while the previous solution is held.

use std::collections::BTreeMap;

use crate::error::CircuitError;
use crate::matrix::{MnaSystem, NodeIdx};
use crate::part::{BjtParams, DiodeModel, NodeId, Part, PartId, GROUND};

/// Hard cap on Newton iterations per sample.
pub const MAX_ITERATIONS: u32 = 500;

/// Elementwise convergence tolerance on the solution vector, in volts
/// and amperes. Loose on purpose: at audio rate a coarse solution one
/// sample early beats a stalled iteration.
pub const CONVERGENCE_TOLERANCE: f64 = 0.15;

/// Result of one per-sample solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveOutcome {
    /// Whether the Newton iteration met the tolerance. A `false` here
    /// is not fatal; the best available solution was committed.
    pub converged: bool,
    /// Iterations spent on this sample (1 for linear circuits).
    pub iterations: u32,
}

/// Running counters across all processed samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveStats {
    /// Samples processed since the last reset.
    pub samples: u64,
    /// Total Newton iterations across all samples.
    pub total_iterations: u64,
    /// Samples that exhausted [`MAX_ITERATIONS`].
    pub non_converged: u64,
    /// Samples where factorization went singular mid-run.
    pub singular: u64,
    /// Largest iteration count seen on a single sample.
    pub max_iterations: u32,
}

/// Flattened primitive with per-sample state. Produced from [`Part`]s
/// at prepare time; compound parts expand to several primitives.
enum Prim {
    Conductance {
        a: NodeIdx,
        b: NodeIdx,
        g: f64,
    },
    Capacitor {
        a: NodeIdx,
        b: NodeIdx,
        /// Trapezoidal companion conductance `2C / dt`.
        g: f64,
        ieq: f64,
    },
    VoltageSource {
        plus: NodeIdx,
        minus: NodeIdx,
        branch: usize,
        volts: f64,
    },
    CurrentSource {
        plus: NodeIdx,
        minus: NodeIdx,
        amps: f64,
    },
    Diode {
        anode: NodeIdx,
        cathode: NodeIdx,
        model: DiodeModel,
        v_op: f64,
    },
    DiodePair {
        a: NodeIdx,
        b: NodeIdx,
        model: DiodeModel,
        v_op: f64,
    },
    Vccs {
        plus: NodeIdx,
        minus: NodeIdx,
        ctrl_plus: NodeIdx,
        ctrl_minus: NodeIdx,
        gm: f64,
    },
    Vcvs {
        plus: NodeIdx,
        minus: NodeIdx,
        ctrl_plus: NodeIdx,
        ctrl_minus: NodeIdx,
        branch: usize,
        gain: f64,
    },
    Cccs {
        plus: NodeIdx,
        minus: NodeIdx,
        ctrl_branch: usize,
        gain: f64,
    },
    BjtSimple {
        collector: NodeIdx,
        base: NodeIdx,
        emitter: NodeIdx,
        params: BjtParams,
        v_be: f64,
        v_bc: f64,
    },
}

/// Nonlinear circuit simulator stepping at audio rate.
pub struct Simulator {
    parts: Vec<Part>,
    prims: Vec<Prim>,
    /// First primitive produced by each part, for source updates.
    part_prim: Vec<usize>,
    node_rows: BTreeMap<NodeId, usize>,
    sys: MnaSystem,
    last_solution: Vec<f64>,
    prev_iter: Vec<f64>,
    has_nonlinear: bool,
    prepared: bool,
    stats: SolveStats,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    /// Creates an empty simulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parts: Vec::new(),
            prims: Vec::new(),
            part_prim: Vec::new(),
            node_rows: BTreeMap::new(),
            sys: MnaSystem::new(0, 0),
            last_solution: Vec::new(),
            prev_iter: Vec::new(),
            has_nonlinear: false,
            prepared: false,
            stats: SolveStats::default(),
        }
    }

    /// Adds a part and returns its handle. Fails once the simulator has
    /// been prepared.
    pub fn add_part(&mut self, part: Part) -> Result<PartId, CircuitError> {
        if self.prepared {
            return Err(CircuitError::Sealed);
        }
        let id = PartId(self.parts.len());
        self.parts.push(part);
        Ok(id)
    }

    fn row(&self, node: NodeId) -> NodeIdx {
        if node == GROUND {
            None
        } else {
            Some(self.node_rows[&node])
        }
    }

    /// Flattens parts, assigns matrix rows and branch numbers and
    /// discretizes capacitors for `sample_rate`. Must be called exactly
    /// once before processing.
    pub fn prepare(&mut self, sample_rate: f64) -> Result<(), CircuitError> {
        if self.prepared {
            return Err(CircuitError::AlreadyPrepared);
        }
        if self.parts.is_empty() {
            return Err(CircuitError::EmptyCircuit);
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(CircuitError::InvalidSampleRate(sample_rate));
        }

        // Row assignment: user nodes in label order, then internal
        // nodes minted by compound expansion.
        for part in &self.parts {
            for node in part_nodes(part) {
                if node != GROUND {
                    let next = self.node_rows.len();
                    self.node_rows.entry(node).or_insert(next);
                }
            }
        }
        let user_rows = self.node_rows.len();
        let internal_rows = 2 * self
            .parts
            .iter()
            .filter(|p| matches!(p, Part::BjtEbersMoll { .. }))
            .count();
        let mut next_internal = user_rows;

        // Branch numbering, with per-part branch recorded for CCCS
        // control resolution.
        let mut branches = 0usize;
        let mut part_branch: Vec<Option<usize>> = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            let taken = match part {
                Part::VoltageSource { .. } | Part::Vcvs { .. } => 1,
                Part::BjtEbersMoll { .. } => 2,
                _ => 0,
            };
            part_branch.push(if taken > 0 { Some(branches) } else { None });
            branches += taken;
        }

        // Nodes whose voltage no connected part can define. Current
        // sources and controlled-current outputs alone leave a node
        // floating and guarantee a singular matrix.
        let mut defined = vec![false; user_rows];

        let dt = 1.0 / sample_rate;
        let parts = std::mem::take(&mut self.parts);
        for (pi, part) in parts.iter().enumerate() {
            self.part_prim.push(self.prims.len());
            match *part {
                Part::Resistor { a, b, ohms } => {
                    if !ohms.is_finite() || ohms <= 0.0 {
                        return Err(CircuitError::InvalidValue { part: PartId(pi) });
                    }
                    mark(&mut defined, self.row(a));
                    mark(&mut defined, self.row(b));
                    self.prims.push(Prim::Conductance {
                        a: self.row(a),
                        b: self.row(b),
                        g: 1.0 / ohms,
                    });
                }
                Part::Capacitor { a, b, farads } => {
                    if !farads.is_finite() || farads <= 0.0 {
                        return Err(CircuitError::InvalidValue { part: PartId(pi) });
                    }
                    mark(&mut defined, self.row(a));
                    mark(&mut defined, self.row(b));
                    self.prims.push(Prim::Capacitor {
                        a: self.row(a),
                        b: self.row(b),
                        g: 2.0 * farads / dt,
                        ieq: 0.0,
                    });
                }
                Part::VoltageSource { plus, minus, volts } => {
                    mark(&mut defined, self.row(plus));
                    mark(&mut defined, self.row(minus));
                    self.prims.push(Prim::VoltageSource {
                        plus: self.row(plus),
                        minus: self.row(minus),
                        branch: part_branch[pi].unwrap_or_default(),
                        volts,
                    });
                }
                Part::CurrentSource { plus, minus, amps } => {
                    self.prims.push(Prim::CurrentSource {
                        plus: self.row(plus),
                        minus: self.row(minus),
                        amps,
                    });
                }
                Part::Diode {
                    anode,
                    cathode,
                    model,
                } => {
                    mark(&mut defined, self.row(anode));
                    mark(&mut defined, self.row(cathode));
                    self.prims.push(Prim::Diode {
                        anode: self.row(anode),
                        cathode: self.row(cathode),
                        model,
                        v_op: 0.0,
                    });
                }
                Part::DiodePair { a, b, model } => {
                    mark(&mut defined, self.row(a));
                    mark(&mut defined, self.row(b));
                    self.prims.push(Prim::DiodePair {
                        a: self.row(a),
                        b: self.row(b),
                        model,
                        v_op: 0.0,
                    });
                }
                Part::Vccs {
                    plus,
                    minus,
                    ctrl_plus,
                    ctrl_minus,
                    gm,
                } => {
                    self.prims.push(Prim::Vccs {
                        plus: self.row(plus),
                        minus: self.row(minus),
                        ctrl_plus: self.row(ctrl_plus),
                        ctrl_minus: self.row(ctrl_minus),
                        gm,
                    });
                }
                Part::Vcvs {
                    plus,
                    minus,
                    ctrl_plus,
                    ctrl_minus,
                    gain,
                } => {
                    mark(&mut defined, self.row(plus));
                    mark(&mut defined, self.row(minus));
                    self.prims.push(Prim::Vcvs {
                        plus: self.row(plus),
                        minus: self.row(minus),
                        ctrl_plus: self.row(ctrl_plus),
                        ctrl_minus: self.row(ctrl_minus),
                        branch: part_branch[pi].unwrap_or_default(),
                        gain,
                    });
                }
                Part::Cccs {
                    plus,
                    minus,
                    ctrl,
                    gain,
                } => {
                    let is_source = matches!(parts.get(ctrl.0), Some(Part::VoltageSource { .. }));
                    let Some(branch) = part_branch.get(ctrl.0).copied().flatten() else {
                        return Err(CircuitError::InvalidControl { ctrl });
                    };
                    if !is_source {
                        return Err(CircuitError::InvalidControl { ctrl });
                    }
                    self.prims.push(Prim::Cccs {
                        plus: self.row(plus),
                        minus: self.row(minus),
                        ctrl_branch: branch,
                        gain,
                    });
                }
                Part::BjtSimple {
                    collector,
                    base,
                    emitter,
                    params,
                } => {
                    mark(&mut defined, self.row(collector));
                    mark(&mut defined, self.row(base));
                    mark(&mut defined, self.row(emitter));
                    self.prims.push(Prim::BjtSimple {
                        collector: self.row(collector),
                        base: self.row(base),
                        emitter: self.row(emitter),
                        params,
                        v_be: 0.0,
                        v_bc: 0.0,
                    });
                }
                Part::BjtEbersMoll {
                    collector,
                    base,
                    emitter,
                    params,
                } => {
                    mark(&mut defined, self.row(collector));
                    mark(&mut defined, self.row(base));
                    mark(&mut defined, self.row(emitter));
                    // Two junction diodes into internal nodes, each
                    // tied to its terminal by a zero-volt sense branch.
                    // The sense currents are the junction currents,
                    // which the transport sources redistribute with the
                    // common-base gains.
                    let x_e = Some(next_internal);
                    let x_c = Some(next_internal + 1);
                    next_internal += 2;
                    let br_f = part_branch[pi].unwrap_or_default();
                    let br_r = br_f + 1;
                    self.prims.push(Prim::Diode {
                        anode: self.row(base),
                        cathode: x_e,
                        model: params.emitter_diode(),
                        v_op: 0.0,
                    });
                    self.prims.push(Prim::VoltageSource {
                        plus: x_e,
                        minus: self.row(emitter),
                        branch: br_f,
                        volts: 0.0,
                    });
                    self.prims.push(Prim::Diode {
                        anode: self.row(base),
                        cathode: x_c,
                        model: params.collector_diode(),
                        v_op: 0.0,
                    });
                    self.prims.push(Prim::VoltageSource {
                        plus: x_c,
                        minus: self.row(collector),
                        branch: br_r,
                        volts: 0.0,
                    });
                    self.prims.push(Prim::Cccs {
                        plus: self.row(collector),
                        minus: self.row(base),
                        ctrl_branch: br_f,
                        gain: params.alpha_f(),
                    });
                    self.prims.push(Prim::Cccs {
                        plus: self.row(emitter),
                        minus: self.row(base),
                        ctrl_branch: br_r,
                        gain: params.alpha_r(),
                    });
                }
            }
        }
        self.parts = parts;

        if let Some(row) = defined.iter().position(|d| !d) {
            let node = self
                .node_rows
                .iter()
                .find(|(_, r)| **r == row)
                .map_or(0, |(n, _)| *n);
            return Err(CircuitError::FloatingNode { node });
        }

        self.has_nonlinear = self.prims.iter().any(|p| {
            matches!(
                p,
                Prim::Diode { .. } | Prim::DiodePair { .. } | Prim::BjtSimple { .. }
            )
        });

        let rows = user_rows + internal_rows;
        self.sys = MnaSystem::new(rows, branches);
        self.last_solution = vec![0.0; rows + branches];
        self.prev_iter = vec![0.0; rows + branches];
        self.prepared = true;
        Ok(())
    }

    /// Updates the value of a voltage source. Intended to be called
    /// once per sample to drive the circuit input.
    pub fn set_source_voltage(&mut self, id: PartId, volts: f64) {
        debug_assert!(self.prepared);
        debug_assert!(matches!(
            self.parts.get(id.0),
            Some(Part::VoltageSource { .. })
        ));
        if let Some(Prim::VoltageSource { volts: v, .. }) = self
            .part_prim
            .get(id.0)
            .and_then(|&i| self.prims.get_mut(i))
        {
            *v = volts;
        }
    }

    /// Updates the value of a current source.
    pub fn set_source_current(&mut self, id: PartId, amps: f64) {
        debug_assert!(self.prepared);
        debug_assert!(matches!(
            self.parts.get(id.0),
            Some(Part::CurrentSource { .. })
        ));
        if let Some(Prim::CurrentSource { amps: a, .. }) = self
            .part_prim
            .get(id.0)
            .and_then(|&i| self.prims.get_mut(i))
        {
            *a = amps;
        }
    }

    /// Voltage at `node` from the last committed solution. Ground reads
    /// zero, as does a node label the circuit never used.
    #[must_use]
    pub fn node_voltage(&self, node: NodeId) -> f64 {
        if node == GROUND {
            return 0.0;
        }
        self.node_rows
            .get(&node)
            .map_or(0.0, |&row| self.last_solution[row])
    }

    fn stamp_all(&mut self) {
        self.sys.clear();
        for prim in &self.prims {
            match *prim {
                Prim::Conductance { a, b, g } => self.sys.stamp_conductance(a, b, g),
                Prim::Capacitor { a, b, g, ieq } => {
                    self.sys.stamp_conductance(a, b, g);
                    self.sys.stamp_current_source(a, b, ieq);
                }
                Prim::VoltageSource {
                    plus,
                    minus,
                    branch,
                    volts,
                } => self.sys.stamp_voltage_source(plus, minus, branch, volts),
                Prim::CurrentSource { plus, minus, amps } => {
                    self.sys.stamp_current_source(plus, minus, amps);
                }
                Prim::Diode {
                    anode,
                    cathode,
                    ref model,
                    v_op,
                } => {
                    let (g, ieq) = model.linearize(v_op);
                    self.sys.stamp_conductance(anode, cathode, g);
                    self.sys.stamp_current_source(anode, cathode, ieq);
                }
                Prim::DiodePair {
                    a,
                    b,
                    ref model,
                    v_op,
                } => {
                    let i = model.current(v_op) - model.current(-v_op);
                    let g = model.conductance(v_op) + model.conductance(-v_op);
                    self.sys.stamp_conductance(a, b, g);
                    self.sys.stamp_current_source(a, b, i - g * v_op);
                }
                Prim::Vccs {
                    plus,
                    minus,
                    ctrl_plus,
                    ctrl_minus,
                    gm,
                } => self.sys.stamp_vccs(plus, minus, ctrl_plus, ctrl_minus, gm),
                Prim::Vcvs {
                    plus,
                    minus,
                    ctrl_plus,
                    ctrl_minus,
                    branch,
                    gain,
                } => self
                    .sys
                    .stamp_vcvs(plus, minus, ctrl_plus, ctrl_minus, branch, gain),
                Prim::Cccs {
                    plus,
                    minus,
                    ctrl_branch,
                    gain,
                } => self.sys.stamp_cccs(plus, minus, ctrl_branch, gain),
                Prim::BjtSimple {
                    collector,
                    base,
                    emitter,
                    ref params,
                    v_be,
                    v_bc,
                } => {
                    let dm = DiodeModel {
                        is: params.is,
                        n: params.n,
                        v_crit: params.v_crit,
                    };
                    let i_f = dm.current(v_be);
                    let g_f = dm.conductance(v_be);
                    let i_r = dm.current(v_bc);
                    let g_r = dm.conductance(v_bc);
                    // Junction conductances into the base, transport
                    // source between collector and emitter.
                    let g_pi = g_f / params.beta_f;
                    let g_mu = g_r / params.beta_r;
                    self.sys.stamp_conductance(base, emitter, g_pi);
                    self.sys.stamp_current_source(
                        base,
                        emitter,
                        i_f / params.beta_f - g_pi * v_be,
                    );
                    self.sys.stamp_conductance(base, collector, g_mu);
                    self.sys.stamp_current_source(
                        base,
                        collector,
                        i_r / params.beta_r - g_mu * v_bc,
                    );
                    self.sys.stamp_vccs(collector, emitter, base, emitter, g_f);
                    self.sys
                        .stamp_vccs(collector, emitter, base, collector, -g_r);
                    self.sys.stamp_current_source(
                        collector,
                        emitter,
                        (i_f - i_r) - g_f * v_be + g_r * v_bc,
                    );
                }
            }
        }
    }

    /// Re-linearizes nonlinear devices at the freshly solved voltages,
    /// with per-junction step damping.
    fn update_operating_points(&mut self) {
        for prim in &mut self.prims {
            match prim {
                Prim::Diode {
                    anode,
                    cathode,
                    model,
                    v_op,
                } => {
                    let v = self.sys.node_voltage(*anode) - self.sys.node_voltage(*cathode);
                    *v_op = model.limit_voltage_step(*v_op, v);
                }
                Prim::DiodePair { a, b, model, v_op } => {
                    let v = self.sys.node_voltage(*a) - self.sys.node_voltage(*b);
                    // Symmetric element: damp by magnitude, keep sign.
                    let limited = model.limit_voltage_step(v_op.abs(), v.abs());
                    *v_op = if v < 0.0 { -limited } else { limited };
                }
                Prim::BjtSimple {
                    collector,
                    base,
                    emitter,
                    params,
                    v_be,
                    v_bc,
                } => {
                    let dm = DiodeModel {
                        is: params.is,
                        n: params.n,
                        v_crit: params.v_crit,
                    };
                    let vb = self.sys.node_voltage(*base);
                    let new_be = vb - self.sys.node_voltage(*emitter);
                    let new_bc = vb - self.sys.node_voltage(*collector);
                    *v_be = dm.limit_voltage_step(*v_be, new_be);
                    *v_bc = dm.limit_voltage_step(*v_bc, new_bc);
                }
                _ => {}
            }
        }
    }

    /// Commits the solution: stores it as the last good one and steps
    /// capacitor companion sources to the next sample.
    fn commit(&mut self) {
        self.last_solution.copy_from_slice(self.sys.solution());
        for prim in &mut self.prims {
            if let Prim::Capacitor { a, b, g, ieq } = prim {
                let v = self.sys.node_voltage(*a) - self.sys.node_voltage(*b);
                *ieq = -(2.0 * *g * v + *ieq);
            }
        }
    }

    /// Solves the circuit for the current source values and advances
    /// reactive state by one sample.
    pub fn process_sample(&mut self) -> SolveOutcome {
        debug_assert!(self.prepared);
        let outcome = if self.has_nonlinear {
            self.solve_newton()
        } else {
            self.solve_linear()
        };
        self.stats.samples += 1;
        self.stats.total_iterations += u64::from(outcome.iterations);
        self.stats.max_iterations = self.stats.max_iterations.max(outcome.iterations);
        if !outcome.converged {
            self.stats.non_converged += 1;
        }
        outcome
    }

    fn solve_linear(&mut self) -> SolveOutcome {
        self.stamp_all();
        if self.sys.solve() {
            self.commit();
            SolveOutcome {
                converged: true,
                iterations: 1,
            }
        } else {
            self.stats.singular += 1;
            self.sys.set_solution(&self.last_solution);
            SolveOutcome {
                converged: false,
                iterations: 1,
            }
        }
    }

    fn solve_newton(&mut self) -> SolveOutcome {
        self.prev_iter.copy_from_slice(&self.last_solution);
        for iteration in 1..=MAX_ITERATIONS {
            self.stamp_all();
            if !self.sys.solve() {
                // Hold the previous sample's solution and move on. One
                // bad sample is inaudible; an unwind at audio rate is
                // not an option.
                self.stats.singular += 1;
                self.sys.set_solution(&self.last_solution);
                return SolveOutcome {
                    converged: false,
                    iterations: iteration,
                };
            }
            self.update_operating_points();
            let delta = self
                .sys
                .solution()
                .iter()
                .zip(&self.prev_iter)
                .map(|(x, p)| (x - p).abs())
                .fold(0.0_f64, f64::max);
            self.prev_iter.copy_from_slice(self.sys.solution());
            if delta < CONVERGENCE_TOLERANCE {
                self.commit();
                return SolveOutcome {
                    converged: true,
                    iterations: iteration,
                };
            }
        }
        // Out of iterations: commit the best estimate anyway.
        self.commit();
        SolveOutcome {
            converged: false,
            iterations: MAX_ITERATIONS,
        }
    }

    /// Discards all reactive and nonlinear state and zeroes the
    /// solution, as after a transport reset.
    pub fn clear_buffers(&mut self) {
        for prim in &mut self.prims {
            match prim {
                Prim::Capacitor { ieq, .. } => *ieq = 0.0,
                Prim::Diode { v_op, .. } | Prim::DiodePair { v_op, .. } => *v_op = 0.0,
                Prim::BjtSimple { v_be, v_bc, .. } => {
                    *v_be = 0.0;
                    *v_bc = 0.0;
                }
                _ => {}
            }
        }
        self.last_solution.fill(0.0);
        self.prev_iter.fill(0.0);
        self.sys.reset_solution();
    }

    /// Solver counters since the last [`Simulator::reset_stats`].
    #[must_use]
    pub fn stats(&self) -> SolveStats {
        self.stats
    }

    /// Zeroes the solver counters.
    pub fn reset_stats(&mut self) {
        self.stats = SolveStats::default();
    }
}

fn mark(defined: &mut [bool], node: NodeIdx) {
    if let Some(row) = node {
        if row < defined.len() {
            defined[row] = true;
        }
    }
}

/// All user-visible nodes a part touches, for row assignment.
fn part_nodes(part: &Part) -> impl Iterator<Item = NodeId> {
    let nodes: [NodeId; 4] = match *part {
        Part::Resistor { a, b, .. }
        | Part::Capacitor { a, b, .. }
        | Part::DiodePair { a, b, .. } => [a, b, GROUND, GROUND],
        Part::VoltageSource { plus, minus, .. }
        | Part::CurrentSource { plus, minus, .. }
        | Part::Cccs { plus, minus, .. } => [plus, minus, GROUND, GROUND],
        Part::Diode { anode, cathode, .. } => [anode, cathode, GROUND, GROUND],
        Part::Vccs {
            plus,
            minus,
            ctrl_plus,
            ctrl_minus,
            ..
        }
        | Part::Vcvs {
            plus,
            minus,
            ctrl_plus,
            ctrl_minus,
            ..
        } => [plus, minus, ctrl_plus, ctrl_minus],
        Part::BjtSimple {
            collector,
            base,
            emitter,
            ..
        }
        | Part::BjtEbersMoll {
            collector,
            base,
            emitter,
            ..
        } => [collector, base, emitter, GROUND],
    };
    nodes.into_iter().filter(|&n| n != GROUND)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn divider(volts: f64) -> (Simulator, PartId) {
        let mut sim = Simulator::new();
        let src = sim
            .add_part(Part::VoltageSource {
                plus: 1,
                minus: GROUND,
                volts,
            })
            .unwrap();
        sim.add_part(Part::Resistor {
            a: 1,
            b: 2,
            ohms: 10_000.0,
        })
        .unwrap();
        sim.add_part(Part::Resistor {
            a: 2,
            b: GROUND,
            ohms: 10_000.0,
        })
        .unwrap();
        sim.prepare(48_000.0).unwrap();
        (sim, src)
    }

    #[test]
    fn linear_divider_single_iteration() {
        for volts in [0.1, 1.0, 9.0, -4.5] {
            let (mut sim, _) = divider(volts);
            let out = sim.process_sample();
            assert!(out.converged);
            assert_eq!(out.iterations, 1);
            assert!((sim.node_voltage(2) - volts / 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn source_update_tracks_per_sample() {
        let (mut sim, src) = divider(0.0);
        for i in 0..100 {
            let v = f64::from(i) * 0.01;
            sim.set_source_voltage(src, v);
            sim.process_sample();
            assert!((sim.node_voltage(2) - v / 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn rc_step_response_charges_to_source() {
        // 1 kOhm into 1 uF: tau = 1 ms, 48 samples per tau.
        let mut sim = Simulator::new();
        sim.add_part(Part::VoltageSource {
            plus: 1,
            minus: GROUND,
            volts: 1.0,
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
            farads: 1e-6,
        })
        .unwrap();
        sim.prepare(48_000.0).unwrap();

        let mut prev = 0.0;
        for _ in 0..48 {
            sim.process_sample();
            let v = sim.node_voltage(2);
            assert!(v >= prev, "RC charge not monotonic");
            prev = v;
        }
        // One time constant: ~63 percent.
        assert!((prev - 0.632).abs() < 0.01, "after one tau: {prev}");
        for _ in 0..(48 * 6) {
            sim.process_sample();
        }
        assert!(sim.node_voltage(2) > 0.995);
    }

    #[test]
    fn diode_pair_clips_symmetrically() {
        let mut sim = Simulator::new();
        let src = sim
            .add_part(Part::VoltageSource {
                plus: 1,
                minus: GROUND,
                volts: 0.0,
            })
            .unwrap();
        sim.add_part(Part::Resistor {
            a: 1,
            b: 2,
            ohms: 4_700.0,
        })
        .unwrap();
        sim.add_part(Part::DiodePair {
            a: 2,
            b: GROUND,
            model: DiodeModel::silicon(),
        })
        .unwrap();
        sim.prepare(48_000.0).unwrap();

        sim.set_source_voltage(src, 5.0);
        let out = sim.process_sample();
        assert!(out.converged);
        let clipped = sim.node_voltage(2);
        assert!(clipped > 0.4 && clipped < 0.9, "knee at {clipped}");

        sim.set_source_voltage(src, -5.0);
        assert!(sim.process_sample().converged);
        let neg = sim.node_voltage(2);
        assert!((neg + clipped).abs() < 0.1, "asymmetric clip: {neg}");

        // Small signals pass nearly untouched.
        sim.set_source_voltage(src, 0.05);
        sim.process_sample();
        assert!((sim.node_voltage(2) - 0.05).abs() < 0.01);
    }

    #[test]
    fn single_diode_clips_one_polarity() {
        let mut sim = Simulator::new();
        let src = sim
            .add_part(Part::VoltageSource {
                plus: 1,
                minus: GROUND,
                volts: 3.0,
            })
            .unwrap();
        sim.add_part(Part::Resistor {
            a: 1,
            b: 2,
            ohms: 10_000.0,
        })
        .unwrap();
        sim.add_part(Part::Diode {
            anode: 2,
            cathode: GROUND,
            model: DiodeModel::silicon(),
        })
        .unwrap();
        sim.prepare(48_000.0).unwrap();

        assert!(sim.process_sample().converged);
        assert!(sim.node_voltage(2) < 0.9);
        sim.set_source_voltage(src, -3.0);
        assert!(sim.process_sample().converged);
        // Reverse direction blocks, node follows the source.
        assert!(sim.node_voltage(2) < -2.9);
    }

    fn common_emitter(part: fn(BjtParams) -> Part, base_resistor: f64) -> Simulator {
        let mut sim = Simulator::new();
        // 9 V supply, 10k collector load, base bias through a large
        // resistor from the supply.
        sim.add_part(Part::VoltageSource {
            plus: 1,
            minus: GROUND,
            volts: 9.0,
        })
        .unwrap();
        sim.add_part(Part::Resistor {
            a: 1,
            b: 2,
            ohms: 10_000.0,
        })
        .unwrap();
        sim.add_part(Part::Resistor {
            a: 1,
            b: 3,
            ohms: base_resistor,
        })
        .unwrap();
        sim.add_part(part(BjtParams::npn_signal())).unwrap();
        sim.prepare(48_000.0).unwrap();
        sim
    }

    #[test]
    fn ebers_moll_forward_active_bias() {
        let mut sim = common_emitter(
            |params| Part::BjtEbersMoll {
                collector: 2,
                base: 3,
                emitter: GROUND,
                params,
            },
            4_700_000.0,
        );
        assert!(sim.process_sample().converged);
        let v_be = sim.node_voltage(3);
        let v_c = sim.node_voltage(2);
        assert!(v_be > 0.5 && v_be < 0.75, "v_be = {v_be}");
        // I_B ~ (9 - 0.65) / 4.7M ~ 1.8 uA, I_C ~ beta * I_B ~ 0.53 mA,
        // so the collector sits a few volts below the supply.
        assert!(v_c > 1.0 && v_c < 6.0, "v_c = {v_c}");
    }

    #[test]
    fn ebers_moll_saturates_with_hard_base_drive() {
        let mut sim = common_emitter(
            |params| Part::BjtEbersMoll {
                collector: 2,
                base: 3,
                emitter: GROUND,
                params,
            },
            47_000.0,
        );
        assert!(sim.process_sample().converged);
        // Heavy base current drives the collector almost to ground
        // instead of the minus 160 V a linear beta model would give.
        let v_c = sim.node_voltage(2);
        assert!(v_c > -0.05 && v_c < 0.3, "v_ce_sat = {v_c}");
    }

    #[test]
    fn hybrid_pi_forward_active_bias() {
        let mut sim = common_emitter(
            |params| Part::BjtSimple {
                collector: 2,
                base: 3,
                emitter: GROUND,
                params,
            },
            4_700_000.0,
        );
        assert!(sim.process_sample().converged);
        let v_be = sim.node_voltage(3);
        let v_c = sim.node_voltage(2);
        assert!(v_be > 0.5 && v_be < 0.75, "v_be = {v_be}");
        assert!(v_c > 1.0 && v_c < 6.0, "v_c = {v_c}");
    }

    #[test]
    fn cccs_control_must_be_voltage_source() {
        let mut sim = Simulator::new();
        let r = sim
            .add_part(Part::Resistor {
                a: 1,
                b: GROUND,
                ohms: 1_000.0,
            })
            .unwrap();
        sim.add_part(Part::VoltageSource {
            plus: 1,
            minus: GROUND,
            volts: 1.0,
        })
        .unwrap();
        sim.add_part(Part::Cccs {
            plus: 1,
            minus: GROUND,
            ctrl: r,
            gain: 2.0,
        })
        .unwrap();
        assert_eq!(
            sim.prepare(48_000.0),
            Err(CircuitError::InvalidControl { ctrl: r })
        );
    }

    #[test]
    fn floating_node_rejected() {
        let mut sim = Simulator::new();
        sim.add_part(Part::CurrentSource {
            plus: GROUND,
            minus: 7,
            amps: 1e-3,
        })
        .unwrap();
        assert_eq!(
            sim.prepare(48_000.0),
            Err(CircuitError::FloatingNode { node: 7 })
        );
    }

    #[test]
    fn prepare_guards() {
        let mut sim = Simulator::new();
        assert_eq!(sim.prepare(48_000.0), Err(CircuitError::EmptyCircuit));
        sim.add_part(Part::Resistor {
            a: 1,
            b: GROUND,
            ohms: 100.0,
        })
        .unwrap();
        assert_eq!(sim.prepare(0.0), Err(CircuitError::InvalidSampleRate(0.0)));
        sim.prepare(48_000.0).unwrap();
        assert_eq!(sim.prepare(48_000.0), Err(CircuitError::AlreadyPrepared));
        assert_eq!(
            sim.add_part(Part::Resistor {
                a: 1,
                b: GROUND,
                ohms: 100.0,
            }),
            Err(CircuitError::Sealed)
        );
    }

    #[test]
    fn clear_buffers_discharges_capacitor() {
        let mut sim = Simulator::new();
        let src = sim
            .add_part(Part::VoltageSource {
                plus: 1,
                minus: GROUND,
                volts: 1.0,
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
            farads: 1e-6,
        })
        .unwrap();
        sim.prepare(48_000.0).unwrap();
        for _ in 0..1_000 {
            sim.process_sample();
        }
        assert!(sim.node_voltage(2) > 0.9);
        sim.clear_buffers();
        assert!((sim.node_voltage(2)).abs() < 1e-12);
        sim.set_source_voltage(src, 0.0);
        sim.process_sample();
        assert!(sim.node_voltage(2).abs() < 1e-6);
    }

    #[test]
    fn stats_accumulate() {
        let (mut sim, _) = divider(1.0);
        for _ in 0..10 {
            sim.process_sample();
        }
        let stats = sim.stats();
        assert_eq!(stats.samples, 10);
        assert_eq!(stats.total_iterations, 10);
        assert_eq!(stats.non_converged, 0);
        assert_eq!(stats.max_iterations, 1);
        sim.reset_stats();
        assert_eq!(sim.stats().samples, 0);
    }
}
