//! Circuit parts and the semiconductor device models behind them.

use libm::{exp, log};

use crate::THERMAL_VOLTAGE;

/// Circuit node label. Node `0` is ground; any other value is an
/// arbitrary user-chosen label, mapped to matrix rows at prepare time.
pub type NodeId = u32;

/// The ground node.
pub const GROUND: NodeId = 0;

/// Handle returned by [`crate::Simulator::add_part`], used to address a
/// part after it has been added (source updates, CCCS control).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartId(pub(crate) usize);

/// Shockley diode model with critical-voltage step damping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiodeModel {
    /// Saturation current in amperes.
    pub is: f64,
    /// Emission coefficient (ideality factor).
    pub n: f64,
    /// Voltage above which Newton steps are damped by logarithmic
    /// extrapolation instead of taken directly.
    pub v_crit: f64,
}

impl DiodeModel {
    /// Small-signal silicon diode (1N4148-like).
    #[must_use]
    pub fn silicon() -> Self {
        Self {
            is: 2.52e-9,
            n: 1.752,
            v_crit: 0.7,
        }
    }

    /// Germanium diode (1N34A-like), softer knee around 0.3 V.
    #[must_use]
    pub fn germanium() -> Self {
        Self {
            is: 2.0e-7,
            n: 1.3,
            v_crit: 0.3,
        }
    }

    /// Red LED, hard knee near 1.7 V.
    #[must_use]
    pub fn led() -> Self {
        Self {
            is: 1.0e-18,
            n: 1.8,
            v_crit: 1.7,
        }
    }

    #[inline]
    fn n_vt(&self) -> f64 {
        self.n * THERMAL_VOLTAGE
    }

    /// Diode current at voltage `v`, linearly extrapolated above
    /// `v_crit` so the exponential cannot overflow during iteration.
    #[must_use]
    pub fn current(&self, v: f64) -> f64 {
        let n_vt = self.n_vt();
        if v > self.v_crit {
            let i_crit = self.is * (exp(self.v_crit / n_vt) - 1.0);
            let g_crit = self.is / n_vt * exp(self.v_crit / n_vt);
            i_crit + g_crit * (v - self.v_crit)
        } else if v < -5.0 * n_vt {
            // Deep reverse bias saturates at -Is.
            -self.is
        } else {
            self.is * (exp(v / n_vt) - 1.0)
        }
    }

    /// Small-signal conductance `dI/dV` at voltage `v`, floored to keep
    /// the MNA matrix well conditioned.
    #[must_use]
    pub fn conductance(&self, v: f64) -> f64 {
        let n_vt = self.n_vt();
        let g = if v > self.v_crit {
            self.is / n_vt * exp(self.v_crit / n_vt)
        } else if v < -5.0 * n_vt {
            0.0
        } else {
            self.is / n_vt * exp(v / n_vt)
        };
        g.max(1e-12)
    }

    /// Companion model at operating point `v`: conductance and parallel
    /// current source such that `i = g * v + ieq` reproduces the tangent
    /// line of the device curve.
    #[must_use]
    pub fn linearize(&self, v: f64) -> (f64, f64) {
        let g = self.conductance(v);
        let ieq = self.current(v) - g * v;
        (g, ieq)
    }

    /// Damps a Newton voltage step. Steps past the critical voltage are
    /// pulled back onto the diode curve by a logarithmic projection,
    /// which keeps iteration stable for hard-driven junctions.
    #[must_use]
    pub fn limit_voltage_step(&self, v_old: f64, v_new: f64) -> f64 {
        let n_vt = self.n_vt();
        if v_new > self.v_crit && (v_new - v_old).abs() > 2.0 * n_vt {
            if v_old > 0.0 {
                let arg = 1.0 + (v_new - v_old) / n_vt;
                if arg > 0.0 {
                    v_old + n_vt * log(arg)
                } else {
                    self.v_crit
                }
            } else {
                n_vt * log(v_new / n_vt)
            }
        } else {
            v_new
        }
    }
}

/// Ebers-Moll bipolar transistor parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BjtParams {
    /// Forward current gain.
    pub beta_f: f64,
    /// Reverse current gain.
    pub beta_r: f64,
    /// Transport saturation current in amperes.
    pub is: f64,
    /// Emission coefficient for both junctions.
    pub n: f64,
    /// Junction critical voltage for step damping.
    pub v_crit: f64,
}

impl BjtParams {
    /// Small-signal NPN (2N3904-like).
    #[must_use]
    pub fn npn_signal() -> Self {
        Self {
            beta_f: 300.0,
            beta_r: 4.0,
            is: 6.73e-15,
            n: 1.0,
            v_crit: 0.7,
        }
    }

    /// Low-gain germanium NPN as found in vintage fuzz circuits.
    #[must_use]
    pub fn npn_germanium() -> Self {
        Self {
            beta_f: 70.0,
            beta_r: 8.0,
            is: 1.0e-9,
            n: 1.2,
            v_crit: 0.3,
        }
    }

    /// Forward common-base gain `beta_f / (beta_f + 1)`.
    #[must_use]
    pub fn alpha_f(&self) -> f64 {
        self.beta_f / (self.beta_f + 1.0)
    }

    /// Reverse common-base gain `beta_r / (beta_r + 1)`.
    #[must_use]
    pub fn alpha_r(&self) -> f64 {
        self.beta_r / (self.beta_r + 1.0)
    }

    /// Base-emitter junction as a diode model, scaled so the collector
    /// current in forward active matches `is * exp(v_be / n_vt)`.
    #[must_use]
    pub fn emitter_diode(&self) -> DiodeModel {
        DiodeModel {
            is: self.is / self.alpha_f(),
            n: self.n,
            v_crit: self.v_crit,
        }
    }

    /// Base-collector junction as a diode model.
    #[must_use]
    pub fn collector_diode(&self) -> DiodeModel {
        DiodeModel {
            is: self.is / self.alpha_r(),
            n: self.n,
            v_crit: self.v_crit,
        }
    }
}

/// A circuit part. Added to a [`crate::Simulator`] before `prepare`;
/// compound parts (transistors) are flattened into primitive stamps at
/// prepare time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Part {
    /// Linear resistor between `a` and `b`.
    Resistor { a: NodeId, b: NodeId, ohms: f64 },
    /// Capacitor between `a` and `b`, discretized with the trapezoidal
    /// rule at prepare time.
    Capacitor { a: NodeId, b: NodeId, farads: f64 },
    /// Independent voltage source; `plus` sits `volts` above `minus`.
    /// The value can be updated per sample via
    /// [`crate::Simulator::set_source_voltage`].
    VoltageSource {
        plus: NodeId,
        minus: NodeId,
        volts: f64,
    },
    /// Independent current source pushing `amps` from `plus` to `minus`
    /// through the element.
    CurrentSource {
        plus: NodeId,
        minus: NodeId,
        amps: f64,
    },
    /// Diode conducting from `anode` to `cathode`.
    Diode {
        anode: NodeId,
        cathode: NodeId,
        model: DiodeModel,
    },
    /// Two antiparallel diodes sharing one model, the usual symmetric
    /// clipper element.
    DiodePair {
        a: NodeId,
        b: NodeId,
        model: DiodeModel,
    },
    /// Voltage-controlled current source: `gm * v(ctrl_plus, ctrl_minus)`
    /// flows from `plus` to `minus`.
    Vccs {
        plus: NodeId,
        minus: NodeId,
        ctrl_plus: NodeId,
        ctrl_minus: NodeId,
        gm: f64,
    },
    /// Voltage-controlled voltage source (ideal op-amp stage building
    /// block): `v(plus, minus) = gain * v(ctrl_plus, ctrl_minus)`.
    Vcvs {
        plus: NodeId,
        minus: NodeId,
        ctrl_plus: NodeId,
        ctrl_minus: NodeId,
        gain: f64,
    },
    /// Current-controlled current source. `ctrl` must identify a
    /// `VoltageSource` part; `gain` times its branch current flows from
    /// `plus` to `minus`.
    Cccs {
        plus: NodeId,
        minus: NodeId,
        ctrl: PartId,
        gain: f64,
    },
    /// Hybrid-pi transistor linearized around a tracked operating
    /// point. Cheaper than [`Part::BjtEbersMoll`] and adequate for
    /// forward-active gain stages.
    BjtSimple {
        collector: NodeId,
        base: NodeId,
        emitter: NodeId,
        params: BjtParams,
    },
    /// Full Ebers-Moll transistor, flattened at prepare time into two
    /// junction diodes, two zero-volt sense branches and two
    /// current-controlled transport sources. Handles saturation and
    /// reverse operation.
    BjtEbersMoll {
        collector: NodeId,
        base: NodeId,
        emitter: NodeId,
        params: BjtParams,
    },
}
