//! Dense modified-nodal-analysis system with LU factorization.
//!
//! The system is `A * x = z` where the first `nodes` unknowns are node
//! voltages (ground excluded) and the remaining `branches` unknowns are
//! currents through voltage-defined elements. All stamps are additive so
//! parts can be applied in any order; [`MnaSystem::clear`] resets the
//! system between Newton iterations.

/// Row/column index of a non-ground node. `None` is ground and absorbs
/// any stamp aimed at it.
pub type NodeIdx = Option<usize>;

/// Dense MNA matrix, right-hand side and solution vector.
pub struct MnaSystem {
    nodes: usize,
    branches: usize,
    dim: usize,
    a: Vec<f64>,
    z: Vec<f64>,
    x: Vec<f64>,
    /// Scratch copy of `a` consumed by the in-place factorization.
    lu: Vec<f64>,
    pivot: Vec<usize>,
    /// Forward-substitution scratch. Preallocated so `solve` stays
    /// allocation-free on the per-sample path.
    y: Vec<f64>,
}

impl MnaSystem {
    /// Creates a system for `nodes` non-ground nodes and `branches`
    /// voltage-defined elements.
    #[must_use]
    pub fn new(nodes: usize, branches: usize) -> Self {
        let dim = nodes + branches;
        Self {
            nodes,
            branches,
            dim,
            a: vec![0.0; dim * dim],
            z: vec![0.0; dim],
            x: vec![0.0; dim],
            lu: vec![0.0; dim * dim],
            pivot: vec![0; dim],
            y: vec![0.0; dim],
        }
    }

    /// Number of non-ground nodes.
    #[must_use]
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Number of branch unknowns.
    #[must_use]
    pub fn branches(&self) -> usize {
        self.branches
    }

    /// Zeroes the matrix and right-hand side. The solution vector is
    /// left intact so it can seed the next Newton iteration.
    pub fn clear(&mut self) {
        self.a.fill(0.0);
        self.z.fill(0.0);
    }

    #[inline]
    fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.dim + col] += value;
    }

    #[inline]
    fn col_of_branch(&self, branch: usize) -> usize {
        debug_assert!(branch < self.branches);
        self.nodes + branch
    }

    /// Stamps a conductance `g` between nodes `a` and `b`.
    pub fn stamp_conductance(&mut self, a: NodeIdx, b: NodeIdx, g: f64) {
        if let Some(i) = a {
            self.add(i, i, g);
        }
        if let Some(j) = b {
            self.add(j, j, g);
        }
        if let (Some(i), Some(j)) = (a, b) {
            self.add(i, j, -g);
            self.add(j, i, -g);
        }
    }

    /// Stamps an independent current source of `amps` flowing from
    /// `from` to `to` through the element.
    pub fn stamp_current_source(&mut self, from: NodeIdx, to: NodeIdx, amps: f64) {
        if let Some(i) = from {
            self.z[i] -= amps;
        }
        if let Some(j) = to {
            self.z[j] += amps;
        }
    }

    /// Stamps a voltage source on branch `branch` forcing
    /// `v(plus) - v(minus) = volts`. Positive branch current flows from
    /// `plus` to `minus` through the source.
    pub fn stamp_voltage_source(&mut self, plus: NodeIdx, minus: NodeIdx, branch: usize, volts: f64) {
        let col = self.col_of_branch(branch);
        if let Some(i) = plus {
            self.add(i, col, 1.0);
            self.add(col, i, 1.0);
        }
        if let Some(j) = minus {
            self.add(j, col, -1.0);
            self.add(col, j, -1.0);
        }
        self.z[col] += volts;
    }

    /// Stamps a voltage-controlled current source: `gm * v(cp, cn)`
    /// flows from `p` to `n`.
    pub fn stamp_vccs(&mut self, p: NodeIdx, n: NodeIdx, cp: NodeIdx, cn: NodeIdx, gm: f64) {
        for (out, sign) in [(p, 1.0), (n, -1.0)] {
            let Some(row) = out else { continue };
            if let Some(c) = cp {
                self.add(row, c, sign * gm);
            }
            if let Some(c) = cn {
                self.add(row, c, -sign * gm);
            }
        }
    }

    /// Stamps a voltage-controlled voltage source on branch `branch`:
    /// `v(p, n) = gain * v(cp, cn)`.
    pub fn stamp_vcvs(
        &mut self,
        p: NodeIdx,
        n: NodeIdx,
        cp: NodeIdx,
        cn: NodeIdx,
        branch: usize,
        gain: f64,
    ) {
        let col = self.col_of_branch(branch);
        if let Some(i) = p {
            self.add(i, col, 1.0);
            self.add(col, i, 1.0);
        }
        if let Some(j) = n {
            self.add(j, col, -1.0);
            self.add(col, j, -1.0);
        }
        if let Some(c) = cp {
            self.add(col, c, -gain);
        }
        if let Some(c) = cn {
            self.add(col, c, gain);
        }
    }

    /// Stamps a current-controlled current source: `gain * i(ctrl)`
    /// flows from `p` to `n`, where `ctrl` is the branch of a voltage
    /// source whose current is an unknown of the system.
    pub fn stamp_cccs(&mut self, p: NodeIdx, n: NodeIdx, ctrl: usize, gain: f64) {
        let col = self.col_of_branch(ctrl);
        if let Some(i) = p {
            self.add(i, col, gain);
        }
        if let Some(j) = n {
            self.add(j, col, -gain);
        }
    }

    /// Factors and solves the system. Returns `false` if the matrix is
    /// numerically singular; the solution vector is left untouched in
    /// that case.
    #[must_use]
    pub fn solve(&mut self) -> bool {
        let n = self.dim;
        self.lu.copy_from_slice(&self.a);

        // LU with partial pivoting.
        for col in 0..n {
            let mut max = self.lu[col * n + col].abs();
            let mut max_row = col;
            for row in (col + 1)..n {
                let v = self.lu[row * n + col].abs();
                if v > max {
                    max = v;
                    max_row = row;
                }
            }
            if max < 1e-13 {
                return false;
            }
            self.pivot[col] = max_row;
            if max_row != col {
                for k in 0..n {
                    self.lu.swap(col * n + k, max_row * n + k);
                }
            }
            let inv_pivot = 1.0 / self.lu[col * n + col];
            for row in (col + 1)..n {
                let factor = self.lu[row * n + col] * inv_pivot;
                self.lu[row * n + col] = factor;
                for k in (col + 1)..n {
                    self.lu[row * n + k] -= factor * self.lu[col * n + k];
                }
            }
        }

        // Forward substitution with the pivoted right-hand side.
        self.y.copy_from_slice(&self.z);
        for col in 0..n {
            self.y.swap(col, self.pivot[col]);
            let yc = self.y[col];
            for row in (col + 1)..n {
                self.y[row] -= self.lu[row * n + col] * yc;
            }
        }

        // Back substitution.
        for row in (0..n).rev() {
            let mut acc = self.y[row];
            for col in (row + 1)..n {
                acc -= self.lu[row * n + col] * self.x[col];
            }
            self.x[row] = acc / self.lu[row * n + row];
        }
        true
    }

    /// Solved voltage at a node, ground reading as zero.
    #[must_use]
    pub fn node_voltage(&self, node: NodeIdx) -> f64 {
        node.map_or(0.0, |i| self.x[i])
    }

    /// Solved current through a voltage-source branch.
    #[must_use]
    pub fn branch_current(&self, branch: usize) -> f64 {
        self.x[self.nodes + branch]
    }

    /// Full solution vector, node voltages first then branch currents.
    #[must_use]
    pub fn solution(&self) -> &[f64] {
        &self.x
    }

    /// Overwrites the solution vector. Used to restore the last good
    /// solution after a singular factorization mid-run.
    pub fn set_solution(&mut self, values: &[f64]) {
        self.x.copy_from_slice(values);
    }

    /// Zeroes the solution vector.
    pub fn reset_solution(&mut self) {
        self.x.fill(0.0);
    }
}
