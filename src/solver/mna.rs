//! MNA workspace: the matrices and vectors shared by every analysis.

use crate::circuit::{Node, UnknownKind};

use super::config::SolverConfig;
use super::matrix::Matrix;

/// Matrices, vectors and per-unknown bookkeeping of a finalized circuit.
///
/// `gl` and `c` hold the time-invariant contributions and are loaded once.
/// `g` is rebuilt from `gl` plus the linearized nonlinear devices on every
/// Newton iteration, and `matrix` is the augmented `N x (N+1)` system handed
/// to the solver.
#[derive(Debug, Clone)]
pub struct MnaWorkspace {
    /// Number of unknowns
    pub size: usize,
    /// Voltage or current, per unknown
    pub kinds: Vec<UnknownKind>,
    /// Absolute tolerance, per unknown
    pub abstol: Vec<f64>,
    /// Largest magnitude seen so far, per unknown
    pub soln_max: Vec<f64>,
    /// Linear conductances
    pub gl: Matrix,
    /// Full conductance / Jacobian
    pub g: Matrix,
    /// Capacitances and inductances
    pub c: Matrix,
    /// Augmented system `[A | rhs]`
    pub matrix: Matrix,
    /// Right-hand side, the negated residual
    pub rhs: Vec<f64>,
    /// Current solution estimate
    pub solution: Vec<f64>,
}

impl MnaWorkspace {
    /// Allocate a zeroed workspace for the given unknowns.
    pub fn new(kinds: Vec<UnknownKind>, config: &SolverConfig) -> Self {
        let size = kinds.len();
        let abstol = kinds
            .iter()
            .map(|k| match k {
                UnknownKind::Voltage => config.v_abstol,
                UnknownKind::Current => config.i_abstol,
            })
            .collect();
        Self {
            size,
            kinds,
            abstol,
            soln_max: vec![0.0; size],
            gl: Matrix::zeros(size, size),
            g: Matrix::zeros(size, size),
            c: Matrix::zeros(size, size),
            matrix: Matrix::zeros(size, size + 1),
            rhs: vec![0.0; size],
            solution: vec![0.0; size],
        }
    }

    /// Seed an unknown before the first Newton iteration.
    pub fn seed(&mut self, index: usize, value: f64) {
        self.solution[index] = value;
        self.soln_max[index] = value.abs();
    }

    /// Forget the current solution and start over from `seeds`.
    pub fn reset(&mut self, seeds: &[(usize, f64)]) {
        self.solution.fill(0.0);
        self.soln_max.fill(0.0);
        for &(index, value) in seeds {
            self.seed(index, value);
        }
    }
}

impl Matrix {
    /// Two-terminal stamp of `value` between `n1` and `n2`.
    ///
    /// For a conductance G between nodes n1 and n2:
    ///   M[n1,n1] += G
    ///   M[n2,n2] += G
    ///   M[n1,n2] -= G
    ///   M[n2,n1] -= G
    pub fn stamp_two_terminal(&mut self, n1: Node, n2: Node, value: f64) {
        if let Some(i) = n1 {
            self.add(i, i, value);
        }
        if let Some(j) = n2 {
            self.add(j, j, value);
        }
        if let (Some(i), Some(j)) = (n1, n2) {
            self.add(i, j, -value);
            self.add(j, i, -value);
        }
    }

    /// Add `value` at `(row, col)` unless either is ground.
    pub fn stamp(&mut self, row: Node, col: Node, value: f64) {
        if let (Some(i), Some(j)) = (row, col) {
            self.add(i, j, value);
        }
    }
}

/// Add `value` to `rhs[node]` unless the node is ground.
pub fn add_rhs(rhs: &mut [f64], node: Node, value: f64) {
    if let Some(i) = node {
        rhs[i] += value;
    }
}

/// Potential of `node` in `soln`; ground reads as zero.
pub fn voltage(soln: &[f64], node: Node) -> f64 {
    node.map(|i| soln[i]).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_terminal_skips_ground() {
        let mut m = Matrix::zeros(2, 2);
        m.stamp_two_terminal(Some(0), Some(1), 2.0);
        m.stamp_two_terminal(Some(1), None, 1.0);
        assert_eq!(m.row(0), &[2.0, -2.0]);
        assert_eq!(m.row(1), &[-2.0, 3.0]);
    }

    #[test]
    fn test_workspace_tolerances() {
        let config = SolverConfig::default();
        let mut ws = MnaWorkspace::new(vec![UnknownKind::Voltage, UnknownKind::Current], &config);
        assert_eq!(ws.abstol, vec![config.v_abstol, config.i_abstol]);
        assert_eq!(ws.matrix.cols(), 3);

        ws.seed(0, 1.5);
        assert_eq!(voltage(&ws.solution, Some(0)), 1.5);
        assert_eq!(voltage(&ws.solution, None), 0.0);

        ws.solution[1] = 3.0;
        ws.reset(&[(0, -2.0)]);
        assert_eq!(ws.solution, vec![-2.0, 0.0]);
        assert_eq!(ws.soln_max, vec![2.0, 0.0]);
    }
}
