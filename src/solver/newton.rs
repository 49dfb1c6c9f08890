//! Newton-Raphson iteration for nonlinear circuits.
//!
//! The caller supplies a load function that fills `ws.rhs` with the negated
//! residual `-f(x)` and `ws.matrix` with the Jacobian at `ws.solution`. Each
//! iteration solves for the update and applies it, optionally limiting how
//! far node voltages may move.

use crate::circuit::UnknownKind;
use crate::error::Result;

use super::config::SolverConfig;
use super::matrix::solve_orthogonal;
use super::mna::MnaWorkspace;

/// Consecutive residual decreases after which limiting is switched off.
const LIMITING_RELEASE_COUNT: usize = 10;

/// Outcome of one Newton solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// Converged after this many iterations
    Converged { iterations: usize },
    /// Iteration cap reached; `problem_node` last failed the delta check
    Failed { problem_node: Option<usize> },
}

/// Newton-Raphson solver with adaptive voltage-step limiting.
#[derive(Debug, Clone)]
pub struct NewtonRaphson {
    /// Relative tolerance on solution updates
    pub reltol: f64,
    /// Largest voltage update per iteration while limiting
    pub v_limit: f64,
    res_check_abs: f64,
    res_check_rel: f64,
    eps: f64,
    d_sol: Vec<f64>,
}

impl NewtonRaphson {
    /// Create a solver from the configured tolerances.
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            reltol: config.reltol,
            v_limit: config.v_newton_limit,
            res_check_abs: config.res_check_abs(),
            res_check_rel: config.res_check_rel(),
            eps: config.eps,
            d_sol: Vec::new(),
        }
    }

    /// Iterate until the update and the residual are both small.
    ///
    /// Convergence needs every `|dx_i| <= abstol_i + reltol * soln_max_i`
    /// and a loose check on the summed residual of the node equations,
    /// skipped on the last allowed iteration. When the residual grows while
    /// limiting is off, the previous update is undone and limiting switches
    /// on; it switches back off after a run of improving iterations.
    pub fn find_solution<F>(&mut self, ws: &mut MnaWorkspace, max_iters: usize, mut load: F) -> Result<Convergence>
    where
        F: FnMut(&mut MnaWorkspace) -> Result<()>,
    {
        let n = ws.size;
        self.d_sol.clear();
        self.d_sol.resize(n, 0.0);

        let mut limiting = false;
        let mut down_count = 0;
        let mut abssum_old = 0.0;
        let mut abssum_compare = 0.0;
        let mut problem_node = None;

        let mut iter = 0;
        while iter < max_iters {
            load(ws)?;

            let abssum: f64 = ws
                .rhs
                .iter()
                .zip(&ws.kinds)
                .filter(|(_, kind)| **kind == UnknownKind::Voltage)
                .map(|(r, _)| r.abs())
                .sum();

            if iter > 0 && !limiting && abssum_old < abssum {
                // The previous update made things worse: back it out and
                // retry it with limiting on.
                for (x, d) in ws.solution.iter_mut().zip(&self.d_sol) {
                    *x -= d;
                }
                iter -= 1;
                limiting = true;
                log::debug!("newton: residual grew, limiting on");
            } else {
                for (i, r) in ws.rhs.iter().enumerate() {
                    ws.matrix.set(i, n, *r);
                }
                self.d_sol = solve_orthogonal(&mut ws.matrix, self.eps);

                if abssum < abssum_old {
                    down_count += 1;
                } else {
                    down_count = 0;
                }
                if down_count > LIMITING_RELEASE_COUNT {
                    limiting = false;
                    down_count = 0;
                }
                abssum_old = abssum;
            }

            if iter == 0 || abssum > abssum_compare {
                abssum_compare = abssum;
            }

            let mut converged = iter + 1 >= max_iters
                || abssum <= self.res_check_abs + self.res_check_rel * abssum_compare;

            for i in 0..n {
                if limiting && ws.kinds[i] == UnknownKind::Voltage {
                    self.d_sol[i] = self.d_sol[i].clamp(-self.v_limit, self.v_limit);
                }
                ws.solution[i] += self.d_sol[i];
                let thresh = ws.abstol[i] + self.reltol * ws.soln_max[i];
                if self.d_sol[i].abs() > thresh {
                    converged = false;
                    problem_node = Some(i);
                }
            }

            if converged {
                for (max, x) in ws.soln_max.iter_mut().zip(&ws.solution) {
                    *max = max.max(x.abs());
                }
                return Ok(Convergence::Converged { iterations: iter + 1 });
            }
            iter += 1;
        }
        Ok(Convergence::Failed { problem_node })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::matrix::Matrix;

    fn workspace(kinds: Vec<UnknownKind>) -> MnaWorkspace {
        MnaWorkspace::new(kinds, &SolverConfig::default())
    }

    #[test]
    fn test_linear_system_converges_quickly() {
        // 2 S to ground driven by 1 A: x = 0.5
        let mut ws = workspace(vec![UnknownKind::Voltage]);
        let mut newton = NewtonRaphson::new(&SolverConfig::default());
        let outcome = newton
            .find_solution(&mut ws, 100, |ws| {
                ws.rhs[0] = 1.0 - 2.0 * ws.solution[0];
                ws.matrix.copy_from(&Matrix::from_rows(&[[2.0]])?)?;
                Ok(())
            })
            .unwrap();
        assert!(matches!(outcome, Convergence::Converged { iterations } if iterations <= 3));
        assert!((ws.solution[0] - 0.5).abs() < 1e-12);
        assert_eq!(ws.soln_max[0], ws.solution[0]);
    }

    #[test]
    fn test_nonlinear_scalar() {
        // f(x) = x^3 - 8, root at 2
        let mut ws = workspace(vec![UnknownKind::Voltage]);
        ws.seed(0, 1.0);
        let mut newton = NewtonRaphson::new(&SolverConfig::default());
        let outcome = newton
            .find_solution(&mut ws, 100, |ws| {
                let x = ws.solution[0];
                ws.rhs[0] = -(x * x * x - 8.0);
                ws.matrix.set(0, 0, 3.0 * x * x);
                Ok(())
            })
            .unwrap();
        assert!(matches!(outcome, Convergence::Converged { .. }));
        assert!((ws.solution[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_reports_problem_node() {
        // Update never shrinks: x keeps growing by 1 per iteration.
        let mut ws = workspace(vec![UnknownKind::Current, UnknownKind::Voltage]);
        let mut newton = NewtonRaphson::new(&SolverConfig::default());
        let outcome = newton
            .find_solution(&mut ws, 5, |ws| {
                ws.rhs[0] = 0.0;
                ws.rhs[1] = 1.0;
                ws.matrix.set(0, 0, 1.0);
                ws.matrix.set(1, 1, 1.0);
                Ok(())
            })
            .unwrap();
        assert_eq!(outcome, Convergence::Failed { problem_node: Some(1) });
    }
}
