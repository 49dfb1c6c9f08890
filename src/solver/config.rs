//! Numerical settings shared by all analyses.

use std::time::Duration;

use serde::Deserialize;

/// Tolerances, iteration caps and step-control factors.
///
/// Every field has a default, so an options file only needs to list the
/// values it overrides:
///
/// ```
/// let config: nodal_core::SolverConfig =
///     serde_json::from_str(r#"{"reltol": 1e-3, "i_abstol": 1e-9}"#).unwrap();
/// assert_eq!(config.i_abstol, 1e-9);
/// assert_eq!(config.v_abstol, 1e-6);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Absolute tolerance for voltage unknowns (volts).
    pub v_abstol: f64,
    /// Absolute tolerance for current unknowns (amps).
    pub i_abstol: f64,
    /// Relative tolerance for all unknowns.
    pub reltol: f64,
    /// Largest voltage change per Newton iteration once limiting is on.
    pub v_newton_limit: f64,
    /// Pivot and rank threshold for the dense solvers.
    pub eps: f64,
    /// Newton iteration cap for the operating point.
    pub dc_max_iters: usize,
    /// Newton iteration cap per transient time point.
    pub tran_max_iters: usize,
    /// Step growth after a step taken at the floor.
    pub step_increase_factor: f64,
    /// Largest shrink applied by the LTE controller.
    pub lte_step_decrease_factor: f64,
    /// Shrink applied after a Newton failure.
    pub nr_step_decrease_factor: f64,
    /// Slack applied to the LTE bound.
    pub lte_rel: f64,
    /// Target number of time points per source period.
    pub tran_points: usize,
    /// Step budget per source period.
    pub max_steps_per_period: usize,
    /// How often the transient progress callback runs, in milliseconds.
    pub progress_interval_ms: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            v_abstol: 1e-6,
            i_abstol: 1e-12,
            reltol: 1e-4,
            v_newton_limit: 0.3,
            eps: 1e-12,
            dc_max_iters: 1000,
            tran_max_iters: 20,
            step_increase_factor: 2.0,
            lte_step_decrease_factor: 8.0,
            nr_step_decrease_factor: 4.0,
            lte_rel: 10.0,
            tran_points: 100,
            max_steps_per_period: 50_000,
            progress_interval_ms: 250,
        }
    }
}

impl SolverConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the voltage absolute tolerance.
    pub fn with_v_abstol(mut self, v_abstol: f64) -> Self {
        self.v_abstol = v_abstol;
        self
    }

    /// Set the current absolute tolerance.
    pub fn with_i_abstol(mut self, i_abstol: f64) -> Self {
        self.i_abstol = i_abstol;
        self
    }

    /// Set the relative tolerance.
    pub fn with_reltol(mut self, reltol: f64) -> Self {
        self.reltol = reltol;
        self
    }

    /// Set the target number of time points per period.
    pub fn with_tran_points(mut self, tran_points: usize) -> Self {
        self.tran_points = tran_points.max(1);
        self
    }

    /// Set the progress callback interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Progress callback interval.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Absolute bound on the voltage-row residual norm.
    pub fn res_check_abs(&self) -> f64 {
        self.i_abstol.sqrt()
    }

    /// Relative bound on the voltage-row residual norm.
    pub fn res_check_rel(&self) -> f64 {
        self.reltol.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_partial_override() {
        let config: SolverConfig = serde_json::from_str(r#"{"i_abstol": 1e-10}"#).unwrap();
        assert_eq!(config.i_abstol, 1e-10);
        assert_relative_eq!(config.res_check_abs(), 1e-5);
        assert_eq!(config.dc_max_iters, 1000);
    }

    #[test]
    fn test_builders() {
        let config = SolverConfig::new()
            .with_reltol(1e-3)
            .with_progress_interval(Duration::from_millis(10));
        assert_eq!(config.reltol, 1e-3);
        assert_eq!(config.progress_interval(), Duration::from_millis(10));
    }
}
