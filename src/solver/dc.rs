//! DC operating point and DC sweeps.

use crate::components::Device;
use crate::error::{DcFailureCause, NodalError, Result};
use crate::waveform::Source;

use super::mna::MnaWorkspace;
use super::newton::Convergence;
use super::results::{DcResult, DcSweepResult, Sweep, SweepTable};
use super::simulator::Simulator;

/// Load `-f` and `df/dx` for the operating point.
///
/// `rhs = -Gl x` plus each device's DC contribution, and the system matrix
/// is `Gl` plus the linearized nonlinear devices.
pub(crate) fn load_dc(devices: &[Device], ws: &mut MnaWorkspace) -> Result<()> {
    let MnaWorkspace {
        gl,
        g,
        matrix,
        rhs,
        solution,
        ..
    } = ws;
    gl.mul_vec(solution, rhs, -1.0)?;
    g.copy_from(gl)?;
    for device in devices {
        device.load_dc(solution, g, rhs);
    }
    matrix.copy_from(g)
}

impl Simulator {
    /// Run Newton on the DC equations from the present solution.
    pub(super) fn run_dc(&mut self) -> Result<Convergence> {
        let max_iters = self.config.dc_max_iters;
        let newton = &mut self.newton;
        let (devices, ws) = self.circuit.split_mut()?;
        let devices: &[Device] = devices;
        newton.find_solution(ws, max_iters, |ws| load_dc(devices, ws))
    }

    /// Find the operating point, or explain why it could not be found.
    pub(super) fn operating_point(&mut self) -> Result<usize> {
        match self.run_dc()? {
            Convergence::Converged { iterations } => {
                log::debug!("operating point found in {} iterations", iterations);
                Ok(iterations)
            }
            Convergence::Failed { problem_node } => Err(self.dc_failure(problem_node)),
        }
    }

    fn dc_failure(&self, problem_node: Option<usize>) -> NodalError {
        let cause = if self.circuit.current_sources.is_empty() {
            DcFailureCause::OscillatingLoop
        } else {
            DcFailureCause::CurrentSourceWithoutPath
        };
        NodalError::DcNonConvergence {
            cause,
            node: problem_node
                .map(|i| self.circuit.unknown_name(i).to_string())
                .unwrap_or_default(),
        }
    }

    /// Compute the DC operating point.
    ///
    /// Every source takes its `dc` value, capacitors are open and inductors
    /// are shorts. The result holds every signal name plus `I(<source>)` for
    /// each voltage source.
    pub fn solve_dc(&mut self) -> Result<DcResult> {
        let iterations = self.operating_point()?;
        log::info!("DC operating point: {} iterations", iterations);
        Ok(DcResult {
            values: self.signal_values(),
            iterations,
        })
    }

    /// Sweep one source through a range of DC values, optionally nested
    /// inside a sweep of a second source.
    ///
    /// Each point starts Newton from the previous one. The swept sources
    /// get their original waveforms back afterwards, also on error.
    pub fn solve_dc_sweep(&mut self, sweep1: &Sweep, sweep2: Option<&Sweep>) -> Result<DcSweepResult> {
        let inner = self.sweep_target(sweep1)?;
        let outer = sweep2.map(|s| self.sweep_target(s)).transpose()?;

        let saved_inner = self.swap_source(inner.0, None);
        let saved_outer = outer.as_ref().map(|(index, _)| (*index, self.swap_source(*index, None)));

        let outcome = self.run_sweeps(&inner, outer.as_ref());

        if let Some((index, saved)) = saved_outer {
            self.swap_source(index, saved);
        }
        self.swap_source(inner.0, saved_inner);
        outcome
    }

    fn run_sweeps(&mut self, inner: &(usize, Vec<f64>), outer: Option<&(usize, Vec<f64>)>) -> Result<DcSweepResult> {
        let outer_values: Vec<Option<f64>> = match outer {
            Some((_, values)) => values.iter().copied().map(Some).collect(),
            None => vec![None],
        };

        let mut result = DcSweepResult::default();
        for outer_value in outer_values {
            if let (Some((index, _)), Some(v)) = (outer, outer_value) {
                self.swap_source(*index, Some(Source::constant(v)));
                result.outer.push(v);
            }

            let mut table = SweepTable::default();
            for &v in &inner.1 {
                self.swap_source(inner.0, Some(Source::constant(v)));
                self.operating_point()?;
                table.sweep.push(v);
                for (name, value) in self.signal_values() {
                    table.signals.entry(name).or_default().push(value);
                }
            }
            result.tables.push(table);
        }
        log::info!(
            "DC sweep: {} tables of {} points",
            result.tables.len(),
            inner.1.len()
        );
        Ok(result)
    }

    /// Resolve a sweep to its source index and the values to visit.
    fn sweep_target(&self, sweep: &Sweep) -> Result<(usize, Vec<f64>)> {
        let index = self.circuit.source_index(&sweep.source)?;
        Ok((index, sweep_values(sweep)?))
    }

    /// Replace the waveform of source `index`, returning the old one.
    ///
    /// `None` leaves the waveform in place and returns a copy of it.
    fn swap_source(&mut self, index: usize, source: Option<Source>) -> Option<Source> {
        let slot = self.circuit.devices.get_mut(index)?.source_mut()?;
        match source {
            Some(new) => Some(std::mem::replace(slot, new)),
            None => Some(slot.clone()),
        }
    }
}

/// Largest number of points in one sweep.
const MAX_SWEEP_POINTS: usize = 1_000_000;

/// Values from `start` to `stop`, moving toward `stop` whatever the sign of
/// `step`, and ending exactly on `stop`.
fn sweep_values(sweep: &Sweep) -> Result<Vec<f64>> {
    let Sweep {
        start, stop, step, ..
    } = *sweep;
    if !(start.is_finite() && stop.is_finite() && step.is_finite()) || step == 0.0 {
        return Err(NodalError::invalid_param(format!(
            "DC sweep of {} needs finite bounds and a non-zero step",
            sweep.source
        )));
    }
    let step = if start <= stop { step.abs() } else { -step.abs() };

    // Whole steps that fit; a remainder within 1% of a step counts as one.
    let spans = (stop - start) / step;
    let whole = if (spans - spans.round()).abs() < 0.01 {
        spans.round()
    } else {
        spans.floor()
    };
    if whole >= MAX_SWEEP_POINTS as f64 {
        return Err(NodalError::invalid_param(format!(
            "DC sweep of {} would take more than {} points",
            sweep.source, MAX_SWEEP_POINTS
        )));
    }

    let mut values: Vec<f64> = (0..=whole as usize).map(|k| start + k as f64 * step).collect();
    match values.last_mut() {
        Some(last) if (*last - stop).abs() < (0.01 * step).abs() => *last = stop,
        _ => values.push(stop),
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_values_land_on_stop() {
        let values = sweep_values(&Sweep::new("V1", 0.0, 1.0, 0.3)).unwrap();
        assert_eq!(values.len(), 5);
        assert_eq!(*values.last().unwrap(), 1.0);
    }

    #[test]
    fn test_sweep_values_fix_step_sign() {
        let values = sweep_values(&Sweep::new("V1", 2.0, 0.0, 1.0)).unwrap();
        assert_eq!(values, vec![2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_sweep_values_near_whole_steps() {
        let values = sweep_values(&Sweep::new("V1", 0.0, 1.0, 0.1)).unwrap();
        assert_eq!(values.len(), 11);
        assert_eq!(values[10], 1.0);

        let single = sweep_values(&Sweep::new("V1", 3.0, 3.0, 1.0)).unwrap();
        assert_eq!(single, vec![3.0]);
    }

    #[test]
    fn test_step_below_resolution_rejected() {
        let err = sweep_values(&Sweep::new("V1", 1.0, 2.0, 1e-20)).unwrap_err();
        assert!(matches!(err, NodalError::InvalidSimulationParam { .. }));
    }

    #[test]
    fn test_zero_step_rejected() {
        assert!(sweep_values(&Sweep::new("V1", 0.0, 1.0, 0.0)).is_err());
    }
}
