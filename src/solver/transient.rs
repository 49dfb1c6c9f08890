//! Transient analysis with adaptive time steps.
//!
//! Integration is trapezoidal, blended per unknown: rows of `C` that are
//! linearly dependent on the others (algebraic unknowns) use Backward-Euler
//! current weighting. Three synthetic Backward-Euler steps at `t = 0` seed
//! the history before regular stepping starts.
//!
//! Step size is chosen from the local truncation error, estimated by
//! comparing each solution with a quadratic extrapolated from the three
//! previous points. A step whose error is too large is retried shorter; a
//! step where Newton fails is retried at a quarter of its length.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::circuit::Node;
use crate::components::Device;
use crate::error::{NodalError, Result};

use super::config::SolverConfig;
use super::matrix::{dependent_rows, scale_add, Scale};
use super::mna::MnaWorkspace;
use super::newton::Convergence;
use super::results::{StepControl, TranProgress, TranResult, TranStats};
use super::simulator::Simulator;

/// Synthetic steps taken before the first recorded point.
const PRE_STEPS: i64 = 3;

/// Runs always start here.
const TSTART: f64 = 0.0;

/// Steps shorter than this fraction of the run use Backward-Euler.
const BE_FRACTION: f64 = 1e-4;

/// Integration state carried from step to step.
#[derive(Debug)]
struct History {
    /// Device currents at the present iterate, `-Gl x` plus sources
    c: Vec<f64>,
    /// Stored charge/flux, `C x`
    q: Vec<f64>,
    oldc: Vec<f64>,
    oldq: Vec<f64>,
    oldsol: Vec<f64>,
    old2sol: Vec<f64>,
    old3sol: Vec<f64>,
    beta0: Vec<f64>,
    beta1: Vec<f64>,
    alpha0: f64,
    alpha1: f64,
    time: f64,
    oldt: f64,
    old2t: f64,
    old3t: f64,
}

impl History {
    fn new(n: usize) -> Self {
        Self {
            c: vec![0.0; n],
            q: vec![0.0; n],
            oldc: vec![0.0; n],
            oldq: vec![0.0; n],
            oldsol: vec![0.0; n],
            old2sol: vec![0.0; n],
            old3sol: vec![0.0; n],
            beta0: vec![1.0; n],
            beta1: vec![0.0; n],
            alpha0: 1.0,
            alpha1: 0.0,
            time: TSTART,
            oldt: 0.0,
            old2t: 0.0,
            old3t: 0.0,
        }
    }

    /// Push the accepted point into the history.
    fn rotate(&mut self, solution: &[f64]) {
        self.oldc.copy_from_slice(&self.c);
        std::mem::swap(&mut self.old3sol, &mut self.old2sol);
        std::mem::swap(&mut self.old2sol, &mut self.oldsol);
        self.oldsol.copy_from_slice(solution);
        self.oldq.copy_from_slice(&self.q);
    }

    /// Per-unknown current weights: `beta0` on the new current, `beta1`
    /// on the old. Algebraic rows put all weight on the new current.
    fn set_weights(&mut self, b0: f64, b1: f64, algebraic: &[bool]) {
        for (i, &ar) in algebraic.iter().enumerate() {
            let ar = if ar { 1.0 } else { 0.0 };
            self.beta0[i] = b0 + ar * b1;
            self.beta1[i] = (1.0 - ar) * b1;
        }
    }
}

/// Load `-f` and `df/dx` for one implicit step.
///
/// `rhs = beta0 c(t) + beta1 c(t_old) - (alpha0 q(t) + alpha1 q(t_old))`
/// and the system matrix is `beta0 G + alpha0 C`.
fn load_tran(devices: &[Device], ws: &mut MnaWorkspace, hist: &mut History) -> Result<()> {
    let MnaWorkspace {
        gl,
        g,
        c,
        matrix,
        rhs,
        solution,
        ..
    } = ws;
    gl.mul_vec(solution, &mut hist.c, -1.0)?;
    g.copy_from(gl)?;
    for device in devices {
        device.load_tran(solution, g, &mut hist.c, hist.time);
    }
    c.mul_vec(solution, &mut hist.q, 1.0)?;

    for (i, r) in rhs.iter_mut().enumerate() {
        let dqdt = hist.alpha0 * hist.q[i] + hist.alpha1 * hist.oldq[i];
        *r = hist.beta0[i] * hist.c[i] + hist.beta1[i] * hist.oldc[i] - dqdt;
    }
    scale_add(
        g,
        c,
        Scale::Rows(&hist.beta0),
        Scale::Scalar(hist.alpha0),
        matrix,
    )
}

/// Step-size limits for one run.
#[derive(Debug, Clone, Copy)]
struct StepBounds {
    min_step: f64,
    max_step: f64,
    max_nsteps: i64,
}

impl StepBounds {
    /// Derive bounds from `tstop` and the shortest source period.
    ///
    /// The run is split into whole periods; each gets `tran_points` target
    /// points and a budget of `max_steps_per_period` steps.
    fn new(tstop: f64, shortest_period: Option<f64>, config: &SolverConfig) -> Self {
        let period = shortest_period.map_or(tstop, |p| p.min(tstop));
        let periods = (tstop / period).ceil().max(1.0);
        let max_step = tstop / (periods * config.tran_points as f64);
        Self {
            min_step: max_step / 1e8,
            max_step,
            max_nsteps: (periods as i64).saturating_mul(config.max_steps_per_period as i64),
        }
    }
}

/// Earliest source breakpoint strictly after `t`.
fn next_breakpoint(devices: &[Device], t: f64) -> Option<f64> {
    devices
        .iter()
        .filter_map(Device::source)
        .filter_map(|s| s.next_breakpoint(t))
        .fold(None, |acc: Option<f64>, bp| Some(acc.map_or(bp, |a| a.min(bp))))
}

/// New step size from the truncation error of the step just taken.
fn pick_step(
    hist: &History,
    ws: &MnaWorkspace,
    ltecheck: &[bool],
    bounds: &StepBounds,
    config: &SolverConfig,
) -> f64 {
    let min_shrink = 1.0 / config.lte_step_decrease_factor;
    let max_growth = config.step_increase_factor;

    let dtt0 = hist.time - hist.oldt;
    let dtt1 = hist.time - hist.old2t;
    let dtt2 = hist.time - hist.old3t;
    let dt0dt1 = hist.oldt - hist.old2t;
    let dt0dt2 = hist.oldt - hist.old3t;
    let dt1dt2 = hist.old2t - hist.old3t;
    let p0 = (dtt1 * dtt2) / (dt0dt1 * dt0dt2);
    let p1 = (dtt0 * dtt2) / (-dt0dt1 * dt1dt2);
    let p2 = (dtt0 * dtt1) / (dt0dt2 * dt1dt2);

    let trapcoeff = 0.5 * dtt0 / dtt2;
    let mut max_ratio = 0.0f64;
    for i in (0..ws.size).filter(|&i| ltecheck[i]) {
        let pred = p0 * hist.oldsol[i] + p1 * hist.old2sol[i] + p2 * hist.old3sol[i];
        let lte = (ws.solution[i] - pred).abs() * trapcoeff;
        let tol = config.lte_rel * (ws.abstol[i] + config.reltol * ws.soln_max[i]);
        max_ratio = max_ratio.max(lte / tol);
    }

    // Cube root: the error of the trapezoidal rule is third order.
    let ratio = 1.0 / max_ratio.cbrt();
    if ratio < 1.0 {
        let ratio = ratio.max(min_shrink);
        (dtt0 * 0.75 * ratio).max(bounds.min_step)
    } else {
        let ratio = ratio.min(max_growth);
        let step = if ratio > 1.2 { dtt0 * ratio / 1.2 } else { dtt0 };
        step.min(bounds.max_step)
    }
}

/// Waveforms accumulated so far.
struct Recorder {
    signals: Vec<(String, Node)>,
    response: Vec<Vec<f64>>,
    times: Vec<f64>,
}

impl Recorder {
    fn new(signals: Vec<(String, Node)>, n: usize) -> Self {
        Self {
            signals,
            response: vec![Vec::new(); n],
            times: Vec::new(),
        }
    }

    fn record(&mut self, solution: &[f64]) {
        for (series, x) in self.response.iter_mut().zip(solution) {
            series.push(*x);
        }
    }

    fn result(&self, stats: &TranStats, stopped_early: bool) -> TranResult {
        let points = self.times.len();
        let signals: BTreeMap<String, Vec<f64>> = self
            .signals
            .iter()
            .map(|(name, node)| {
                let values = match node {
                    Some(i) => self.response[*i][..points].to_vec(),
                    None => vec![0.0; points],
                };
                (name.clone(), values)
            })
            .collect();
        TranResult {
            times: self.times.clone(),
            signals,
            stats: stats.clone(),
            stopped_early,
        }
    }
}

impl Simulator {
    /// Simulate from `t = 0` to `tstop`.
    ///
    /// The run starts from the DC operating point, or from the initial
    /// guess if none can be found. `probes` names signals whose truncation
    /// error also limits the step, in addition to every state variable.
    ///
    /// `progress` is called with [`TranProgress::Running`] about every
    /// configured interval and may answer [`StepControl::Stop`] to end the
    /// run early with the points computed so far. It is called exactly once
    /// with [`TranProgress::Finished`] holding the value this method
    /// returns.
    pub fn solve_transient<S, F>(&mut self, tstop: f64, probes: &[S], mut progress: F) -> Result<TranResult>
    where
        S: AsRef<str>,
        F: FnMut(TranProgress<'_>) -> StepControl,
    {
        let result = self.run_transient(tstop, probes, &mut progress);
        progress(TranProgress::Finished(&result));
        result
    }

    fn run_transient<S, F>(&mut self, tstop: f64, probes: &[S], progress: &mut F) -> Result<TranResult>
    where
        S: AsRef<str>,
        F: FnMut(TranProgress<'_>) -> StepControl,
    {
        if !(tstop > 0.0 && tstop.is_finite()) {
            return Err(NodalError::invalid_param(format!(
                "transient stop time must be positive, got {}",
                tstop
            )));
        }

        if let Convergence::Failed { problem_node } = self.run_dc()? {
            log::warn!(
                "DC operating point not found (trouble at {}), starting transient from the initial guess",
                problem_node
                    .map(|i| self.circuit.unknown_name(i))
                    .unwrap_or("?")
            );
            let seeds = self.circuit.initial_voltages.clone();
            let (_, ws) = self.circuit.split_mut()?;
            ws.reset(&seeds);
        }

        let shortest_period = self
            .circuit
            .devices
            .iter()
            .filter_map(Device::source)
            .map(|s| s.period())
            .filter(|p| *p > 0.0)
            .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.min(p))));
        let bounds = StepBounds::new(tstop, shortest_period, &self.config);

        let names = self.circuit.unknown_names.clone();
        let probe_nodes: Vec<usize> = probes
            .iter()
            .filter_map(|p| match self.circuit.node(p.as_ref()) {
                Some(node) => node,
                None => {
                    log::warn!("unknown probe '{}' ignored", p.as_ref());
                    None
                }
            })
            .collect();
        let mut recorder = Recorder::new(self.circuit.result_signals(), names.len());

        let config = &self.config;
        let newton = &mut self.newton;
        let (devices, ws) = self.circuit.split_mut()?;
        let devices: &[Device] = devices;
        let n = ws.size;

        let algebraic = dependent_rows(&ws.c, config.eps);
        let mut ltecheck: Vec<bool> = algebraic.iter().map(|ar| !ar).collect();
        for i in probe_nodes {
            ltecheck[i] = true;
        }
        log::debug!(
            "transient: {} of {} unknowns algebraic, max step {:e}",
            algebraic.iter().filter(|a| **a).count(),
            n,
            bounds.max_step
        );

        let mut hist = History::new(n);
        let mut new_step = bounds.max_step / 1e6;
        hist.oldt = hist.time - new_step;
        hist.old2t = hist.oldt - new_step;
        hist.old3t = hist.old2t - new_step;

        // Currents and charges at the starting point
        load_tran(devices, ws, &mut hist)?;

        let mut stats = TranStats::default();
        let mut step_index = -PRE_STEPS;
        let mut after_breakpoint = false;
        let mut stopped_early = false;
        let mut finished = false;
        let interval = config.progress_interval();
        let mut next_update = Instant::now() + interval;

        while step_index < bounds.max_nsteps {
            if step_index >= 0 {
                recorder.record(&ws.solution);
            }
            hist.rotate(&ws.solution);

            let mut landing = None;
            let (b0, b1) = if step_index < 0 {
                // Synthetic step ending at the start time
                hist.old3t = hist.old2t - (hist.oldt - hist.old2t);
                hist.old2t = hist.oldt - (TSTART - hist.oldt);
                hist.oldt = TSTART - (hist.time - hist.oldt);
                hist.time = TSTART;
                (1.0, 0.0)
            } else {
                recorder.times.push(hist.time);
                hist.old3t = hist.old2t;
                hist.old2t = hist.oldt;
                hist.oldt = hist.time;

                if hist.time >= tstop {
                    finished = true;
                    break;
                } else if hist.time + new_step > tstop {
                    hist.time = tstop;
                } else if hist.time + 1.5 * new_step > tstop {
                    hist.time += (2.0 / 3.0) * (tstop - hist.time);
                } else {
                    hist.time += new_step;
                }

                if let Some(bp) = next_breakpoint(devices, hist.oldt + bounds.min_step).filter(|bp| *bp < tstop) {
                    let step = hist.time - hist.oldt;
                    if hist.time >= bp {
                        hist.time = bp;
                        landing = Some(bp);
                    } else if hist.time + step > bp && 0.5 * (bp - hist.oldt) >= bounds.min_step {
                        hist.time = hist.oldt + 0.5 * (bp - hist.oldt);
                    }
                }

                if after_breakpoint {
                    (1.0, 0.0)
                } else {
                    (0.5, 0.5)
                }
            };
            hist.set_weights(b0, b1, &algebraic);

            // Find a step where Newton converges and the error is acceptable
            loop {
                let step = hist.time - hist.oldt;
                hist.alpha0 = 1.0 / step;
                hist.alpha1 = -hist.alpha0;
                if step < BE_FRACTION * tstop {
                    hist.beta0.fill(1.0);
                    hist.beta1.fill(0.0);
                }

                let at_floor = step < (1.0 + config.reltol) * bounds.min_step;
                let outcome = newton.find_solution(ws, config.tran_max_iters, |ws| load_tran(devices, ws, &mut hist))?;
                match outcome {
                    Convergence::Converged { iterations } => {
                        stats.newton_iterations += iterations;
                        if step_index <= 0 || at_floor {
                            if step_index > 0 {
                                new_step = config.step_increase_factor * bounds.min_step;
                            }
                            break;
                        }
                        new_step = pick_step(&hist, ws, &ltecheck, &bounds, config);
                        if new_step < (1.0 - config.reltol) * step {
                            stats.lte_rejections += 1;
                            log::trace!("t={:e}: step {:e} rejected, retry {:e}", hist.time, step, new_step);
                            hist.time = hist.oldt + new_step;
                        } else {
                            break;
                        }
                    }
                    Convergence::Failed { problem_node } => {
                        stats.newton_failures += 1;
                        let node = problem_node
                            .and_then(|i| names.get(i))
                            .cloned()
                            .unwrap_or_default();
                        if at_floor {
                            return Err(NodalError::TransientNonConvergence {
                                time: hist.time,
                                node,
                                partial: Box::new(recorder.result(&stats, false)),
                            });
                        }
                        log::debug!("t={:e}: newton failed at {}, shrinking step", hist.time, node);
                        ws.solution.copy_from_slice(&hist.oldsol);
                        let shorter = (step / config.nr_step_decrease_factor).max(bounds.min_step);
                        hist.time = hist.oldt + shorter;
                    }
                }
            }

            if step_index >= 0 {
                stats.record_step(hist.time - hist.oldt);
                after_breakpoint = landing == Some(hist.time);
                if after_breakpoint {
                    stats.breakpoints += 1;
                }
            }
            step_index += 1;

            let now = Instant::now();
            if now >= next_update {
                let percent = (100.0 * (hist.time - TSTART) / (tstop - TSTART)).round();
                if progress(TranProgress::Running { percent }) == StepControl::Stop {
                    log::warn!("transient stopped by request at t={:e}", hist.time);
                    recorder.record(&ws.solution);
                    recorder.times.push(hist.time);
                    stopped_early = true;
                    break;
                }
                next_update = now + interval;
            }
        }

        if !finished && !stopped_early {
            log::warn!(
                "transient step budget of {} exhausted at t={:e}",
                bounds.max_nsteps,
                hist.time
            );
        }

        let result = recorder.result(&stats, stopped_early);
        log::info!(
            "transient: {} points, {} newton failures, {} LTE rejections",
            result.times.len(),
            stats.newton_failures,
            stats.lte_rejections
        );
        Ok(result)
    }
}
