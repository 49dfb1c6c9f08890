//! Analysis results.
//!
//! Every result maps signal names (node names and `I(<source>)` branch
//! currents) to values. Maps are ordered so serialized output is stable.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;

/// DC operating point: signal name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DcResult {
    pub values: BTreeMap<String, f64>,
    /// Newton iterations used
    pub iterations: usize,
}

impl DcResult {
    /// Value of one signal.
    pub fn get(&self, signal: &str) -> Option<f64> {
        self.values.get(signal).copied()
    }
}

/// One DC sweep parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sweep {
    /// Name of the independent source being swept
    pub source: String,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl Sweep {
    pub fn new(source: impl Into<String>, start: f64, stop: f64, step: f64) -> Self {
        Self {
            source: source.into(),
            start,
            stop,
            step,
        }
    }
}

/// Signals recorded over one pass of the inner sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepTable {
    /// Values taken by the swept source
    pub sweep: Vec<f64>,
    pub signals: BTreeMap<String, Vec<f64>>,
}

/// DC sweep over one source, or nested over two.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DcSweepResult {
    /// Values of the outer source; empty for a single sweep
    pub outer: Vec<f64>,
    /// One table per outer value (a single table without an outer sweep)
    pub tables: Vec<SweepTable>,
}

/// Magnitude and phase of one signal across the frequency sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcSignal {
    pub magnitude: Vec<f64>,
    /// Unwrapped phase in degrees
    pub phase: Vec<f64>,
}

/// Small-signal frequency response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcResult {
    pub frequencies: Vec<f64>,
    pub signals: BTreeMap<String, AcSignal>,
}

/// Transient step statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranStats {
    /// Accepted time points
    pub accepted_steps: usize,
    /// Steps retried after Newton failed
    pub newton_failures: usize,
    /// Steps retried because the truncation error was too large
    pub lte_rejections: usize,
    /// Source breakpoints landed on
    pub breakpoints: usize,
    /// Newton iterations over the whole run
    pub newton_iterations: usize,
    /// Shortest accepted step (seconds)
    pub min_step: f64,
    /// Longest accepted step (seconds)
    pub max_step: f64,
}

impl TranStats {
    pub(crate) fn record_step(&mut self, step: f64) {
        if self.accepted_steps == 0 || step < self.min_step {
            self.min_step = step;
        }
        if step > self.max_step {
            self.max_step = step;
        }
        self.accepted_steps += 1;
    }
}

/// Transient waveforms sampled at the accepted time points.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranResult {
    pub times: Vec<f64>,
    pub signals: BTreeMap<String, Vec<f64>>,
    pub stats: TranStats,
    /// Set when the progress callback asked to stop
    pub stopped_early: bool,
}

impl TranResult {
    /// Waveform of one signal.
    pub fn signal(&self, name: &str) -> Option<&[f64]> {
        self.signals.get(name).map(Vec::as_slice)
    }

    /// Linearly interpolated value of a signal at `t`.
    pub fn value_at(&self, name: &str, t: f64) -> Option<f64> {
        let values = self.signal(name)?;
        let times = &self.times;
        if times.is_empty() {
            return None;
        }
        let idx = times.partition_point(|&x| x < t);
        if idx == 0 {
            return Some(values[0]);
        }
        if idx >= times.len() {
            return values.last().copied();
        }
        let (t0, t1) = (times[idx - 1], times[idx]);
        let (v0, v1) = (values[idx - 1], values[idx]);
        if t1 == t0 {
            return Some(v1);
        }
        Some(v0 + (v1 - v0) * (t - t0) / (t1 - t0))
    }
}

/// Progress report passed to the transient callback.
#[derive(Debug)]
pub enum TranProgress<'a> {
    /// Periodic report while stepping
    Running { percent: f64 },
    /// Final outcome, reported exactly once
    Finished(&'a Result<TranResult>),
}

/// Callback answer: keep going or stop with the results so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
    Continue,
    Stop,
}
