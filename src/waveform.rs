//! Independent source waveforms.
//!
//! Every source kind except `sin` compiles down to a piecewise-linear (PWL)
//! table of `(time, value)` knots, optionally repeating with the time of the
//! last knot as its period. A compiled [`Source`] answers three questions for
//! the analyses: its value at a time, the next time its slope changes, and
//! its period.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{NodalError, Result};

/// Source function name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// `dc(v)`
    Dc,
    /// `impulse(height, width)`
    Impulse,
    /// `step(v1, v2, t_delay, t_rise)`
    Step,
    /// `square(v1, v2, freq, duty, rise_fall)`
    Square,
    /// `clock(v1, v2, period, duty, rise_fall)`
    Clock,
    /// `triangle(v1, v2, freq)`
    Triangle,
    /// `pwl(t1, v1, t2, v2, ...)`
    Pwl,
    /// `pwl_repeating(t1, v1, t2, v2, ...)`
    PwlRepeating,
    /// `pulse(v1, v2, t_delay, t_rise, t_fall, width, period)`
    Pulse,
    /// `sin(v_offset, amplitude, freq, t_delay, phase_deg)`
    Sin,
}

impl SourceKind {
    /// Lowercase function name as written in netlists.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dc => "dc",
            Self::Impulse => "impulse",
            Self::Step => "step",
            Self::Square => "square",
            Self::Clock => "clock",
            Self::Triangle => "triangle",
            Self::Pwl => "pwl",
            Self::PwlRepeating => "pwl_repeating",
            Self::Pulse => "pulse",
            Self::Sin => "sin",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceKind {
    type Err = NodalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dc" => Ok(Self::Dc),
            "impulse" => Ok(Self::Impulse),
            "step" => Ok(Self::Step),
            "square" => Ok(Self::Square),
            "clock" => Ok(Self::Clock),
            "triangle" => Ok(Self::Triangle),
            "pwl" => Ok(Self::Pwl),
            "pwl_repeating" | "pwlr" => Ok(Self::PwlRepeating),
            "pulse" => Ok(Self::Pulse),
            "sin" | "sine" => Ok(Self::Sin),
            other => Err(NodalError::invalid_source(format!(
                "unrecognized source function '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Shape {
    Pwl {
        knots: Vec<(f64, f64)>,
        /// Repeat period; `None` when aperiodic.
        period: Option<f64>,
    },
    Sine {
        offset: f64,
        amplitude: f64,
        freq: f64,
        delay: f64,
        /// Phase in cycles.
        phase: f64,
    },
}

/// A compiled source waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    kind: SourceKind,
    args: Vec<f64>,
    shape: Shape,
    dc: f64,
}

/// `args[index]` if present, else `default`.
fn arg(args: &[f64], index: usize, default: f64) -> f64 {
    args.get(index).copied().unwrap_or(default)
}

impl Source {
    /// Compile a source from its function name and argument list.
    ///
    /// Missing trailing arguments take their defaults; the normalized list
    /// is kept and returned by [`Source::args`].
    pub fn new(kind: SourceKind, args: &[f64]) -> Result<Self> {
        if let Some(bad) = args.iter().find(|a| !a.is_finite()) {
            return Err(NodalError::invalid_source(format!(
                "{}: argument {} is not a finite number",
                kind, bad
            )));
        }

        let (args, shape) = match kind {
            SourceKind::Dc => {
                let v = arg(args, 0, 0.0);
                (vec![v], pwl(vec![0.0, v], false))
            }
            SourceKind::Impulse => {
                let height = arg(args, 0, 1.0);
                let width = arg(args, 1, 1e-9).abs();
                (
                    vec![height, width],
                    pwl(vec![0.0, 0.0, width / 2.0, height, width, 0.0], false),
                )
            }
            SourceKind::Step => {
                let v1 = arg(args, 0, 0.0);
                let v2 = arg(args, 1, 1.0);
                let td = arg(args, 2, 0.0).max(0.0);
                let tr = arg(args, 3, 1e-9).abs();
                (vec![v1, v2, td, tr], pwl(vec![td, v1, td + tr, v2], false))
            }
            SourceKind::Square | SourceKind::Clock => {
                let v1 = arg(args, 0, 0.0);
                let v2 = arg(args, 1, 1.0);
                let (third, per) = if kind == SourceKind::Square {
                    let freq = arg(args, 2, 1.0).abs();
                    let per = if freq == 0.0 { f64::INFINITY } else { 1.0 / freq };
                    (freq, per)
                } else {
                    let per = arg(args, 2, 100e-9).abs();
                    (per, per)
                };
                let duty = arg(args, 3, 50.0).abs().min(100.0);
                let tc = arg(args, 4, 0.1e-9).abs();
                let pw = 0.01 * duty * (per - 2.0 * tc);
                (
                    vec![v1, v2, third, duty, tc],
                    pwl(
                        vec![
                            0.0,
                            v1,
                            pw,
                            v1,
                            pw + tc,
                            v2,
                            2.0 * pw + tc,
                            v2,
                            2.0 * tc + 2.0 * pw,
                            v1,
                            per,
                            v1,
                        ],
                        true,
                    ),
                )
            }
            SourceKind::Triangle => {
                let v1 = arg(args, 0, 0.0);
                let v2 = arg(args, 1, 1.0);
                let freq = arg(args, 2, 1.0).abs();
                let per = if freq == 0.0 { f64::INFINITY } else { 1.0 / freq };
                (
                    vec![v1, v2, freq],
                    pwl(vec![0.0, v1, per / 2.0, v2, per, v1], true),
                )
            }
            SourceKind::Pwl | SourceKind::PwlRepeating => (
                args.to_vec(),
                pwl(args.to_vec(), kind == SourceKind::PwlRepeating),
            ),
            SourceKind::Pulse => {
                let v1 = arg(args, 0, 0.0);
                let v2 = arg(args, 1, 1.0);
                let td = arg(args, 2, 0.0).max(0.0);
                let tr = arg(args, 3, 1e-9).abs();
                let tf = arg(args, 4, 1e-9).abs();
                let width = arg(args, 5, 1e9).abs();
                let per = arg(args, 6, 1e9).abs();

                let t1 = td;
                let t2 = t1 + tr;
                let t3 = t2 + width;
                let t4 = t3 + tf;
                (
                    vec![v1, v2, td, tr, tf, width, per],
                    pwl(vec![t1, v1, t2, v2, t3, v2, t4, v1, per, v1], true),
                )
            }
            SourceKind::Sin => {
                let offset = arg(args, 0, 0.0);
                let amplitude = arg(args, 1, 1.0);
                let freq = arg(args, 2, 1.0).abs();
                let delay = arg(args, 3, 0.0).max(0.0);
                let phase_deg = arg(args, 4, 0.0);
                (
                    vec![offset, amplitude, freq, delay, phase_deg],
                    Shape::Sine {
                        offset,
                        amplitude,
                        freq,
                        delay,
                        phase: phase_deg / 360.0,
                    },
                )
            }
        };

        let mut source = Self {
            kind,
            args,
            shape,
            dc: 0.0,
        };
        source.dc = source.value(0.0);
        Ok(source)
    }

    /// A constant source, `dc(value)`.
    pub fn constant(value: f64) -> Self {
        Self {
            kind: SourceKind::Dc,
            args: vec![value],
            shape: pwl(vec![0.0, value], false),
            dc: value,
        }
    }

    /// Function name.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Normalized argument list, with defaults filled in.
    pub fn args(&self) -> &[f64] {
        &self.args
    }

    /// Value used by DC analysis, always `value(0)`.
    pub fn dc(&self) -> f64 {
        self.dc
    }

    /// Repeat period in seconds, or 0 for aperiodic sources.
    pub fn period(&self) -> f64 {
        match &self.shape {
            Shape::Pwl { period, .. } => period.unwrap_or(0.0),
            Shape::Sine { freq, .. } => {
                let per = 1.0 / freq;
                if per.is_finite() {
                    per
                } else {
                    0.0
                }
            }
        }
    }

    /// Source value at time `t`.
    pub fn value(&self, t: f64) -> f64 {
        match &self.shape {
            Shape::Pwl { knots, period } => {
                let t = match period {
                    Some(per) => fold(t, *per),
                    None => t,
                };
                interpolate(knots, t)
            }
            Shape::Sine {
                offset,
                amplitude,
                freq,
                delay,
                phase,
            } => {
                if t < *delay {
                    offset + amplitude * (2.0 * PI * phase).sin()
                } else {
                    offset + amplitude * (2.0 * PI * (freq * (t - delay) + phase)).sin()
                }
            }
        }
    }

    /// First time strictly after `t` at which the waveform changes slope.
    ///
    /// Returned as an absolute time, also for repeating sources. `None` when
    /// the waveform is smooth from `t` on.
    pub fn next_breakpoint(&self, t: f64) -> Option<f64> {
        match &self.shape {
            Shape::Pwl { knots, period } => {
                if knots.len() < 2 {
                    return None;
                }
                match period {
                    None => knots.iter().map(|(kt, _)| *kt).find(|kt| *kt > t),
                    Some(per) => {
                        let base = (t / per).floor() * per;
                        let local = t - base;
                        knots
                            .iter()
                            .map(|(kt, _)| *kt)
                            .find(|kt| *kt > local)
                            .map(|kt| base + kt)
                            .or_else(|| Some(base + per + knots[0].0))
                            .filter(|bp| *bp > t)
                    }
                }
            }
            Shape::Sine { delay, .. } => (t < *delay).then_some(*delay),
        }
    }
}

/// Build a PWL shape from a flat `t1, v1, t2, v2, ...` list.
///
/// A trailing unpaired time is dropped. A repeating table whose period is not
/// a positive finite number is treated as aperiodic.
fn pwl(flat: Vec<f64>, repeat: bool) -> Shape {
    let knots: Vec<(f64, f64)> = flat.chunks_exact(2).map(|p| (p[0], p[1])).collect();
    let period = if repeat {
        knots
            .last()
            .map(|(t, _)| *t)
            .filter(|per| per.is_finite() && *per > 0.0)
    } else {
        None
    };
    Shape::Pwl { knots, period }
}

/// Floor-based modulo, so negative times fold into `[0, per)`.
fn fold(t: f64, per: f64) -> f64 {
    t - (t / per).floor() * per
}

fn interpolate(knots: &[(f64, f64)], t: f64) -> f64 {
    let Some(&(mut last_t, mut last_v)) = knots.first() else {
        return 0.0;
    };
    if t > last_t {
        for &(next_t, next_v) in &knots[1..] {
            // A knot that does not advance in time is never interpolated
            // across, but still becomes the start of the next segment.
            if next_t > last_t && t < next_t {
                return last_v + (next_v - last_v) * (t - last_t) / (next_t - last_t);
            }
            last_t = next_t;
            last_v = next_v;
        }
    }
    last_v
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dc_defaults() {
        let s = Source::new(SourceKind::Dc, &[]).unwrap();
        assert_eq!(s.args(), &[0.0]);
        assert_eq!(s.value(123.0), 0.0);
        assert_eq!(s.period(), 0.0);
        assert_eq!(s.next_breakpoint(0.0), None);

        let c = Source::constant(3.3);
        assert_eq!(c.dc(), 3.3);
        assert_eq!(c.value(1e-3), 3.3);
    }

    #[test]
    fn test_pwl_hits_knots_exactly() {
        let knots = [0.0, 1.0, 1e-3, 2.5, 2e-3, -1.0, 5e-3, 4.0];
        let s = Source::new(SourceKind::Pwl, &knots).unwrap();
        for pair in knots.chunks(2) {
            assert_eq!(s.value(pair[0]), pair[1]);
        }
        // Clamped outside the table.
        assert_eq!(s.value(-1.0), 1.0);
        assert_eq!(s.value(1.0), 4.0);
        assert_relative_eq!(s.value(0.5e-3), 1.75);
        assert_eq!(s.next_breakpoint(1e-3), Some(2e-3));
        assert_eq!(s.next_breakpoint(5e-3), None);
    }

    #[test]
    fn test_pwl_backwards_knot_starts_next_segment() {
        // (0.5, 9) goes back in time: nothing interpolates into it, but the
        // segment to (2, 3) starts from it.
        let s = Source::new(SourceKind::Pwl, &[0.0, 0.0, 1.0, 1.0, 0.5, 9.0, 2.0, 3.0]).unwrap();
        assert_relative_eq!(s.value(0.75), 0.75);
        assert_relative_eq!(s.value(1.5), 5.0);
        assert_relative_eq!(s.value(2.5), 3.0);
    }

    #[test]
    fn test_repeating_is_periodic() {
        let s = Source::new(SourceKind::PwlRepeating, &[0.0, 0.0, 1.0, 2.0, 4.0, 0.0]).unwrap();
        assert_eq!(s.period(), 4.0);
        for i in 0..40 {
            let t = i as f64 * 0.37;
            assert_relative_eq!(s.value(t), s.value(t + s.period()), epsilon = 1e-9);
        }
        // Breakpoints are absolute and cross period boundaries.
        assert_eq!(s.next_breakpoint(4.5), Some(5.0));
        assert_eq!(s.next_breakpoint(6.0), Some(8.0));
    }

    #[test]
    fn test_odd_trailing_time_dropped() {
        let s = Source::new(SourceKind::PwlRepeating, &[0.0, 1.0, 2.0, 3.0, 7.0]).unwrap();
        assert_eq!(s.period(), 2.0);
    }

    #[test]
    fn test_step_and_impulse() {
        let s = Source::new(SourceKind::Step, &[0.0, 5.0, 1e-6]).unwrap();
        assert_eq!(s.args(), &[0.0, 5.0, 1e-6, 1e-9]);
        assert_eq!(s.dc(), 0.0);
        assert_eq!(s.value(2e-6), 5.0);
        assert_eq!(s.next_breakpoint(0.0), Some(1e-6));

        let imp = Source::new(SourceKind::Impulse, &[2.0, 4e-9]).unwrap();
        assert_relative_eq!(imp.value(2e-9), 2.0);
        assert_eq!(imp.value(5e-9), 0.0);
    }

    #[test]
    fn test_pulse() {
        let s = Source::new(SourceKind::Pulse, &[0.0, 1.0, 1e-6, 1e-7, 1e-7, 1e-6, 4e-6]).unwrap();
        assert_eq!(s.period(), 4e-6);
        assert_eq!(s.value(0.5e-6), 0.0);
        assert_eq!(s.value(1.5e-6), 1.0);
        assert_relative_eq!(s.value(1.05e-6), 0.5, epsilon = 1e-9);
        assert_relative_eq!(s.value(5.5e-6), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_square_and_clock() {
        let sq = Source::new(SourceKind::Square, &[0.0, 1.0, 1e3]).unwrap();
        assert_eq!(sq.args(), &[0.0, 1.0, 1e3, 50.0, 0.1e-9]);
        assert_relative_eq!(sq.period(), 1e-3);
        assert_eq!(sq.value(0.25e-3), 0.0);
        assert_eq!(sq.value(0.75e-3), 1.0);

        let clk = Source::new(SourceKind::Clock, &[0.0, 1.0, 20e-9]).unwrap();
        assert_eq!(clk.period(), 20e-9);
        assert_eq!(clk.value(15e-9), 1.0);
    }

    #[test]
    fn test_triangle() {
        let s = Source::new(SourceKind::Triangle, &[-1.0, 1.0, 2.0]).unwrap();
        assert_eq!(s.period(), 0.5);
        assert_eq!(s.value(0.25), 1.0);
        assert_relative_eq!(s.value(0.125), 0.0);
    }

    #[test]
    fn test_sin() {
        let s = Source::new(SourceKind::Sin, &[1.0, 2.0, 50.0, 0.01, 90.0]).unwrap();
        assert_relative_eq!(s.period(), 0.02);
        assert_relative_eq!(s.value(0.0), 3.0);
        assert_relative_eq!(s.value(0.01 + 0.005), 1.0, epsilon = 1e-12);
        assert_eq!(s.next_breakpoint(0.0), Some(0.01));
        assert_eq!(s.next_breakpoint(0.02), None);
    }

    #[test]
    fn test_rejects_non_finite_args() {
        assert!(Source::new(SourceKind::Pwl, &[0.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("PWLR".parse::<SourceKind>().unwrap(), SourceKind::PwlRepeating);
        assert_eq!("Pulse".parse::<SourceKind>().unwrap(), SourceKind::Pulse);
        assert!("sawtooth".parse::<SourceKind>().is_err());
    }
}
