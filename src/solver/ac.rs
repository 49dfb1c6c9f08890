//! Small-signal AC analysis.
//!
//! The circuit is linearized at its operating point and excited by a unit
//! source. For each frequency the complex system `(G + jwC) z = b` is solved
//! in real arithmetic as
//!
//! ```text
//! [ G   -wC ] [ x ]   [ b ]
//! [ wC    G ] [ y ] = [ 0 ]
//! ```
//!
//! with `z = x + jy`.

use std::collections::BTreeMap;
use std::f64::consts::{LN_10, PI};

use crate::components::Device;
use crate::error::{NodalError, Result};

use super::dc::load_dc;
use super::matrix::{solve, Matrix};
use super::results::{AcResult, AcSignal};
use super::simulator::Simulator;

/// Largest phase change between neighbouring points before it is taken
/// as a wrap.
const PHASE_JUMP: f64 = 90.0;

impl Simulator {
    /// Frequency response to a unit excitation at `source`.
    ///
    /// Frequencies start at `fstart` and grow by `10^(1/points_per_decade)`
    /// up to `fstop`. Phases are in degrees and unwrapped.
    pub fn solve_ac(
        &mut self,
        fstart: f64,
        fstop: f64,
        points_per_decade: usize,
        source: &str,
    ) -> Result<AcResult> {
        if !(fstart > 0.0 && fstart.is_finite() && fstop.is_finite() && fstop >= fstart) {
            return Err(NodalError::invalid_param(format!(
                "AC sweep needs 0 < fstart <= fstop, got {} to {}",
                fstart, fstop
            )));
        }
        if points_per_decade == 0 {
            return Err(NodalError::invalid_param("AC sweep needs at least one point per decade"));
        }
        let source_index = self.circuit.source_index(source)?;

        self.operating_point()?;

        let eps = self.config.eps;
        let signals = self.circuit.result_signals();
        let (devices, ws) = self.circuit.split_mut()?;
        let devices: &[Device] = devices;

        // Jacobian at the operating point, excitation only in the rhs
        load_dc(devices, ws)?;
        ws.rhs.fill(0.0);
        devices[source_index].load_ac(&mut ws.rhs);

        let n = ws.size;
        let mut system = Matrix::zeros(2 * n, 2 * n + 1);
        let delta_f = (LN_10 / points_per_decade as f64).exp();
        let f_last = fstop * 1.0001;

        let mut frequencies = Vec::new();
        let mut magnitude: Vec<Vec<f64>> = vec![Vec::new(); n];
        let mut phase: Vec<Vec<f64>> = vec![Vec::new(); n];
        let mut phase_offset = vec![0.0; n];

        let mut f = fstart;
        while f <= f_last {
            let omega = 2.0 * PI * f;
            for i in 0..n {
                system.set(i, 2 * n, ws.rhs[i]);
                system.set(i + n, 2 * n, 0.0);
                for j in 0..n {
                    let g = ws.g.get(i, j);
                    let wc = omega * ws.c.get(i, j);
                    system.set(i, j, g);
                    system.set(i + n, j + n, g);
                    system.set(i, j + n, -wc);
                    system.set(i + n, j, wc);
                }
            }

            let z = solve(&mut system, eps);
            frequencies.push(f);
            for i in 0..n {
                let (re, im) = (z[i], z[i + n]);
                magnitude[i].push(re.hypot(im));

                let p = im.atan2(re).to_degrees();
                if let Some(&prev) = phase[i].last() {
                    let jump = p + phase_offset[i] - prev;
                    if jump > PHASE_JUMP {
                        phase_offset[i] -= 360.0;
                    } else if jump < -PHASE_JUMP {
                        phase_offset[i] += 360.0;
                    }
                }
                phase[i].push(p + phase_offset[i]);
            }
            f *= delta_f;
        }

        let points = frequencies.len();
        let signals: BTreeMap<String, AcSignal> = signals
            .into_iter()
            .map(|(name, node)| {
                let signal = match node {
                    Some(i) => AcSignal {
                        magnitude: magnitude[i].clone(),
                        phase: phase[i].clone(),
                    },
                    None => AcSignal {
                        magnitude: vec![0.0; points],
                        phase: vec![0.0; points],
                    },
                };
                (name, signal)
            })
            .collect();

        log::info!("AC analysis: {} frequencies from {:e} Hz", points, fstart);
        Ok(AcResult {
            frequencies,
            signals,
        })
    }
}
