//! Operational Amplifier model.
//!
//! A voltage-controlled voltage source referenced to its own ground pin:
//!
//! ```text
//! (v(out) - v(gnd)) / A - (v(+) - v(-)) = 0
//! ```
//!
//! The output current is a branch unknown flowing out of `out` and back
//! through `gnd`. The model is linear and loads once.

use crate::circuit::Node;
use crate::error::{NodalError, Result};
use crate::solver::Matrix;

/// An op-amp component.
#[derive(Debug, Clone)]
pub struct OpAmp {
    pub name: String,
    pub nodes: [Node; 4], // [nplus, nminus, output, gnd]
    /// Open-loop gain
    pub gain: f64,
    pub branch: usize,
}

impl OpAmp {
    /// Create a new op-amp.
    pub fn new(name: String, nodes: [Node; 4], gain: f64, branch: usize) -> Result<Self> {
        if !gain.is_finite() || gain == 0.0 {
            return Err(NodalError::invalid_parameter(
                &name,
                "A",
                format!("gain must be finite and non-zero, got {}", gain),
            ));
        }
        Ok(Self {
            name,
            nodes,
            gain,
            branch,
        })
    }

    pub(crate) fn load_linear(&self, gl: &mut Matrix) {
        let [np, nn, no, ng] = self.nodes;
        let br = Some(self.branch);
        let inv_a = 1.0 / self.gain;

        gl.stamp(no, br, 1.0);
        gl.stamp(ng, br, -1.0);
        gl.stamp(br, no, inv_a);
        gl.stamp(br, ng, -inv_a);
        gl.stamp(br, np, -1.0);
        gl.stamp(br, nn, 1.0);
    }
}
