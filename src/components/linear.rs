//! Linear passive components: Resistor, Capacitor, Inductor.
//!
//! All three load their contributions once, into the linear conductance
//! matrix `Gl` and the storage matrix `C`. The circuit equations read
//!
//! ```text
//! C dx/dt + Gl x + f(x) = sources
//! ```
//!
//! so a capacitor is a two-terminal entry of `C`, and an inductor adds a
//! branch current `i` with `L di/dt = v(n1) - v(n2)`.

use crate::circuit::Node;
use crate::error::{NodalError, Result};
use crate::solver::Matrix;

/// A resistor component.
///
/// A zero-valued resistor is never built; the circuit replaces it with a
/// 0 V voltage source.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub name: String,
    pub nodes: [Node; 2],
    pub resistance: f64,
}

impl Resistor {
    /// Create a new resistor.
    pub fn new(name: String, nodes: [Node; 2], resistance: f64) -> Result<Self> {
        if !resistance.is_finite() || resistance == 0.0 {
            return Err(NodalError::invalid_parameter(
                &name,
                "value",
                format!("resistance must be finite and non-zero, got {}", resistance),
            ));
        }
        Ok(Self {
            name,
            nodes,
            resistance,
        })
    }

    /// Get the conductance (1/R).
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }

    pub(crate) fn load_linear(&self, gl: &mut Matrix) {
        gl.stamp_two_terminal(self.nodes[0], self.nodes[1], self.conductance());
    }
}

/// A capacitor component.
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub name: String,
    pub nodes: [Node; 2],
    pub capacitance: f64,
}

impl Capacitor {
    /// Create a new capacitor.
    pub fn new(name: String, nodes: [Node; 2], capacitance: f64) -> Result<Self> {
        if !capacitance.is_finite() {
            return Err(NodalError::invalid_parameter(
                &name,
                "value",
                "capacitance must be finite",
            ));
        }
        Ok(Self {
            name,
            nodes,
            capacitance,
        })
    }

    pub(crate) fn load_linear(&self, c: &mut Matrix) {
        c.stamp_two_terminal(self.nodes[0], self.nodes[1], self.capacitance);
    }
}

/// An inductor component.
///
/// Introduces a branch current unknown. At DC the `C` entry is unused and
/// the branch equation reduces to `v(n1) = v(n2)`, a short.
#[derive(Debug, Clone)]
pub struct Inductor {
    pub name: String,
    pub nodes: [Node; 2],
    pub inductance: f64,
    pub branch: usize,
}

impl Inductor {
    /// Create a new inductor.
    pub fn new(name: String, nodes: [Node; 2], inductance: f64, branch: usize) -> Result<Self> {
        if !inductance.is_finite() {
            return Err(NodalError::invalid_parameter(
                &name,
                "value",
                "inductance must be finite",
            ));
        }
        Ok(Self {
            name,
            nodes,
            inductance,
            branch,
        })
    }

    pub(crate) fn load_linear(&self, gl: &mut Matrix, c: &mut Matrix) {
        let [n1, n2] = self.nodes;
        let br = Some(self.branch);
        gl.stamp(n1, br, 1.0);
        gl.stamp(n2, br, -1.0);
        gl.stamp(br, n1, -1.0);
        gl.stamp(br, n2, 1.0);
        c.add(self.branch, self.branch, self.inductance);
    }
}
