//! Independent voltage and current sources.

use crate::circuit::Node;
use crate::solver::mna::add_rhs;
use crate::solver::Matrix;
use crate::waveform::Source;

/// A voltage source component.
///
/// Voltage sources require an extra row/column in the MNA matrix for the
/// branch current. The source enforces: V+ - V- = value(t)
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub name: String,
    pub nodes: [Node; 2], // [positive, negative]
    pub branch: usize,
    pub source: Source,
}

impl VoltageSource {
    /// Create a new voltage source.
    pub fn new(name: String, nodes: [Node; 2], branch: usize, source: Source) -> Self {
        Self {
            name,
            nodes,
            branch,
            source,
        }
    }

    pub(crate) fn load_linear(&self, gl: &mut Matrix) {
        let [npos, nneg] = self.nodes;
        let br = Some(self.branch);
        gl.stamp(br, npos, 1.0);
        gl.stamp(br, nneg, -1.0);
        gl.stamp(npos, br, 1.0);
        gl.stamp(nneg, br, -1.0);
    }

    pub(crate) fn load_dc(&self, rhs: &mut [f64]) {
        rhs[self.branch] += self.source.dc();
    }

    pub(crate) fn load_tran(&self, current: &mut [f64], time: f64) {
        current[self.branch] += self.source.value(time);
    }

    /// Unit small-signal excitation.
    pub(crate) fn load_ac(&self, rhs: &mut [f64]) {
        rhs[self.branch] += 1.0;
    }
}

/// A current source component.
///
/// Current flows out of the positive terminal, through the source, and into
/// the negative terminal. Current sources add directly to the RHS vector.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub name: String,
    pub nodes: [Node; 2], // [positive, negative]
    pub source: Source,
}

impl CurrentSource {
    /// Create a new current source.
    pub fn new(name: String, nodes: [Node; 2], source: Source) -> Self {
        Self {
            name,
            nodes,
            source,
        }
    }

    fn stamp(&self, rhs: &mut [f64], is: f64) {
        add_rhs(rhs, self.nodes[0], -is);
        add_rhs(rhs, self.nodes[1], is);
    }

    pub(crate) fn load_dc(&self, rhs: &mut [f64]) {
        self.stamp(rhs, self.source.dc());
    }

    pub(crate) fn load_tran(&self, current: &mut [f64], time: f64) {
        self.stamp(current, self.source.value(time));
    }

    pub(crate) fn load_ac(&self, rhs: &mut [f64]) {
        self.stamp(rhs, 1.0);
    }
}
