//! Long-channel MOSFET model (no bulk terminal, no body effect).
//!
//! Square-law drain current with channel-length modulation:
//! - Cutoff: `Ids = 0` when `Vgs - Vt <= 0` (no subthreshold conduction)
//! - Saturation: `Ids = beta/2 * (1 + lambda*Vds) * (Vgs-Vt)^2`
//! - Linear: `Ids = beta * (1 + lambda*Vds) * Vds * (Vgs - Vt - Vds/2)`
//!
//! Parameters approximate a 0.25u process: Vt = 0.5 V, K' = 120 uA/V^2 for
//! n-channel and 25 uA/V^2 for p-channel devices. Drain and source are
//! symmetric; when `Vds < 0` the model evaluates with the roles exchanged.

use crate::circuit::{Node, GROUND};
use crate::error::{NodalError, Result};
use crate::solver::mna::{add_rhs, voltage};
use crate::solver::Matrix;

/// Threshold voltage magnitude.
const VT: f64 = 0.5;
/// Channel-length modulation.
const LAMBDA: f64 = 0.05;
/// Process scale factor (drawn units to microns).
const SCALE: f64 = 0.25;
/// Diffusion area capacitance (F/um^2).
const C_DIFF_AREA: f64 = 2000e-18;
/// Diffusion perimeter capacitance (F/um).
const C_DIFF_PERIM: f64 = 500e-18;
/// Gate capacitance (F/um^2).
const C_GATE: f64 = 6000e-18;

/// Channel polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MosfetType {
    /// N-channel
    Nfet,
    /// P-channel
    Pfet,
}

impl MosfetType {
    fn sign(&self) -> f64 {
        match self {
            Self::Nfet => 1.0,
            Self::Pfet => -1.0,
        }
    }

    fn kp(&self) -> f64 {
        match self {
            Self::Nfet => 120e-6,
            Self::Pfet => 25e-6,
        }
    }
}

/// Linearized channel at one solution point, in the terminal orientation
/// that gives `Vds >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelState {
    /// Effective drain
    pub drain: Node,
    /// Effective source
    pub source: Node,
    /// Drain current (signed by polarity)
    pub ids: f64,
    /// Transconductance
    pub gm: f64,
    /// Output conductance
    pub gds: f64,
}

/// A MOSFET component.
#[derive(Debug, Clone)]
pub struct Mosfet {
    pub name: String,
    pub nodes: [Node; 3], // [drain, gate, source]
    pub width: f64,
    pub length: f64,
    pub mos_type: MosfetType,
}

impl Mosfet {
    /// Create a new MOSFET.
    pub fn new(
        name: String,
        nodes: [Node; 3],
        width: f64,
        length: f64,
        mos_type: MosfetType,
    ) -> Result<Self> {
        for (param, value) in [("W", width), ("L", length)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(NodalError::invalid_parameter(
                    &name,
                    param,
                    format!("must be a positive number, got {}", value),
                ));
            }
        }
        Ok(Self {
            name,
            nodes,
            width,
            length,
            mos_type,
        })
    }

    fn drain(&self) -> Node {
        self.nodes[0]
    }

    fn gate(&self) -> Node {
        self.nodes[1]
    }

    fn source(&self) -> Node {
        self.nodes[2]
    }

    /// Gain factor `K' * W / L`.
    pub fn beta(&self) -> f64 {
        self.mos_type.kp() * self.width / self.length
    }

    /// Evaluate the channel at `soln`, or `None` when the device is off.
    pub fn channel(&self, soln: &[f64]) -> Option<ChannelState> {
        let sign = self.mos_type.sign();
        let (mut drain, mut source) = (self.drain(), self.source());
        let mut vds = sign * (voltage(soln, drain) - voltage(soln, source));
        if vds < 0.0 {
            std::mem::swap(&mut drain, &mut source);
            vds = -vds;
        }

        let vgs = sign * (voltage(soln, self.gate()) - voltage(soln, source));
        let vgst = vgs - VT;
        if vgst <= 0.0 {
            return None;
        }

        let beta = self.beta();
        let (ids, gm, gds) = if vgst < vds {
            // Saturation
            let gm = beta * (1.0 + LAMBDA * vds) * vgst;
            let ids = sign * 0.5 * gm * vgst;
            let gds = 0.5 * beta * vgst * vgst * LAMBDA;
            (ids, gm, gds)
        } else {
            // Linear region
            let k = beta * (1.0 + LAMBDA * vds);
            let ids = sign * k * vds * (vgst - 0.5 * vds);
            let gds = k * (vgst - vds) + beta * LAMBDA * vds * (vgst - 0.5 * vds);
            (ids, k * vds, gds)
        };

        Some(ChannelState {
            drain,
            source,
            ids,
            gm,
            gds,
        })
    }

    pub(crate) fn load_linear(&self, gl: &mut Matrix, c: &mut Matrix) {
        // Small drain-source leakage keeps cut-off nodes from floating.
        gl.stamp_two_terminal(self.drain(), self.source(), 1.0e-8 * self.beta());

        // Bulk is taken to be ground. Diffusions are 4 lambda wide with no
        // sidewall on the channel side.
        let w = self.width * SCALE;
        let l_diff = 4.0 * SCALE;
        let c_diff = C_DIFF_AREA * w * l_diff + C_DIFF_PERIM * (w + 2.0 * l_diff);
        c.stamp_two_terminal(self.drain(), GROUND, c_diff);
        c.stamp_two_terminal(self.source(), GROUND, c_diff);

        let c_gate = C_GATE * w * (self.length * SCALE);
        c.stamp_two_terminal(self.gate(), GROUND, c_gate);
    }

    pub(crate) fn load(&self, soln: &[f64], g: &mut Matrix, rhs: &mut [f64]) {
        let Some(ch) = self.channel(soln) else {
            return;
        };
        let gate = self.gate();

        add_rhs(rhs, ch.drain, -ch.ids);
        add_rhs(rhs, ch.source, ch.ids);
        g.stamp_two_terminal(ch.drain, ch.source, ch.gds);
        g.stamp(ch.source, ch.source, ch.gm);
        g.stamp(ch.drain, ch.source, -ch.gm);
        g.stamp(ch.drain, gate, ch.gm);
        g.stamp(ch.source, gate, -ch.gm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // Unknowns: 0 = drain, 1 = gate; source grounded.
    fn nfet() -> Mosfet {
        Mosfet::new("M1".into(), [Some(0), Some(1), None], 8.0, 1.0, MosfetType::Nfet).unwrap()
    }

    #[test]
    fn test_cutoff() {
        assert!(nfet().channel(&[1.0, 0.3]).is_none());
    }

    #[test]
    fn test_saturation_current() {
        let m = nfet();
        let ch = m.channel(&[3.0, 1.5]).unwrap();
        let beta = 120e-6 * 8.0;
        assert_relative_eq!(ch.ids, 0.5 * beta * (1.0 + 0.05 * 3.0) * 1.0, max_relative = 1e-12);
        assert_eq!(ch.drain, Some(0));
    }

    #[test]
    fn test_linear_region_derivatives() {
        let m = nfet();
        let (vd, vg) = (0.2, 2.0);
        let ch = m.channel(&[vd, vg]).unwrap();
        let h = 1e-7;
        let dids_dvd = (m.channel(&[vd + h, vg]).unwrap().ids - m.channel(&[vd - h, vg]).unwrap().ids) / (2.0 * h);
        let dids_dvg = (m.channel(&[vd, vg + h]).unwrap().ids - m.channel(&[vd, vg - h]).unwrap().ids) / (2.0 * h);
        assert_relative_eq!(ch.gds, dids_dvd, max_relative = 1e-5);
        assert_relative_eq!(ch.gm, dids_dvg, max_relative = 1e-5);
    }

    #[test]
    fn test_swapped_roles() {
        // Drain below source: roles swap, device itself is unchanged.
        let m = Mosfet::new("M2".into(), [Some(0), Some(1), Some(2)], 4.0, 1.0, MosfetType::Nfet).unwrap();
        let ch = m.channel(&[0.0, 3.0, 1.0]).unwrap();
        assert_eq!(ch.drain, Some(2));
        assert_eq!(ch.source, Some(0));
        assert_eq!(m.nodes, [Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_pfet_polarity() {
        // Source at 5 V, gate at 0: on, current flows source -> drain.
        let m = Mosfet::new("MP".into(), [Some(0), Some(1), Some(2)], 8.0, 1.0, MosfetType::Pfet).unwrap();
        let ch = m.channel(&[2.0, 0.0, 5.0]).unwrap();
        assert!(ch.ids < 0.0);
    }

    #[test]
    fn test_rejects_bad_geometry() {
        assert!(Mosfet::new("M3".into(), [None, None, None], 0.0, 1.0, MosfetType::Nfet).is_err());
    }
}
