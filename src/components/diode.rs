//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = area * Is * (exp(V / Vt) - 1)
//!
//! For Newton-Raphson iteration the device is linearized around the present
//! solution: the residual current goes into the right-hand side and
//! G_d = dI/dV is stamped across anode and cathode.
//!
//! Past |V/Vt| = 50 the exponential is continued by its quadratic Taylor
//! expansion about the clamp point, so the value and slope stay continuous
//! and nothing overflows.

use crate::circuit::Node;
use crate::error::{NodalError, Result};
use crate::solver::mna::{add_rhs, voltage};
use crate::solver::Matrix;

/// Saturation current per unit area.
const IS: f64 = 1.0e-14;

/// Largest exponent evaluated exactly.
const EXP_ARG_MAX: f64 = 50.0;

/// Diode flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiodeType {
    /// Silicon junction, Vt = 25.8 mV
    #[default]
    Normal,
    /// Near-ideal switch, Vt = 0.1 mV
    Ideal,
}

impl DiodeType {
    /// Parse type from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "ideal" => Some(Self::Ideal),
            _ => None,
        }
    }

    /// Thermal voltage used for this flavor.
    pub fn vt(&self) -> f64 {
        match self {
            Self::Normal => 25.8e-3,
            Self::Ideal => 0.1e-3,
        }
    }
}

/// A diode component.
#[derive(Debug, Clone)]
pub struct Diode {
    pub name: String,
    pub nodes: [Node; 2], // [anode, cathode]
    pub area: f64,
    pub diode_type: DiodeType,
}

impl Diode {
    /// Create a new diode.
    pub fn new(name: String, nodes: [Node; 2], area: f64, diode_type: DiodeType) -> Result<Self> {
        if !area.is_finite() || area < 0.0 {
            return Err(NodalError::invalid_parameter(
                &name,
                "area",
                format!("area must be a non-negative number, got {}", area),
            ));
        }
        Ok(Self {
            name,
            nodes,
            area,
            diode_type,
        })
    }

    /// Current and small-signal conductance at junction voltage `vd`.
    pub fn evaluate(&self, vd: f64) -> (f64, f64) {
        let vt = self.diode_type.vt();
        let ais = self.area * IS;
        let exp_arg = vd / vt;

        let abs_arg = exp_arg.abs();
        let d_arg = abs_arg - EXP_ARG_MAX;
        let (mut value, mut slope) = if d_arg > 0.0 {
            let exp_max = EXP_ARG_MAX.exp();
            (
                exp_max * (1.0 + d_arg + 0.5 * d_arg * d_arg),
                exp_max * (1.0 + d_arg),
            )
        } else {
            let e = abs_arg.exp();
            (e, e)
        };

        // exp(-x) = 1/exp(x); d/dx exp(-x) = slope / value^2
        if exp_arg < 0.0 {
            value = 1.0 / value;
            slope = value * slope * value;
        }

        (ais * (value - 1.0), ais * slope / vt)
    }

    pub(crate) fn load(&self, soln: &[f64], g: &mut Matrix, rhs: &mut [f64]) {
        let [anode, cathode] = self.nodes;
        let vd = voltage(soln, anode) - voltage(soln, cathode);
        let (id, gd) = self.evaluate(vd);

        add_rhs(rhs, anode, -id);
        add_rhs(rhs, cathode, id);
        g.stamp_two_terminal(anode, cathode, gd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn diode() -> Diode {
        Diode::new("D1".into(), [Some(0), None], 1.0, DiodeType::Normal).unwrap()
    }

    #[test]
    fn test_forward_and_reverse() {
        let d = diode();
        let (i_fwd, g_fwd) = d.evaluate(0.6);
        assert_relative_eq!(i_fwd, 1e-14 * ((0.6f64 / 25.8e-3).exp() - 1.0), max_relative = 1e-12);
        assert!(g_fwd > 0.0);

        let (i_rev, g_rev) = d.evaluate(-1.0);
        assert_relative_eq!(i_rev, -1e-14, max_relative = 1e-9);
        assert!(g_rev >= 0.0 && g_rev < 1e-20);
    }

    #[test]
    fn test_continuous_at_clamp() {
        let d = diode();
        let v_clamp = EXP_ARG_MAX * 25.8e-3;
        let (i_lo, g_lo) = d.evaluate(v_clamp * (1.0 - 1e-9));
        let (i_hi, g_hi) = d.evaluate(v_clamp * (1.0 + 1e-9));
        assert_relative_eq!(i_lo, i_hi, max_relative = 1e-6);
        assert_relative_eq!(g_lo, g_hi, max_relative = 1e-6);

        // Far past the clamp: finite, growing quadratically
        let (i_far, g_far) = d.evaluate(100.0);
        assert!(i_far.is_finite() && g_far.is_finite());
    }

    #[test]
    fn test_stamp_signs() {
        let d = diode();
        let mut g = Matrix::zeros(1, 1);
        let mut rhs = vec![0.0];
        d.load(&[0.7], &mut g, &mut rhs);
        let (id, gd) = d.evaluate(0.7);
        assert_eq!(rhs[0], -id);
        assert_eq!(g.get(0, 0), gd);
    }

    #[test]
    fn test_type_parse() {
        assert_eq!(DiodeType::from_str("IDEAL"), Some(DiodeType::Ideal));
        assert_eq!(DiodeType::from_str("zener"), None);
    }
}
