//! Main simulator interface.
//!
//! A [`Simulator`] owns a finalized [`Circuit`] together with the solver
//! settings, and runs the three analyses against it:
//!
//! - [`Simulator::solve_dc`] and [`Simulator::solve_dc_sweep`]
//! - [`Simulator::solve_ac`]
//! - [`Simulator::solve_transient`]
//!
//! Analyses share the circuit's workspace, so the solution of one is the
//! starting point of the next.

use std::collections::BTreeMap;

use crate::circuit::{Circuit, Node};
use crate::error::Result;

use super::config::SolverConfig;
use super::newton::NewtonRaphson;

/// The main circuit simulator.
pub struct Simulator {
    /// The circuit being simulated
    pub(super) circuit: Circuit,
    /// Numerical settings
    pub(super) config: SolverConfig,
    /// Newton-Raphson solver
    pub(super) newton: NewtonRaphson,
}

impl Simulator {
    /// Create a simulator with default settings.
    pub fn new(circuit: Circuit) -> Result<Self> {
        Self::with_config(circuit, SolverConfig::default())
    }

    /// Create a simulator with custom settings.
    ///
    /// Finalizes the circuit, so topology errors are reported here.
    pub fn with_config(mut circuit: Circuit, config: SolverConfig) -> Result<Self> {
        circuit.finalize(&config)?;
        let newton = NewtonRaphson::new(&config);
        Ok(Self {
            circuit,
            config,
            newton,
        })
    }

    /// Build a simulator straight from a JSON netlist.
    pub fn from_json(json: &str, config: SolverConfig) -> Result<Self> {
        Self::with_config(Circuit::from_json(json)?, config)
    }

    /// Get a reference to the circuit.
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// Get the solver settings.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Present solution value of one signal.
    pub fn value(&self, signal: &str) -> Option<f64> {
        let node = self.circuit.node(signal)?;
        Some(read(self.solution(), node))
    }

    /// Every result signal read from the present solution.
    pub(super) fn signal_values(&self) -> BTreeMap<String, f64> {
        let soln = self.solution();
        self.circuit
            .result_signals()
            .into_iter()
            .map(|(name, node)| (name, read(soln, node)))
            .collect()
    }

    fn solution(&self) -> &[f64] {
        self.circuit
            .workspace()
            .map(|ws| ws.solution.as_slice())
            .unwrap_or(&[])
    }
}

/// Value of `node` in `soln`; ground and out-of-range read as zero.
pub(super) fn read(soln: &[f64], node: Node) -> f64 {
    node.and_then(|i| soln.get(i).copied()).unwrap_or(0.0)
}
