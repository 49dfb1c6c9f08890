//! MNA (Modified Nodal Analysis) solver.
//!
//! This module provides the numerical engine for circuit simulation.
//!
//! ## Modified Nodal Analysis
//!
//! The unknowns `x` are node voltages plus the branch currents of elements
//! defined by a voltage (sources, inductors, op-amp outputs). The circuit
//! equations are written as
//!
//! ```text
//! f(x, t) = i(x, t) + d/dt q(x) = 0
//! ```
//!
//! where `i` collects device currents and `q` the charges and fluxes.
//! Linear devices load `Gl = di/dx` and `C = dq/dx` once; nonlinear devices
//! reload their contribution to `G` on every Newton iteration.
//!
//! - DC drops the `dq/dt` term and solves `i(x) = 0`.
//! - AC solves `(G + jwC) z = b` at the operating point.
//! - Transient integrates with a variable-step trapezoidal rule.

mod ac;
mod config;
mod dc;
pub mod matrix;
pub(crate) mod mna;
mod newton;
mod results;
mod simulator;
mod transient;

pub use config::SolverConfig;
pub use matrix::Matrix;
pub use mna::MnaWorkspace;
pub use newton::{Convergence, NewtonRaphson};
pub use results::{
    AcResult, AcSignal, DcResult, DcSweepResult, StepControl, Sweep, SweepTable, TranProgress, TranResult,
    TranStats,
};
pub use simulator::Simulator;
