//! # Nodal Core
//!
//! A circuit solver built on Modified Nodal Analysis.
//!
//! This library provides:
//! - A JSON netlist reader (device records with named terminals)
//! - DC operating point and DC sweeps
//! - Small-signal AC frequency response
//! - Transient analysis with adaptive, error-controlled time steps
//! - Linear components (R, C, L, op-amp), independent sources with
//!   piecewise-linear and periodic waveforms, and nonlinear diodes and MOSFETs
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`netlist`] - JSON device records and engineering-notation values
//! - [`waveform`] - Source waveforms (`dc`, `step`, `pulse`, `sin`, `pwl`, ...)
//! - [`circuit`] - Node resolution, device registry and topology checks
//! - [`components`] - Device models and their matrix stamps
//! - [`solver`] - Dense linear algebra, Newton-Raphson and the analyses
//!
//! ## Usage
//!
//! ```
//! use nodal_core::{Simulator, SolverConfig};
//!
//! let netlist = r#"[
//!   {"type": "voltage source", "connections": {"nplus": "in", "nminus": "gnd"},
//!    "properties": {"name": "V1", "value": 10}},
//!   {"type": "resistor", "connections": {"n1": "in", "n2": "out"},
//!    "properties": {"name": "R1", "value": "1k"}},
//!   {"type": "resistor", "connections": {"n1": "out", "n2": "gnd"},
//!    "properties": {"name": "R2", "value": "3k"}},
//!   {"type": "ground", "connections": ["gnd"]}
//! ]"#;
//!
//! let mut sim = Simulator::from_json(netlist, SolverConfig::default()).unwrap();
//! let dc = sim.solve_dc().unwrap();
//! assert!((dc.get("out").unwrap() - 7.5).abs() < 1e-6);
//! ```
//!
//! ## Circuit Simulation Method
//!
//! Each analysis repeatedly:
//!
//! 1. Loads the linearized device equations into the system matrix and
//!    right-hand side
//! 2. Solves the dense linear system
//! 3. Updates the solution until Newton-Raphson converges
//!
//! Transient analysis wraps this in an implicit integrator whose step is
//! controlled by a local truncation error estimate.

pub mod circuit;
pub mod components;
pub mod error;
pub mod netlist;
pub mod solver;
pub mod waveform;

// Re-export main types for convenience
pub use circuit::Circuit;
pub use error::{NodalError, Result};
pub use solver::{Simulator, SolverConfig};
