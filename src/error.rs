//! Error types for the nodal circuit solver.
//!
//! This module provides a unified error type [`NodalError`] that covers
//! netlist loading, topology checks and the three analyses. Numerical
//! corner cases (zero pivots, rank-deficient rows) are recovered locally by
//! the solver and never surface here.

use thiserror::Error;

use crate::solver::TranResult;

/// Result type alias using [`NodalError`].
pub type Result<T> = std::result::Result<T, NodalError>;

/// Why a DC operating point could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcFailureCause {
    /// A current source drives a node that has no conductive path to ground.
    CurrentSourceWithoutPath,
    /// Newton iteration kept oscillating, usually a loop with positive feedback.
    OscillatingLoop,
}

impl std::fmt::Display for DcFailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CurrentSourceWithoutPath => {
                write!(f, "do your current sources have a conductive path to ground?")
            }
            Self::OscillatingLoop => {
                write!(f, "is there a loop in your circuit that's oscillating?")
            }
        }
    }
}

/// Unified error type for all solver operations.
#[derive(Error, Debug)]
pub enum NodalError {
    // ============ Netlist Errors ============
    /// Error reading a netlist file
    #[error("Failed to read netlist file '{path}': {source}")]
    NetlistRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON netlist
    #[error("Malformed netlist: {0}")]
    NetlistParse(#[from] serde_json::Error),

    /// Unknown device type in the netlist
    #[error("Unrecognized device type '{kind}'")]
    UnknownDeviceKind { kind: String },

    /// A device record lacks a required terminal
    #[error("Device '{device}' is missing terminal '{terminal}'")]
    MissingTerminal { device: String, terminal: String },

    /// Invalid parameter value
    #[error("Invalid parameter '{param}' for device '{device}': {message}")]
    InvalidParameter {
        device: String,
        param: String,
        message: String,
    },

    /// Source specification could not be compiled
    #[error("Invalid source specification: {message}")]
    InvalidSource { message: String },

    // ============ Topology Errors ============
    /// No device is connected to ground
    #[error("Please make at least one connection to ground (node gnd)")]
    MissingGround,

    /// Voltage sources form a loop, or a source is shorted by a wire
    #[error(
        "Circuit has a voltage source loop or a source shorted by a wire \
         (involving {sources}); remove the source or the wire causing the short"
    )]
    VoltageSourceLoop { sources: String },

    // ============ Analysis Errors ============
    /// Named source does not exist or is not an independent source
    #[error("Analysis refers to unknown source '{name}'")]
    UnknownSource { name: String },

    /// Newton-Raphson failed to find a DC operating point
    #[error("Unable to find circuit's operating point (trouble at node '{node}'): {cause}")]
    DcNonConvergence { cause: DcFailureCause, node: String },

    /// Transient analysis could not converge even at the minimum step
    #[error("Transient analysis failed to converge at t={time:.4e}s (trouble at node '{node}')")]
    TransientNonConvergence {
        time: f64,
        node: String,
        /// Waveforms accumulated before the failure.
        partial: Box<TranResult>,
    },

    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },

    // ============ Linear Algebra Errors ============
    /// Matrix/vector shapes do not agree
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: String, found: String },
}

impl NodalError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(
        device: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            device: device.into(),
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create an invalid source error
    pub fn invalid_source(message: impl Into<String>) -> Self {
        Self::InvalidSource {
            message: message.into(),
        }
    }

    /// Create an invalid simulation parameter error
    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::InvalidSimulationParam {
            message: message.into(),
        }
    }

    /// Partial transient waveforms attached to this error, if any.
    pub fn partial_results(&self) -> Option<&TranResult> {
        match self {
            Self::TransientNonConvergence { partial, .. } => Some(partial),
            _ => None,
        }
    }
}
