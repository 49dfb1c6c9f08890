//! Core types for circuit representation.

use std::fmt;

use serde::Serialize;

/// Index of an unknown in the MNA solution vector.
///
/// Ground is `None` and never gets a matrix row or column; stamps simply skip
/// it.
pub type Node = Option<usize>;

/// The ground node.
pub const GROUND: Node = None;

/// What an unknown represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownKind {
    /// Node potential
    Voltage,
    /// Branch current (voltage sources, inductors, op-amp outputs)
    Current,
}

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Voltage => write!(f, "V"),
            Self::Current => write!(f, "I"),
        }
    }
}
