//! Circuit graph representation and validation.
//!
//! This module turns netlist records into the internal representation used
//! by every analysis. The [`Circuit`] struct owns the devices, the mapping
//! from signal names to unknowns, and (once finalized) the MNA workspace.

mod graph;
mod types;
mod validate;

pub(crate) use graph::NodeAllocator;
pub use graph::{Circuit, GROUND_NAME};
pub use types::*;
pub use validate::check_voltage_source_loops;
