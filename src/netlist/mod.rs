//! JSON netlist reader.
//!
//! A netlist is an ordered array of device records:
//!
//! ```text
//! [
//!   {"type": "voltage source", "connections": {"nplus": "in", "nminus": "gnd"},
//!    "properties": {"name": "Vin", "value": "step(0, 1, 1u)"}},
//!   {"type": "resistor", "connections": {"n1": "in", "n2": "out"},
//!    "properties": {"name": "R1", "value": "1k"}},
//!   {"type": "capacitor", "connections": {"n1": "out", "n2": "gnd"},
//!    "properties": {"name": "C1", "value": "1u"}},
//!   {"type": "ground", "connections": ["gnd"]}
//! ]
//! ```

mod records;
mod value;

pub use records::{DeviceRecord, Terminals};
pub use value::{parse_source_text, parse_value};

use std::path::Path;

use crate::error::{NodalError, Result};

/// Parse a netlist from a JSON string.
pub fn parse(json: &str) -> Result<Vec<DeviceRecord>> {
    Ok(serde_json::from_str(json)?)
}

/// Parse a netlist from a file.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<DeviceRecord>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| NodalError::NetlistRead {
        path: path.display().to_string(),
        source: e,
    })?;
    parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_netlist() {
        let records = parse(
            r#"[
                {"type": "resistor", "connections": {"n1": "a", "n2": "gnd"},
                 "properties": {"value": 1000}},
                {"type": "ground", "connections": ["gnd"]}
            ]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind, "ground");
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse("[{"), Err(NodalError::NetlistParse(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = parse_file("/nonexistent/netlist.json").unwrap_err();
        assert!(matches!(err, NodalError::NetlistRead { .. }));
    }
}
