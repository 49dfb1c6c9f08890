//! Device records as they appear in a JSON netlist.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::value::{parse_source_text, parse_value};
use crate::error::{NodalError, Result};
use crate::waveform::{Source, SourceKind};

/// Terminal connections of a record.
///
/// Devices name their ports (`{"n1": "a", "n2": "gnd"}`); `ground` and
/// `connect` records just list signal names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Terminals {
    Named(BTreeMap<String, String>),
    List(Vec<String>),
}

impl Default for Terminals {
    fn default() -> Self {
        Terminals::Named(BTreeMap::new())
    }
}

impl Terminals {
    /// Signal attached to a named port.
    pub fn get(&self, port: &str) -> Option<&str> {
        match self {
            Terminals::Named(map) => map.get(port).map(String::as_str),
            Terminals::List(_) => None,
        }
    }

    /// All signal names, in list order or port-name order.
    pub fn signals(&self) -> Vec<&str> {
        match self {
            Terminals::Named(map) => map.values().map(String::as_str).collect(),
            Terminals::List(list) => list.iter().map(String::as_str).collect(),
        }
    }
}

/// One entry of a netlist: `{kind, terminals, properties}`.
///
/// `type` and `connections` are accepted as aliases of `kind` and
/// `terminals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default, alias = "connections")]
    pub terminals: Terminals,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl DeviceRecord {
    /// Start a record of the given kind with no terminals or properties.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            terminals: Terminals::default(),
            properties: BTreeMap::new(),
        }
    }

    /// A `ground` record binding every listed signal to ground.
    pub fn ground<S: Into<String>>(signals: impl IntoIterator<Item = S>) -> Self {
        Self {
            terminals: Terminals::List(signals.into_iter().map(Into::into).collect()),
            ..Self::new("ground")
        }
    }

    /// A `connect` record merging every listed signal into one node.
    pub fn connect<S: Into<String>>(signals: impl IntoIterator<Item = S>) -> Self {
        Self {
            terminals: Terminals::List(signals.into_iter().map(Into::into).collect()),
            ..Self::new("connect")
        }
    }

    /// Attach a port to a signal.
    pub fn terminal(mut self, port: impl Into<String>, signal: impl Into<String>) -> Self {
        if let Terminals::List(_) = self.terminals {
            self.terminals = Terminals::default();
        }
        if let Terminals::Named(map) = &mut self.terminals {
            map.insert(port.into(), signal.into());
        }
        self
    }

    /// Set a property.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The `name` property, if given.
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(Value::as_str)
    }

    /// A plain string property.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// A numeric property, accepting JSON numbers and engineering strings.
    pub fn number(&self, device: &str, key: &str) -> Result<Option<f64>> {
        match self.properties.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| NodalError::invalid_parameter(device, key, "not a finite number")),
            Some(Value::String(s)) => parse_value(s).map(Some).ok_or_else(|| {
                NodalError::invalid_parameter(
                    device,
                    key,
                    format!("\"{}\" is not a number in engineering notation", s),
                )
            }),
            Some(other) => Err(NodalError::invalid_parameter(
                device,
                key,
                format!("expected a number, found {}", other),
            )),
        }
    }

    /// A numeric property that must be present.
    pub fn required_number(&self, device: &str, key: &str) -> Result<f64> {
        self.number(device, key)?
            .ok_or_else(|| NodalError::invalid_parameter(device, key, "missing value"))
    }

    /// A source specification.
    ///
    /// Accepts `{"type": "pulse", "args": [...]}`, the text form
    /// `"pulse(0, 1, 1n)"`, or a bare number meaning `dc(value)`.
    pub fn source(&self, device: &str, key: &str) -> Result<Option<Source>> {
        let value = match self.properties.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(v) => v,
        };
        let source = match value {
            Value::Number(_) => Source::constant(self.required_number(device, key)?),
            Value::String(s) => parse_source_text(s)?,
            Value::Object(obj) => {
                let kind: SourceKind = obj
                    .get("type")
                    .or_else(|| obj.get("kind"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        NodalError::invalid_source(format!("{}: source has no function name", device))
                    })?
                    .parse()?;
                let args = match obj.get("args") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|item| source_arg(device, item))
                        .collect::<Result<Vec<_>>>()?,
                    Some(other) => vec![source_arg(device, other)?],
                };
                Source::new(kind, &args)?
            }
            other => {
                return Err(NodalError::invalid_source(format!(
                    "{}: cannot interpret {} as a source",
                    device, other
                )))
            }
        };
        Ok(Some(source))
    }
}

fn source_arg(device: &str, item: &Value) -> Result<f64> {
    let parsed = match item {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_value(s),
        _ => None,
    };
    parsed.ok_or_else(|| {
        NodalError::invalid_source(format!("{}: source argument {} is not a number", device, item))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_aliases() {
        let rec: DeviceRecord = serde_json::from_value(json!({
            "type": "resistor",
            "connections": {"n1": "a", "n2": "b"},
            "properties": {"name": "R1", "value": "4.7k"}
        }))
        .unwrap();
        assert_eq!(rec.kind, "resistor");
        assert_eq!(rec.terminals.get("n2"), Some("b"));
        assert_eq!(rec.name(), Some("R1"));
        assert_eq!(rec.number("R1", "value").unwrap(), Some(4700.0));

        let gnd: DeviceRecord =
            serde_json::from_value(json!({"kind": "ground", "terminals": ["gnd", "vss"]})).unwrap();
        assert_eq!(gnd.terminals.signals(), vec!["gnd", "vss"]);
    }

    #[test]
    fn test_bad_number_names_device() {
        let rec = DeviceRecord::new("resistor").property("value", "ten");
        let err = rec.number("R7", "value").unwrap_err();
        assert!(err.to_string().contains("R7"));
    }

    #[test]
    fn test_source_forms() {
        let rec = DeviceRecord::new("voltage source")
            .property("a", json!({"type": "step", "args": [0, "5", "1u"]}))
            .property("b", "sin(0, 1, 1k)")
            .property("c", 2.5);

        let a = rec.source("V1", "a").unwrap().unwrap();
        assert_eq!(a.kind(), SourceKind::Step);
        assert_eq!(a.args()[1], 5.0);

        let b = rec.source("V1", "b").unwrap().unwrap();
        assert_eq!(b.kind(), SourceKind::Sin);

        let c = rec.source("V1", "c").unwrap().unwrap();
        assert_eq!(c.dc(), 2.5);

        assert!(rec.source("V1", "missing").unwrap().is_none());
        let bad = DeviceRecord::new("voltage source").property("value", json!([1, 2]));
        assert!(bad.source("V1", "value").is_err());
    }
}
