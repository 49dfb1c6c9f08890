//! Component models for circuit simulation.
//!
//! This module provides models for all supported circuit components:
//! - Linear: Resistor, Capacitor, Inductor, Op-Amp
//! - Sources: Voltage Source, Current Source
//! - Nonlinear: Diode, MOSFET
//!
//! Each component knows up to four stamps: `load_linear` (loaded once into
//! `Gl` and `C`), `load_dc`, `load_tran` (every Newton iteration) and
//! `load_ac` (small-signal excitation).

mod diode;
mod linear;
mod mosfet;
mod opamp;
mod sources;

pub use diode::{Diode, DiodeType};
pub use linear::{Capacitor, Inductor, Resistor};
pub use mosfet::{ChannelState, Mosfet, MosfetType};
pub use opamp::OpAmp;
pub use sources::{CurrentSource, VoltageSource};

use std::fmt;

use crate::circuit::NodeAllocator;
use crate::error::{NodalError, Result};
use crate::netlist::DeviceRecord;
use crate::solver::Matrix;
use crate::waveform::Source;

/// Record kinds understood by the circuit builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceKind {
    Resistor,
    Capacitor,
    Inductor,
    Diode,
    OpAmp,
    Nfet,
    Pfet,
    VoltageSource,
    CurrentSource,
    /// Alias group: all listed signals are one node
    Connect,
    /// Alias group bound to ground
    Ground,
    /// Newton starting value for one node
    InitialVoltage,
    /// Display-only marker, ignored
    VoltageProbe,
}

impl DeviceKind {
    /// Parse a record kind, ignoring case.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "resistor" => Some(Self::Resistor),
            "capacitor" => Some(Self::Capacitor),
            "inductor" => Some(Self::Inductor),
            "diode" => Some(Self::Diode),
            "opamp" => Some(Self::OpAmp),
            "nfet" => Some(Self::Nfet),
            "pfet" => Some(Self::Pfet),
            "voltage source" => Some(Self::VoltageSource),
            "current source" => Some(Self::CurrentSource),
            "connect" => Some(Self::Connect),
            "ground" => Some(Self::Ground),
            "initial voltage" => Some(Self::InitialVoltage),
            "voltage probe" => Some(Self::VoltageProbe),
            _ => None,
        }
    }

    /// Netlist spelling.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Resistor => "resistor",
            Self::Capacitor => "capacitor",
            Self::Inductor => "inductor",
            Self::Diode => "diode",
            Self::OpAmp => "opamp",
            Self::Nfet => "nfet",
            Self::Pfet => "pfet",
            Self::VoltageSource => "voltage source",
            Self::CurrentSource => "current source",
            Self::Connect => "connect",
            Self::Ground => "ground",
            Self::InitialVoltage => "initial voltage",
            Self::VoltageProbe => "voltage probe",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A circuit component.
#[derive(Debug, Clone)]
pub enum Device {
    Resistor(Resistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    VoltageSource(VoltageSource),
    CurrentSource(CurrentSource),
    Diode(Diode),
    Mosfet(Mosfet),
    OpAmp(OpAmp),
}

impl Device {
    /// Create a device from a netlist record.
    ///
    /// Returns `Ok(None)` for records that produce no device (a zero-area
    /// diode). Connectivity-only kinds are handled by the circuit builder
    /// and rejected here.
    pub(crate) fn from_record(
        kind: DeviceKind,
        name: String,
        record: &DeviceRecord,
        nodes: &mut NodeAllocator,
    ) -> Result<Option<Self>> {
        let device = match kind {
            DeviceKind::Resistor => {
                let value = record.required_number(&name, "value")?;
                let terms = [
                    nodes.terminal(record, &name, "n1")?,
                    nodes.terminal(record, &name, "n2")?,
                ];
                if value == 0.0 {
                    // A zero resistor is a 0 V source.
                    let branch = nodes.branch(&name);
                    Device::VoltageSource(VoltageSource::new(
                        name,
                        terms,
                        branch,
                        Source::constant(0.0),
                    ))
                } else {
                    Device::Resistor(Resistor::new(name, terms, value)?)
                }
            }

            DeviceKind::Capacitor => {
                let value = record.required_number(&name, "value")?;
                let terms = [
                    nodes.terminal(record, &name, "n1")?,
                    nodes.terminal(record, &name, "n2")?,
                ];
                Device::Capacitor(Capacitor::new(name, terms, value)?)
            }

            DeviceKind::Inductor => {
                let value = record.required_number(&name, "value")?;
                let terms = [
                    nodes.terminal(record, &name, "n1")?,
                    nodes.terminal(record, &name, "n2")?,
                ];
                let branch = nodes.branch(&name);
                Device::Inductor(Inductor::new(name, terms, value, branch)?)
            }

            DeviceKind::Diode => {
                let area = record.number(&name, "area")?.unwrap_or(1.0);
                let diode_type = match record.text("type") {
                    None => DiodeType::Normal,
                    Some(t) => DiodeType::from_str(t).ok_or_else(|| {
                        NodalError::invalid_parameter(
                            &name,
                            "type",
                            format!("expected 'normal' or 'ideal', got '{}'", t),
                        )
                    })?,
                };
                let terms = [
                    nodes.terminal(record, &name, "anode")?,
                    nodes.terminal(record, &name, "cathode")?,
                ];
                if area == 0.0 {
                    log::debug!("discarding zero-area diode {}", name);
                    return Ok(None);
                }
                Device::Diode(Diode::new(name, terms, area, diode_type)?)
            }

            DeviceKind::OpAmp => {
                let gain = record.required_number(&name, "A")?;
                let terms = [
                    nodes.terminal(record, &name, "nplus")?,
                    nodes.terminal(record, &name, "nminus")?,
                    nodes.terminal(record, &name, "output")?,
                    nodes.terminal(record, &name, "gnd")?,
                ];
                let branch = nodes.branch(&name);
                Device::OpAmp(OpAmp::new(name, terms, gain, branch)?)
            }

            DeviceKind::Nfet | DeviceKind::Pfet => {
                let width = record.required_number(&name, "W")?;
                let length = record.required_number(&name, "L")?;
                let terms = [
                    nodes.terminal(record, &name, "d")?,
                    nodes.terminal(record, &name, "g")?,
                    nodes.terminal(record, &name, "s")?,
                ];
                let mos_type = if kind == DeviceKind::Nfet {
                    MosfetType::Nfet
                } else {
                    MosfetType::Pfet
                };
                Device::Mosfet(Mosfet::new(name, terms, width, length, mos_type)?)
            }

            DeviceKind::VoltageSource => {
                let source = record
                    .source(&name, "value")?
                    .unwrap_or_else(|| Source::constant(0.0));
                let terms = [
                    nodes.terminal(record, &name, "nplus")?,
                    nodes.terminal(record, &name, "nminus")?,
                ];
                let branch = nodes.branch(&name);
                Device::VoltageSource(VoltageSource::new(name, terms, branch, source))
            }

            DeviceKind::CurrentSource => {
                let source = record
                    .source(&name, "value")?
                    .unwrap_or_else(|| Source::constant(0.0));
                let terms = [
                    nodes.terminal(record, &name, "nplus")?,
                    nodes.terminal(record, &name, "nminus")?,
                ];
                Device::CurrentSource(CurrentSource::new(name, terms, source))
            }

            DeviceKind::Connect
            | DeviceKind::Ground
            | DeviceKind::InitialVoltage
            | DeviceKind::VoltageProbe => {
                return Err(NodalError::UnknownDeviceKind {
                    kind: kind.to_string(),
                })
            }
        };
        Ok(Some(device))
    }

    /// Get the component name.
    pub fn name(&self) -> &str {
        match self {
            Device::Resistor(r) => &r.name,
            Device::Capacitor(c) => &c.name,
            Device::Inductor(l) => &l.name,
            Device::VoltageSource(v) => &v.name,
            Device::CurrentSource(i) => &i.name,
            Device::Diode(d) => &d.name,
            Device::Mosfet(m) => &m.name,
            Device::OpAmp(o) => &o.name,
        }
    }

    /// Check if this component is nonlinear (requires Newton-Raphson iteration).
    pub fn is_nonlinear(&self) -> bool {
        matches!(self, Device::Diode(_) | Device::Mosfet(_))
    }

    /// Waveform of an independent source.
    pub fn source(&self) -> Option<&Source> {
        match self {
            Device::VoltageSource(v) => Some(&v.source),
            Device::CurrentSource(i) => Some(&i.source),
            _ => None,
        }
    }

    /// Mutable waveform of an independent source.
    pub fn source_mut(&mut self) -> Option<&mut Source> {
        match self {
            Device::VoltageSource(v) => Some(&mut v.source),
            Device::CurrentSource(i) => Some(&mut i.source),
            _ => None,
        }
    }

    /// Time-invariant contributions to `Gl` and `C`.
    pub(crate) fn load_linear(&self, gl: &mut Matrix, c: &mut Matrix) {
        match self {
            Device::Resistor(r) => r.load_linear(gl),
            Device::Capacitor(cap) => cap.load_linear(c),
            Device::Inductor(l) => l.load_linear(gl, c),
            Device::VoltageSource(v) => v.load_linear(gl),
            Device::Mosfet(m) => m.load_linear(gl, c),
            Device::OpAmp(o) => o.load_linear(gl),
            Device::CurrentSource(_) | Device::Diode(_) => {}
        }
    }

    /// Operating-point contributions: sources at their DC value plus the
    /// linearized nonlinear devices.
    pub(crate) fn load_dc(&self, soln: &[f64], g: &mut Matrix, rhs: &mut [f64]) {
        match self {
            Device::VoltageSource(v) => v.load_dc(rhs),
            Device::CurrentSource(i) => i.load_dc(rhs),
            Device::Diode(d) => d.load(soln, g, rhs),
            Device::Mosfet(m) => m.load(soln, g, rhs),
            _ => {}
        }
    }

    /// Transient contributions at `time`, accumulated into the device
    /// current vector.
    pub(crate) fn load_tran(&self, soln: &[f64], g: &mut Matrix, current: &mut [f64], time: f64) {
        match self {
            Device::VoltageSource(v) => v.load_tran(current, time),
            Device::CurrentSource(i) => i.load_tran(current, time),
            Device::Diode(d) => d.load(soln, g, current),
            Device::Mosfet(m) => m.load(soln, g, current),
            _ => {}
        }
    }

    /// Unit small-signal excitation; only independent sources have one.
    pub(crate) fn load_ac(&self, rhs: &mut [f64]) {
        match self {
            Device::VoltageSource(v) => v.load_ac(rhs),
            Device::CurrentSource(i) => i.load_ac(rhs),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        assert_eq!(DeviceKind::from_str("Voltage Source"), Some(DeviceKind::VoltageSource));
        assert_eq!(DeviceKind::from_str("nfet"), Some(DeviceKind::Nfet));
        assert_eq!(DeviceKind::from_str("transistor"), None);
        assert_eq!(DeviceKind::InitialVoltage.to_string(), "initial voltage");
    }
}
