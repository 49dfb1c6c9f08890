//! Circuit graph structure.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use super::types::{Node, UnknownKind, GROUND};
use super::validate::check_voltage_source_loops;
use crate::components::{Device, DeviceKind};
use crate::error::{NodalError, Result};
use crate::netlist::{self, DeviceRecord};
use crate::solver::{MnaWorkspace, SolverConfig};

/// Signal name that is ground even without a `ground` record.
pub const GROUND_NAME: &str = "gnd";

/// Hands out unknown indices while a netlist is being read.
///
/// Signal names are first resolved through the alias chains built from
/// `connect` records. Ground-bound names map to [`GROUND`]; every other
/// canonical name gets a voltage unknown the first time it is seen. Branch
/// unknowns are allocated on demand by the devices that need them.
#[derive(Debug, Default)]
pub struct NodeAllocator {
    ground: BTreeSet<String>,
    aliases: HashMap<String, String>,
    node_map: BTreeMap<String, Node>,
    names: Vec<String>,
    kinds: Vec<UnknownKind>,
    found_ground: bool,
}

impl NodeAllocator {
    fn new() -> Self {
        let mut ground = BTreeSet::new();
        ground.insert(GROUND_NAME.to_string());
        Self {
            ground,
            ..Self::default()
        }
    }

    fn add_ground(&mut self, signal: &str) {
        self.ground.insert(signal.to_string());
    }

    /// Follow the alias chain to the canonical name.
    fn resolve<'a>(&'a self, mut signal: &'a str) -> &'a str {
        while let Some(next) = self.aliases.get(signal) {
            signal = next;
        }
        signal
    }

    /// Merge a `connect` group into one node.
    ///
    /// A ground name always becomes canonical. Otherwise the least
    /// hierarchical name wins (fewest `.` separators, then shortest), so
    /// top-level signal names survive over names inside subcircuits.
    fn connect(&mut self, signals: &[&str]) {
        if signals.len() <= 1 {
            return;
        }
        let roots: Vec<String> = signals.iter().map(|s| self.resolve(s).to_string()).collect();
        let canonical = roots
            .iter()
            .find(|r| self.ground.contains(r.as_str()))
            .or_else(|| {
                roots
                    .iter()
                    .min_by_key(|r| (r.matches('.').count(), r.len()))
            })
            .cloned();
        let Some(canonical) = canonical else {
            return;
        };
        for root in roots {
            if root != canonical {
                self.aliases.insert(root, canonical.clone());
            }
        }
    }

    /// Unknown for a signal name, allocating a voltage unknown if needed.
    fn signal(&mut self, signal: &str) -> Node {
        let canonical = self.resolve(signal).to_string();
        if self.ground.contains(&canonical) {
            self.node_map.insert(canonical, GROUND);
            return GROUND;
        }
        if let Some(&node) = self.node_map.get(&canonical) {
            return node;
        }
        let index = self.allocate(canonical.clone(), UnknownKind::Voltage);
        self.node_map.insert(canonical, Some(index));
        Some(index)
    }

    fn allocate(&mut self, name: String, kind: UnknownKind) -> usize {
        self.names.push(name);
        self.kinds.push(kind);
        self.kinds.len() - 1
    }

    /// Resolve a device port to its node.
    pub(crate) fn terminal(&mut self, record: &DeviceRecord, device: &str, port: &str) -> Result<Node> {
        let signal = record
            .terminals
            .get(port)
            .ok_or_else(|| NodalError::MissingTerminal {
                device: device.to_string(),
                terminal: port.to_string(),
            })?;
        let node = self.signal(signal);
        if node == GROUND {
            self.found_ground = true;
        }
        Ok(node)
    }

    /// Allocate the branch-current unknown of a device.
    pub(crate) fn branch(&mut self, device: &str) -> usize {
        self.allocate(format!("I({})", device), UnknownKind::Current)
    }

    /// Give every aliased name the node of its canonical name.
    fn finish(mut self) -> (BTreeMap<String, Node>, Vec<String>, Vec<UnknownKind>) {
        let aliased: Vec<(String, Node)> = self
            .aliases
            .keys()
            .filter_map(|alias| {
                let canonical = self.resolve(alias);
                self.node_map.get(canonical).map(|&node| (alias.clone(), node))
            })
            .collect();
        self.node_map.extend(aliased);
        (self.node_map, self.names, self.kinds)
    }
}

/// A complete circuit ready for simulation.
#[derive(Debug)]
pub struct Circuit {
    /// All devices in netlist order
    pub devices: Vec<Device>,

    /// Mapping from lowercase device name to index in `devices`
    device_map: HashMap<String, usize>,

    /// Mapping from every signal name (aliases included) to its node
    pub node_map: BTreeMap<String, Node>,

    /// Name of each unknown (canonical signal or `I(device)`)
    pub unknown_names: Vec<String>,

    /// Voltage or current, per unknown
    pub kinds: Vec<UnknownKind>,

    /// Indices of voltage sources in `devices`
    pub voltage_sources: Vec<usize>,

    /// Indices of current sources in `devices`
    pub current_sources: Vec<usize>,

    /// Newton starting values `(unknown, volts)`
    pub initial_voltages: Vec<(usize, f64)>,

    /// Number of records of each kind
    pub counts: BTreeMap<DeviceKind, usize>,

    workspace: Option<MnaWorkspace>,
}

impl Circuit {
    /// Build a circuit from netlist records.
    pub fn from_records(records: &[DeviceRecord]) -> Result<Self> {
        let mut nodes = NodeAllocator::new();

        let mut kinds = Vec::with_capacity(records.len());
        for record in records {
            let kind = DeviceKind::from_str(&record.kind).ok_or_else(|| NodalError::UnknownDeviceKind {
                kind: record.kind.clone(),
            })?;
            kinds.push(kind);
        }

        // Ground names first so connect groups can see them
        for (record, kind) in records.iter().zip(&kinds) {
            if *kind == DeviceKind::Ground {
                for signal in record.terminals.signals() {
                    nodes.add_ground(signal);
                }
            }
        }
        for (record, kind) in records.iter().zip(&kinds) {
            if *kind == DeviceKind::Connect {
                nodes.connect(&record.terminals.signals());
            }
        }

        let mut devices = Vec::new();
        let mut device_map = HashMap::new();
        let mut voltage_sources = Vec::new();
        let mut current_sources = Vec::new();
        let mut initial_voltages = Vec::new();
        let mut counts: BTreeMap<DeviceKind, usize> = BTreeMap::new();

        for (record, &kind) in records.iter().zip(&kinds) {
            let ordinal = counts.entry(kind).or_insert(0);
            *ordinal += 1;
            let name = match record.name() {
                Some(name) => name.to_string(),
                None => format!("{}_{}", kind.name().replace(' ', "_"), ordinal),
            };

            match kind {
                DeviceKind::Ground | DeviceKind::Connect | DeviceKind::VoltageProbe => continue,
                DeviceKind::InitialVoltage => {
                    let node = nodes.terminal(record, &name, "node")?;
                    let volts = record.required_number(&name, "IV")?;
                    match node {
                        Some(index) => initial_voltages.push((index, volts)),
                        None => log::debug!("ignoring initial voltage {} on ground", name),
                    }
                    continue;
                }
                _ => {}
            }

            let Some(device) = Device::from_record(kind, name, record, &mut nodes)? else {
                continue;
            };

            let index = devices.len();
            match &device {
                Device::VoltageSource(_) => voltage_sources.push(index),
                Device::CurrentSource(_) => current_sources.push(index),
                _ => {}
            }
            if device_map
                .insert(device.name().to_lowercase(), index)
                .is_some()
            {
                log::warn!("duplicate device name '{}', later definition wins lookups", device.name());
            }
            devices.push(device);
        }

        if !nodes.found_ground {
            return Err(NodalError::MissingGround);
        }

        let (node_map, unknown_names, kinds) = nodes.finish();

        let circuit = Circuit {
            devices,
            device_map,
            node_map,
            unknown_names,
            kinds,
            voltage_sources,
            current_sources,
            initial_voltages,
            counts,
            workspace: None,
        };
        log::info!("{}", circuit.summary());
        Ok(circuit)
    }

    /// Build a circuit from a JSON netlist string.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_records(&netlist::parse(json)?)
    }

    /// Build a circuit from a JSON netlist file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_records(&netlist::parse_file(path)?)
    }

    /// One-line statistics: unknown count and records per kind.
    pub fn summary(&self) -> String {
        let mut msg = format!("{} nodes", self.unknown_count());
        for (kind, count) in &self.counts {
            msg.push_str(&format!(", {} {}", count, kind));
        }
        msg
    }

    /// Total number of unknowns, branch currents included.
    pub fn unknown_count(&self) -> usize {
        self.kinds.len()
    }

    /// Node of a signal name.
    pub fn node(&self, name: &str) -> Option<Node> {
        self.node_map.get(name).copied()
    }

    /// Name of an unknown, for diagnostics.
    pub fn unknown_name(&self, index: usize) -> &str {
        self.unknown_names
            .get(index)
            .map(String::as_str)
            .unwrap_or("?")
    }

    /// Find a device by name, ignoring case.
    pub fn device(&self, name: &str) -> Option<&Device> {
        self.device_index(name).map(|i| &self.devices[i])
    }

    /// Index of a device by name, ignoring case.
    pub fn device_index(&self, name: &str) -> Option<usize> {
        self.device_map.get(&name.to_lowercase()).copied()
    }

    /// Index of an independent source by name, ignoring case.
    pub fn source_index(&self, name: &str) -> Result<usize> {
        self.device_index(name)
            .filter(|&i| self.devices[i].source().is_some())
            .ok_or_else(|| NodalError::UnknownSource {
                name: name.to_string(),
            })
    }

    /// Result keys and where to read them in a solution vector.
    ///
    /// Every signal name maps to its node (ground reads as zero), and each
    /// voltage source reports its branch current as `I(<name>)`.
    pub fn result_signals(&self) -> Vec<(String, Node)> {
        let mut signals: Vec<(String, Node)> = self
            .node_map
            .iter()
            .map(|(name, &node)| (name.clone(), node))
            .collect();
        for &i in &self.voltage_sources {
            if let Device::VoltageSource(v) = &self.devices[i] {
                signals.push((format!("I({})", v.name), Some(v.branch)));
            }
        }
        signals
    }

    /// Whether [`finalize`](Self::finalize) has succeeded.
    pub fn is_finalized(&self) -> bool {
        self.workspace.is_some()
    }

    /// Size the matrices, load linear contributions and check topology.
    ///
    /// Runs once; later calls return immediately.
    pub fn finalize(&mut self, config: &SolverConfig) -> Result<()> {
        if self.workspace.is_some() {
            return Ok(());
        }

        let mut ws = MnaWorkspace::new(self.kinds.clone(), config);
        for &(index, volts) in &self.initial_voltages {
            ws.seed(index, volts);
        }

        {
            let MnaWorkspace { gl, c, .. } = &mut ws;
            for device in &self.devices {
                device.load_linear(gl, c);
            }
        }

        let sources: Vec<(&str, usize)> = self
            .voltage_sources
            .iter()
            .filter_map(|&i| match &self.devices[i] {
                Device::VoltageSource(v) => Some((v.name.as_str(), v.branch)),
                _ => None,
            })
            .collect();
        check_voltage_source_loops(&ws.gl, &sources, config.eps)?;

        log::debug!("finalized circuit with {} unknowns", ws.size);
        self.workspace = Some(ws);
        Ok(())
    }

    /// Devices and workspace of a finalized circuit.
    pub(crate) fn split_mut(&mut self) -> Result<(&mut [Device], &mut MnaWorkspace)> {
        match self.workspace.as_mut() {
            Some(ws) => Ok((&mut self.devices, ws)),
            None => Err(NodalError::invalid_param("circuit has not been finalized")),
        }
    }

    /// Workspace of a finalized circuit.
    pub fn workspace(&self) -> Option<&MnaWorkspace> {
        self.workspace.as_ref()
    }
}
