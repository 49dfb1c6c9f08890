//! End-to-end analyses on small netlists.

use std::time::Duration;

use approx::assert_relative_eq;
use nodal_core::error::{DcFailureCause, NodalError};
use nodal_core::netlist::DeviceRecord;
use nodal_core::solver::{StepControl, Sweep, TranProgress};
use nodal_core::{Circuit, Simulator, SolverConfig};
use serde_json::json;

fn resistor(name: &str, n1: &str, n2: &str, value: impl Into<serde_json::Value>) -> DeviceRecord {
    DeviceRecord::new("resistor")
        .terminal("n1", n1)
        .terminal("n2", n2)
        .property("name", name)
        .property("value", value)
}

fn vsource(name: &str, nplus: &str, nminus: &str, value: impl Into<serde_json::Value>) -> DeviceRecord {
    DeviceRecord::new("voltage source")
        .terminal("nplus", nplus)
        .terminal("nminus", nminus)
        .property("name", name)
        .property("value", value)
}

fn simulator(records: &[DeviceRecord]) -> Simulator {
    let circuit = Circuit::from_records(records).unwrap();
    Simulator::new(circuit).unwrap()
}

fn rc_lowpass(input: impl Into<serde_json::Value>) -> Vec<DeviceRecord> {
    vec![
        vsource("Vin", "in", "gnd", input),
        resistor("R1", "in", "out", "1k"),
        DeviceRecord::new("capacitor")
            .terminal("n1", "out")
            .terminal("n2", "gnd")
            .property("name", "C1")
            .property("value", "1u"),
        DeviceRecord::ground(["gnd"]),
    ]
}

#[test]
fn test_voltage_divider() {
    let mut sim = simulator(&[
        vsource("V1", "in", "gnd", 10.0),
        resistor("R1", "in", "out", "1k"),
        resistor("R2", "out", "gnd", "3k"),
        DeviceRecord::ground(["gnd"]),
    ]);
    let dc = sim.solve_dc().unwrap();
    assert_relative_eq!(dc.get("in").unwrap(), 10.0, epsilon = 1e-9);
    assert_relative_eq!(dc.get("out").unwrap(), 7.5, epsilon = 1e-9);
    // 2.5 mA flows out of the positive terminal
    assert_relative_eq!(dc.get("I(V1)").unwrap().abs(), 2.5e-3, epsilon = 1e-9);
    assert_eq!(dc.get("gnd"), Some(0.0));
}

#[test]
fn test_json_netlist_with_connect() {
    let netlist = json!([
        {"type": "voltage source", "connections": {"nplus": "a", "nminus": "gnd"},
         "properties": {"name": "V1", "value": "5"}},
        {"type": "resistor", "connections": {"n1": "a.x", "n2": "b"},
         "properties": {"name": "R1", "value": 1000}},
        {"type": "resistor", "connections": {"n1": "b", "n2": "gnd"},
         "properties": {"name": "R2", "value": 1000}},
        {"type": "connect", "connections": ["a", "a.x"]}
    ]);
    let mut sim = Simulator::from_json(&netlist.to_string(), SolverConfig::default()).unwrap();
    let dc = sim.solve_dc().unwrap();
    assert_relative_eq!(dc.get("b").unwrap(), 2.5, epsilon = 1e-9);
    // Aliases report the value of their canonical node
    assert_eq!(dc.get("a.x"), dc.get("a"));
    assert!(!sim.circuit().unknown_names.iter().any(|n| n == "a.x"));
}

#[test]
fn test_diode_forward_drop() {
    let mut sim = simulator(&[
        vsource("V1", "in", "gnd", 5.0),
        resistor("R1", "in", "a", "1k"),
        DeviceRecord::new("diode")
            .terminal("anode", "a")
            .terminal("cathode", "gnd")
            .property("name", "D1"),
        DeviceRecord::ground(["gnd"]),
    ]);
    let vd = sim.solve_dc().unwrap().get("a").unwrap();
    assert!(vd > 0.6 && vd < 0.8, "diode drop {}", vd);
}

#[test]
fn test_nmos_inverter() {
    let build = |vin: f64| {
        simulator(&[
            vsource("Vdd", "vdd", "gnd", 5.0),
            vsource("Vin", "in", "gnd", vin),
            resistor("Rload", "vdd", "out", "10k"),
            DeviceRecord::new("nfet")
                .terminal("d", "out")
                .terminal("g", "in")
                .terminal("s", "gnd")
                .property("name", "M1")
                .property("W", 1.0)
                .property("L", 1.0),
            DeviceRecord::ground(["gnd"]),
        ])
    };

    let high = build(0.0).solve_dc().unwrap().get("out").unwrap();
    assert_relative_eq!(high, 5.0, epsilon = 1e-6);

    let low = build(5.0).solve_dc().unwrap().get("out").unwrap();
    assert!(low < 1.0, "inverter output {}", low);
    assert!(low > 0.0);
}

#[test]
fn test_noninverting_opamp() {
    let mut sim = simulator(&[
        vsource("Vin", "in", "gnd", 1.0),
        DeviceRecord::new("opamp")
            .terminal("nplus", "in")
            .terminal("nminus", "fb")
            .terminal("output", "out")
            .terminal("gnd", "gnd")
            .property("name", "U1")
            .property("A", 1e5),
        resistor("Rf", "out", "fb", "10k"),
        resistor("Rg", "fb", "gnd", "10k"),
        DeviceRecord::ground(["gnd"]),
    ]);
    let out = sim.solve_dc().unwrap().get("out").unwrap();
    assert_relative_eq!(out, 2.0, epsilon = 1e-3);
}

#[test]
fn test_parallel_sources_are_a_loop() {
    let records = [
        vsource("V1", "a", "gnd", 1.0),
        vsource("V2", "a", "gnd", 2.0),
        resistor("R1", "a", "gnd", "1k"),
        DeviceRecord::ground(["gnd"]),
    ];
    let circuit = Circuit::from_records(&records).unwrap();
    match Simulator::new(circuit) {
        Err(NodalError::VoltageSourceLoop { sources }) => {
            assert!(sources.contains("V1"));
            assert!(sources.contains("V2"));
        }
        other => panic!("expected a voltage source loop, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_ground() {
    let records = [vsource("V1", "a", "b", 1.0), resistor("R1", "a", "b", "1k")];
    assert!(matches!(
        Circuit::from_records(&records),
        Err(NodalError::MissingGround)
    ));
}

#[test]
fn test_dc_sweep_of_divider() {
    let mut sim = simulator(&[
        vsource("V1", "in", "gnd", 0.0),
        resistor("R1", "in", "out", "1k"),
        resistor("R2", "out", "gnd", "1k"),
        DeviceRecord::ground(["gnd"]),
    ]);
    let result = sim
        .solve_dc_sweep(&Sweep::new("v1", 0.0, 2.0, 0.5), None)
        .unwrap();
    assert!(result.outer.is_empty());
    assert_eq!(result.tables.len(), 1);

    let table = &result.tables[0];
    assert_eq!(table.sweep.len(), 5);
    for (v, out) in table.sweep.iter().zip(&table.signals["out"]) {
        assert_relative_eq!(*out, v / 2.0, epsilon = 1e-9);
    }

    // The swept source gets its own waveform back
    let dc = sim.solve_dc().unwrap();
    assert_relative_eq!(dc.get("out").unwrap(), 0.0, epsilon = 1e-12);
}

#[test]
fn test_nested_sweep() {
    let mut sim = simulator(&[
        vsource("V1", "a", "gnd", 0.0),
        vsource("V2", "b", "gnd", 0.0),
        resistor("R1", "a", "out", "1k"),
        resistor("R2", "b", "out", "1k"),
        DeviceRecord::ground(["gnd"]),
    ]);
    let result = sim
        .solve_dc_sweep(
            &Sweep::new("V1", 0.0, 1.0, 1.0),
            Some(&Sweep::new("V2", 0.0, 4.0, 2.0)),
        )
        .unwrap();
    assert_eq!(result.outer, vec![0.0, 2.0, 4.0]);
    assert_eq!(result.tables.len(), 3);
    let last = &result.tables[2].signals["out"];
    assert_relative_eq!(last[0], 2.0, epsilon = 1e-9);
    assert_relative_eq!(last[1], 2.5, epsilon = 1e-9);
}

#[test]
fn test_ac_lowpass_response() {
    let mut sim = simulator(&rc_lowpass(0.0));
    let ac = sim.solve_ac(1.0, 1e6, 10, "Vin").unwrap();
    assert_eq!(ac.frequencies.len(), 61);
    assert_relative_eq!(ac.frequencies[0], 1.0);
    assert_relative_eq!(*ac.frequencies.last().unwrap(), 1e6, max_relative = 1e-6);

    let out = &ac.signals["out"];
    assert_relative_eq!(out.magnitude[0], 1.0, epsilon = 1e-3);
    assert!(out.phase[0].abs() < 1.0);

    // Corner at 1/(2 pi RC) ~ 159 Hz
    let corner = 1.0 / (2.0 * std::f64::consts::PI * 1e-3);
    for (i, f) in ac.frequencies.iter().enumerate().skip(1) {
        if *f > corner {
            assert!(out.magnitude[i] < out.magnitude[i - 1]);
        }
        assert!((out.phase[i] - out.phase[i - 1]).abs() < 90.0);
    }
    let last = out.phase.last().unwrap();
    assert_relative_eq!(*last, -90.0, epsilon = 0.1);

    assert!(ac.signals["gnd"].magnitude.iter().all(|m| *m == 0.0));
    assert!(ac.signals.contains_key("I(Vin)"));
}

#[test]
fn test_ac_unknown_source() {
    let mut sim = simulator(&rc_lowpass(0.0));
    match sim.solve_ac(1.0, 1e3, 10, "Vx") {
        Err(NodalError::UnknownSource { name }) => assert_eq!(name, "Vx"),
        other => panic!("expected UnknownSource, got {:?}", other.map(|_| ())),
    }
    assert!(sim.solve_ac(0.0, 1e3, 10, "Vin").is_err());
    assert!(sim.solve_ac(1.0, 1e3, 0, "Vin").is_err());
}

#[test]
fn test_rc_step_response() {
    let mut sim = simulator(&rc_lowpass(json!({"type": "step", "args": [0, 1, 0]})));
    let tau = 1e-3;
    let tstop = 5e-3;

    let result = sim.solve_transient(tstop, &["out"], |_| StepControl::Continue).unwrap();
    assert!(!result.stopped_early);
    assert_relative_eq!(result.times[0], 0.0);
    assert_relative_eq!(*result.times.last().unwrap(), tstop, max_relative = 1e-9);
    assert!(result.times.windows(2).all(|w| w[1] > w[0]));

    let out = result.signal("out").unwrap();
    assert_eq!(out.len(), result.times.len());
    for (t, v) in result.times.iter().zip(out) {
        let expected = 1.0 - (-t / tau).exp();
        assert!((v - expected).abs() < 0.01, "t={} v={} expected {}", t, v, expected);
    }

    let stats = &result.stats;
    assert_eq!(stats.accepted_steps + 1, result.times.len());
    assert!(stats.max_step <= tstop / 100.0 * (1.0 + 1e-9));
    assert!(stats.min_step > 0.0);
}

#[test]
fn test_square_drive_keeps_steps_in_bounds() {
    let config = SolverConfig::default();
    let circuit = Circuit::from_records(&rc_lowpass("square(0, 1, 1k)")).unwrap();
    let mut sim = Simulator::with_config(circuit, config.clone()).unwrap();

    // Three periods of 1 ms
    let tstop = 3e-3;
    let max_step = tstop / (3.0 * config.tran_points as f64);
    let min_step = max_step / 1e8;

    let result = sim.solve_transient(tstop, &["out"], |_| StepControl::Continue).unwrap();
    assert!(result.stats.breakpoints >= 4);

    let steps: Vec<f64> = result.times.windows(2).map(|w| w[1] - w[0]).collect();
    for h in &steps {
        assert!(*h >= min_step * (1.0 - 1e-3), "step {} below floor {}", h, min_step);
        assert!(*h <= max_step * (1.0 + 1e-9), "step {} above {}", h, max_step);
    }
    for pair in steps.windows(2) {
        let growth = pair[1] / pair[0];
        assert!(
            growth <= config.step_increase_factor * (1.0 + 1e-3),
            "step grew from {} to {}",
            pair[0],
            pair[1]
        );
    }

    let out = result.signal("out").unwrap();
    assert!(out.iter().all(|v| (-0.01..=1.01).contains(v)));
}

fn diode_clamp(input: impl Into<serde_json::Value>) -> Vec<DeviceRecord> {
    vec![
        vsource("V1", "in", "gnd", input),
        resistor("R1", "in", "a", "1k"),
        DeviceRecord::new("diode")
            .terminal("anode", "a")
            .terminal("cathode", "gnd")
            .property("name", "D1"),
        DeviceRecord::new("capacitor")
            .terminal("n1", "a")
            .terminal("n2", "gnd")
            .property("name", "C1")
            .property("value", "1n"),
        DeviceRecord::ground(["gnd"]),
    ]
}

#[test]
fn test_transient_failure_keeps_partial_waveforms() {
    let config = SolverConfig {
        tran_max_iters: 1,
        ..SolverConfig::default()
    };
    let edge = 1e-4;
    let tstop = 1e-3;
    let records = diode_clamp(json!({"type": "step", "args": [0, 5, edge, "1n"]}));
    let mut sim = Simulator::with_config(Circuit::from_records(&records).unwrap(), config).unwrap();

    let err = sim
        .solve_transient(tstop, &[] as &[&str], |_| StepControl::Continue)
        .unwrap_err();
    let NodalError::TransientNonConvergence { time, ref node, .. } = err else {
        panic!("expected transient non-convergence, got {}", err);
    };
    assert!(time >= edge && time < tstop, "failed at {}", time);
    assert!(!node.is_empty());

    let partial = err.partial_results().unwrap();
    assert!(!partial.stopped_early);
    assert!(!partial.times.is_empty());
    assert_eq!(partial.times[0], 0.0);
    assert!(partial.times.windows(2).all(|w| w[1] > w[0]));
    assert!(*partial.times.last().unwrap() <= time);
    assert_eq!(partial.signal("a").unwrap().len(), partial.times.len());
    assert!(partial.stats.newton_failures > 0);
}

#[test]
fn test_dc_failure_without_current_sources() {
    let config = SolverConfig {
        dc_max_iters: 1,
        ..SolverConfig::default()
    };
    let circuit = Circuit::from_records(&diode_clamp(5.0)).unwrap();
    let mut sim = Simulator::with_config(circuit, config).unwrap();
    match sim.solve_dc() {
        Err(NodalError::DcNonConvergence { cause, node }) => {
            assert_eq!(cause, DcFailureCause::OscillatingLoop);
            assert_eq!(node, "a");
        }
        other => panic!("expected DC non-convergence, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_dc_failure_with_current_source() {
    let config = SolverConfig {
        dc_max_iters: 1,
        ..SolverConfig::default()
    };
    let records = [
        DeviceRecord::new("current source")
            .terminal("nplus", "gnd")
            .terminal("nminus", "a")
            .property("name", "I1")
            .property("value", "1m"),
        resistor("R1", "a", "gnd", "1k"),
        DeviceRecord::new("diode")
            .terminal("anode", "a")
            .terminal("cathode", "gnd")
            .property("name", "D1"),
    ];
    let mut sim = Simulator::with_config(Circuit::from_records(&records).unwrap(), config).unwrap();
    let err = sim.solve_dc().unwrap_err();
    assert!(err.to_string().contains("conductive path"));
    match err {
        NodalError::DcNonConvergence { cause, node } => {
            assert_eq!(cause, DcFailureCause::CurrentSourceWithoutPath);
            assert_eq!(node, "a");
        }
        other => panic!("expected DC non-convergence, got {}", other),
    }
}

#[test]
fn test_pwl_source_follows_knots() {
    let mut sim = simulator(&[
        vsource("V1", "a", "gnd", "pwl(0, 0, 1m, 1, 2m, 1, 3m, 0)"),
        resistor("R1", "a", "gnd", "1k"),
        DeviceRecord::ground(["gnd"]),
    ]);
    let result = sim
        .solve_transient(4e-3, &[] as &[&str], |_| StepControl::Continue)
        .unwrap();
    for (t, v) in [(0.5e-3, 0.5), (1e-3, 1.0), (1.5e-3, 1.0), (2.5e-3, 0.5), (3.5e-3, 0.0)] {
        assert_relative_eq!(result.value_at("a", t).unwrap(), v, epsilon = 1e-6);
    }
    assert!(result.stats.breakpoints >= 2);
}

#[test]
fn test_progress_stop_and_finish() {
    let config = SolverConfig::default().with_progress_interval(Duration::ZERO);
    let circuit = Circuit::from_records(&rc_lowpass("sin(0, 1, 1k)")).unwrap();
    let mut sim = Simulator::with_config(circuit, config).unwrap();

    let mut running = 0;
    let mut finished = 0;
    let result = sim
        .solve_transient(10e-3, &["out"], |p| match p {
            TranProgress::Running { percent } => {
                assert!((0.0..=100.0).contains(&percent));
                running += 1;
                if running == 5 {
                    StepControl::Stop
                } else {
                    StepControl::Continue
                }
            }
            TranProgress::Finished(outcome) => {
                assert!(outcome.is_ok());
                finished += 1;
                StepControl::Continue
            }
        })
        .unwrap();

    assert_eq!(running, 5);
    assert_eq!(finished, 1);
    assert!(result.stopped_early);
    assert!(*result.times.last().unwrap() < 10e-3);
}

#[test]
fn test_transient_rejects_bad_stop_time() {
    let mut sim = simulator(&rc_lowpass(1.0));
    let mut finished = 0;
    let result = sim.solve_transient(0.0, &["out"], |p| {
        if let TranProgress::Finished(outcome) = p {
            assert!(outcome.is_err());
            finished += 1;
        }
        StepControl::Continue
    });
    assert!(matches!(result, Err(NodalError::InvalidSimulationParam { .. })));
    assert_eq!(finished, 1);
}
