//! Nodal - command-line front end for the circuit solver.
//!
//! Reads a JSON netlist, runs one analysis and prints the result as JSON.
//!
//! # Usage
//!
//! ```bash
//! nodal divider.json dc
//! nodal rc.json ac --source Vin --fstart 10 --fstop 1meg
//! RUST_LOG=info nodal rc.json tran --tstop 5m --probe out
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nodal_core::{
    error::{NodalError, Result},
    netlist::parse_value,
    solver::{StepControl, Sweep, TranProgress},
    Circuit, Simulator, SolverConfig,
};

/// Modified nodal analysis circuit solver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON netlist
    #[arg(value_name = "NETLIST")]
    netlist: PathBuf,

    /// JSON file overriding solver settings
    #[arg(short, long)]
    options: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(short, long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// DC operating point
    Dc,

    /// DC sweep of one source, optionally nested in a sweep of another
    Sweep {
        #[arg(long)]
        source: String,
        #[arg(long, value_parser = engineering)]
        start: f64,
        #[arg(long, value_parser = engineering)]
        stop: f64,
        #[arg(long, value_parser = engineering)]
        step: f64,
        /// Outer sweep as SOURCE,START,STOP,STEP
        #[arg(long, value_parser = outer_sweep)]
        outer: Option<Sweep>,
    },

    /// Small-signal frequency response
    Ac {
        /// Source carrying the unit excitation
        #[arg(long)]
        source: String,
        #[arg(long, value_parser = engineering)]
        fstart: f64,
        #[arg(long, value_parser = engineering)]
        fstop: f64,
        /// Points per decade
        #[arg(long, default_value_t = 50)]
        points: usize,
    },

    /// Transient analysis from t = 0
    Tran {
        #[arg(long, value_parser = engineering)]
        tstop: f64,
        /// Signals whose truncation error also limits the step
        #[arg(long)]
        probe: Vec<String>,
    },
}

fn engineering(s: &str) -> std::result::Result<f64, String> {
    parse_value(s).ok_or_else(|| format!("'{}' is not a number", s))
}

fn outer_sweep(s: &str) -> std::result::Result<Sweep, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [source, start, stop, step] = parts.as_slice() else {
        return Err("expected SOURCE,START,STOP,STEP".to_string());
    };
    Ok(Sweep::new(
        *source,
        engineering(start)?,
        engineering(stop)?,
        engineering(step)?,
    ))
}

fn load_config(path: Option<&PathBuf>) -> Result<SolverConfig> {
    let Some(path) = path else {
        return Ok(SolverConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| NodalError::NetlistRead {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(serde_json::from_str(&text)?)
}

fn print<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = load_config(args.options.as_ref())?;
    let circuit = Circuit::from_file(&args.netlist)?;
    let mut simulator = Simulator::with_config(circuit, config)?;

    match args.command {
        Command::Dc => print(&simulator.solve_dc()?, args.pretty),
        Command::Sweep {
            source,
            start,
            stop,
            step,
            outer,
        } => {
            let inner = Sweep::new(source, start, stop, step);
            print(&simulator.solve_dc_sweep(&inner, outer.as_ref())?, args.pretty)
        }
        Command::Ac {
            source,
            fstart,
            fstop,
            points,
        } => print(&simulator.solve_ac(fstart, fstop, points, &source)?, args.pretty),
        Command::Tran { tstop, probe } => {
            let result = simulator.solve_transient(tstop, probe.as_slice(), |p| {
                if let TranProgress::Running { percent } = p {
                    log::info!("transient {:.0}%", percent);
                }
                StepControl::Continue
            });
            match result {
                Ok(result) => print(&result, args.pretty),
                Err(e) => {
                    if let Some(partial) = e.partial_results() {
                        print(partial, args.pretty)?;
                    }
                    Err(e)
                }
            }
        }
    }
}
