use clap::Parser;
use log::info;
use microsim::{JsonLinesSource, JsonLinesWriter, NetworkDescription, Simulation, SimulationConfig};
use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;

/// Runs a traffic simulation without a user interface.
#[derive(Parser)]
#[command(name = "microsim")]
#[command(about = "Microscopic road traffic simulation")]
struct Cli {
    /// The network description (JSON)
    #[arg(short, long)]
    net: PathBuf,

    /// Route files with one vehicle, route or vehicle type per line (JSON)
    #[arg(short, long)]
    routes: Vec<PathBuf>,

    /// The simulation configuration (JSON); defaults are used if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Writes the per-step vehicle states to this file (JSON lines)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overrides the configured end time in s
    #[arg(long)]
    end: Option<f64>,

    /// Overrides the configured random seed
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    env_logger::init();
    if let Err(err) = run(Cli::parse()) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config: SimulationConfig = match &cli.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => SimulationConfig::default(),
    };
    if cli.end.is_some() {
        config.end = cli.end;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    let net = NetworkDescription::from_json(&std::fs::read_to_string(&cli.net)?)?.build()?;
    let mut sim = Simulation::new(net, config)?;
    for path in &cli.routes {
        sim.add_route_source(JsonLinesSource::open(path)?)?;
    }
    if let Some(path) = &cli.output {
        sim.add_output(JsonLinesWriter::create(path)?);
    }

    let start = Instant::now();
    let state = sim.run()?;
    let stats = sim.statistics();
    info!("stopped after {} steps ({:?})", sim.frame(), start.elapsed());
    println!(
        "{:?} at t={}: departed {}, arrived {}, running {}, teleports {}",
        state,
        sim.time(),
        stats.departed,
        stats.arrived,
        stats.running,
        stats.teleports
    );
    Ok(())
}
