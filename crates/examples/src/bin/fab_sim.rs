use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use vf_core::{PopulationSource, SimRng};
use vf_examples::{load_config, print_json, PopulationArgs};
use vf_runtime::{init_tracing, FabSimulator, RunConfig, RunCounters, RunTimer};

/// Run one fab simulation and print its metrics as JSON.
#[derive(Debug, Parser)]
#[command(name = "fab_sim")]
struct Args {
    #[arg(long, default_value_t = 168.0)]
    hours: f64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// JSON file with `population` and `run` sections
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(flatten)]
    population: PopulationArgs,
    /// Log the run counters as a JSON line when done
    #[arg(long)]
    counters: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct FabSimConfig {
    population: PopulationSource,
    run: RunConfig,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg: FabSimConfig = load_config(args.config.as_deref())?;
    let source = args.population.resolve(cfg.population)?;

    info!(seed = args.seed, hours = args.hours, "fab_sim starting");
    let counters = RunCounters::default();
    let timer = RunTimer::start();
    let mut sim = FabSimulator::from_source(&source, cfg.run, SimRng::new(args.seed))
        .context("building the fab")?
        .with_counters(counters.clone());
    let metrics = sim.run(args.hours).context("running the simulation")?;

    if args.counters {
        info!(counters = %counters.snapshot().to_json_line("fab_sim", Some(timer.elapsed())), "run counters");
    }
    print_json(&metrics)
}
