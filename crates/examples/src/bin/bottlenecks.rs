use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use vf_core::{PopulationSource, SimRng};
use vf_examples::{load_config, print_json, PopulationArgs};
use vf_predictors::{BottleneckPredictor, PredictorConfig, SimulatedBottleneckPredictor};
use vf_runtime::{init_tracing, RunConfig};

/// Predict which tools will be congested at the end of the horizon.
#[derive(Debug, Parser)]
#[command(name = "bottlenecks")]
struct Args {
    #[arg(long, default_value_t = 24.0)]
    horizon: f64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// JSON file with `population`, `run` and `predictor` sections
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(flatten)]
    population: PopulationArgs,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct BottleneckConfig {
    population: PopulationSource,
    run: RunConfig,
    predictor: PredictorConfig,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg: BottleneckConfig = load_config(args.config.as_deref())?;
    let source = args.population.resolve(cfg.population)?;

    let mut predictor = SimulatedBottleneckPredictor::new(cfg.predictor, source, cfg.run, SimRng::new(args.seed))?;
    let predictions = predictor.predict(args.horizon).context("predicting bottlenecks")?;
    info!(horizon = args.horizon, bottlenecks = predictions.len(), "bottlenecks done");
    print_json(&predictions)
}
