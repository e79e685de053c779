use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vf_core::{PopulationSource, SimRng};
use vf_examples::{load_config, print_json, PopulationArgs};
use vf_runtime::init_tracing;
use vf_scenarios::{ScenarioEngine, ScenarioEngineConfig, ScenarioParameters, ScenarioType};

/// Run a what-if scenario against a baseline and print the comparison as JSON.
#[derive(Debug, Parser)]
#[command(name = "whatif")]
struct Args {
    /// EQUIPMENT_FAILURE, DEMAND_SPIKE or MAINTENANCE
    #[arg(long = "type")]
    scenario_type: String,
    #[arg(long, default_value = "what-if")]
    name: String,
    #[arg(long)]
    equipment: Option<String>,
    #[arg(long)]
    failure_time: Option<f64>,
    #[arg(long)]
    additional_lots: Option<usize>,
    /// Maintenance window in hours
    #[arg(long)]
    maintenance_hours: Option<f64>,
    /// Scenario parameters as a JSON object; flags above override its keys
    #[arg(long)]
    params: Option<String>,
    #[arg(long, default_value_t = 168.0)]
    hours: f64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// JSON file with `population` and `engine` sections
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(flatten)]
    population: PopulationArgs,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct WhatIfConfig {
    population: PopulationSource,
    engine: ScenarioEngineConfig,
}

fn parameters(args: &Args) -> Result<ScenarioParameters> {
    let mut params = match &args.params {
        Some(raw) => ScenarioParameters::from_json(raw).context("parsing --params")?,
        None => ScenarioParameters::default(),
    };
    if args.equipment.is_some() {
        params.equipment_id = args.equipment.clone();
    }
    if args.failure_time.is_some() {
        params.failure_time = args.failure_time;
    }
    if args.additional_lots.is_some() {
        params.additional_lots = args.additional_lots;
    }
    if args.maintenance_hours.is_some() {
        params.duration_hours = args.maintenance_hours;
    }
    Ok(params)
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg: WhatIfConfig = load_config(args.config.as_deref())?;
    let source = args.population.resolve(cfg.population)?;

    let scenario_type: ScenarioType = args.scenario_type.parse()?;
    let params = parameters(&args)?;
    let mut engine = ScenarioEngine::new(cfg.engine, source, SimRng::new(args.seed))?;
    let id = engine.create_scenario(args.name.clone(), None, scenario_type, params)?;
    info!(scenario_id = %id, %scenario_type, hours = args.hours, "whatif starting");

    let outcome = match engine.run_scenario(&id, args.hours) {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Ok(record) = engine.scenario(&id) {
                warn!(scenario_id = %id, status = ?record.status, "scenario did not complete");
            }
            return Err(err).context("running the scenario");
        }
    };
    print_json(&outcome)
}
