//! Runs a scenario's baseline and perturbed simulations and diffs them.

use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use vf_core::population::{generate_route, new_lot};
use vf_core::{EquipmentId, Hours, PopulationSource, RandomSource, Result, ScenarioId, SimError, SimulationMetrics};
use vf_runtime::config::validate_horizon;
use vf_runtime::{FabSimulator, RunConfig, RunCounters, RunTimer};

use crate::impact::{ImpactAnalysis, ScenarioOutcome};
use crate::registry::ScenarioRegistry;
use crate::{Scenario, ScenarioParameters, ScenarioType, MAX_ADDITIONAL_LOTS};

const SPIKE_WAFERS: u32 = 25;
const SPIKE_STEPS: u32 = 30;
const SPIKE_PRIORITY: u8 = 8;
/// Spike lots arrive within the first day of the horizon.
const SPIKE_ARRIVAL_WINDOW_HOURS: Hours = 24.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScenarioEngineConfig {
    pub run: RunConfig,
    pub default_spike_lots: usize,
    pub default_maintenance_hours: Hours,
    /// Run baseline and scenario on two threads.
    pub parallel: bool,
}

impl Default for ScenarioEngineConfig {
    fn default() -> Self {
        Self { run: RunConfig::default(), default_spike_lots: 20, default_maintenance_hours: 8.0, parallel: true }
    }
}

impl ScenarioEngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.run.validate()?;
        if self.default_spike_lots > MAX_ADDITIONAL_LOTS {
            return Err(SimError::invalid(
                "default_spike_lots",
                format!("at most {MAX_ADDITIONAL_LOTS}, got {}", self.default_spike_lots),
            ));
        }
        validate_horizon("default_maintenance_hours", self.default_maintenance_hours)
    }
}

/// What the scenario run does before it starts, resolved from type and parameters.
#[derive(Debug, Clone, PartialEq)]
enum Perturbation {
    Nothing,
    Failure { equipment_id: EquipmentId, at: Hours },
    Spike { lots: usize },
    Maintenance { equipment_id: EquipmentId, until: Hours },
}

impl Perturbation {
    fn resolve(scenario: &Scenario, cfg: &ScenarioEngineConfig) -> Result<Self> {
        let ScenarioParameters { equipment_id, failure_time, additional_lots, duration_hours } =
            scenario.parameters.clone();
        Ok(match scenario.scenario_type {
            ScenarioType::EquipmentFailure => match equipment_id {
                Some(equipment_id) => Perturbation::Failure { equipment_id, at: failure_time.unwrap_or(0.0) },
                None => Perturbation::Nothing,
            },
            ScenarioType::DemandSpike => match additional_lots.unwrap_or(cfg.default_spike_lots) {
                0 => Perturbation::Nothing,
                lots => Perturbation::Spike { lots },
            },
            ScenarioType::Maintenance => match equipment_id {
                Some(equipment_id) => Perturbation::Maintenance {
                    equipment_id,
                    until: duration_hours.unwrap_or(cfg.default_maintenance_hours),
                },
                None => Perturbation::Nothing,
            },
            ScenarioType::NewProcess => return Err(SimError::UnsupportedScenario(scenario.scenario_type.to_string())),
        })
    }

    fn apply<R: RandomSource>(&self, sim: &mut FabSimulator<R>, horizon: Hours) -> Result<()> {
        match self {
            Perturbation::Nothing => return Ok(()),
            Perturbation::Failure { equipment_id, at } => sim.force_failure(equipment_id, *at)?,
            Perturbation::Maintenance { equipment_id, until } => sim.force_maintenance(equipment_id, *until)?,
            Perturbation::Spike { lots } => {
                let window = SPIKE_ARRIVAL_WINDOW_HOURS.min(horizon);
                for i in 0..*lots {
                    let rng = sim.rng_mut();
                    let route = generate_route(rng, SPIKE_STEPS);
                    let arrival = rng.uniform(0.0, window);
                    let lot = new_lot(format!("SPIKE-{i:04}"), SPIKE_WAFERS, 1, SPIKE_STEPS, SPIKE_PRIORITY, route, arrival);
                    sim.inject_lot(lot)?;
                }
            }
        }
        debug!(perturbation = ?self, "perturbation applied");
        Ok(())
    }

    /// Type-specific advice; none when nothing was perturbed.
    fn advice(&self) -> Vec<String> {
        match self {
            Perturbation::Nothing => Vec::new(),
            Perturbation::Failure { equipment_id, .. } => vec![
                format!("Shorten the preventive maintenance interval for {equipment_id}"),
                "Prepare overtime on equipment of the same type".to_string(),
            ],
            Perturbation::Spike { .. } => vec![
                "Consider temporary extra capacity at bottleneck equipment".to_string(),
                "Consider holding low-priority lots".to_string(),
            ],
            Perturbation::Maintenance { .. } => vec![
                "Adjust WIP levels for the maintenance window".to_string(),
                "Review night or weekend maintenance slots".to_string(),
            ],
        }
    }
}

/// Owns the scenario registry and the template random source the paired runs start from.
pub struct ScenarioEngine<R: RandomSource + Clone> {
    config: ScenarioEngineConfig,
    source: PopulationSource,
    rng: R,
    counters: RunCounters,
    registry: ScenarioRegistry,
}

impl<R: RandomSource + Clone> ScenarioEngine<R> {
    pub fn new(config: ScenarioEngineConfig, source: PopulationSource, rng: R) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, source, rng, counters: RunCounters::default(), registry: ScenarioRegistry::new() })
    }

    pub fn config(&self) -> &ScenarioEngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ScenarioRegistry {
        &self.registry
    }

    /// Counters shared by every run this engine starts.
    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    pub fn create_scenario(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
        scenario_type: ScenarioType,
        parameters: ScenarioParameters,
    ) -> Result<ScenarioId> {
        self.registry.create(name, description, scenario_type, parameters)
    }

    pub fn scenario(&self, scenario_id: &str) -> Result<&Scenario> {
        self.registry.get(scenario_id)
    }

    /// Runs baseline and scenario over `duration_hours` and stores the outcome.
    ///
    /// Both runs start from clones of the same random state, so they build
    /// identical populations and differ only by the perturbation. Lookup and
    /// configuration errors leave the record untouched; anything that fails
    /// once the record is RUNNING moves it to FAILED.
    pub fn run_scenario(&mut self, scenario_id: &str, duration_hours: Hours) -> Result<ScenarioOutcome> {
        validate_horizon("duration_hours", duration_hours)?;
        let scenario = self.registry.get(scenario_id)?.clone();
        let perturbation = Perturbation::resolve(&scenario, &self.config)?;

        self.registry.mark_running(scenario_id)?;
        info!(scenario_id, scenario_type = %scenario.scenario_type, duration_hours, "scenario running");
        let timer = RunTimer::start();

        let (baseline, perturbed) = match self.run_pair(&perturbation, duration_hours) {
            Ok(pair) => pair,
            Err(err) => {
                error!(scenario_id, error = %err, "scenario failed");
                self.registry.mark_failed(scenario_id)?;
                return Err(err);
            }
        };

        let impact = ImpactAnalysis::between(&baseline, &perturbed);
        let outcome = ScenarioOutcome {
            scenario_id: scenario_id.to_string(),
            recommendations: impact.recommendations(perturbation.advice()),
            confidence_score: impact.confidence(),
            baseline,
            scenario: perturbed,
            impact,
        };
        self.registry.mark_completed(scenario_id, outcome.clone())?;
        info!(
            scenario_id,
            throughput_change_percent = outcome.impact.throughput_change_percent,
            cycle_time_change_percent = outcome.impact.cycle_time_change_percent,
            confidence = outcome.confidence_score,
            duration_ms = timer.elapsed().as_millis() as u64,
            "scenario completed"
        );
        Ok(outcome)
    }

    fn run_pair(&mut self, perturbation: &Perturbation, duration_hours: Hours) -> Result<(SimulationMetrics, SimulationMetrics)> {
        let baseline_rng = self.rng.clone();
        let scenario_rng = self.rng.clone();
        // The next scenario starts from a different population.
        self.rng.next_u64();

        let source = &self.source;
        let run = &self.config.run;
        let counters = &self.counters;
        if !self.config.parallel {
            let baseline = run_side(source, run, counters, baseline_rng, &Perturbation::Nothing, duration_hours)?;
            let scenario = run_side(source, run, counters, scenario_rng, perturbation, duration_hours)?;
            return Ok((baseline, scenario));
        }

        thread::scope(|scope| {
            let baseline =
                scope.spawn(move || run_side(source, run, counters, baseline_rng, &Perturbation::Nothing, duration_hours));
            let scenario = scope.spawn(move || run_side(source, run, counters, scenario_rng, perturbation, duration_hours));
            let baseline = baseline.join().map_err(|_| SimError::Fault("baseline run panicked".into()))?;
            let scenario = scenario.join().map_err(|_| SimError::Fault("scenario run panicked".into()))?;
            Ok((baseline?, scenario?))
        })
    }
}

fn run_side<R: RandomSource>(
    source: &PopulationSource,
    run: &RunConfig,
    counters: &RunCounters,
    rng: R,
    perturbation: &Perturbation,
    duration_hours: Hours,
) -> Result<SimulationMetrics> {
    let mut sim = FabSimulator::from_source(source, run.clone(), rng)?.with_counters(counters.clone());
    perturbation.apply(&mut sim, duration_hours)?;
    sim.run(duration_hours)
}
