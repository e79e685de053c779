//! Discrete-event runtime for the virtual fab.

use tracing::{info, Level};

use vf_core::{Hours, PopulationSource, RandomSource, Result, SimulationMetrics};

pub mod config;
pub mod fab;
pub mod metrics;
pub mod runner;
pub mod scheduler;

pub use config::{DispatchConfig, RunConfig, UtilizationModel};
pub use fab::FabState;
pub use metrics::{CountersSnapshot, RunCounters, RunTimer};
pub use runner::FabSimulator;
pub use scheduler::EventScheduler;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_max_level(Level::INFO)
        .try_init();
}

/// Build a population from `source`, run it for `duration_hours` and return its metrics.
pub fn simulate<R: RandomSource>(
    source: &PopulationSource,
    config: RunConfig,
    rng: R,
    duration_hours: Hours,
) -> Result<SimulationMetrics> {
    let mut sim = FabSimulator::from_source(source, config, rng)?;
    info!(lots = sim.initial_lot_count(), duration_hours, "simulating fab");
    sim.run(duration_hours)
}
