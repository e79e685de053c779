//! Core types and traits for the virtual fab simulator.

pub type Hours = f64;
pub type EquipmentId = String;
pub type LotId = String;
pub type ScenarioId = String;

#[derive(thiserror::Error, Debug)]
pub enum SimError {
    #[error("unknown scenario type: {0}")]
    UnknownScenarioType(String),
    #[error("scenario type {0} has no perturbation model")]
    UnsupportedScenario(String),
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("invalid population: {0}")]
    InvalidPopulation(String),
    #[error("scenario not found: {0}")]
    ScenarioNotFound(ScenarioId),
    #[error("equipment not found: {0}")]
    EquipmentNotFound(EquipmentId),
    #[error("simulation fault: {0}")]
    Fault(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl SimError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        SimError::InvalidParameter { name, reason: reason.into() }
    }

    /// Rejected request: nothing was run.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            SimError::UnknownScenarioType(_)
                | SimError::UnsupportedScenario(_)
                | SimError::InvalidParameter { .. }
                | SimError::InvalidPopulation(_)
                | SimError::Serde(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SimError::ScenarioNotFound(_) | SimError::EquipmentNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, SimError>;

pub mod event;
pub mod fab;
pub mod metrics;
pub mod population;
pub mod rng;

pub use event::{Event, EventType};
pub use fab::{Equipment, EquipmentStatus, EquipmentType, Lot, RouteStep};
pub use metrics::{QueueDepth, SimulationMetrics, WipSample};
pub use population::{
    EquipmentRecord, LotRecord, Population, PopulationConfig, PopulationSnapshot,
    PopulationSource,
};
pub use rng::{RandomSource, SimRng};
