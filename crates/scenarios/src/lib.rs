//! What-if scenarios: a perturbed run diffed against an unperturbed baseline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use vf_core::{EquipmentId, Hours, Result, ScenarioId, SimError};

pub mod engine;
pub mod impact;
pub mod registry;

pub use engine::{ScenarioEngine, ScenarioEngineConfig};
pub use impact::{ImpactAnalysis, ScenarioOutcome};
pub use registry::ScenarioRegistry;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioType {
    EquipmentFailure,
    DemandSpike,
    Maintenance,
    /// Accepted as a record type; running it is rejected.
    NewProcess,
}

impl ScenarioType {
    pub const ALL: [ScenarioType; 4] = [
        ScenarioType::EquipmentFailure,
        ScenarioType::DemandSpike,
        ScenarioType::Maintenance,
        ScenarioType::NewProcess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioType::EquipmentFailure => "EQUIPMENT_FAILURE",
            ScenarioType::DemandSpike => "DEMAND_SPIKE",
            ScenarioType::Maintenance => "MAINTENANCE",
            ScenarioType::NewProcess => "NEW_PROCESS",
        }
    }
}

impl fmt::Display for ScenarioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        ScenarioType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SimError::UnknownScenarioType(s.to_string()))
    }
}

/// Largest demand spike one scenario may inject.
pub const MAX_ADDITIONAL_LOTS: usize = 10_000;

/// Knobs of a scenario; which ones matter depends on the scenario type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioParameters {
    pub equipment_id: Option<EquipmentId>,
    pub failure_time: Option<Hours>,
    pub additional_lots: Option<usize>,
    /// Maintenance window length.
    pub duration_hours: Option<Hours>,
}

impl ScenarioParameters {
    pub fn from_json(raw: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(raw)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.failure_time {
            if !t.is_finite() || t < 0.0 {
                return Err(SimError::invalid("failure_time", format!("must be finite and >= 0, got {t}")));
            }
        }
        if let Some(n) = self.additional_lots {
            if n > MAX_ADDITIONAL_LOTS {
                return Err(SimError::invalid("additional_lots", format!("at most {MAX_ADDITIONAL_LOTS}, got {n}")));
            }
        }
        if let Some(d) = self.duration_hours {
            if !d.is_finite() || d <= 0.0 {
                return Err(SimError::invalid("duration_hours", format!("must be positive and finite, got {d}")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioStatus {
    #[default]
    Draft,
    Running,
    Completed,
    Failed,
}

/// A stored scenario and, once completed, its outcome.
///
/// The `*_seq` fields are ticks of the registry's logical clock, not wall time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub scenario_id: ScenarioId,
    pub name: String,
    pub description: Option<String>,
    pub scenario_type: ScenarioType,
    pub parameters: ScenarioParameters,
    pub status: ScenarioStatus,
    pub outcome: Option<ScenarioOutcome>,
    pub created_seq: u64,
    pub executed_seq: Option<u64>,
    pub completed_seq: Option<u64>,
}
