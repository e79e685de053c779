use std::collections::BTreeMap;

use tracing::debug;

use vf_core::{Result, ScenarioId, SimError};

use crate::impact::ScenarioOutcome;
use crate::{Scenario, ScenarioParameters, ScenarioStatus, ScenarioType};

/// In-memory scenario store, ordered by id.
#[derive(Debug, Default)]
pub struct ScenarioRegistry {
    scenarios: BTreeMap<ScenarioId, Scenario>,
    next_id: u64,
    clock: u64,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a DRAFT scenario and returns its id (`SCN-0001`, `SCN-0002`, ...).
    pub fn create(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
        scenario_type: ScenarioType,
        parameters: ScenarioParameters,
    ) -> Result<ScenarioId> {
        parameters.validate()?;
        self.next_id += 1;
        let scenario_id = format!("SCN-{:04}", self.next_id);
        let created_seq = self.tick();
        let scenario = Scenario {
            scenario_id: scenario_id.clone(),
            name: name.into(),
            description,
            scenario_type,
            parameters,
            status: ScenarioStatus::Draft,
            outcome: None,
            created_seq,
            executed_seq: None,
            completed_seq: None,
        };
        debug!(scenario_id = %scenario_id, %scenario_type, "scenario created");
        self.scenarios.insert(scenario_id.clone(), scenario);
        Ok(scenario_id)
    }

    pub fn get(&self, scenario_id: &str) -> Result<&Scenario> {
        self.scenarios
            .get(scenario_id)
            .ok_or_else(|| SimError::ScenarioNotFound(scenario_id.to_string()))
    }

    /// Scenarios matching both filters; `None` matches anything.
    pub fn list(&self, status: Option<ScenarioStatus>, scenario_type: Option<ScenarioType>) -> Vec<&Scenario> {
        self.scenarios
            .values()
            .filter(|s| status.map_or(true, |st| s.status == st))
            .filter(|s| scenario_type.map_or(true, |t| s.scenario_type == t))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub(crate) fn mark_running(&mut self, scenario_id: &str) -> Result<()> {
        let seq = self.tick();
        let s = self.get_mut(scenario_id)?;
        s.status = ScenarioStatus::Running;
        s.executed_seq = Some(seq);
        s.completed_seq = None;
        s.outcome = None;
        Ok(())
    }

    pub(crate) fn mark_completed(&mut self, scenario_id: &str, outcome: ScenarioOutcome) -> Result<()> {
        let seq = self.tick();
        let s = self.get_mut(scenario_id)?;
        s.status = ScenarioStatus::Completed;
        s.completed_seq = Some(seq);
        s.outcome = Some(outcome);
        Ok(())
    }

    pub(crate) fn mark_failed(&mut self, scenario_id: &str) -> Result<()> {
        let s = self.get_mut(scenario_id)?;
        s.status = ScenarioStatus::Failed;
        Ok(())
    }

    fn get_mut(&mut self, scenario_id: &str) -> Result<&mut Scenario> {
        self.scenarios
            .get_mut(scenario_id)
            .ok_or_else(|| SimError::ScenarioNotFound(scenario_id.to_string()))
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}
