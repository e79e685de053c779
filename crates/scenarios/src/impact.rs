use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use vf_core::{EquipmentId, ScenarioId, SimulationMetrics};
use vf_views::percent_change;

/// Percent change beyond which throughput or cycle time gets its own line.
const NOTABLE_CHANGE_PERCENT: f64 = 10.0;
const CONFIDENCE_BASE: f64 = 70.0;
const CONFIDENCE_BONUS_CAP: f64 = 25.0;
const CONFIDENCE_CAP: f64 = 95.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImpactAnalysis {
    pub throughput_change_percent: f64,
    pub cycle_time_change_percent: f64,
    pub lots_completed_change: i64,
    pub wafers_completed_change: i64,
    /// Scenario minus baseline utilization, for every baseline tool.
    pub utilization_impact: BTreeMap<EquipmentId, f64>,
}

impl ImpactAnalysis {
    pub fn between(baseline: &SimulationMetrics, scenario: &SimulationMetrics) -> Self {
        let utilization_impact = baseline
            .equipment_utilization
            .iter()
            .map(|(id, base)| {
                let after = scenario.equipment_utilization.get(id).copied().unwrap_or(0.0);
                (id.clone(), after - base)
            })
            .collect();

        Self {
            throughput_change_percent: percent_change(
                baseline.throughput_lots_per_day,
                scenario.throughput_lots_per_day,
            ),
            cycle_time_change_percent: percent_change(
                baseline.avg_cycle_time_hours,
                scenario.avg_cycle_time_hours,
            ),
            lots_completed_change: scenario.total_lots_completed as i64 - baseline.total_lots_completed as i64,
            wafers_completed_change: scenario.total_wafers_completed as i64
                - baseline.total_wafers_completed as i64,
            utilization_impact,
        }
    }

    /// Grows with the size of the observed deltas; a heuristic, not a statistical interval.
    pub fn confidence(&self) -> f64 {
        let magnitude = (self.throughput_change_percent.abs() + self.cycle_time_change_percent.abs()) / 2.0;
        (CONFIDENCE_BASE + magnitude.min(CONFIDENCE_BONUS_CAP)).min(CONFIDENCE_CAP)
    }

    /// Delta-driven lines followed by `specific` lines; a single "limited impact"
    /// line when neither produced anything.
    pub fn recommendations(&self, specific: Vec<String>) -> Vec<String> {
        let mut lines = Vec::new();
        if self.throughput_change_percent < -NOTABLE_CHANGE_PERCENT {
            lines.push(format!(
                "Throughput expected to drop {:.1}%; consider alternate equipment",
                self.throughput_change_percent.abs()
            ));
        }
        if self.cycle_time_change_percent > NOTABLE_CHANGE_PERCENT {
            lines.push(format!(
                "Cycle time expected to grow {:.1}%; consider re-prioritising lots",
                self.cycle_time_change_percent
            ));
        }
        lines.extend(specific);
        if lines.is_empty() {
            lines.push("Limited impact expected from this scenario".to_string());
        }
        lines
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioOutcome {
    pub scenario_id: ScenarioId,
    pub baseline: SimulationMetrics,
    pub scenario: SimulationMetrics,
    pub impact: ImpactAnalysis,
    pub recommendations: Vec<String>,
    pub confidence_score: f64,
}
