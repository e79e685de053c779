use serde::{Deserialize, Serialize};

use vf_core::{Hours, Result, SimError};

/// How `equipment_utilization` is derived at the end of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UtilizationModel {
    /// `total_processed / elapsed * 100 * 10`, capped at 100.
    #[default]
    ProcessedCountHeuristic,
    /// Busy hours over elapsed hours.
    BusyTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct DispatchConfig {
    /// Skip MAINTENANCE tools when picking equipment (DOWN is always skipped).
    pub exclude_maintenance: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    pub collect_interval_hours: Hours,
    pub bottleneck_top_n: usize,
    pub utilization: UtilizationModel,
    pub dispatch: DispatchConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            collect_interval_hours: 1.0,
            bottleneck_top_n: 3,
            utilization: UtilizationModel::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.collect_interval_hours.is_finite() || self.collect_interval_hours <= 0.0 {
            return Err(SimError::invalid("collect_interval_hours", "must be positive"));
        }
        Ok(())
    }
}

pub fn validate_horizon(name: &'static str, hours: Hours) -> Result<()> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(SimError::invalid(name, format!("must be positive and finite, got {hours}")));
    }
    Ok(())
}
