use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{EquipmentId, Hours};

/// Periodic snapshot taken while a run is in progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WipSample {
    pub time: Hours,
    pub wip_count: usize,
    pub avg_queue_length: f64,
    pub completed_lots: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueDepth {
    pub equipment_id: EquipmentId,
    pub queue_length: usize,
}

/// Aggregate outcome of one simulation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SimulationMetrics {
    pub total_lots_completed: usize,
    pub total_wafers_completed: u64,
    pub avg_cycle_time_hours: f64,
    pub avg_wait_time_hours: f64,
    pub throughput_lots_per_day: f64,
    pub throughput_wafers_per_day: f64,
    /// 0-100 per equipment id.
    pub equipment_utilization: BTreeMap<EquipmentId, f64>,
    pub bottleneck_equipment: Vec<QueueDepth>,
    pub wip_levels: Vec<WipSample>,
    pub elapsed_hours: Hours,
}
