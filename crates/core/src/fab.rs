use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{EquipmentId, Hours, LotId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentType {
    Lithography,
    Etcher,
    Cvd,
    Cmp,
    Implant,
}

impl EquipmentType {
    pub const ALL: [EquipmentType; 5] = [
        EquipmentType::Lithography,
        EquipmentType::Etcher,
        EquipmentType::Cvd,
        EquipmentType::Cmp,
        EquipmentType::Implant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentType::Lithography => "LITHOGRAPHY",
            EquipmentType::Etcher => "ETCHER",
            EquipmentType::Cvd => "CVD",
            EquipmentType::Cmp => "CMP",
            EquipmentType::Implant => "IMPLANT",
        }
    }
}

impl fmt::Display for EquipmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentStatus {
    #[default]
    Idle,
    Running,
    Down,
    Maintenance,
}

impl EquipmentStatus {
    /// DOWN and MAINTENANCE equipment cannot start or pull work.
    pub fn is_available(&self) -> bool {
        matches!(self, EquipmentStatus::Idle | EquipmentStatus::Running)
    }
}

/// One step of a lot's process recipe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteStep {
    pub step: u32,
    pub operation: String,
    pub equipment_type: EquipmentType,
    pub process_time_hours: Hours,
}

/// A tool on the fab floor together with its run state.
///
/// Created once per run and mutated only by the event handlers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Equipment {
    pub equipment_id: EquipmentId,
    pub equipment_type: EquipmentType,
    pub capacity_wph: f64,
    pub mtbf_hours: Hours,
    pub mttr_hours: Hours,
    pub status: EquipmentStatus,
    pub current_lot: Option<LotId>,
    pub queue: VecDeque<LotId>,
    /// Remaining hours until the next breakdown, as last sampled.
    pub time_to_failure: Hours,
    pub total_processed: u64,
    pub busy_hours: Hours,
    pub busy_since: Option<Hours>,
    /// Time of the only breakdown event of this tool's failure chain that is honoured.
    pub next_breakdown_at: Option<Hours>,
    /// Time of the only pending repair that may return this tool to service.
    pub repair_due: Option<Hours>,
}

impl Equipment {
    pub fn new(
        equipment_id: impl Into<EquipmentId>,
        equipment_type: EquipmentType,
        capacity_wph: f64,
        mtbf_hours: Hours,
        mttr_hours: Hours,
    ) -> Self {
        Self {
            equipment_id: equipment_id.into(),
            equipment_type,
            capacity_wph,
            mtbf_hours,
            mttr_hours,
            status: EquipmentStatus::Idle,
            current_lot: None,
            queue: VecDeque::new(),
            time_to_failure: 0.0,
            total_processed: 0,
            busy_hours: 0.0,
            busy_since: None,
            next_breakdown_at: None,
            repair_due: None,
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

/// A batch of wafers moving through its route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lot {
    pub lot_id: LotId,
    pub wafer_count: u32,
    /// 1-based index into `route`; `total_steps + 1` once finished.
    pub current_step: u32,
    pub total_steps: u32,
    /// Stored for reporting; dispatch and queues are FIFO.
    pub priority: u8,
    pub route: Vec<RouteStep>,
    pub arrival_time: Hours,
    pub completion_time: Option<Hours>,
    pub wait_time_hours: Hours,
    pub queued_at: Option<Hours>,
}

impl Lot {
    pub fn is_complete(&self) -> bool {
        self.current_step > self.total_steps
    }

    pub fn current_route_step(&self) -> Option<&RouteStep> {
        if self.is_complete() || self.current_step == 0 {
            return None;
        }
        self.route.get(self.current_step as usize - 1)
    }

    pub fn cycle_time(&self) -> Option<Hours> {
        self.completion_time.map(|done| done - self.arrival_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(current_step: u32, total_steps: u32) -> Lot {
        let route = (1..=total_steps)
            .map(|step| RouteStep {
                step,
                operation: format!("OP-{step:03}"),
                equipment_type: EquipmentType::Cvd,
                process_time_hours: 1.0,
            })
            .collect();
        Lot {
            lot_id: "LOT-0001".into(),
            wafer_count: 25,
            current_step,
            total_steps,
            priority: 5,
            route,
            arrival_time: 2.0,
            completion_time: None,
            wait_time_hours: 0.0,
            queued_at: None,
        }
    }

    #[test]
    fn route_step_is_one_based() {
        let l = lot(3, 5);
        assert_eq!(l.current_route_step().map(|s| s.step), Some(3));
    }

    #[test]
    fn finished_lot_has_no_route_step() {
        let l = lot(6, 5);
        assert!(l.is_complete());
        assert!(l.current_route_step().is_none());
    }

    #[test]
    fn cycle_time_spans_arrival_to_completion() {
        let mut l = lot(6, 5);
        l.completion_time = Some(10.5);
        assert_eq!(l.cycle_time(), Some(8.5));
    }

    #[test]
    fn type_names_match_wire_format() {
        let json = serde_json::to_string(&EquipmentType::Lithography).unwrap();
        assert_eq!(json, "\"LITHOGRAPHY\"");
        assert_eq!(EquipmentType::Cmp.to_string(), "CMP");
    }

    #[test]
    fn only_idle_and_running_are_available() {
        assert!(EquipmentStatus::Idle.is_available());
        assert!(EquipmentStatus::Running.is_available());
        assert!(!EquipmentStatus::Down.is_available());
        assert!(!EquipmentStatus::Maintenance.is_available());
    }
}
