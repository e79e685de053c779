use serde::{Deserialize, Serialize};

use crate::{EquipmentId, Hours, LotId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Arrival,
    ProcessStart,
    ProcessEnd,
    Breakdown,
    Repair,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::Arrival,
        EventType::ProcessStart,
        EventType::ProcessEnd,
        EventType::Breakdown,
        EventType::Repair,
    ];
}

/// Something that happens to a lot or a tool at a virtual hour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub time: Hours,
    pub event_type: EventType,
    pub equipment_id: Option<EquipmentId>,
    pub lot_id: Option<LotId>,
}

impl Event {
    pub fn arrival(time: Hours, lot_id: impl Into<LotId>) -> Self {
        Self { time, event_type: EventType::Arrival, equipment_id: None, lot_id: Some(lot_id.into()) }
    }

    pub fn process_start(time: Hours, equipment_id: impl Into<EquipmentId>, lot_id: impl Into<LotId>) -> Self {
        Self {
            time,
            event_type: EventType::ProcessStart,
            equipment_id: Some(equipment_id.into()),
            lot_id: Some(lot_id.into()),
        }
    }

    pub fn process_end(time: Hours, equipment_id: impl Into<EquipmentId>, lot_id: impl Into<LotId>) -> Self {
        Self {
            time,
            event_type: EventType::ProcessEnd,
            equipment_id: Some(equipment_id.into()),
            lot_id: Some(lot_id.into()),
        }
    }

    pub fn breakdown(time: Hours, equipment_id: impl Into<EquipmentId>) -> Self {
        Self { time, event_type: EventType::Breakdown, equipment_id: Some(equipment_id.into()), lot_id: None }
    }

    pub fn repair(time: Hours, equipment_id: impl Into<EquipmentId>) -> Self {
        Self { time, event_type: EventType::Repair, equipment_id: Some(equipment_id.into()), lot_id: None }
    }
}
