//! Initial equipment/lot populations: synthetic generation and snapshot loading.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::fab::{Equipment, EquipmentStatus, EquipmentType, Lot, RouteStep};
use crate::rng::RandomSource;
use crate::{EquipmentId, Hours, LotId, Result, SimError};

/// One row of the synthetic equipment mix.
#[derive(Debug, Clone, Copy)]
pub struct CategorySpec {
    pub prefix: &'static str,
    pub equipment_type: EquipmentType,
    pub nominal_wph: f64,
    pub nominal_mtbf_hours: Hours,
    pub weight: usize,
}

pub const EQUIPMENT_CATEGORIES: [CategorySpec; 5] = [
    CategorySpec {
        prefix: "LITHO",
        equipment_type: EquipmentType::Lithography,
        nominal_wph: 8.0,
        nominal_mtbf_hours: 600.0,
        weight: 6,
    },
    CategorySpec {
        prefix: "ETCH",
        equipment_type: EquipmentType::Etcher,
        nominal_wph: 15.0,
        nominal_mtbf_hours: 400.0,
        weight: 4,
    },
    CategorySpec {
        prefix: "CVD",
        equipment_type: EquipmentType::Cvd,
        nominal_wph: 12.0,
        nominal_mtbf_hours: 500.0,
        weight: 5,
    },
    CategorySpec {
        prefix: "CMP",
        equipment_type: EquipmentType::Cmp,
        nominal_wph: 10.0,
        nominal_mtbf_hours: 450.0,
        weight: 4,
    },
    CategorySpec {
        prefix: "IMPLANT",
        equipment_type: EquipmentType::Implant,
        nominal_wph: 8.0,
        nominal_mtbf_hours: 700.0,
        weight: 3,
    },
];

const WPH_JITTER: f64 = 2.0;
const MTBF_JITTER_HOURS: f64 = 50.0;
const MTTR_BAND_HOURS: (f64, f64) = (2.0, 6.0);
const PROCESS_TIME_BAND_HOURS: (f64, f64) = (0.5, 2.0);
const STEP_COUNT_BAND: (u32, u32) = (20, 40);
const PRIORITY_BAND: (u32, u32) = (1, 10);
const WAFER_COUNTS: [u32; 2] = [25, 50];

const DEFAULT_CAPACITY_WPH: f64 = 10.0;
const DEFAULT_MTBF_HOURS: Hours = 500.0;
const DEFAULT_MTTR_HOURS: Hours = 4.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PopulationConfig {
    pub num_equipments: usize,
    pub num_lots: usize,
    pub initial_arrival_window_hours: Hours,
    pub schedule_initial_failures: bool,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            num_equipments: 20,
            num_lots: 50,
            initial_arrival_window_hours: 24.0,
            schedule_initial_failures: true,
        }
    }
}

impl PopulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_equipments < EQUIPMENT_CATEGORIES.len() {
            return Err(SimError::invalid(
                "num_equipments",
                format!("need at least {} to cover every category", EQUIPMENT_CATEGORIES.len()),
            ));
        }
        if !self.initial_arrival_window_hours.is_finite() || self.initial_arrival_window_hours < 0.0 {
            return Err(SimError::invalid("initial_arrival_window_hours", "must be finite and >= 0"));
        }
        Ok(())
    }
}

/// Persisted equipment row as handed over by the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EquipmentRecord {
    pub equipment_id: EquipmentId,
    pub equipment_type: EquipmentType,
    #[serde(default)]
    pub capacity_wph: Option<f64>,
    #[serde(default)]
    pub mtbf_hours: Option<Hours>,
    #[serde(default)]
    pub mttr_hours: Option<Hours>,
    #[serde(default)]
    pub status: EquipmentStatus,
}

/// Persisted work-in-process row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LotRecord {
    pub lot_id: LotId,
    pub wafer_count: u32,
    #[serde(default = "first_step")]
    pub current_step: u32,
    pub total_steps: u32,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub route: Option<Vec<RouteStep>>,
    #[serde(default)]
    pub arrival_time: Hours,
}

fn first_step() -> u32 {
    1
}

fn default_priority() -> u8 {
    5
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PopulationSnapshot {
    pub equipment: Vec<EquipmentRecord>,
    pub lots: Vec<LotRecord>,
    #[serde(default = "enabled")]
    pub schedule_initial_failures: bool,
}

impl PopulationSnapshot {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    fn validate(&self) -> Result<()> {
        if self.equipment.is_empty() {
            return Err(SimError::InvalidPopulation("no equipment".into()));
        }
        let mut seen = HashSet::new();
        for eq in &self.equipment {
            if !seen.insert(eq.equipment_id.as_str()) {
                return Err(SimError::InvalidPopulation(format!(
                    "duplicate equipment id {}",
                    eq.equipment_id
                )));
            }
            for (name, value) in [
                ("capacity_wph", eq.capacity_wph),
                ("mtbf_hours", eq.mtbf_hours),
                ("mttr_hours", eq.mttr_hours),
            ] {
                if let Some(v) = value {
                    if !v.is_finite() || v <= 0.0 {
                        return Err(SimError::InvalidPopulation(format!(
                            "{}: {name} must be positive",
                            eq.equipment_id
                        )));
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        for lot in &self.lots {
            let bad = |reason: &str| SimError::InvalidPopulation(format!("{}: {reason}", lot.lot_id));
            if !seen.insert(lot.lot_id.as_str()) {
                return Err(bad("duplicate lot id"));
            }
            if lot.wafer_count == 0 {
                return Err(bad("wafer_count must be positive"));
            }
            if lot.total_steps == 0 {
                return Err(bad("total_steps must be positive"));
            }
            // Loaded WIP is unfinished by definition.
            if lot.current_step == 0 || lot.current_step > lot.total_steps {
                return Err(bad("current_step out of range"));
            }
            if !lot.arrival_time.is_finite() || lot.arrival_time < 0.0 {
                return Err(bad("arrival_time must be finite and >= 0"));
            }
            if let Some(route) = &lot.route {
                if route.len() < lot.total_steps as usize {
                    return Err(bad("route shorter than total_steps"));
                }
                if route
                    .iter()
                    .any(|s| !s.process_time_hours.is_finite() || s.process_time_hours <= 0.0)
                {
                    return Err(bad("process times must be positive"));
                }
            }
        }
        Ok(())
    }
}

/// Where each run's initial population comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PopulationSource {
    Synthetic(PopulationConfig),
    Snapshot(PopulationSnapshot),
}

impl Default for PopulationSource {
    fn default() -> Self {
        PopulationSource::Synthetic(PopulationConfig::default())
    }
}

impl PopulationSource {
    pub fn build(&self, rng: &mut impl RandomSource) -> Result<Population> {
        match self {
            PopulationSource::Synthetic(cfg) => Population::synthetic(cfg, rng),
            PopulationSource::Snapshot(snapshot) => Population::from_snapshot(snapshot, rng),
        }
    }
}

/// The equipment and lots a run starts from, in population order.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    pub equipment: Vec<Equipment>,
    pub lots: Vec<Lot>,
    pub schedule_initial_failures: bool,
}

impl Population {
    pub fn synthetic(cfg: &PopulationConfig, rng: &mut impl RandomSource) -> Result<Self> {
        cfg.validate()?;

        let counts = apportion(cfg.num_equipments);
        let mut equipment = Vec::with_capacity(cfg.num_equipments);
        for (spec, count) in EQUIPMENT_CATEGORIES.iter().zip(counts) {
            for n in 1..=count {
                let mut eq = Equipment::new(
                    format!("{}-{n:02}", spec.prefix),
                    spec.equipment_type,
                    spec.nominal_wph + rng.uniform(-WPH_JITTER, WPH_JITTER),
                    spec.nominal_mtbf_hours + rng.uniform(-MTBF_JITTER_HOURS, MTBF_JITTER_HOURS),
                    rng.uniform(MTTR_BAND_HOURS.0, MTTR_BAND_HOURS.1),
                );
                eq.time_to_failure = rng.exponential(spec.nominal_mtbf_hours);
                equipment.push(eq);
            }
        }

        let lots = (0..cfg.num_lots)
            .map(|i| {
                let total_steps = rng.int_inclusive(STEP_COUNT_BAND.0, STEP_COUNT_BAND.1);
                let wafer_count = *rng.pick(&WAFER_COUNTS).unwrap_or(&WAFER_COUNTS[0]);
                let current_step = rng.int_inclusive(1, total_steps / 2);
                let priority = rng.int_inclusive(PRIORITY_BAND.0, PRIORITY_BAND.1) as u8;
                let route = generate_route(rng, total_steps);
                let arrival_time = rng.uniform(0.0, cfg.initial_arrival_window_hours);
                new_lot(format!("LOT-{i:04}"), wafer_count, current_step, total_steps, priority, route, arrival_time)
            })
            .collect();

        Ok(Self { equipment, lots, schedule_initial_failures: cfg.schedule_initial_failures })
    }

    pub fn from_snapshot(snapshot: &PopulationSnapshot, rng: &mut impl RandomSource) -> Result<Self> {
        snapshot.validate()?;

        let equipment = snapshot
            .equipment
            .iter()
            .map(|rec| {
                let mut eq = Equipment::new(
                    rec.equipment_id.clone(),
                    rec.equipment_type,
                    rec.capacity_wph.unwrap_or(DEFAULT_CAPACITY_WPH),
                    rec.mtbf_hours.unwrap_or(DEFAULT_MTBF_HOURS),
                    rec.mttr_hours.unwrap_or(DEFAULT_MTTR_HOURS),
                );
                // A snapshot row carries no in-flight process to resume.
                eq.status = match rec.status {
                    EquipmentStatus::Running => EquipmentStatus::Idle,
                    other => other,
                };
                eq.time_to_failure = rng.exponential(eq.mtbf_hours);
                eq
            })
            .collect();

        let lots = snapshot
            .lots
            .iter()
            .map(|rec| {
                let route = match &rec.route {
                    Some(route) => route.clone(),
                    None => generate_route(rng, rec.total_steps),
                };
                new_lot(
                    rec.lot_id.clone(),
                    rec.wafer_count,
                    rec.current_step,
                    rec.total_steps,
                    rec.priority,
                    route,
                    rec.arrival_time,
                )
            })
            .collect();

        Ok(Self { equipment, lots, schedule_initial_failures: snapshot.schedule_initial_failures })
    }

    pub fn total_wafers(&self) -> u64 {
        self.lots.iter().map(|l| u64::from(l.wafer_count)).sum()
    }

    pub fn contains_equipment(&self, equipment_id: &str) -> bool {
        self.equipment.iter().any(|eq| eq.equipment_id == equipment_id)
    }
}

pub fn new_lot(
    lot_id: LotId,
    wafer_count: u32,
    current_step: u32,
    total_steps: u32,
    priority: u8,
    route: Vec<RouteStep>,
    arrival_time: Hours,
) -> Lot {
    Lot {
        lot_id,
        wafer_count,
        current_step,
        total_steps,
        priority,
        route,
        arrival_time,
        completion_time: None,
        wait_time_hours: 0.0,
        queued_at: None,
    }
}

/// Route of `total_steps` steps over uniformly chosen equipment types.
pub fn generate_route(rng: &mut impl RandomSource, total_steps: u32) -> Vec<RouteStep> {
    (1..=total_steps)
        .map(|step| RouteStep {
            step,
            operation: format!("OP-{step:03}"),
            equipment_type: *rng.pick(&EquipmentType::ALL).unwrap_or(&EquipmentType::Lithography),
            process_time_hours: rng.uniform(PROCESS_TIME_BAND_HOURS.0, PROCESS_TIME_BAND_HOURS.1),
        })
        .collect()
}

/// Split `total` units over the categories by weight (largest remainder),
/// keeping at least one unit per category whenever `total` allows it.
pub fn apportion(total: usize) -> [usize; 5] {
    let weight_sum: usize = EQUIPMENT_CATEGORIES.iter().map(|c| c.weight).sum();
    let mut counts = [0usize; 5];
    let mut remainders = [(0usize, 0usize); 5];
    for (i, spec) in EQUIPMENT_CATEGORIES.iter().enumerate() {
        let share = total * spec.weight;
        counts[i] = share / weight_sum;
        remainders[i] = (share % weight_sum, i);
    }
    let assigned: usize = counts.iter().sum();
    // Stable sort keeps table order among equal remainders.
    remainders.sort_by(|a, b| b.0.cmp(&a.0));
    for &(_, i) in remainders.iter().take(total - assigned) {
        counts[i] += 1;
    }

    if total >= counts.len() {
        while let Some(empty) = counts.iter().position(|&c| c == 0) {
            let Some(largest) = (0..counts.len()).max_by_key(|&i| counts[i]) else {
                break;
            };
            counts[largest] -= 1;
            counts[empty] += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SimRng;

    #[test]
    fn apportion_reproduces_table_counts() {
        assert_eq!(apportion(22), [6, 4, 5, 4, 3]);
    }

    #[test]
    fn apportion_uses_largest_remainder() {
        assert_eq!(apportion(20), [5, 4, 4, 4, 3]);
        assert_eq!(apportion(20).iter().sum::<usize>(), 20);
    }

    #[test]
    fn apportion_covers_every_category() {
        for total in 5..60 {
            let counts = apportion(total);
            assert_eq!(counts.iter().sum::<usize>(), total);
            assert!(counts.iter().all(|&c| c >= 1), "{total}: {counts:?}");
        }
    }

    #[test]
    fn synthetic_population_respects_bands() {
        let cfg = PopulationConfig::default();
        let pop = Population::synthetic(&cfg, &mut SimRng::new(1)).unwrap();
        assert_eq!(pop.equipment.len(), 20);
        assert_eq!(pop.lots.len(), 50);
        for eq in &pop.equipment {
            assert!((2.0..6.0).contains(&eq.mttr_hours));
            assert!(eq.time_to_failure >= 0.0);
            assert_eq!(eq.status, EquipmentStatus::Idle);
        }
        for lot in &pop.lots {
            assert!((20..=40).contains(&lot.total_steps));
            assert!(lot.current_step >= 1 && lot.current_step <= lot.total_steps / 2);
            assert_eq!(lot.route.len(), lot.total_steps as usize);
            assert!(lot.wafer_count == 25 || lot.wafer_count == 50);
            assert!((0.0..24.0).contains(&lot.arrival_time));
            assert!(lot
                .route
                .iter()
                .all(|s| (0.5..2.0).contains(&s.process_time_hours)));
        }
    }

    #[test]
    fn equipment_ids_follow_prefix_numbering() {
        let cfg = PopulationConfig { num_equipments: 22, ..PopulationConfig::default() };
        let pop = Population::synthetic(&cfg, &mut SimRng::new(2)).unwrap();
        assert_eq!(pop.equipment[0].equipment_id, "LITHO-01");
        assert_eq!(pop.equipment[5].equipment_id, "LITHO-06");
        assert_eq!(pop.equipment[6].equipment_id, "ETCH-01");
        assert_eq!(pop.equipment[21].equipment_id, "IMPLANT-03");
    }

    #[test]
    fn same_seed_same_population() {
        let cfg = PopulationConfig::default();
        let a = Population::synthetic(&cfg, &mut SimRng::new(99)).unwrap();
        let b = Population::synthetic(&cfg, &mut SimRng::new(99)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn too_few_equipments_is_rejected() {
        let cfg = PopulationConfig { num_equipments: 3, ..PopulationConfig::default() };
        let err = Population::synthetic(&cfg, &mut SimRng::new(1)).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn snapshot_fills_defaults() {
        let raw = r#"{
            "equipment": [
                {"equipment_id": "ETCH-A", "equipment_type": "ETCHER", "status": "RUNNING"},
                {"equipment_id": "CVD-A", "equipment_type": "CVD", "mttr_hours": 2.5, "status": "DOWN"}
            ],
            "lots": [
                {"lot_id": "L1", "wafer_count": 25, "total_steps": 4, "current_step": 2}
            ]
        }"#;
        let snapshot = PopulationSnapshot::from_json(raw).unwrap();
        let pop = Population::from_snapshot(&snapshot, &mut SimRng::new(4)).unwrap();
        assert_eq!(pop.equipment[0].status, EquipmentStatus::Idle);
        assert_eq!(pop.equipment[0].mtbf_hours, 500.0);
        assert_eq!(pop.equipment[0].capacity_wph, 10.0);
        assert_eq!(pop.equipment[1].mttr_hours, 2.5);
        assert_eq!(pop.equipment[1].status, EquipmentStatus::Down);
        assert_eq!(pop.lots[0].route.len(), 4);
        assert_eq!(pop.lots[0].priority, 5);
        assert_eq!(pop.lots[0].arrival_time, 0.0);
        assert!(pop.schedule_initial_failures);
    }

    #[test]
    fn snapshot_rejects_finished_wip() {
        let snapshot = PopulationSnapshot {
            equipment: vec![EquipmentRecord {
                equipment_id: "CMP-A".into(),
                equipment_type: EquipmentType::Cmp,
                capacity_wph: None,
                mtbf_hours: None,
                mttr_hours: None,
                status: EquipmentStatus::Idle,
            }],
            lots: vec![LotRecord {
                lot_id: "L1".into(),
                wafer_count: 25,
                current_step: 5,
                total_steps: 4,
                priority: 5,
                route: None,
                arrival_time: 0.0,
            }],
            schedule_initial_failures: false,
        };
        let err = Population::from_snapshot(&snapshot, &mut SimRng::new(1)).unwrap_err();
        assert!(matches!(err, SimError::InvalidPopulation(_)));
    }

    #[test]
    fn snapshot_rejects_duplicate_equipment() {
        let rec = EquipmentRecord {
            equipment_id: "CMP-A".into(),
            equipment_type: EquipmentType::Cmp,
            capacity_wph: None,
            mtbf_hours: None,
            mttr_hours: None,
            status: EquipmentStatus::Idle,
        };
        let snapshot = PopulationSnapshot {
            equipment: vec![rec.clone(), rec],
            lots: Vec::new(),
            schedule_initial_failures: true,
        };
        assert!(Population::from_snapshot(&snapshot, &mut SimRng::new(1)).is_err());
    }
}
