use std::collections::HashMap;

use proptest::prelude::*;

use vf_core::{Hours, PopulationConfig, PopulationSource, SimRng};
use vf_runtime::{simulate, FabSimulator, RunConfig, UtilizationModel};

fn synthetic(num_equipments: usize, num_lots: usize) -> PopulationSource {
    PopulationSource::Synthetic(PopulationConfig { num_equipments, num_lots, ..PopulationConfig::default() })
}

#[test]
fn default_fab_week() {
    let mut rng = SimRng::new(42);
    let population = synthetic(20, 50).build(&mut rng).unwrap();
    let mut sim = FabSimulator::new(population.clone(), RunConfig::default(), rng).unwrap();
    assert_eq!(sim.state().equipment().len(), 20);
    assert_eq!(sim.initial_lot_count(), 50);

    let m = sim.run(168.0).unwrap();
    assert!(m.elapsed_hours <= 168.0);
    assert_eq!(m.total_lots_completed + sim.state().wip_count(), 50);
    assert_eq!(m.equipment_utilization.len(), 20);
    assert_eq!(m.bottleneck_equipment.len(), 3);
    assert!(m.avg_cycle_time_hours >= 0.0);
    assert!(m.avg_wait_time_hours >= 0.0);
    assert!(m.wip_levels.windows(2).all(|w| w[0].time < w[1].time));
    assert!(m.wip_levels.iter().all(|s| s.wip_count + s.completed_lots == 50));
    assert!(m.total_wafers_completed <= population.total_wafers());
    for b in &m.bottleneck_equipment {
        assert!(population.contains_equipment(&b.equipment_id), "unknown tool {}", b.equipment_id);
    }
}

/// Step reached and completion time of every lot, finished or not.
fn progress(sim: &FabSimulator<SimRng>) -> HashMap<String, (u32, Option<Hours>)> {
    let state = sim.state();
    state
        .active_lots()
        .values()
        .chain(state.completed())
        .map(|lot| (lot.lot_id.clone(), (lot.current_step, lot.completion_time)))
        .collect()
}

#[test]
fn progress_never_goes_backwards() {
    let mut sim = FabSimulator::from_source(&synthetic(20, 50), RunConfig::default(), SimRng::new(8)).unwrap();
    let mut before = progress(&sim);
    for day in 1..=7 {
        sim.run(f64::from(day) * 24.0).unwrap();
        let after = progress(&sim);
        assert_eq!(after.len(), before.len());
        for (lot_id, (step, done_at)) in &before {
            let (next_step, next_done_at) = after[lot_id];
            assert!(next_step >= *step, "{lot_id} went from step {step} to {next_step}");
            if done_at.is_some() {
                assert_eq!(next_done_at, *done_at, "{lot_id} completion moved");
            }
        }
        before = after;
    }
}

#[test]
fn simulate_matches_a_manual_run() {
    let cfg = RunConfig::default();
    let direct = simulate(&synthetic(10, 20), cfg.clone(), SimRng::new(5), 72.0).unwrap();
    let mut sim = FabSimulator::from_source(&synthetic(10, 20), cfg, SimRng::new(5)).unwrap();
    assert_eq!(direct, sim.run(72.0).unwrap());
}

#[test]
fn too_few_tools_is_rejected() {
    let err = FabSimulator::from_source(&synthetic(3, 10), RunConfig::default(), SimRng::new(1))
        .err()
        .unwrap();
    assert!(err.is_config());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn lots_are_conserved(seed in any::<u64>(), tools in 5usize..25, lots in 1usize..40, hours in 1.0f64..200.0) {
        let mut sim = FabSimulator::from_source(&synthetic(tools, lots), RunConfig::default(), SimRng::new(seed)).unwrap();
        let m = sim.run(hours).unwrap();
        prop_assert_eq!(m.total_lots_completed + sim.state().wip_count(), lots);
        prop_assert!(sim.clock() < hours);
        for sample in &m.wip_levels {
            prop_assert_eq!(sample.wip_count + sample.completed_lots, lots);
        }
    }

    #[test]
    fn completed_lots_are_consistent(seed in any::<u64>(), lots in 1usize..40) {
        let mut sim = FabSimulator::from_source(&synthetic(20, lots), RunConfig::default(), SimRng::new(seed)).unwrap();
        sim.run(240.0).unwrap();
        for lot in sim.state().completed() {
            prop_assert!(lot.is_complete());
            prop_assert!(lot.cycle_time().unwrap() >= 0.0);
            prop_assert!(lot.wait_time_hours >= 0.0);
        }
        for lot in sim.state().active_lots().values() {
            prop_assert!(lot.current_step <= lot.total_steps);
        }
    }

    #[test]
    fn utilization_stays_in_range(seed in any::<u64>(), busy_time in any::<bool>()) {
        let utilization = if busy_time { UtilizationModel::BusyTime } else { UtilizationModel::ProcessedCountHeuristic };
        let cfg = RunConfig { utilization, ..RunConfig::default() };
        let m = simulate(&synthetic(20, 30), cfg, SimRng::new(seed), 120.0).unwrap();
        for value in m.equipment_utilization.values() {
            prop_assert!((0.0..=100.0).contains(value));
        }
    }

    #[test]
    fn same_seed_same_metrics(seed in any::<u64>()) {
        let a = simulate(&synthetic(15, 25), RunConfig::default(), SimRng::new(seed), 96.0).unwrap();
        let b = simulate(&synthetic(15, 25), RunConfig::default(), SimRng::new(seed), 96.0).unwrap();
        prop_assert_eq!(a, b);
    }
}
