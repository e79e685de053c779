//! Drives the scheduler loop up to a horizon and aggregates run metrics.

use tracing::{debug, error, info};

use vf_core::{
    Equipment, EquipmentStatus, Event, Hours, Lot, Population, PopulationSource, QueueDepth,
    RandomSource, Result, SimError, SimulationMetrics, WipSample,
};
use vf_views::{mean, top_k_by, TopKConfig};

use crate::config::{validate_horizon, RunConfig, UtilizationModel};
use crate::fab::FabState;
use crate::metrics::{RunCounters, RunTimer};
use crate::scheduler::EventScheduler;

/// Scale applied to the processed-count utilization proxy.
const UTILIZATION_SCALE: f64 = 10.0;
const HOURS_PER_DAY: f64 = 24.0;

/// One isolated simulation run: its own population, queue and random source.
pub struct FabSimulator<R: RandomSource> {
    state: FabState,
    scheduler: EventScheduler,
    rng: R,
    config: RunConfig,
    counters: RunCounters,
    clock: Hours,
    next_collect: Hours,
    history: Vec<WipSample>,
    initial_lots: usize,
}

impl<R: RandomSource> FabSimulator<R> {
    /// Seeds the queue with one ARRIVAL per lot and, for every tool, either
    /// its first BREAKDOWN or (when it starts out of service) its REPAIR.
    pub fn new(population: Population, config: RunConfig, mut rng: R) -> Result<Self> {
        config.validate()?;
        let Population { equipment, lots, schedule_initial_failures } = population;

        let mut scheduler = EventScheduler::new();
        for lot in lots.iter().filter(|l| !l.is_complete()) {
            scheduler.push(Event::arrival(lot.arrival_time, lot.lot_id.clone()));
        }

        let mut equipment = equipment;
        for eq in equipment.iter_mut() {
            match eq.status {
                EquipmentStatus::Down | EquipmentStatus::Maintenance => {
                    let back_at = rng.exponential(eq.mttr_hours);
                    eq.repair_due = Some(back_at);
                    scheduler.push(Event::repair(back_at, eq.equipment_id.clone()));
                }
                _ if schedule_initial_failures => {
                    eq.next_breakdown_at = Some(eq.time_to_failure);
                    scheduler.push(Event::breakdown(eq.time_to_failure, eq.equipment_id.clone()));
                }
                _ => {}
            }
        }

        let initial_lots = lots.len();
        let counters = RunCounters::default();
        let mut state = FabState::new(equipment, lots, config.dispatch);
        state.set_counters(counters.clone());
        Ok(Self {
            state,
            scheduler,
            rng,
            next_collect: config.collect_interval_hours,
            config,
            counters,
            clock: 0.0,
            history: Vec::new(),
            initial_lots,
        })
    }

    /// Builds the population from `source` with the run's own random source.
    pub fn from_source(source: &PopulationSource, config: RunConfig, mut rng: R) -> Result<Self> {
        let population = source.build(&mut rng)?;
        Self::new(population, config, rng)
    }

    pub fn with_counters(mut self, counters: RunCounters) -> Self {
        self.state.set_counters(counters.clone());
        self.counters = counters;
        self
    }

    pub fn schedule(&mut self, event: Event) {
        self.scheduler.push(event);
    }

    /// Adds a lot before or during the run; it arrives at its `arrival_time`.
    pub fn inject_lot(&mut self, lot: Lot) -> Result<()> {
        if self.state.contains_lot(&lot.lot_id) {
            return Err(SimError::InvalidPopulation(format!("duplicate lot id {}", lot.lot_id)));
        }
        self.scheduler.push(Event::arrival(lot.arrival_time, lot.lot_id.clone()));
        self.state.insert_lot(lot);
        self.initial_lots += 1;
        Ok(())
    }

    /// Takes a tool out of service now and breaks it down at `at`.
    ///
    /// Any repair already pending for the tool is dropped; the forced
    /// breakdown schedules the one that counts.
    pub fn force_failure(&mut self, equipment_id: &str, at: Hours) -> Result<()> {
        let eq = self
            .state
            .equipment_mut(equipment_id)
            .ok_or_else(|| SimError::EquipmentNotFound(equipment_id.to_string()))?;
        eq.status = EquipmentStatus::Down;
        eq.next_breakdown_at = Some(at);
        eq.repair_due = None;
        self.scheduler.push(Event::breakdown(at, equipment_id));
        Ok(())
    }

    /// Puts a tool into maintenance until `until`, when a REPAIR returns it to service.
    pub fn force_maintenance(&mut self, equipment_id: &str, until: Hours) -> Result<()> {
        let eq = self
            .state
            .equipment_mut(equipment_id)
            .ok_or_else(|| SimError::EquipmentNotFound(equipment_id.to_string()))?;
        eq.status = EquipmentStatus::Maintenance;
        eq.repair_due = Some(until);
        self.scheduler.push(Event::repair(until, equipment_id));
        Ok(())
    }

    /// Processes every event strictly before `duration_hours`.
    ///
    /// The clock only moves to events that are processed, so a later call
    /// with a longer horizon continues the same run.
    pub fn run(&mut self, duration_hours: Hours) -> Result<SimulationMetrics> {
        validate_horizon("duration_hours", duration_hours)?;
        let timer = RunTimer::start();
        info!(
            duration_hours,
            equipment = self.state.equipment().len(),
            lots = self.state.wip_count(),
            pending_events = self.scheduler.len(),
            "simulation run starting"
        );

        let interval = self.config.collect_interval_hours;
        while let Some(event) = self.scheduler.pop_before(duration_hours) {
            self.clock = event.time;
            self.counters.inc_event(event.event_type);
            if let Err(err) = self.state.apply(&event, &mut self.scheduler, &mut self.rng) {
                error!(error = %err, time = event.time, event_type = ?event.event_type, "run aborted");
                return Err(err);
            }

            if self.clock >= self.next_collect {
                self.sample();
                self.next_collect = ((self.clock / interval).floor() + 1.0) * interval;
            }
        }

        let metrics = self.metrics();
        let snapshot = self.counters.snapshot();
        debug!(counters = %snapshot.to_json_line("run", Some(timer.elapsed())), "run counters");
        info!(
            clock = self.clock,
            idle = self.scheduler.is_empty(),
            lots_completed = metrics.total_lots_completed,
            avg_cycle_time_hours = metrics.avg_cycle_time_hours,
            duration_ms = timer.elapsed().as_millis() as u64,
            "simulation run finished"
        );
        Ok(metrics)
    }

    fn sample(&mut self) {
        self.history.push(WipSample {
            time: self.clock,
            wip_count: self.state.wip_count(),
            avg_queue_length: self.state.avg_queue_length(),
            completed_lots: self.state.completed().len(),
        });
    }

    /// Aggregates the run so far.
    pub fn metrics(&self) -> SimulationMetrics {
        let completed = self.state.completed();
        let elapsed = self.clock;

        let total_lots_completed = completed.len();
        let total_wafers_completed = completed.iter().map(|l| u64::from(l.wafer_count)).sum::<u64>();
        let (throughput_lots_per_day, throughput_wafers_per_day) = if elapsed > 0.0 {
            let days = elapsed / HOURS_PER_DAY;
            (total_lots_completed as f64 / days, total_wafers_completed as f64 / days)
        } else {
            (0.0, 0.0)
        };

        let equipment_utilization = self
            .state
            .equipment()
            .iter()
            .map(|eq| (eq.equipment_id.clone(), self.utilization(eq)))
            .collect();

        let bottleneck_equipment = top_k_by(
            self.state.equipment().iter(),
            TopKConfig { k: self.config.bottleneck_top_n },
            |eq| eq.queue_len(),
        )
        .into_iter()
        .map(|eq| QueueDepth { equipment_id: eq.equipment_id.clone(), queue_length: eq.queue_len() })
        .collect();

        SimulationMetrics {
            total_lots_completed,
            total_wafers_completed,
            avg_cycle_time_hours: mean(completed.iter().filter_map(Lot::cycle_time)),
            avg_wait_time_hours: mean(completed.iter().map(|l| l.wait_time_hours)),
            throughput_lots_per_day,
            throughput_wafers_per_day,
            equipment_utilization,
            bottleneck_equipment,
            wip_levels: self.history.clone(),
            elapsed_hours: elapsed,
        }
    }

    fn utilization(&self, eq: &Equipment) -> f64 {
        let elapsed = self.clock;
        match self.config.utilization {
            UtilizationModel::ProcessedCountHeuristic => {
                let rate = eq.total_processed as f64 / elapsed.max(1.0) * 100.0;
                (rate * UTILIZATION_SCALE).min(100.0)
            }
            UtilizationModel::BusyTime => {
                if elapsed <= 0.0 {
                    return 0.0;
                }
                let in_progress = eq.busy_since.map_or(0.0, |since| elapsed - since);
                ((eq.busy_hours + in_progress) / elapsed * 100.0).clamp(0.0, 100.0)
            }
        }
    }

    pub fn clock(&self) -> Hours {
        self.clock
    }

    pub fn state(&self) -> &FabState {
        &self.state
    }

    pub fn pending_events(&self) -> usize {
        self.scheduler.len()
    }

    pub fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }

    /// Lots the run started with plus any injected since.
    pub fn initial_lot_count(&self) -> usize {
        self.initial_lots
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}
