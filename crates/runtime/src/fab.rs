//! Equipment and lot state transitions driven by popped events.
//!
//! Equipment lives in an arena (`Vec` in population order, indexed by id) so
//! the dispatch policy's "first encountered" tie-break is the population
//! order. Active lots live in a map; finished lots move to `completed` and
//! are never touched again.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace};

use vf_core::{
    Equipment, EquipmentId, EquipmentStatus, EquipmentType, Event, EventType, Hours, Lot, LotId,
    RandomSource, Result, SimError,
};

use crate::config::DispatchConfig;
use crate::metrics::RunCounters;
use crate::scheduler::EventScheduler;

pub struct FabState {
    equipment: Vec<Equipment>,
    index: HashMap<EquipmentId, usize>,
    lots: HashMap<LotId, Lot>,
    completed: Vec<Lot>,
    /// Lots whose next step had no eligible equipment when they arrived.
    on_hold: VecDeque<LotId>,
    dispatch: DispatchConfig,
    counters: RunCounters,
}

impl FabState {
    pub fn new(equipment: Vec<Equipment>, lots: Vec<Lot>, dispatch: DispatchConfig) -> Self {
        let index = equipment
            .iter()
            .enumerate()
            .map(|(i, eq)| (eq.equipment_id.clone(), i))
            .collect();
        let lots = lots.into_iter().map(|lot| (lot.lot_id.clone(), lot)).collect();
        Self {
            equipment,
            index,
            lots,
            completed: Vec::new(),
            on_hold: VecDeque::new(),
            dispatch,
            counters: RunCounters::default(),
        }
    }

    pub(crate) fn set_counters(&mut self, counters: RunCounters) {
        self.counters = counters;
    }

    pub fn equipment(&self) -> &[Equipment] {
        &self.equipment
    }

    pub fn equipment_by_id(&self, equipment_id: &str) -> Option<&Equipment> {
        self.index.get(equipment_id).map(|&i| &self.equipment[i])
    }

    pub(crate) fn equipment_mut(&mut self, equipment_id: &str) -> Option<&mut Equipment> {
        self.index.get(equipment_id).map(|&i| &mut self.equipment[i])
    }

    /// Lots still in flight, including ones that have not arrived yet.
    pub fn active_lots(&self) -> &HashMap<LotId, Lot> {
        &self.lots
    }

    pub fn completed(&self) -> &[Lot] {
        &self.completed
    }

    pub fn on_hold(&self) -> &VecDeque<LotId> {
        &self.on_hold
    }

    pub fn wip_count(&self) -> usize {
        self.lots.len()
    }

    pub fn avg_queue_length(&self) -> f64 {
        let total: usize = self.equipment.iter().map(Equipment::queue_len).sum();
        total as f64 / self.equipment.len().max(1) as f64
    }

    pub fn contains_lot(&self, lot_id: &str) -> bool {
        self.lots.contains_key(lot_id) || self.completed.iter().any(|l| l.lot_id == lot_id)
    }

    pub(crate) fn insert_lot(&mut self, lot: Lot) {
        self.lots.insert(lot.lot_id.clone(), lot);
    }

    /// Shortest queue among eligible tools of `equipment_type`; the first
    /// encountered wins ties.
    pub fn select_equipment(&self, equipment_type: EquipmentType) -> Option<usize> {
        self.equipment
            .iter()
            .enumerate()
            .filter(|(_, eq)| eq.equipment_type == equipment_type && self.is_dispatchable(eq))
            .min_by_key(|(_, eq)| eq.queue_len())
            .map(|(i, _)| i)
    }

    fn is_dispatchable(&self, eq: &Equipment) -> bool {
        match eq.status {
            EquipmentStatus::Down => false,
            EquipmentStatus::Maintenance => !self.dispatch.exclude_maintenance,
            EquipmentStatus::Idle | EquipmentStatus::Running => true,
        }
    }

    pub fn apply(
        &mut self,
        event: &Event,
        sched: &mut EventScheduler,
        rng: &mut impl RandomSource,
    ) -> Result<()> {
        let now = event.time;
        match event.event_type {
            EventType::Arrival => self.on_arrival(lot_ref(event)?, now, sched),
            EventType::ProcessStart => self.on_process_start(equipment_ref(event)?, lot_ref(event)?, now, sched),
            EventType::ProcessEnd => self.on_process_end(equipment_ref(event)?, lot_ref(event)?, now, sched),
            EventType::Breakdown => self.on_breakdown(equipment_ref(event)?, now, sched, rng),
            EventType::Repair => self.on_repair(equipment_ref(event)?, now, sched, rng),
        }
    }

    fn on_arrival(&mut self, lot_id: &str, now: Hours, sched: &mut EventScheduler) -> Result<()> {
        let lot = self
            .lots
            .get(lot_id)
            .ok_or_else(|| fault(EventType::Arrival, "lot", lot_id))?;
        let step = lot
            .current_route_step()
            .ok_or_else(|| SimError::Fault(format!("lot {lot_id} has no route step {}", lot.current_step)))?;
        let equipment_type = step.equipment_type;

        let Some(idx) = self.select_equipment(equipment_type) else {
            debug!(lot_id, %equipment_type, now, "no eligible equipment, holding lot");
            self.counters.inc_held_arrivals();
            self.on_hold.push_back(lot_id.to_string());
            return Ok(());
        };

        let eq = &mut self.equipment[idx];
        if eq.status == EquipmentStatus::Idle {
            sched.push(Event::process_start(now, eq.equipment_id.clone(), lot_id));
        } else {
            eq.queue.push_back(lot_id.to_string());
            self.counters.record_queue_peak(eq.queue.len() as u64);
            if let Some(lot) = self.lots.get_mut(lot_id) {
                lot.queued_at = Some(now);
            }
        }
        trace!(lot_id, equipment_id = %self.equipment[idx].equipment_id, now, "lot dispatched");
        Ok(())
    }

    fn on_process_start(
        &mut self,
        equipment_id: &str,
        lot_id: &str,
        now: Hours,
        sched: &mut EventScheduler,
    ) -> Result<()> {
        let idx = self.index_of(EventType::ProcessStart, equipment_id)?;
        let lot = self
            .lots
            .get_mut(lot_id)
            .ok_or_else(|| fault(EventType::ProcessStart, "lot", lot_id))?;
        let eq = &mut self.equipment[idx];

        // Two lots arriving at the same instant can both see an IDLE tool.
        let bound_elsewhere = eq.current_lot.as_deref().is_some_and(|cur| cur != lot_id);
        if !eq.status.is_available() || bound_elsewhere {
            eq.queue.push_back(lot_id.to_string());
            lot.queued_at.get_or_insert(now);
            self.counters.inc_deferred_starts();
            trace!(equipment_id, lot_id, status = ?eq.status, "start deferred to queue");
            return Ok(());
        }

        let process_time = lot
            .current_route_step()
            .map(|s| s.process_time_hours)
            .ok_or_else(|| SimError::Fault(format!("lot {lot_id} has no route step {}", lot.current_step)))?;
        if let Some(queued_at) = lot.queued_at.take() {
            lot.wait_time_hours += now - queued_at;
        }

        eq.status = EquipmentStatus::Running;
        eq.current_lot = Some(lot_id.to_string());
        eq.busy_since = Some(now);
        sched.push(Event::process_end(now + process_time, equipment_id, lot_id));
        Ok(())
    }

    fn on_process_end(
        &mut self,
        equipment_id: &str,
        lot_id: &str,
        now: Hours,
        sched: &mut EventScheduler,
    ) -> Result<()> {
        let idx = self.index_of(EventType::ProcessEnd, equipment_id)?;
        let eq = &mut self.equipment[idx];
        eq.total_processed += 1;
        if eq.current_lot.as_deref() == Some(lot_id) {
            eq.current_lot = None;
        }
        if let Some(since) = eq.busy_since.take() {
            eq.busy_hours += now - since;
        }

        let lot = self
            .lots
            .get_mut(lot_id)
            .ok_or_else(|| fault(EventType::ProcessEnd, "lot", lot_id))?;
        lot.current_step += 1;
        if lot.is_complete() {
            lot.completion_time = Some(now);
            if let Some(done) = self.lots.remove(lot_id) {
                debug!(lot_id, now, cycle_time = ?done.cycle_time(), "lot completed");
                self.completed.push(done);
                self.counters.inc_lots_completed();
            }
        } else {
            sched.push(Event::arrival(now, lot_id));
        }

        // A tool that broke down mid-process finishes the lot but stays out of service.
        if self.equipment[idx].status.is_available() {
            self.pull_next(idx, now, sched);
        }
        Ok(())
    }

    fn on_breakdown(
        &mut self,
        equipment_id: &str,
        now: Hours,
        sched: &mut EventScheduler,
        rng: &mut impl RandomSource,
    ) -> Result<()> {
        let idx = self.index_of(EventType::Breakdown, equipment_id)?;
        let eq = &mut self.equipment[idx];

        if eq.next_breakdown_at != Some(now) {
            self.counters.inc_stale_events();
            trace!(equipment_id, now, "superseded breakdown ignored");
            return Ok(());
        }
        eq.next_breakdown_at = None;
        if eq.status == EquipmentStatus::Maintenance {
            // Maintenance end reschedules the failure chain.
            trace!(equipment_id, now, "breakdown during maintenance ignored");
            return Ok(());
        }

        eq.status = EquipmentStatus::Down;
        let repair_hours = rng.exponential(eq.mttr_hours);
        eq.repair_due = Some(now + repair_hours);
        debug!(equipment_id, now, repair_hours, "equipment down");
        sched.push(Event::repair(now + repair_hours, equipment_id));
        Ok(())
    }

    fn on_repair(
        &mut self,
        equipment_id: &str,
        now: Hours,
        sched: &mut EventScheduler,
        rng: &mut impl RandomSource,
    ) -> Result<()> {
        let idx = self.index_of(EventType::Repair, equipment_id)?;
        let eq = &mut self.equipment[idx];

        if eq.repair_due != Some(now) {
            self.counters.inc_stale_events();
            trace!(equipment_id, now, "superseded repair ignored");
            return Ok(());
        }
        eq.repair_due = None;

        let ttf = rng.exponential(eq.mtbf_hours);
        eq.time_to_failure = ttf;
        eq.next_breakdown_at = Some(now + ttf);
        sched.push(Event::breakdown(now + ttf, equipment_id));

        let equipment_type = eq.equipment_type;
        if eq.current_lot.is_some() {
            eq.status = EquipmentStatus::Running;
        } else {
            eq.status = EquipmentStatus::Idle;
            self.pull_next(idx, now, sched);
        }
        debug!(equipment_id, now, next_breakdown = now + ttf, "equipment back in service");

        self.release_held(equipment_type, now, sched);
        Ok(())
    }

    /// Start the head of the queue, or go IDLE when there is nothing waiting.
    fn pull_next(&mut self, idx: usize, now: Hours, sched: &mut EventScheduler) {
        let eq = &mut self.equipment[idx];
        match eq.queue.pop_front() {
            Some(next) => sched.push(Event::process_start(now, eq.equipment_id.clone(), next)),
            None => eq.status = EquipmentStatus::Idle,
        }
    }

    /// Re-dispatch held lots that were waiting on `equipment_type`.
    fn release_held(&mut self, equipment_type: EquipmentType, now: Hours, sched: &mut EventScheduler) {
        if self.on_hold.is_empty() {
            return;
        }
        let lots = &self.lots;
        let (release, keep): (VecDeque<LotId>, VecDeque<LotId>) = self.on_hold.drain(..).partition(|id| {
            lots.get(id)
                .and_then(Lot::current_route_step)
                .is_some_and(|s| s.equipment_type == equipment_type)
        });
        self.on_hold = keep;
        for lot_id in release {
            trace!(lot_id = %lot_id, %equipment_type, now, "held lot released");
            sched.push(Event::arrival(now, lot_id));
        }
    }

    fn index_of(&self, kind: EventType, equipment_id: &str) -> Result<usize> {
        self.index
            .get(equipment_id)
            .copied()
            .ok_or_else(|| fault(kind, "equipment", equipment_id))
    }
}

fn fault(kind: EventType, what: &str, id: &str) -> SimError {
    SimError::Fault(format!("{kind:?} references unknown {what} {id}"))
}

fn lot_ref(event: &Event) -> Result<&str> {
    event
        .lot_id
        .as_deref()
        .ok_or_else(|| SimError::Fault(format!("{:?} event without a lot", event.event_type)))
}

fn equipment_ref(event: &Event) -> Result<&str> {
    event
        .equipment_id
        .as_deref()
        .ok_or_else(|| SimError::Fault(format!("{:?} event without equipment", event.event_type)))
}
