use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use vf_core::EventType;

/// Event and outcome counters, shareable across concurrent runs.
#[derive(Clone, Default)]
pub struct RunCounters {
    inner: Arc<CountersInner>,
}

#[derive(Default)]
struct CountersInner {
    arrivals: AtomicU64,
    process_starts: AtomicU64,
    process_ends: AtomicU64,
    breakdowns: AtomicU64,
    repairs: AtomicU64,
    stale_events: AtomicU64,
    held_arrivals: AtomicU64,
    deferred_starts: AtomicU64,
    lots_completed: AtomicU64,
    queue_peak: AtomicU64,
}

impl RunCounters {
    pub fn inc_event(&self, kind: EventType) {
        let counter = match kind {
            EventType::Arrival => &self.inner.arrivals,
            EventType::ProcessStart => &self.inner.process_starts,
            EventType::ProcessEnd => &self.inner.process_ends,
            EventType::Breakdown => &self.inner.breakdowns,
            EventType::Repair => &self.inner.repairs,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_stale_events(&self) {
        self.inner.stale_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_held_arrivals(&self) {
        self.inner.held_arrivals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_deferred_starts(&self) {
        self.inner.deferred_starts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_lots_completed(&self) {
        self.inner.lots_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_peak(&self, len: u64) {
        self.inner.queue_peak.fetch_max(len, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CountersSnapshot {
            arrivals: load(&self.inner.arrivals),
            process_starts: load(&self.inner.process_starts),
            process_ends: load(&self.inner.process_ends),
            breakdowns: load(&self.inner.breakdowns),
            repairs: load(&self.inner.repairs),
            stale_events: load(&self.inner.stale_events),
            held_arrivals: load(&self.inner.held_arrivals),
            deferred_starts: load(&self.inner.deferred_starts),
            lots_completed: load(&self.inner.lots_completed),
            queue_peak: load(&self.inner.queue_peak),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub arrivals: u64,
    pub process_starts: u64,
    pub process_ends: u64,
    pub breakdowns: u64,
    pub repairs: u64,
    pub stale_events: u64,
    pub held_arrivals: u64,
    pub deferred_starts: u64,
    pub lots_completed: u64,
    pub queue_peak: u64,
}

impl CountersSnapshot {
    pub fn events_processed(&self) -> u64 {
        self.arrivals + self.process_starts + self.process_ends + self.breakdowns + self.repairs
    }

    pub fn to_json_line(&self, label: &str, elapsed: Option<Duration>) -> String {
        #[derive(Serialize)]
        struct Line<'a> {
            label: &'a str,
            #[serde(flatten)]
            counters: &'a CountersSnapshot,
            elapsed_ms: Option<u128>,
        }

        let payload = Line { label, counters: self, elapsed_ms: elapsed.map(|d| d.as_millis()) };
        serde_json::to_string(&payload).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Wall-clock timer around a run.
pub struct RunTimer {
    start: Instant,
}

impl RunTimer {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
