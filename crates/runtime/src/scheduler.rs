//! Time-ordered event queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use vf_core::{Event, Hours};

#[derive(Debug)]
struct Scheduled {
    seq: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // BinaryHeap is a max-heap: earliest time, then lowest seq, must compare greatest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .event
            .time
            .total_cmp(&self.event.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of pending events; ties on time pop in insertion order.
#[derive(Debug, Default)]
pub struct EventScheduler {
    next_seq: u64,
    heap: BinaryHeap<Scheduled>,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.heap.push(Scheduled { seq, event });
    }

    /// `None` means the fab has gone idle.
    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|s| s.event)
    }

    /// Pops the earliest event only if it falls strictly before `horizon`.
    pub fn pop_before(&mut self, horizon: Hours) -> Option<Event> {
        match self.peek_time() {
            Some(t) if t < horizon => self.pop(),
            _ => None,
        }
    }

    pub fn peek_time(&self) -> Option<Hours> {
        self.heap.peek().map(|s| s.event.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pending events in pop order, for inspection.
    pub fn pending(&self) -> Vec<&Event> {
        let mut items: Vec<&Scheduled> = self.heap.iter().collect();
        items.sort_by(|a, b| b.cmp(a));
        items.into_iter().map(|s| &s.event).collect()
    }
}
