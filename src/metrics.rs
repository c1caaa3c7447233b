//! Lock-free counters shared by producers, consumers and observers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Produced,
    Processed,
    InFlight,
}

/// Per-run registry. Each counter is atomic on its own; there is no
/// cross-counter atomicity.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    produced: AtomicU64,
    processed: AtomicU64,
    in_flight: AtomicU64,
}

/// Point-in-time read of the registry. Exact only once the run is at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub produced: u64,
    pub processed: u64,
    pub in_flight: u64,
}

impl MetricsSnapshot {
    /// Every produced task was processed and nothing is mid-flight.
    pub fn is_balanced(&self) -> bool {
        self.produced == self.processed && self.in_flight == 0
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "produced={} processed={} in_flight={}",
            self.produced, self.processed, self.in_flight
        )
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Produced => &self.produced,
            Counter::Processed => &self.processed,
            Counter::InFlight => &self.in_flight,
        }
    }

    pub fn increment(&self, counter: Counter) {
        self.counter(counter).fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement `in_flight`, saturating at zero.
    pub fn decrement_in_flight(&self) {
        let result = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));
        if result.is_err() {
            warn!("in_flight decrement below zero ignored");
        }
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counter(counter).load(Ordering::SeqCst)
    }

    /// A real task was enqueued.
    pub fn record_produced(&self) {
        self.increment(Counter::Produced);
    }

    /// A consumer took ownership of a task.
    pub fn claim(&self) {
        self.increment(Counter::InFlight);
    }

    /// A claimed task finished processing.
    pub fn complete(&self) {
        self.increment(Counter::Processed);
        self.decrement_in_flight();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            produced: self.get(Counter::Produced),
            processed: self.get(Counter::Processed),
            in_flight: self.get(Counter::InFlight),
        }
    }
}
