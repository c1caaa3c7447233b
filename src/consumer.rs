//! Task consumer: drains the queue until it receives the shutdown sentinel.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{IntervalRange, ShutdownMode};
use crate::error::QueueError;
use crate::metrics::MetricsRegistry;
use crate::task_queue::TaskQueue;
use crate::types::{ConsumerId, Message, Task};

/// Processing step run by a consumer for each real task.
pub trait TaskHandler: Send + Sync {
    fn handle(&self, task: &Task, rng: &mut fastrand::Rng);
}

/// Sleeps for a sampled interval to model variable processing latency.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedWork {
    interval: IntervalRange,
}

impl SimulatedWork {
    pub fn new(interval: IntervalRange) -> Self {
        Self { interval }
    }
}

impl TaskHandler for SimulatedWork {
    fn handle(&self, _task: &Task, rng: &mut fastrand::Rng) {
        thread::sleep(self.interval.sample(rng));
    }
}

/// Number of consumers still able to take a relayed sentinel.
#[derive(Debug, Clone, Default)]
pub struct LivePeers(Arc<AtomicUsize>);

impl LivePeers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Register one consumer; the returned guard deregisters it on drop,
    /// including while unwinding from a panic.
    pub fn register(&self) -> Membership {
        self.0.fetch_add(1, Ordering::SeqCst);
        Membership {
            peers: self.clone(),
            released: false,
        }
    }
}

pub struct Membership {
    peers: LivePeers,
    released: bool,
}

impl Membership {
    /// Leave the peer group; returns how many consumers remain.
    fn leave(&mut self) -> usize {
        if self.released {
            return self.peers.count();
        }
        self.released = true;
        self.peers.0.fetch_sub(1, Ordering::SeqCst) - 1
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.leave();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub processed: u64,
    /// Whether this consumer passed the sentinel on before exiting.
    pub relayed: bool,
}

pub struct Consumer {
    id: ConsumerId,
    queue: Arc<TaskQueue>,
    metrics: Arc<MetricsRegistry>,
    handler: Arc<dyn TaskHandler>,
    mode: ShutdownMode,
    membership: Membership,
}

impl Consumer {
    /// Build a consumer and register it with `peers` immediately, so the
    /// relay count is right even before its thread gets scheduled.
    pub fn new(
        id: ConsumerId,
        queue: Arc<TaskQueue>,
        metrics: Arc<MetricsRegistry>,
        handler: Arc<dyn TaskHandler>,
        mode: ShutdownMode,
        peers: &LivePeers,
    ) -> Self {
        Self {
            id,
            queue,
            metrics,
            handler,
            mode,
            membership: peers.register(),
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Process tasks until the sentinel arrives or the queue is cancelled.
    pub fn run(mut self) -> Result<ConsumerStats, QueueError> {
        let mut rng = fastrand::Rng::new();
        let mut stats = ConsumerStats::default();
        loop {
            let task = match self.queue.dequeue() {
                Ok(Message::Task(task)) => task,
                Ok(Message::Shutdown) => {
                    stats.relayed = self.on_shutdown()?;
                    info!(
                        consumer = self.id,
                        processed = stats.processed,
                        relayed = stats.relayed,
                        "consumer stopped"
                    );
                    return Ok(stats);
                }
                Err(err) => {
                    info!(consumer = self.id, processed = stats.processed, "consumer cancelled");
                    return Err(err);
                }
            };
            self.metrics.claim();
            debug!(consumer = self.id, task = task.id, "task claimed");
            self.handler.handle(&task, &mut rng);
            self.metrics.complete();
            stats.processed += 1;
        }
    }

    /// Returns whether the sentinel was relayed to a peer.
    fn on_shutdown(&mut self) -> Result<bool, QueueError> {
        let remaining = self.membership.leave();
        match self.mode {
            ShutdownMode::PerConsumer => Ok(false),
            ShutdownMode::Relay if remaining > 0 => {
                self.queue.enqueue(Message::Shutdown)?;
                debug!(consumer = self.id, remaining, "sentinel relayed");
                Ok(true)
            }
            ShutdownMode::Relay => Ok(false),
        }
    }
}
