//! Lifecycle controller: owns the queue and registry, runs the producers and
//! consumers for a fixed window, then drains them in a strict order.
//!
//! ```text
//! Created ──start()──► Running ──window elapsed / stop()──► Draining ──► Stopped
//!
//! Draining:
//!   1. raise every producer's stop flag
//!   2. await producers (they finish any enqueue already underway)
//!   3. insert the shutdown sentinels
//!   4. await consumers (every real task ahead of a sentinel is processed)
//! ```

use std::any::Any;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::LevelingConfig;
use crate::consumer::{Consumer, ConsumerStats, LivePeers, SimulatedWork, TaskHandler};
use crate::error::{ConfigError, LifecycleError, QueueError};
use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::producer::{Producer, StopFlag};
use crate::signal::StopSignal;
use crate::status::StatusProbe;
use crate::task_queue::{Offer, TaskQueue};
use crate::types::{Message, TaskIds};

// How often draining re-checks unit liveness while it waits.
const DRAIN_POLL_MS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Created,
    Running,
    Draining,
    Stopped,
}

/// How a producer or consumer thread ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitExit {
    Clean,
    /// A blocked queue wait was cancelled.
    Cancelled,
    Panicked(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    pub name: String,
    pub exit: UnitExit,
    /// Tasks produced or processed by this unit; 0 if it panicked.
    pub tasks: u64,
}

impl UnitOutcome {
    pub fn is_clean(&self) -> bool {
        self.exit == UnitExit::Clean
    }
}

/// Everything known about a run once it reached `Stopped`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub snapshot: MetricsSnapshot,
    pub producers: Vec<UnitOutcome>,
    pub consumers: Vec<UnitOutcome>,
    pub sentinels_inserted: usize,
    pub relays: usize,
    /// Messages still queued after the consumers exited; discarded.
    pub leftover: usize,
    pub peak_queue_len: usize,
    pub elapsed_ms: u64,
    /// Some unit exited abnormally or the sentinel protocol could not finish.
    pub degraded: bool,
}

struct ProducerUnit {
    name: String,
    stop: StopFlag,
    handle: thread::JoinHandle<Result<u64, QueueError>>,
}

struct ConsumerUnit {
    name: String,
    handle: thread::JoinHandle<Result<ConsumerStats, QueueError>>,
}

pub struct Orchestrator {
    config: LevelingConfig,
    phase: Phase,
    queue: Arc<TaskQueue>,
    metrics: Arc<MetricsRegistry>,
    ids: Arc<TaskIds>,
    handler: Arc<dyn TaskHandler>,
    peers: LivePeers,
    stop: StopSignal,
    producers: Vec<ProducerUnit>,
    consumers: Vec<ConsumerUnit>,
    started_at: Option<Instant>,
    final_snapshot: Option<MetricsSnapshot>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Orchestrator {
    /// Allocate the queue and registry for one run. Nothing is spawned yet.
    pub fn new(config: LevelingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let handler: Arc<dyn TaskHandler> =
            Arc::new(SimulatedWork::new(config.process_interval_ms));
        Ok(Self {
            queue: Arc::new(TaskQueue::new(config.queue_capacity)),
            metrics: Arc::new(MetricsRegistry::new()),
            ids: Arc::new(TaskIds::new()),
            handler,
            peers: LivePeers::new(),
            stop: StopSignal::new(),
            producers: Vec::new(),
            consumers: Vec::new(),
            started_at: None,
            final_snapshot: None,
            phase: Phase::Created,
            config,
        })
    }

    /// Replace the processing step (defaults to `SimulatedWork`).
    pub fn with_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &LevelingConfig {
        &self.config
    }

    /// Ends the run window early from any thread. Raised before `start`,
    /// producers are stopped before their first enqueue.
    pub fn stop_handle(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn status_probe(&self) -> StatusProbe {
        StatusProbe::new(Arc::clone(&self.queue), Arc::clone(&self.metrics))
    }

    /// Exposed once the run is `Stopped`.
    pub fn final_snapshot(&self) -> Option<MetricsSnapshot> {
        self.final_snapshot
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), LifecycleError> {
        if self.phase != expected {
            return Err(LifecycleError::InvalidPhase {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    /// Spawn all consumers, then all producers.
    pub fn start(&mut self) -> Result<(), LifecycleError> {
        self.expect_phase(Phase::Created)?;
        self.phase = Phase::Running;
        self.started_at = Some(Instant::now());
        info!(
            producers = self.config.producers,
            consumers = self.config.consumers,
            capacity = self.config.queue_capacity,
            shutdown = ?self.config.shutdown,
            "run starting"
        );

        for id in 1..=self.config.consumers as u64 {
            let consumer = Consumer::new(
                id,
                Arc::clone(&self.queue),
                Arc::clone(&self.metrics),
                Arc::clone(&self.handler),
                self.config.shutdown,
                &self.peers,
            );
            let name = format!("consumer-{}", consumer.id());
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || consumer.run())
                .map_err(|source| LifecycleError::Spawn {
                    unit: name.clone(),
                    source,
                })?;
            self.consumers.push(ConsumerUnit { name, handle });
        }

        let stop_requested = self.stop.is_stopped();
        for id in 1..=self.config.producers as u64 {
            let producer = Producer::new(
                id,
                Arc::clone(&self.queue),
                Arc::clone(&self.metrics),
                Arc::clone(&self.ids),
                self.config.produce_interval_ms,
            );
            if stop_requested {
                producer.stop();
            }
            let name = format!("producer-{}", producer.id());
            let stop = producer.stop_flag();
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || producer.run())
                .map_err(|source| LifecycleError::Spawn {
                    unit: name.clone(),
                    source,
                })?;
            self.producers.push(ProducerUnit { name, stop, handle });
        }
        Ok(())
    }

    /// Block for the configured run duration; returns true if cut short.
    pub fn wait_window(&self) -> Result<bool, LifecycleError> {
        self.expect_phase(Phase::Running)?;
        Ok(self.stop.wait_timeout(self.config.run_duration()))
    }

    /// Start, hold the window open, then shut down.
    pub fn run(&mut self) -> Result<RunReport, LifecycleError> {
        self.start()?;
        if self.wait_window()? {
            info!("run window cut short by stop request");
        }
        self.shutdown()
    }

    /// Drain the run and move to `Stopped`.
    pub fn shutdown(&mut self) -> Result<RunReport, LifecycleError> {
        self.expect_phase(Phase::Running)?;
        self.phase = Phase::Draining;
        self.stop.stop();

        info!("draining: stopping producers");
        for unit in &self.producers {
            unit.stop.stop();
        }
        let producers = self.await_producers();

        let wanted = self.config.sentinel_count();
        let sentinels_inserted = self.insert_sentinels(wanted);
        info!(sentinels = sentinels_inserted, "draining: awaiting consumers");
        let (consumers, relays) = self.await_consumers();

        let mut leftover = 0usize;
        while self.queue.try_dequeue().is_some() {
            leftover += 1;
        }

        let snapshot = self.metrics.snapshot();
        let degraded = sentinels_inserted < wanted
            || !producers.iter().chain(consumers.iter()).all(UnitOutcome::is_clean);
        let elapsed_ms = self
            .started_at
            .map(|start| start.elapsed().as_millis() as u64)
            .unwrap_or(0);

        self.phase = Phase::Stopped;
        self.final_snapshot = Some(snapshot);
        if degraded {
            warn!(%snapshot, leftover, "degraded shutdown");
        } else {
            info!(%snapshot, elapsed_ms, "run stopped");
        }

        Ok(RunReport {
            snapshot,
            producers,
            consumers,
            sentinels_inserted,
            relays,
            leftover,
            peak_queue_len: self.queue.peak_len(),
            elapsed_ms,
            degraded,
        })
    }

    fn consumers_all_finished(&self) -> bool {
        self.consumers.iter().all(|unit| unit.handle.is_finished())
    }

    fn await_producers(&mut self) -> Vec<UnitOutcome> {
        let units = std::mem::take(&mut self.producers);
        while !units.iter().all(|unit| unit.handle.is_finished()) {
            // With no consumer left, a producer parked on a full queue would never wake.
            if self.consumers_all_finished() && !self.queue.is_cancelled() {
                warn!("no consumer alive; cancelling queue to release producers");
                self.queue.cancel();
            }
            thread::sleep(Duration::from_millis(DRAIN_POLL_MS));
        }

        units
            .into_iter()
            .map(|unit| {
                let (exit, tasks) = match unit.handle.join() {
                    Ok(Ok(produced)) => (UnitExit::Clean, produced),
                    Ok(Err(QueueError::Cancelled)) => (UnitExit::Cancelled, 0),
                    Err(payload) => (UnitExit::Panicked(panic_message(payload)), 0),
                };
                if exit != UnitExit::Clean {
                    warn!(unit = %unit.name, ?exit, "producer exited abnormally");
                }
                UnitOutcome {
                    name: unit.name,
                    exit,
                    tasks,
                }
            })
            .collect()
    }

    /// Returns how many sentinels made it into the queue.
    fn insert_sentinels(&self, wanted: usize) -> usize {
        let poll = Duration::from_millis(DRAIN_POLL_MS);
        let mut inserted = 0;
        while inserted < wanted {
            match self.queue.enqueue_timeout(Message::Shutdown, poll) {
                Ok(Offer::Accepted) => inserted += 1,
                Ok(Offer::Full(_)) if self.consumers_all_finished() => {
                    warn!(inserted, wanted, "queue full and no consumer alive; giving up on sentinels");
                    break;
                }
                Ok(Offer::Full(_)) => {}
                Err(QueueError::Cancelled) => {
                    warn!(inserted, wanted, "queue cancelled before all sentinels were inserted");
                    break;
                }
            }
        }
        inserted
    }

    fn await_consumers(&mut self) -> (Vec<UnitOutcome>, usize) {
        let mut relays = 0;
        let outcomes = std::mem::take(&mut self.consumers)
            .into_iter()
            .map(|unit| {
                let (exit, tasks) = match unit.handle.join() {
                    Ok(Ok(stats)) => {
                        relays += usize::from(stats.relayed);
                        (UnitExit::Clean, stats.processed)
                    }
                    Ok(Err(QueueError::Cancelled)) => (UnitExit::Cancelled, 0),
                    Err(payload) => (UnitExit::Panicked(panic_message(payload)), 0),
                };
                if exit != UnitExit::Clean {
                    warn!(unit = %unit.name, ?exit, "consumer exited abnormally");
                }
                UnitOutcome {
                    name: unit.name,
                    exit,
                    tasks,
                }
            })
            .collect();
        (outcomes, relays)
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        // Dropped mid-run: release every thread rather than leak blocked waiters.
        if matches!(self.phase, Phase::Running | Phase::Draining) {
            for unit in &self.producers {
                unit.stop.stop();
            }
            self.queue.cancel();
        }
    }
}
