//! Periodic status reads for display front ends.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::metrics::MetricsRegistry;
use crate::signal::StopSignal;
use crate::task_queue::TaskQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub queue_len: usize,
    pub produced: u64,
    pub processed: u64,
    pub in_flight: u64,
    /// processed / produced as a percentage, 0 before anything is produced.
    pub progress_percent: u8,
}

fn progress_percent(processed: u64, produced: u64) -> u8 {
    if produced == 0 {
        return 0;
    }
    (processed.saturating_mul(100) / produced).min(100) as u8
}

/// Read-only view over a run's queue and registry.
#[derive(Clone)]
pub struct StatusProbe {
    queue: Arc<TaskQueue>,
    metrics: Arc<MetricsRegistry>,
}

impl StatusProbe {
    pub fn new(queue: Arc<TaskQueue>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { queue, metrics }
    }

    pub fn read(&self) -> StatusSnapshot {
        let metrics = self.metrics.snapshot();
        StatusSnapshot {
            queue_len: self.queue.len(),
            produced: metrics.produced,
            processed: metrics.processed,
            in_flight: metrics.in_flight,
            progress_percent: progress_percent(metrics.processed, metrics.produced),
        }
    }
}

/// Receives each periodic snapshot.
pub trait StatusSink: Send {
    fn publish(&mut self, status: &StatusSnapshot);
}

impl<F> StatusSink for F
where
    F: FnMut(&StatusSnapshot) + Send,
{
    fn publish(&mut self, status: &StatusSnapshot) {
        self(status)
    }
}

/// Logs every snapshot at info level.
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn publish(&mut self, status: &StatusSnapshot) {
        info!(
            queue_len = status.queue_len,
            produced = status.produced,
            processed = status.processed,
            in_flight = status.in_flight,
            progress = status.progress_percent,
            "status"
        );
    }
}

/// Background thread publishing status at a fixed interval.
pub struct StatusMonitor {
    stop: StopSignal,
    handle: thread::JoinHandle<()>,
}

impl StatusMonitor {
    pub fn spawn(
        probe: StatusProbe,
        interval: Duration,
        mut sink: impl StatusSink + 'static,
    ) -> io::Result<Self> {
        let stop = StopSignal::new();
        let signal = stop.clone();
        let handle = thread::Builder::new()
            .name("status-monitor".to_string())
            .spawn(move || {
                loop {
                    sink.publish(&probe.read());
                    if signal.wait_timeout(interval) {
                        break;
                    }
                }
            })?;
        Ok(Self { stop, handle })
    }

    /// Stop publishing and wait for the thread.
    pub fn stop(self) {
        self.stop.stop();
        if self.handle.join().is_err() {
            warn!("status monitor thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Task;
    use std::sync::mpsc;

    #[test]
    fn progress_handles_zero_and_caps() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(1, 4), 25);
        assert_eq!(progress_percent(4, 4), 100);
        // Mid-update reads may briefly see processed ahead of produced.
        assert_eq!(progress_percent(5, 4), 100);
    }

    #[test]
    fn probe_reads_queue_and_counters() {
        let queue = Arc::new(TaskQueue::unbounded());
        let metrics = Arc::new(MetricsRegistry::new());
        for id in 1..=3 {
            queue.enqueue(Task::new(id, "x")).expect("queue cancelled");
            metrics.record_produced();
        }
        queue.try_dequeue();
        metrics.claim();

        let status = StatusProbe::new(queue, Arc::clone(&metrics)).read();
        assert_eq!(status.queue_len, 2);
        assert_eq!(status.produced, 3);
        assert_eq!(status.processed, 0);
        assert_eq!(status.in_flight, 1);
        assert_eq!(status.progress_percent, 0);
    }

    #[test]
    fn monitor_publishes_until_stopped() {
        let queue = Arc::new(TaskQueue::unbounded());
        let metrics = Arc::new(MetricsRegistry::new());
        let (tx, rx) = mpsc::channel();
        let monitor = StatusMonitor::spawn(
            StatusProbe::new(queue, metrics),
            Duration::from_millis(10),
            move |status: &StatusSnapshot| {
                let _ = tx.send(*status);
            },
        )
        .expect("spawn status monitor");

        for _ in 0..3 {
            rx.recv_timeout(Duration::from_secs(1))
                .expect("status snapshot");
        }
        monitor.stop();
        // Drain what was published before the stop, then the channel closes.
        while rx.recv_timeout(Duration::from_millis(100)).is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
