//! Task producer: synthesizes tasks at a randomized rate until stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::{debug, info};

use crate::config::IntervalRange;
use crate::error::QueueError;
use crate::metrics::MetricsRegistry;
use crate::task_queue::TaskQueue;
use crate::types::{ProducerId, Task, TaskIds};

/// Cooperative stop request shared between a producer and its controller.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop; repeated or concurrent calls are harmless.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Producer {
    id: ProducerId,
    queue: Arc<TaskQueue>,
    metrics: Arc<MetricsRegistry>,
    ids: Arc<TaskIds>,
    interval: IntervalRange,
    stop: StopFlag,
}

impl Producer {
    pub fn new(
        id: ProducerId,
        queue: Arc<TaskQueue>,
        metrics: Arc<MetricsRegistry>,
        ids: Arc<TaskIds>,
        interval: IntervalRange,
    ) -> Self {
        Self {
            id,
            queue,
            metrics,
            ids,
            interval,
            stop: StopFlag::new(),
        }
    }

    pub fn id(&self) -> ProducerId {
        self.id
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Produce until stopped; returns how many tasks this producer enqueued.
    ///
    /// The flag is only checked between iterations, so an enqueue already
    /// underway always completes.
    pub fn run(&self) -> Result<u64, QueueError> {
        let mut rng = fastrand::Rng::new();
        let mut produced = 0u64;
        while !self.stop.is_stopped() {
            let id = self.ids.next_id();
            let task = Task::new(id, format!("Email {id} from producer {}", self.id));
            if let Err(err) = self.queue.enqueue(task) {
                info!(producer = self.id, produced, "producer cancelled");
                return Err(err);
            }
            self.metrics.record_produced();
            produced += 1;
            debug!(producer = self.id, task = id, "task enqueued");
            thread::sleep(self.interval.sample(&mut rng));
        }
        info!(producer = self.id, produced, "producer stopped");
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use std::sync::mpsc;
    use std::time::Duration;

    fn producer(queue: &Arc<TaskQueue>, metrics: &Arc<MetricsRegistry>, interval: u64) -> Producer {
        Producer::new(
            1,
            Arc::clone(queue),
            Arc::clone(metrics),
            Arc::new(TaskIds::new()),
            IntervalRange::fixed(interval),
        )
    }

    fn wait_for_len(queue: &TaskQueue, len: usize) {
        let start = std::time::Instant::now();
        while queue.len() < len {
            assert!(start.elapsed() < Duration::from_secs(2), "queue never filled");
            thread::sleep(Duration::from_millis(1));
        }
        // Give the producer time to park on its next enqueue.
        thread::sleep(Duration::from_millis(20));
    }

    #[test]
    fn stopped_before_start_produces_nothing() {
        let queue = Arc::new(TaskQueue::unbounded());
        let metrics = Arc::new(MetricsRegistry::new());
        let producer = producer(&queue, &metrics, 0);
        producer.stop();
        assert_eq!(producer.run(), Ok(0));
        assert_eq!(metrics.snapshot().produced, 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn produced_count_matches_enqueued_tasks() {
        let queue = Arc::new(TaskQueue::unbounded());
        let metrics = Arc::new(MetricsRegistry::new());
        let producer = Arc::new(producer(&queue, &metrics, 1));

        let runner = Arc::clone(&producer);
        let handle = thread::spawn(move || runner.run());
        thread::sleep(Duration::from_millis(50));
        producer.stop();
        let produced = handle
            .join()
            .expect("producer thread panicked")
            .expect("queue cancelled");

        assert!(produced > 0);
        assert_eq!(metrics.snapshot().produced, produced);
        assert_eq!(queue.len() as u64, produced);

        let mut expected = 1;
        while let Some(message) = queue.try_dequeue() {
            match message {
                Message::Task(task) => {
                    assert_eq!(task.id, expected);
                    assert_eq!(task.payload, format!("Email {expected} from producer 1"));
                }
                Message::Shutdown => panic!("producer must never enqueue a sentinel"),
            }
            expected += 1;
        }
    }

    #[test]
    fn concurrent_stop_calls_are_idempotent() {
        let queue = Arc::new(TaskQueue::unbounded());
        let metrics = Arc::new(MetricsRegistry::new());
        let producer = Arc::new(producer(&queue, &metrics, 1));

        let runner = Arc::clone(&producer);
        let handle = thread::spawn(move || runner.run());

        let stoppers: Vec<_> = (0..8)
            .map(|_| {
                let flag = producer.stop_flag();
                thread::spawn(move || flag.stop())
            })
            .collect();
        for stopper in stoppers {
            stopper.join().expect("stopper panicked");
        }
        producer.stop();

        let produced = handle
            .join()
            .expect("producer thread panicked")
            .expect("queue cancelled");
        assert_eq!(metrics.snapshot().produced, produced);
        assert!(producer.stop_flag().is_stopped());
    }

    #[test]
    fn stop_lets_blocked_enqueue_finish() {
        let queue = Arc::new(TaskQueue::new(1));
        let metrics = Arc::new(MetricsRegistry::new());
        let producer = Arc::new(producer(&queue, &metrics, 0));

        let (done_tx, done_rx) = mpsc::channel();
        let runner = Arc::clone(&producer);
        let handle = thread::spawn(move || {
            let result = runner.run();
            done_tx.send(()).expect("done");
            result
        });

        // First task fills the queue, the second enqueue parks.
        wait_for_len(&queue, 1);
        producer.stop();
        assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());

        queue.try_dequeue().expect("first task");
        done_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("producer should exit after its pending enqueue");
        let produced = handle
            .join()
            .expect("producer thread panicked")
            .expect("queue cancelled");
        assert_eq!(produced, 2);
        assert_eq!(metrics.snapshot().produced, 2);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn cancellation_ends_the_loop() {
        let queue = Arc::new(TaskQueue::new(1));
        let metrics = Arc::new(MetricsRegistry::new());
        let producer = Arc::new(producer(&queue, &metrics, 0));

        let runner = Arc::clone(&producer);
        let handle = thread::spawn(move || runner.run());
        wait_for_len(&queue, 1);
        queue.cancel();

        let result = handle.join().expect("producer thread panicked");
        assert_eq!(result, Err(QueueError::Cancelled));
        assert_eq!(metrics.snapshot().produced, 1);
    }
}
