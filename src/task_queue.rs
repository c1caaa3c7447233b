//! Bounded FIFO queue with blocking put/take and capacity backpressure.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::QueueError;
use crate::types::Message;

/// Result of a time-limited enqueue.
#[derive(Debug, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    /// The queue stayed full for the whole timeout; the message is handed back.
    Full(Message),
}

/// Synchronized FIFO shared by every producer and consumer of a run.
pub struct TaskQueue {
    inner: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
}

struct QueueState {
    items: VecDeque<Message>,
    cancelled: bool,
    peak: usize,
}

impl TaskQueue {
    /// Create a queue holding at most `capacity` messages; 0 means unbounded.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueState {
                items: VecDeque::new(),
                cancelled: false,
                peak: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: (capacity > 0).then_some(capacity),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    fn is_full(&self, state: &QueueState) -> bool {
        self.capacity
            .is_some_and(|capacity| state.items.len() >= capacity)
    }

    fn push_locked(&self, state: &mut QueueState, message: Message) {
        state.items.push_back(message);
        state.peak = state.peak.max(state.items.len());
        // Always notify: a transition-only wakeup loses signals with several waiters.
        self.not_empty.notify_one();
    }

    fn pop_locked(&self, state: &mut QueueState) -> Option<Message> {
        let message = state.items.pop_front()?;
        self.not_full.notify_one();
        Some(message)
    }

    /// Append at the tail, suspending while the queue is full.
    pub fn enqueue(&self, message: impl Into<Message>) -> Result<(), QueueError> {
        let message = message.into();
        let mut state = self.inner.lock();
        loop {
            if state.cancelled {
                return Err(QueueError::Cancelled);
            }
            if !self.is_full(&state) {
                break;
            }
            self.not_full.wait(&mut state);
        }
        self.push_locked(&mut state, message);
        Ok(())
    }

    /// Like `enqueue`, but gives the message back if no space opens up in time.
    pub fn enqueue_timeout(
        &self,
        message: impl Into<Message>,
        timeout: Duration,
    ) -> Result<Offer, QueueError> {
        let message = message.into();
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.lock();
        loop {
            if state.cancelled {
                return Err(QueueError::Cancelled);
            }
            if !self.is_full(&state) {
                break;
            }
            if self.not_full.wait_until(&mut state, deadline).timed_out() && self.is_full(&state)
            {
                return Ok(Offer::Full(message));
            }
        }
        self.push_locked(&mut state, message);
        Ok(Offer::Accepted)
    }

    /// Remove the head, suspending while the queue is empty.
    ///
    /// After `cancel`, queued messages are still handed out; the error is
    /// returned only once nothing is left.
    pub fn dequeue(&self) -> Result<Message, QueueError> {
        let mut state = self.inner.lock();
        loop {
            if let Some(message) = self.pop_locked(&mut state) {
                return Ok(message);
            }
            if state.cancelled {
                return Err(QueueError::Cancelled);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Like `dequeue`, but returns `None` once `timeout` passes with nothing queued.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Result<Option<Message>, QueueError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.lock();
        loop {
            if let Some(message) = self.pop_locked(&mut state) {
                return Ok(Some(message));
            }
            if state.cancelled {
                return Err(QueueError::Cancelled);
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return Ok(self.pop_locked(&mut state));
            }
        }
    }

    /// Pop immediately without blocking.
    pub fn try_dequeue(&self) -> Option<Message> {
        let mut state = self.inner.lock();
        self.pop_locked(&mut state)
    }

    /// Cancel every current and future blocked wait.
    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        state.cancelled = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    /// Current number of queued messages. Racy by nature; display only.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured bound, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Highest length observed since creation.
    pub fn peak_len(&self) -> usize {
        self.inner.lock().peak
    }
}
