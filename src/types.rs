//! Shared identifiers and the task model passed through the queue.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Unique identifier for a task in the queue.
pub type TaskId = u64;
/// Identifier for a producer thread.
pub type ProducerId = u64;
/// Identifier for a consumer thread.
pub type ConsumerId = u64;

/// Unit of work handed from producers to consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Monotonic identifier, assigned once and never reused within a run.
    pub id: TaskId,
    /// Free-form payload carried to the consumer.
    pub payload: String,
}

impl Task {
    /// Construct a new task with the provided id and payload.
    pub fn new(id: TaskId, payload: impl Into<String>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// What actually travels through the queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Task(Task),
    /// Termination signal for consumers; never counted as produced work.
    Shutdown,
}

impl Message {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Message::Shutdown)
    }
}

impl From<Task> for Message {
    fn from(task: Task) -> Self {
        Message::Task(task)
    }
}

/// Per-run id source shared by every producer of that run.
#[derive(Debug)]
pub struct TaskIds {
    next: AtomicU64,
}

impl TaskIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Hand out the next id; ids start at 1.
    pub fn next_id(&self) -> TaskId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for TaskIds {
    fn default() -> Self {
        Self::new()
    }
}
