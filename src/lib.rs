//! Queue-based load leveling: a bounded in-process queue between producers
//! and consumers that run at their own pace, with a drain-and-stop protocol
//! and live counters for observers.
//!
//! ```text
//! producer-1 ─┐                         ┌─► consumer-1
//! producer-2 ─┼─► TaskQueue (bounded) ──┼─► consumer-2
//! producer-N ─┘                         └─► consumer-M
//!        │              ▲                       │
//!        └──────► MetricsRegistry ◄─────────────┘
//!                       │
//!              StatusMonitor / report
//! ```

pub mod bench;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod producer;
pub mod report;
pub mod signal;
pub mod status;
pub mod task_queue;
pub mod types;

pub use config::{IntervalRange, LevelingConfig, ShutdownMode};
pub use error::{BrokerError, ConfigError, LifecycleError, QueueError, ReportError};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use orchestrator::{Orchestrator, Phase, RunReport, UnitExit, UnitOutcome};
pub use task_queue::TaskQueue;
pub use types::{Message, Task, TaskId};
