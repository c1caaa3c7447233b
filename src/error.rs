//! Error types for the leveling core and its collaborator boundaries.

use thiserror::Error;

use crate::orchestrator::Phase;

/// Raised by a blocked queue wait; everything else on the queue is infallible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue wait cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("orchestrator is {actual:?}, expected {expected:?}")]
    InvalidPhase { expected: Phase, actual: Phase },

    #[error("failed to spawn {unit}: {source}")]
    Spawn {
        unit: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker rejected message for {destination}")]
    Rejected { destination: String },

    #[error("broker send failed: {0}")]
    Send(String),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report generator unavailable: {0}")]
    Unavailable(String),

    #[error("report generation failed: {0}")]
    Generation(String),
}
