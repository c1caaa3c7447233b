//! Run configuration: defaults, TOML loading and validation.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Half-open `[min_ms, max_ms)` interval; `min_ms == max_ms` is a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl IntervalRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn fixed(ms: u64) -> Self {
        Self::new(ms, ms)
    }

    pub fn sample(&self, rng: &mut fastrand::Rng) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng.u64(self.min_ms..self.max_ms))
    }

    /// Parse `MIN,MAX` or a single fixed value.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let parse_ms = |part: &str| {
            part.trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid(format!("bad interval value: {part:?}")))
        };
        let range = match text.split_once(',') {
            Some((min, max)) => Self::new(parse_ms(min)?, parse_ms(max)?),
            None => Self::fixed(parse_ms(text)?),
        };
        range.validate("interval")?;
        Ok(range)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.min_ms > self.max_ms {
            return Err(ConfigError::Invalid(format!(
                "{name}: min {} exceeds max {}",
                self.min_ms, self.max_ms
            )));
        }
        Ok(())
    }
}

/// How consumers are told to stop once producers have drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShutdownMode {
    /// One sentinel per consumer; each consumer absorbs exactly one.
    #[default]
    PerConsumer,
    /// A single sentinel, relayed by each consumer while live peers remain.
    Relay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LevelingConfig {
    pub producers: usize,
    pub consumers: usize,
    pub run_duration_ms: u64,
    pub produce_interval_ms: IntervalRange,
    pub process_interval_ms: IntervalRange,
    /// 0 = unbounded.
    pub queue_capacity: usize,
    pub shutdown: ShutdownMode,
    pub status_interval_ms: u64,
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            producers: 2,
            consumers: 2,
            run_duration_ms: 10_000,
            produce_interval_ms: IntervalRange::new(100, 500),
            process_interval_ms: IntervalRange::new(200, 1000),
            queue_capacity: 0,
            shutdown: ShutdownMode::PerConsumer,
            status_interval_ms: 500,
        }
    }
}

impl LevelingConfig {
    /// Load a TOML file; missing keys fall back to defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading config");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.producers == 0 {
            return Err(ConfigError::Invalid("producers must be > 0".into()));
        }
        if self.consumers == 0 {
            return Err(ConfigError::Invalid("consumers must be > 0".into()));
        }
        if self.run_duration_ms == 0 {
            return Err(ConfigError::Invalid("run_duration_ms must be > 0".into()));
        }
        if self.status_interval_ms == 0 {
            return Err(ConfigError::Invalid("status_interval_ms must be > 0".into()));
        }
        self.produce_interval_ms.validate("produce_interval_ms")?;
        self.process_interval_ms.validate("process_interval_ms")?;
        Ok(())
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_millis(self.run_duration_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    /// Sentinels inserted by the shutdown protocol.
    pub fn sentinel_count(&self) -> usize {
        match self.shutdown {
            ShutdownMode::PerConsumer => self.consumers,
            ShutdownMode::Relay => 1,
        }
    }
}
