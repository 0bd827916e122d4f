#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! Every knob has a default matching the behavior the runtime is tuned for;
//! an embedder only overrides what it needs. With the `policy-config`
//! feature the configuration can also be loaded from TOML or JSON.
//!
//! ```toml
//! micro_task_capacity = 2048
//! dirty_check_interval_ms = 250
//!
//! [connect_queue]
//! minimum_immediate = 50
//! ```

use web_time::Duration;

#[cfg(feature = "policy-config")]
use std::path::Path;

#[cfg(feature = "policy-config")]
use crate::error::ConfigError;

/// Limits for deferred connects.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "policy-config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct ConnectQueueConfig {
    /// Connects that run synchronously before the queue starts deferring.
    pub minimum_immediate: usize,
    /// Time a flush may spend before yielding to the next frame.
    pub frame_budget_ms: u64,
}

impl Default for ConnectQueueConfig {
    fn default() -> Self {
        Self {
            minimum_immediate: 100,
            frame_budget_ms: 15,
        }
    }
}

impl ConnectQueueConfig {
    #[must_use]
    pub fn frame_budget(&self) -> Duration {
        Duration::from_millis(self.frame_budget_ms)
    }
}

/// Configuration for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "policy-config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct EngineConfig {
    /// Processed microtasks kept before the queue compacts itself.
    pub micro_task_capacity: usize,
    /// Polling interval of the dirty checker.
    pub dirty_check_interval_ms: u64,
    /// Record where each task was queued and attach it to task errors.
    pub long_stacks: bool,
    /// Observe getter properties through dependency recording instead of
    /// dirty checking.
    pub computed_observation: bool,
    pub connect_queue: ConnectQueueConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            micro_task_capacity: 1024,
            dirty_check_interval_ms: 120,
            long_stacks: false,
            computed_observation: true,
            connect_queue: ConnectQueueConfig::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn dirty_check_interval(&self) -> Duration {
        Duration::from_millis(self.dirty_check_interval_ms)
    }

    #[must_use]
    pub fn with_long_stacks(mut self, enabled: bool) -> Self {
        self.long_stacks = enabled;
        self
    }

    #[must_use]
    pub fn with_computed_observation(mut self, enabled: bool) -> Self {
        self.computed_observation = enabled;
        self
    }

    #[must_use]
    pub fn with_micro_task_capacity(mut self, capacity: usize) -> Self {
        self.micro_task_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_dirty_check_interval_ms(mut self, interval_ms: u64) -> Self {
        self.dirty_check_interval_ms = interval_ms;
        self
    }

    #[must_use]
    pub fn with_minimum_immediate_connects(mut self, count: usize) -> Self {
        self.connect_queue.minimum_immediate = count;
        self
    }
}

#[cfg(feature = "policy-config")]
impl EngineConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Parse a JSON document. Missing keys keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a `.toml` or `.json` file, chosen by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("json") => Self::from_json_str(&text),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or_default().to_owned(),
            )),
        }
    }
}
