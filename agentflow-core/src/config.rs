//! Engine and message bus settings

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Workflow engine behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound of concurrently running steps within one batch
    pub max_concurrent_steps: Option<usize>,
    /// Wrap agent invocations with the agent's `max_retries`
    pub retry_failed_steps: bool,
    pub backoff_factor: f64,
    /// Applied to agents that declare no `timeout_seconds`
    pub default_step_timeout_seconds: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_steps: None,
            retry_failed_steps: false,
            backoff_factor: 2.0,
            default_step_timeout_seconds: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_steps == Some(0) {
            return Err(Error::configuration(
                "engine.max_concurrent_steps must be greater than 0",
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 0.0 {
            return Err(Error::configuration(
                "engine.backoff_factor must be a non-negative number",
            ));
        }
        if self.default_step_timeout_seconds == Some(0) {
            return Err(Error::configuration(
                "engine.default_step_timeout_seconds must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Message bus behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    pub poll_interval_ms: u64,
    /// Oldest messages are dropped from history beyond this bound
    pub max_history: usize,
    /// Undelivered messages beyond this bound are dropped, oldest first
    pub max_pending: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            max_history: 10_000,
            max_pending: 10_000,
        }
    }
}

impl BusConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::configuration(
                "bus.poll_interval_ms must be greater than 0",
            ));
        }
        if self.max_pending == 0 {
            return Err(Error::configuration("bus.max_pending must be greater than 0"));
        }
        Ok(())
    }
}
