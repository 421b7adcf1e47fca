//! Configuration for the reactive event bus.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// When false every emit is a silent no-op.
    /// Default: true
    pub enabled: bool,

    /// Maximum number of events kept in history.
    /// Default: 1000
    pub buffer_size: usize,

    /// How long the dispatcher waits on the intake queue before re-checking
    /// the stop signal.
    /// Default: 100
    pub poll_interval_ms: u64,

    /// Upper bound on draining the queue during `stop`.
    /// Default: 2000
    pub shutdown_timeout_ms: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 1000,
            poll_interval_ms: 100,
            shutdown_timeout_ms: 2_000,
        }
    }
}

impl EventBusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus that accepts nothing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EventBusConfig::default();
        assert!(config.enabled);
        assert_eq!(config.buffer_size, 1000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EventBusConfig = serde_json::from_str(r#"{"buffer_size": 5}"#).unwrap();
        assert_eq!(config.buffer_size, 5);
        assert!(config.enabled);
        assert_eq!(config.poll_interval_ms, 100);
    }
}
