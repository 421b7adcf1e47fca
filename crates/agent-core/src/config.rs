//! Configuration for plan execution, recovery and the workflow graph.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use soulbrowser_event_bus::EventBusConfig;

/// Orchestration settings shared by every component of the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of events kept in bus history.
    /// Default: 1000
    pub event_buffer_size: usize,

    /// When false the bus accepts nothing and recovery never runs.
    /// Default: true
    pub enable_event_system: bool,

    /// Attach the recovery coordinator to the bus.
    /// Default: true
    pub auto_recovery: bool,

    /// Upper bound on one parallel batch of index-free actions.
    /// Values of 0 or 1 disable parallel execution.
    /// Default: 3
    pub max_parallel_actions: usize,

    /// Settle delay between consecutive plan actions, in milliseconds.
    /// Default: 500
    pub wait_between_actions_ms: u64,

    /// Recovery attempts (and workflow retries) before escalation.
    /// Default: 3
    pub max_retries: u32,

    /// Re-fetch page state before index-addressed actions and stop the plan
    /// when new elements appeared.
    /// Default: true
    pub check_for_new_elements: bool,

    /// Workflow iterations before forcing stop.
    /// Default: 100
    pub max_steps: u32,

    /// Dispatcher intake poll interval in milliseconds.
    /// Default: 100
    pub dispatch_poll_interval_ms: u64,

    /// Bus drain timeout on stop, in milliseconds.
    /// Default: 2000
    pub shutdown_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            enable_event_system: true,
            auto_recovery: true,
            max_parallel_actions: 3,
            wait_between_actions_ms: 500,
            max_retries: 3,
            check_for_new_elements: true,
            max_steps: 100,
            dispatch_poll_interval_ms: 100,
            shutdown_timeout_ms: 2_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config for tests: no settle delay, small budgets.
    pub fn minimal() -> Self {
        Self {
            event_buffer_size: 100,
            wait_between_actions_ms: 0,
            max_steps: 10,
            dispatch_poll_interval_ms: 10,
            shutdown_timeout_ms: 500,
            ..Self::default()
        }
    }

    /// Builder: set max steps.
    pub fn max_steps(mut self, steps: u32) -> Self {
        self.max_steps = steps;
        self
    }

    /// Builder: set max retries.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Builder: set the settle delay between actions.
    pub fn wait_between(mut self, ms: u64) -> Self {
        self.wait_between_actions_ms = ms;
        self
    }

    pub fn parallel_actions(mut self, count: usize) -> Self {
        self.max_parallel_actions = count;
        self
    }

    pub fn auto_recovery(mut self, enabled: bool) -> Self {
        self.auto_recovery = enabled;
        self
    }

    pub fn event_system(mut self, enabled: bool) -> Self {
        self.enable_event_system = enabled;
        self
    }

    pub fn check_new_elements(mut self, enabled: bool) -> Self {
        self.check_for_new_elements = enabled;
        self
    }

    pub fn wait_between_actions(&self) -> Duration {
        Duration::from_millis(self.wait_between_actions_ms)
    }

    pub fn parallel_enabled(&self) -> bool {
        self.max_parallel_actions > 1
    }

    pub fn event_bus_config(&self) -> EventBusConfig {
        EventBusConfig {
            enabled: self.enable_event_system,
            buffer_size: self.event_buffer_size,
            poll_interval_ms: self.dispatch_poll_interval_ms,
            shutdown_timeout_ms: self.shutdown_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.event_buffer_size, 1000);
        assert_eq!(config.max_parallel_actions, 3);
        assert_eq!(config.wait_between_actions(), Duration::from_millis(500));
        assert_eq!(config.max_retries, 3);
        assert!(config.enable_event_system);
        assert!(config.auto_recovery);
        assert!(config.check_for_new_elements);
    }

    #[test]
    fn test_builder() {
        let config = OrchestratorConfig::new()
            .max_steps(5)
            .max_retries(1)
            .parallel_actions(1)
            .auto_recovery(false);
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.max_retries, 1);
        assert!(!config.parallel_enabled());
        assert!(!config.auto_recovery);
    }

    #[test]
    fn test_bus_config_follows_settings() {
        let bus = OrchestratorConfig::new().event_system(false).event_bus_config();
        assert!(!bus.enabled);
        assert_eq!(bus.buffer_size, 1000);
    }
}
