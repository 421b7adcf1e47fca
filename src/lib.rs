//! SoulBrowser orchestration core.
//!
//! Re-exports the workspace crates and adds the pieces an embedding process
//! needs: settings loading, tracing setup and the [`AgentRuntime`] facade.

pub mod config;
pub mod observability;
pub mod runtime;

pub use action_registry;
pub use agent_core;
pub use soulbrowser_core_types as core_types;
pub use soulbrowser_event_bus as event_bus;

pub use action_registry::{
    default_registry, Action, ActionContext, ActionError, ActionRegistry, ActionResult,
    BrowserPage, PageExtractor,
};
pub use agent_core::{
    ActionPlanner, AgentError, BrowserStateProvider, ErrorClass, OrchestratorConfig,
    PlanExecutor, RecoveryCoordinator, RecoveryStrategy, WorkflowGraph, WorkflowOutcome,
    WorkflowStatus,
};
pub use config::{load_settings, OrchestratorSettings, SettingsLoader};
pub use observability::init_tracing;
pub use runtime::{AgentRuntime, AgentRuntimeBuilder};
pub use soulbrowser_core_types::{BrowserStateSnapshot, DomElement, ElementFingerprint};
pub use soulbrowser_event_bus::{EventType, ReactiveEvent, ReactiveEventBus};
