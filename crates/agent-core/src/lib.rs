//! Action orchestration core.
//!
//! Executes LLM-proposed action plans against a page that can change under
//! them, reacts to failures published on the event bus, and optionally drives
//! whole tasks through a small fixed workflow graph.

pub mod config;
pub mod errors;
pub mod events;
pub mod plan_executor;
pub mod recovery;
pub mod state;
pub mod workflow;

pub use config::OrchestratorConfig;
pub use errors::{AgentError, ErrorClass};
pub use events::EventEmitter;
pub use plan_executor::PlanExecutor;
pub use recovery::{
    RecoveryContext, RecoveryCoordinator, RecoveryStats, RecoveryStrategy,
    RegistryRecoveryStrategy,
};
pub use state::{never_pause, BrowserStateProvider, PauseCheck};
pub use workflow::{
    ActionPlanner, ErrorRoute, EvaluationRoute, ParallelActionExecutor, ScriptedPlanner,
    WorkflowGraph, WorkflowOutcome, WorkflowState, WorkflowStatus,
};
