//! Graph-based step sequencing built on the plan executor, the registry and
//! the event bus.
//!
//! # Key Components
//!
//! - [`WorkflowGraph`]: drives the fixed node graph for one task
//! - [`WorkflowState`]: mutable record threaded through every node
//! - [`ActionPlanner`]: proposes actions (LLM stand-in)
//! - [`ParallelActionExecutor`]: bounded batches of index-free actions

pub mod graph;
pub mod parallel;
pub mod planner;
pub mod routing;
pub mod state;

pub use graph::{WorkflowGraph, WorkflowOutcome};
pub use parallel::ParallelActionExecutor;
pub use planner::{ActionPlanner, ScriptedPlanner};
pub use routing::{route_after_error, route_after_evaluation, ErrorRoute, EvaluationRoute};
pub use state::{
    ErrorContext, MessageRole, WorkflowMessage, WorkflowNode, WorkflowState, WorkflowStatus,
};
