use std::fmt;
use std::sync::Arc;

use action_registry::{Action, ActionResult};
use serde::{Deserialize, Serialize};
use soulbrowser_core_types::{BrowserStateSnapshot, TaskId};
use soulbrowser_event_bus::ReactiveEvent;

use crate::errors::ErrorClass;

/// Named steps of the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowNode {
    AnalyzeState,
    ProcessEvents,
    PlanActions,
    ExecuteActions,
    EvaluateResults,
    HandleErrors,
}

impl WorkflowNode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowNode::AnalyzeState => "analyze_state",
            WorkflowNode::ProcessEvents => "process_events",
            WorkflowNode::PlanActions => "plan_actions",
            WorkflowNode::ExecuteActions => "execute_actions",
            WorkflowNode::EvaluateResults => "evaluate_results",
            WorkflowNode::HandleErrors => "handle_errors",
        }
    }
}

impl fmt::Display for WorkflowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Still iterating (internal state).
    Running,
    /// A `done` action finished the task.
    Completed,
    /// An action asked the user for input.
    AwaitingUserInput,
    /// Reached the step limit without completion.
    MaxStepsReached,
    /// The pause predicate fired.
    Cancelled,
    /// Retries were exhausted.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One entry of the run's message history, consumed by planners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMessage {
    pub role: MessageRole,
    pub content: String,
}

impl WorkflowMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Failure recorded by a node and consumed by routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub message: String,
    pub class: ErrorClass,
    pub node: WorkflowNode,
    /// The failure was already published on the bus by the component that
    /// hit it.
    #[serde(default)]
    pub reported: bool,
}

impl ErrorContext {
    pub fn new(node: WorkflowNode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            class: ErrorClass::classify(&message),
            message,
            node,
            reported: false,
        }
    }

    pub fn with_class(mut self, class: ErrorClass) -> Self {
        self.class = class;
        self
    }

    pub fn reported(mut self) -> Self {
        self.reported = true;
        self
    }
}

/// Mutable record threaded through every node of one run.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub task: String,
    pub task_id: TaskId,
    pub messages: Vec<WorkflowMessage>,
    pub snapshot: Option<Arc<BrowserStateSnapshot>>,
    pub pending_actions: Vec<Action>,
    pub last_results: Vec<ActionResult>,
    /// Every result produced during the run, in order.
    pub all_results: Vec<ActionResult>,
    pub retry_count: u32,
    pub error: Option<ErrorContext>,
    /// Most recent handled error, kept so the planner can choose an
    /// alternative.
    pub last_error: Option<ErrorContext>,
    pub should_continue: bool,
    pub step: u32,
    pub pending_events: Vec<ReactiveEvent>,
    pub status: WorkflowStatus,
}

impl WorkflowState {
    pub fn new(task: impl Into<String>) -> Self {
        let task = task.into();
        Self {
            messages: vec![WorkflowMessage::user(task.clone())],
            task,
            task_id: TaskId::new(),
            snapshot: None,
            pending_actions: Vec::new(),
            last_results: Vec::new(),
            all_results: Vec::new(),
            retry_count: 0,
            error: None,
            last_error: None,
            should_continue: true,
            step: 0,
            pending_events: Vec::new(),
            status: WorkflowStatus::Running,
        }
    }

    pub fn with_task_id(mut self, task_id: TaskId) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn set_error(&mut self, error: ErrorContext) {
        self.error = Some(error);
    }

    /// Mark the run terminal with `status`.
    pub fn finish(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.should_continue = false;
    }

    pub fn is_terminal(&self) -> bool {
        !self.should_continue
    }
}
