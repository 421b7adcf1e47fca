//! Event model carried on the reactive bus.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use soulbrowser_core_types::{SessionId, TaskId};

/// Coarse grouping used by category subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Agent,
    Action,
    Browser,
    Error,
    Recovery,
    Workflow,
    User,
    System,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Agent => "agent",
            EventCategory::Action => "action",
            EventCategory::Browser => "browser",
            EventCategory::Error => "error",
            EventCategory::Recovery => "recovery",
            EventCategory::Workflow => "workflow",
            EventCategory::User => "user",
            EventCategory::System => "system",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity attached to every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// Every event kind the orchestration core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentStarted,
    AgentStepStarted,
    AgentStepCompleted,
    AgentCompleted,
    AgentPaused,

    PlanStarted,
    PlanCompleted,
    ActionStarted,
    ActionCompleted,

    PageChanged,
    StateCaptured,

    ActionFailed,
    StateCaptureFailed,
    PlannerFailed,
    WorkflowFailed,

    RecoveryStarted,
    RecoverySucceeded,
    RecoveryFailed,
    RecoveryExhausted,

    WorkflowStarted,
    WorkflowNodeEntered,
    WorkflowCompleted,
    WorkflowEscalated,

    UserInputRequested,

    SystemStartup,
    SystemShutdown,
}

impl EventType {
    pub fn category(&self) -> EventCategory {
        use EventType::*;
        match self {
            AgentStarted | AgentStepStarted | AgentStepCompleted | AgentCompleted
            | AgentPaused => EventCategory::Agent,
            PlanStarted | PlanCompleted | ActionStarted | ActionCompleted => {
                EventCategory::Action
            }
            PageChanged | StateCaptured => EventCategory::Browser,
            ActionFailed | StateCaptureFailed | PlannerFailed | WorkflowFailed => {
                EventCategory::Error
            }
            RecoveryStarted | RecoverySucceeded | RecoveryFailed | RecoveryExhausted => {
                EventCategory::Recovery
            }
            WorkflowStarted | WorkflowNodeEntered | WorkflowCompleted | WorkflowEscalated => {
                EventCategory::Workflow
            }
            UserInputRequested => EventCategory::User,
            SystemStartup | SystemShutdown => EventCategory::System,
        }
    }

    /// Severity used when the emitter does not override it.
    pub fn default_severity(&self) -> Severity {
        use EventType::*;
        match self {
            ActionFailed | StateCaptureFailed | PlannerFailed | WorkflowFailed
            | RecoveryFailed => Severity::Error,
            RecoveryExhausted | WorkflowEscalated => Severity::Critical,
            PageChanged | AgentPaused | UserInputRequested => Severity::Warning,
            WorkflowNodeEntered | StateCaptured => Severity::Debug,
            _ => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use EventType::*;
        match self {
            AgentStarted => "agent_started",
            AgentStepStarted => "agent_step_started",
            AgentStepCompleted => "agent_step_completed",
            AgentCompleted => "agent_completed",
            AgentPaused => "agent_paused",
            PlanStarted => "plan_started",
            PlanCompleted => "plan_completed",
            ActionStarted => "action_started",
            ActionCompleted => "action_completed",
            PageChanged => "page_changed",
            StateCaptured => "state_captured",
            ActionFailed => "action_failed",
            StateCaptureFailed => "state_capture_failed",
            PlannerFailed => "planner_failed",
            WorkflowFailed => "workflow_failed",
            RecoveryStarted => "recovery_started",
            RecoverySucceeded => "recovery_succeeded",
            RecoveryFailed => "recovery_failed",
            RecoveryExhausted => "recovery_exhausted",
            WorkflowStarted => "workflow_started",
            WorkflowNodeEntered => "workflow_node_entered",
            WorkflowCompleted => "workflow_completed",
            WorkflowEscalated => "workflow_escalated",
            UserInputRequested => "user_input_requested",
            SystemStartup => "system_startup",
            SystemShutdown => "system_shutdown",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable event record appended to the bus history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactiveEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub category: EventCategory,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub priority: i32,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub metadata: Value,
}

impl ReactiveEvent {
    pub fn new(source: impl Into<String>, event_type: EventType, metadata: Value) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            category: event_type.category(),
            severity: event_type.default_severity(),
            event_type,
            source: source.into(),
            priority: 0,
            timestamp: Utc::now(),
            session_id: None,
            task_id: None,
            metadata,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Read a string field from the metadata object.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn category_follows_event_type() {
        let event = ReactiveEvent::new("executor", EventType::ActionFailed, json!({}));
        assert_eq!(event.category, EventCategory::Error);
        assert_eq!(event.severity, Severity::Error);
    }

    #[test]
    fn json_round_trip_preserves_type_category_and_metadata() {
        let metadata = json!({
            "action": "click_element",
            "index": 5,
            "nested": { "attempts": [1, 2, 3], "ok": false },
        });
        let event = ReactiveEvent::new("executor", EventType::PageChanged, metadata.clone())
            .with_task(TaskId("task-1".to_string()))
            .with_priority(3);

        let raw = event.to_json().expect("serialize");
        let decoded = ReactiveEvent::from_json(&raw).expect("deserialize");

        assert_eq!(decoded.event_type, EventType::PageChanged);
        assert_eq!(decoded.category, EventCategory::Browser);
        assert_eq!(decoded.metadata, metadata);
        assert_eq!(decoded, event);
    }

    #[test]
    fn wire_shape_uses_snake_case_and_rfc3339() {
        let event = ReactiveEvent::new("bus", EventType::SystemShutdown, json!({}));
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["event_type"], "system_shutdown");
        assert_eq!(value["category"], "system");
        let ts = value["timestamp"].as_str().expect("timestamp string");
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
        assert!(value.get("session_id").is_none());
    }
}
