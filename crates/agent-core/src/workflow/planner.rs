use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::workflow::state::WorkflowState;

/// Proposes the next actions for a run. Stands in for the LLM.
///
/// Returns the raw wire form: a JSON array of `{"<action_name>": {...}}`
/// objects. The graph validates it before anything executes.
#[async_trait]
pub trait ActionPlanner: Send + Sync {
    async fn plan(&self, state: &WorkflowState) -> anyhow::Result<Value>;
}

/// Planner that replays a fixed sequence of plans, one per call, then
/// finishes the task.
#[derive(Debug)]
pub struct ScriptedPlanner {
    plans: Vec<Value>,
    cursor: AtomicUsize,
}

impl ScriptedPlanner {
    pub fn new(plans: Vec<Value>) -> Self {
        Self {
            plans,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionPlanner for ScriptedPlanner {
    async fn plan(&self, _state: &WorkflowState) -> anyhow::Result<Value> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .plans
            .get(index)
            .cloned()
            .unwrap_or_else(|| json!([{ "done": { "text": "No more steps" } }])))
    }
}
