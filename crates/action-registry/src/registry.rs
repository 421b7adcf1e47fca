use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::action::Action;
use crate::context::ActionContext;
use crate::errors::ActionError;
use crate::result::ActionResult;

/// Raw value produced by a handler, normalized by the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    Empty,
    Text(String),
    Result(ActionResult),
    Other(Value),
}

impl HandlerOutput {
    pub fn into_action_result(self, action: &str) -> Result<ActionResult, ActionError> {
        match self {
            HandlerOutput::Empty => Ok(ActionResult::default()),
            HandlerOutput::Text(text) => Ok(ActionResult::extracted(text)),
            HandlerOutput::Result(result) => Ok(result),
            HandlerOutput::Other(Value::Null) => Ok(ActionResult::default()),
            HandlerOutput::Other(Value::String(text)) => Ok(ActionResult::extracted(text)),
            HandlerOutput::Other(other) => Err(ActionError::InvalidHandlerResult {
                action: action.to_string(),
                detail: format!("expected text or an action result, got {other}"),
            }),
        }
    }
}

impl From<()> for HandlerOutput {
    fn from(_: ()) -> Self {
        HandlerOutput::Empty
    }
}

impl From<String> for HandlerOutput {
    fn from(value: String) -> Self {
        HandlerOutput::Text(value)
    }
}

impl From<&str> for HandlerOutput {
    fn from(value: &str) -> Self {
        HandlerOutput::Text(value.to_string())
    }
}

impl From<ActionResult> for HandlerOutput {
    fn from(value: ActionResult) -> Self {
        HandlerOutput::Result(value)
    }
}

impl From<Value> for HandlerOutput {
    fn from(value: Value) -> Self {
        HandlerOutput::Other(value)
    }
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn call(&self, action: &Action, ctx: &ActionContext) -> anyhow::Result<HandlerOutput>;
}

/// Adapter turning an async closure into an [`ActionHandler`].
pub struct FnHandler<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(Action, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<HandlerOutput>> + Send + 'static,
{
    async fn call(&self, action: &Action, ctx: &ActionContext) -> anyhow::Result<HandlerOutput> {
        (self.func)(action.clone(), ctx.clone()).await
    }
}

pub fn handler_fn<F, Fut>(func: F) -> Arc<dyn ActionHandler>
where
    F: Fn(Action, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<HandlerOutput>> + Send + 'static,
{
    Arc::new(FnHandler { func })
}

/// Public description of a registered action, used for prompt building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    pub description: String,
    pub param_schema: Value,
}

impl ActionDescriptor {
    fn prompt_block(&self) -> String {
        let mut lines = vec![format!("• {}: {}", self.name, self.description)];
        if let Some(properties) = self.param_schema.get("properties").and_then(Value::as_object) {
            if !properties.is_empty() {
                let required: Vec<&str> = self
                    .param_schema
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                let fields: Vec<String> = properties
                    .keys()
                    .map(|key| {
                        if required.contains(&key.as_str()) {
                            key.clone()
                        } else {
                            format!("{key}?")
                        }
                    })
                    .collect();
                lines.push(format!("  Parameters: {}", fields.join(", ")));
            }
        }
        lines.join("\n")
    }
}

struct RegisteredAction {
    descriptor: ActionDescriptor,
    handler: Arc<dyn ActionHandler>,
}

/// Name to handler table. Built once at startup and shared behind an `Arc`.
#[derive(Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, RegisteredAction>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        param_schema: Value,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<(), ActionError> {
        if !Action::is_known_name(name) {
            return Err(ActionError::UnknownAction(name.to_string()));
        }
        if self.actions.contains_key(name) {
            return Err(ActionError::DuplicateAction(name.to_string()));
        }
        self.actions.insert(
            name.to_string(),
            RegisteredAction {
                descriptor: ActionDescriptor {
                    name: name.to_string(),
                    description: description.to_string(),
                    param_schema,
                },
                handler,
            },
        );
        Ok(())
    }

    /// Register with the parameter schema derived from `P`.
    pub fn register_action<P: JsonSchema>(
        &mut self,
        name: &str,
        description: &str,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<(), ActionError> {
        let schema = serde_json::to_value(schemars::schema_for!(P))
            .map_err(|err| ActionError::invalid_parameters(name, err.to_string()))?;
        self.register(name, description, schema, handler)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    pub fn descriptors(&self) -> Vec<ActionDescriptor> {
        self.actions
            .values()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    pub fn prompt_description(&self) -> String {
        self.actions
            .values()
            .map(|entry| entry.descriptor.prompt_block())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn execute(
        &self,
        action: &Action,
        ctx: &ActionContext,
    ) -> Result<ActionResult, ActionError> {
        let name = action.name();
        action.validate()?;
        let entry = self
            .actions
            .get(name)
            .ok_or_else(|| ActionError::UnknownAction(name.to_string()))?;

        let started = Instant::now();
        let output = entry.handler.call(action, ctx).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match output {
            Ok(output) => {
                let result = output.into_action_result(name)?;
                debug!(action = name, elapsed_ms, error = result.error.is_some(), "action executed");
                Ok(result)
            }
            Err(err) => {
                warn!(action = name, elapsed_ms, error = %err, "action handler failed");
                match err.downcast::<ActionError>() {
                    Ok(action_error) => Err(action_error),
                    Err(other) => Err(ActionError::Handler(other)),
                }
            }
        }
    }

    /// Parse a wire-format action and execute it.
    pub async fn execute_json(
        &self,
        value: &Value,
        ctx: &ActionContext,
    ) -> Result<ActionResult, ActionError> {
        let action = Action::from_json(value)?;
        self.execute(&action, ctx).await
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}
