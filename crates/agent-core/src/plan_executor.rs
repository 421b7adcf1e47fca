//! Sequential execution of one action plan against one page snapshot.
//!
//! Element indices in a plan refer to the snapshot the plan was built from.
//! Before every index-addressed action after the first, the executor
//! re-captures page state and stops the plan when elements appeared that the
//! last validated fingerprint set does not contain. Elements that disappeared
//! do not stop the plan.

use std::sync::Arc;
use std::time::{Duration, Instant};

use action_registry::{Action, ActionContext, ActionError, ActionRegistry, ActionResult};
use serde_json::json;
use soulbrowser_core_types::{BrowserStateSnapshot, FingerprintSet, TaskId};
use soulbrowser_event_bus::{EventType, ReactiveEventBus};
use tracing::{debug, info, warn};

use crate::errors::{AgentError, ErrorClass};
use crate::events::EventEmitter;
use crate::state::{BrowserStateProvider, PauseCheck};

const SOURCE: &str = "plan_executor";

/// Runs action plans through the registry, one action at a time.
pub struct PlanExecutor {
    registry: Arc<ActionRegistry>,
    provider: Arc<dyn BrowserStateProvider>,
    context: ActionContext,
    events: EventEmitter,
    wait_between_actions: Duration,
}

impl PlanExecutor {
    pub fn new(registry: Arc<ActionRegistry>, provider: Arc<dyn BrowserStateProvider>) -> Self {
        Self {
            registry,
            provider,
            context: ActionContext::default(),
            events: EventEmitter::silent(SOURCE),
            wait_between_actions: Duration::from_millis(500),
        }
    }

    pub fn with_bus(mut self, bus: Arc<ReactiveEventBus>) -> Self {
        self.events = EventEmitter::new(Some(bus), SOURCE);
        self
    }

    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.events = self.events.with_task(task_id);
        self
    }

    pub fn with_context(mut self, context: ActionContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_wait_between_actions(mut self, wait: Duration) -> Self {
        self.wait_between_actions = wait;
        self
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &ActionContext {
        &self.context
    }

    /// Execute `actions` in order against `snapshot`.
    ///
    /// Returns one result per executed action, plus one synthetic result when
    /// the plan was cut short by new page elements or a failed state capture.
    /// Handler failures become error results; malformed actions and
    /// unsupported handler output abort the plan with
    /// [`AgentError::ActionAborted`], which keeps the results produced so far.
    pub async fn run(
        &self,
        actions: &[Action],
        snapshot: Arc<BrowserStateSnapshot>,
        pause: PauseCheck<'_>,
        check_new_elements: bool,
    ) -> Result<Vec<ActionResult>, AgentError> {
        let started = Instant::now();
        let mut results = Vec::with_capacity(actions.len());
        let mut validated: FingerprintSet = snapshot.fingerprints().clone();

        info!(
            actions = actions.len(),
            url = %snapshot.url,
            elements = snapshot.element_count(),
            "executing plan"
        );
        self.events.emit(
            EventType::PlanStarted,
            json!({ "action_count": actions.len(), "url": snapshot.url }),
        );

        for (i, action) in actions.iter().enumerate() {
            if pause() {
                info!(completed = results.len(), "plan paused");
                self.events
                    .emit(EventType::AgentPaused, json!({ "completed": results.len() }));
                break;
            }

            if i > 0 && check_new_elements && action.is_index_addressed() {
                let fresh = match self.provider.get_state().await {
                    Ok(fresh) => fresh,
                    Err(err) => {
                        let message = format!("Failed to capture browser state: {err}");
                        warn!(index = i, error = %err, "state capture failed during plan");
                        self.events.emit(
                            EventType::StateCaptureFailed,
                            json!({
                                "index": i,
                                "error": message,
                                "class": ErrorClass::classify(&message),
                                "phase": SOURCE,
                            }),
                        );
                        results.push(ActionResult::error(message));
                        break;
                    }
                };
                let appeared = fresh.fingerprints().appeared_since(&validated);
                if !appeared.is_empty() {
                    let message =
                        format!("Something new appeared after action {} / {}", i, actions.len());
                    info!(
                        index = i,
                        new_elements = appeared.len(),
                        "page changed, stopping plan"
                    );
                    self.events.emit(
                        EventType::PageChanged,
                        json!({
                            "index": i,
                            "action": action.name(),
                            "new_elements": appeared.len(),
                            "url": fresh.url,
                        }),
                    );
                    results.push(ActionResult::in_memory(message));
                    break;
                }
                validated = fresh.fingerprints().clone();
            }

            let result = match self.execute_one(i, action).await {
                Ok(result) => result,
                Err(source) => return Err(AgentError::ActionAborted { source, results }),
            };
            let stop = result.is_terminal() || i + 1 == actions.len();
            results.push(result);
            if stop {
                break;
            }

            if !self.wait_between_actions.is_zero() {
                tokio::time::sleep(self.wait_between_actions).await;
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(results = results.len(), elapsed_ms, "plan finished");
        self.events.emit(
            EventType::PlanCompleted,
            json!({
                "action_count": actions.len(),
                "result_count": results.len(),
                "elapsed_ms": elapsed_ms,
            }),
        );
        Ok(results)
    }

    async fn execute_one(&self, index: usize, action: &Action) -> Result<ActionResult, ActionError> {
        let name = action.name();
        self.events.emit(
            EventType::ActionStarted,
            json!({ "index": index, "action": name }),
        );

        let result = match self.registry.execute(action, &self.context).await {
            Ok(result) => result,
            Err(ActionError::Handler(err)) => ActionResult::error(err.to_string()),
            Err(err) => {
                warn!(index, action = name, error = %err, "action rejected");
                self.events.emit(
                    EventType::ActionFailed,
                    json!({
                        "index": index,
                        "action": name,
                        "error": err.to_string(),
                        "class": ErrorClass::Validation,
                        "phase": SOURCE,
                        "fatal": true,
                    }),
                );
                return Err(err);
            }
        };

        if let Some(error) = &result.error {
            warn!(index, action = name, error = %error, "action failed");
            self.events.emit(
                EventType::ActionFailed,
                json!({
                    "index": index,
                    "action": name,
                    "error": error,
                    "class": ErrorClass::classify(error),
                    "phase": SOURCE,
                }),
            );
        } else {
            self.events.emit(
                EventType::ActionCompleted,
                json!({
                    "index": index,
                    "action": name,
                    "is_done": result.is_done,
                }),
            );
        }

        if let Some(request) = &result.user_input_request {
            self.events.emit(
                EventType::UserInputRequested,
                json!({
                    "index": index,
                    "prompt": request.prompt,
                    "input_type": request.input_type,
                    "options": request.options,
                }),
            );
        }

        Ok(result)
    }
}
