//! Fixed workflow graph:
//!
//! ```text
//! analyze_state -> process_events -> plan_actions -> execute_actions -> evaluate_results
//! evaluate_results --continue--> analyze_state
//! evaluate_results --error-----> handle_errors
//! evaluate_results --complete--> END
//! handle_errors    --retry-----> analyze_state
//! handle_errors    --alternative> plan_actions
//! handle_errors    --escalate--> END (RecoveryExhausted)
//! ```

use std::sync::Arc;
use std::time::Instant;

use action_registry::{Action, ActionContext, ActionRegistry, ActionResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use soulbrowser_event_bus::{
    callback, EventCategory, EventType, ReactiveEvent, ReactiveEventBus, SubscriptionId,
};
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::errors::{AgentError, ErrorClass};
use crate::events::EventEmitter;
use crate::plan_executor::PlanExecutor;
use crate::state::{BrowserStateProvider, PauseCheck};
use crate::workflow::parallel::ParallelActionExecutor;
use crate::workflow::planner::ActionPlanner;
use crate::workflow::routing::{route_after_error, route_after_evaluation, ErrorRoute, EvaluationRoute};
use crate::workflow::state::{
    ErrorContext, WorkflowMessage, WorkflowNode, WorkflowState, WorkflowStatus,
};

const SOURCE: &str = "workflow";

/// Result of a workflow run that did not escalate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub status: WorkflowStatus,
    pub steps: u32,
    pub retries: u32,
    /// Every action result produced during the run.
    pub results: Vec<ActionResult>,
    pub messages: Vec<WorkflowMessage>,
    pub total_time_ms: u64,
}

impl WorkflowOutcome {
    fn from_state(state: WorkflowState, started: Instant) -> Self {
        Self {
            status: state.status,
            steps: state.step,
            retries: state.retry_count,
            results: state.all_results,
            messages: state.messages,
            total_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, WorkflowStatus::Completed)
    }

    pub fn final_result(&self) -> Option<&ActionResult> {
        self.results.last()
    }
}

/// Buffers bus events between `process_events` visits.
#[derive(Default)]
struct EventInbox {
    events: Mutex<Vec<ReactiveEvent>>,
}

impl EventInbox {
    fn drain(&self) -> Vec<ReactiveEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

/// Graph-driven alternative to calling the plan executor in a loop.
pub struct WorkflowGraph {
    registry: Arc<ActionRegistry>,
    provider: Arc<dyn BrowserStateProvider>,
    planner: Arc<dyn ActionPlanner>,
    context: ActionContext,
    bus: Option<Arc<ReactiveEventBus>>,
    config: OrchestratorConfig,
}

impl WorkflowGraph {
    pub fn new(
        registry: Arc<ActionRegistry>,
        provider: Arc<dyn BrowserStateProvider>,
        planner: Arc<dyn ActionPlanner>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            provider,
            planner,
            context: ActionContext::default(),
            bus: None,
            config,
        }
    }

    pub fn with_bus(mut self, bus: Arc<ReactiveEventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_context(mut self, context: ActionContext) -> Self {
        self.context = context;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run `task` until completion, a terminal condition, or escalation.
    pub async fn run(
        &self,
        task: &str,
        pause: PauseCheck<'_>,
    ) -> Result<WorkflowOutcome, AgentError> {
        self.run_with_state(WorkflowState::new(task), pause).await
    }

    /// Run from a caller-prepared state (task id, seeded messages).
    pub async fn run_with_state(
        &self,
        mut state: WorkflowState,
        pause: PauseCheck<'_>,
    ) -> Result<WorkflowOutcome, AgentError> {
        let started = Instant::now();
        let events = EventEmitter::new(self.bus.clone(), SOURCE).with_task(state.task_id.clone());
        let executor = self.plan_executor(&state);
        let parallel_events =
            EventEmitter::new(self.bus.clone(), "parallel_executor").with_task(state.task_id.clone());
        let parallel = ParallelActionExecutor::new(
            Arc::clone(&self.registry),
            self.context.clone(),
            self.config.max_parallel_actions,
        )
        .with_events(parallel_events);

        let inbox = Arc::new(EventInbox::default());
        let subscriptions = self.subscribe_inbox(&inbox);

        info!(task_id = %state.task_id, task = %state.task, "workflow started");
        events.emit(
            EventType::WorkflowStarted,
            json!({ "task": state.task, "max_steps": self.config.max_steps }),
        );

        let outcome = self
            .drive(&mut state, &events, &executor, &parallel, &inbox, pause)
            .await;

        if let Some(bus) = &self.bus {
            for id in subscriptions {
                bus.unsubscribe(id);
            }
        }

        match outcome {
            Ok(()) => {
                info!(
                    task_id = %state.task_id,
                    status = ?state.status,
                    steps = state.step,
                    retries = state.retry_count,
                    "workflow finished"
                );
                events.emit(
                    EventType::WorkflowCompleted,
                    json!({
                        "status": state.status,
                        "steps": state.step,
                        "results": state.all_results.len(),
                    }),
                );
                Ok(WorkflowOutcome::from_state(state, started))
            }
            Err(err) => Err(err),
        }
    }

    fn plan_executor(&self, state: &WorkflowState) -> PlanExecutor {
        let mut executor = PlanExecutor::new(Arc::clone(&self.registry), Arc::clone(&self.provider))
            .with_context(self.context.clone())
            .with_wait_between_actions(self.config.wait_between_actions());
        if let Some(bus) = &self.bus {
            executor = executor.with_bus(Arc::clone(bus));
        }
        executor.with_task(state.task_id.clone())
    }

    fn subscribe_inbox(&self, inbox: &Arc<EventInbox>) -> Vec<SubscriptionId> {
        let Some(bus) = &self.bus else {
            return Vec::new();
        };
        [EventCategory::Recovery, EventCategory::User]
            .into_iter()
            .map(|category| {
                let inbox = Arc::clone(inbox);
                bus.subscribe(
                    category,
                    callback(move |event| {
                        inbox.events.lock().push(event.clone());
                        Ok(())
                    }),
                )
            })
            .collect()
    }

    async fn drive(
        &self,
        state: &mut WorkflowState,
        events: &EventEmitter,
        executor: &PlanExecutor,
        parallel: &ParallelActionExecutor,
        inbox: &EventInbox,
        pause: PauseCheck<'_>,
    ) -> Result<(), AgentError> {
        let mut node = WorkflowNode::AnalyzeState;
        loop {
            if pause() {
                info!(task_id = %state.task_id, step = state.step, "workflow paused");
                events.emit(EventType::AgentPaused, json!({ "step": state.step, "node": node }));
                state.finish(WorkflowStatus::Cancelled);
                return Ok(());
            }
            debug!(task_id = %state.task_id, node = %node, step = state.step, "entering node");
            events.emit(EventType::WorkflowNodeEntered, json!({ "node": node, "step": state.step }));

            node = match node {
                WorkflowNode::AnalyzeState => {
                    if state.step >= self.config.max_steps {
                        warn!(task_id = %state.task_id, max_steps = self.config.max_steps, "step limit reached");
                        state.finish(WorkflowStatus::MaxStepsReached);
                        return Ok(());
                    }
                    self.analyze_state(state, events).await;
                    WorkflowNode::ProcessEvents
                }
                WorkflowNode::ProcessEvents => {
                    self.process_events(state, inbox);
                    WorkflowNode::PlanActions
                }
                WorkflowNode::PlanActions => {
                    self.plan_actions(state, events).await;
                    WorkflowNode::ExecuteActions
                }
                WorkflowNode::ExecuteActions => {
                    self.execute_actions(state, executor, parallel, pause).await;
                    WorkflowNode::EvaluateResults
                }
                WorkflowNode::EvaluateResults => {
                    self.evaluate_results(state);
                    match route_after_evaluation(state) {
                        EvaluationRoute::Continue => WorkflowNode::AnalyzeState,
                        EvaluationRoute::Error => WorkflowNode::HandleErrors,
                        EvaluationRoute::Complete => {
                            if state.should_continue {
                                state.finish(WorkflowStatus::Completed);
                            }
                            return Ok(());
                        }
                    }
                }
                WorkflowNode::HandleErrors => match self.handle_errors(state, events).await {
                    ErrorRoute::Retry => WorkflowNode::AnalyzeState,
                    ErrorRoute::Alternative => WorkflowNode::PlanActions,
                    ErrorRoute::Escalate => {
                        let last_error = state
                            .error
                            .as_ref()
                            .map(|ctx| ctx.message.clone())
                            .unwrap_or_default();
                        warn!(
                            task_id = %state.task_id,
                            attempts = state.retry_count,
                            error = %last_error,
                            "workflow escalated"
                        );
                        events.emit(
                            EventType::WorkflowEscalated,
                            json!({ "attempts": state.retry_count, "error": last_error }),
                        );
                        state.finish(WorkflowStatus::Failed);
                        return Err(AgentError::RecoveryExhausted {
                            attempts: state.retry_count,
                            last_error,
                            results: std::mem::take(&mut state.all_results),
                        });
                    }
                },
            };
        }
    }

    async fn analyze_state(&self, state: &mut WorkflowState, events: &EventEmitter) {
        state.step += 1;
        match self.provider.get_state().await {
            Ok(snapshot) => {
                debug!(
                    task_id = %state.task_id,
                    url = %snapshot.url,
                    elements = snapshot.element_count(),
                    "state captured"
                );
                events.emit(
                    EventType::StateCaptured,
                    json!({
                        "step": state.step,
                        "url": snapshot.url,
                        "elements": snapshot.element_count(),
                    }),
                );
                state.snapshot = Some(snapshot);
            }
            Err(err) => {
                let err = AgentError::StateProvider(err);
                let message = err.to_string();
                warn!(task_id = %state.task_id, error = %message, "state capture failed");
                events.emit(
                    EventType::StateCaptureFailed,
                    json!({
                        "step": state.step,
                        "error": message,
                        "class": err.class(),
                        "phase": WorkflowNode::AnalyzeState,
                    }),
                );
                state.set_error(
                    ErrorContext::new(WorkflowNode::AnalyzeState, message)
                        .with_class(err.class())
                        .reported(),
                );
            }
        }
    }

    fn process_events(&self, state: &mut WorkflowState, inbox: &EventInbox) {
        state.pending_events.extend(inbox.drain());
        for event in state.pending_events.drain(..) {
            let note = match event.event_type {
                EventType::RecoverySucceeded => format!(
                    "Recovery action '{}' succeeded",
                    event.metadata_str("action").unwrap_or("unknown")
                ),
                EventType::RecoveryFailed => format!(
                    "Recovery failed: {}",
                    event.metadata_str("reason").unwrap_or("unknown")
                ),
                EventType::RecoveryExhausted => "Automatic recovery is exhausted".to_string(),
                EventType::UserInputRequested => format!(
                    "Waiting for user input: {}",
                    event.metadata_str("prompt").unwrap_or_default()
                ),
                _ => continue,
            };
            state.messages.push(WorkflowMessage::system(note));
        }
    }

    async fn plan_actions(&self, state: &mut WorkflowState, events: &EventEmitter) {
        if state.error.is_some() {
            return;
        }
        let proposal = match self.planner.plan(state).await {
            Ok(proposal) => proposal,
            Err(err) => {
                let err = AgentError::Planner(err);
                let message = err.to_string();
                warn!(task_id = %state.task_id, error = %message, "planner failed");
                events.emit(
                    EventType::PlannerFailed,
                    json!({ "error": message, "class": err.class(), "phase": WorkflowNode::PlanActions }),
                );
                state.set_error(
                    ErrorContext::new(WorkflowNode::PlanActions, message)
                        .with_class(err.class())
                        .reported(),
                );
                return;
            }
        };

        match Action::parse_plan(&proposal) {
            Ok(actions) if actions.is_empty() => {
                state.set_error(
                    ErrorContext::new(WorkflowNode::PlanActions, "planner proposed no actions")
                        .with_class(ErrorClass::Validation),
                );
            }
            Ok(actions) => {
                let names: Vec<&str> = actions.iter().map(Action::name).collect();
                info!(task_id = %state.task_id, step = state.step, actions = ?names, "actions planned");
                state
                    .messages
                    .push(WorkflowMessage::assistant(proposal.to_string()));
                state.pending_actions = actions;
            }
            Err(err) => {
                warn!(task_id = %state.task_id, error = %err, "planner output rejected");
                state.set_error(
                    ErrorContext::new(WorkflowNode::PlanActions, err.to_string())
                        .with_class(ErrorClass::Validation),
                );
            }
        }
    }

    async fn execute_actions(
        &self,
        state: &mut WorkflowState,
        executor: &PlanExecutor,
        parallel: &ParallelActionExecutor,
        pause: PauseCheck<'_>,
    ) {
        if state.error.is_some() {
            return;
        }
        let actions = std::mem::take(&mut state.pending_actions);
        let Some(snapshot) = state.snapshot.clone() else {
            state.set_error(ErrorContext::new(
                WorkflowNode::ExecuteActions,
                "no browser state available for execution",
            ));
            return;
        };

        let outcome = if self.config.parallel_enabled() && parallel.can_run(&actions) {
            parallel.run(&actions, pause).await
        } else {
            executor
                .run(&actions, snapshot, pause, self.config.check_for_new_elements)
                .await
        };

        match outcome {
            Ok(results) => {
                if let Some(error) = results.last().and_then(|r| r.error.clone()) {
                    // Already published as action_failed by the executor.
                    state.set_error(ErrorContext::new(WorkflowNode::ExecuteActions, error).reported());
                }
                state.all_results.extend(results.iter().cloned());
                state.last_results = results;
            }
            Err(err) => {
                let partial = err.partial_results().to_vec();
                state.all_results.extend(partial.iter().cloned());
                state.last_results = partial;
                state.set_error(
                    ErrorContext::new(WorkflowNode::ExecuteActions, err.to_string())
                        .with_class(err.class())
                        .reported(),
                );
            }
        }
    }

    fn evaluate_results(&self, state: &mut WorkflowState) {
        for result in &state.last_results {
            if result.include_in_memory {
                if let Some(content) = &result.extracted_content {
                    state.messages.push(WorkflowMessage::system(content.clone()));
                }
            }
        }
        if state.error.is_some() {
            return;
        }
        state.last_error = None;
        if let Some(last) = state.last_results.last() {
            if last.is_done {
                state.finish(WorkflowStatus::Completed);
            } else if last.requires_user_action {
                state.finish(WorkflowStatus::AwaitingUserInput);
            }
        }
    }

    async fn handle_errors(&self, state: &mut WorkflowState, events: &EventEmitter) -> ErrorRoute {
        state.retry_count += 1;
        let Some(error) = state.error.clone() else {
            return ErrorRoute::Retry;
        };
        warn!(
            task_id = %state.task_id,
            node = %error.node,
            class = %error.class,
            retry = state.retry_count,
            error = %error.message,
            "handling workflow error"
        );
        if !error.reported {
            events.emit(
                EventType::WorkflowFailed,
                json!({
                    "error": error.message,
                    "class": error.class,
                    "phase": error.node,
                    "retry_count": state.retry_count,
                }),
            );
        }
        // Let the recovery coordinator finish before the next node runs.
        events.flush().await;

        let route = route_after_error(state, self.config.max_retries);
        if route != ErrorRoute::Escalate {
            state.last_error = state.error.take();
            state
                .messages
                .push(WorkflowMessage::system(format!("Previous step failed: {}", error.message)));
        }
        route
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::never_pause;
    use crate::workflow::planner::ScriptedPlanner;
    use action_registry::{handler_fn, HandlerOutput};
    use async_trait::async_trait;
    use soulbrowser_core_types::{BrowserStateSnapshot, DomElement};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider;

    #[async_trait]
    impl BrowserStateProvider for FixedProvider {
        async fn get_state(&self) -> anyhow::Result<Arc<BrowserStateSnapshot>> {
            Ok(Arc::new(BrowserStateSnapshot::new(
                "https://example.com",
                [(1, DomElement::new("button", "/html/body/button"))],
            )))
        }
    }

    fn registry(failures: Arc<AtomicUsize>) -> Arc<ActionRegistry> {
        let mut registry = ActionRegistry::new();
        registry
            .register(
                "click_element",
                "click",
                json!({}),
                handler_fn(move |_action, _ctx| {
                    let failures = failures.clone();
                    async move {
                        failures.fetch_add(1, Ordering::SeqCst);
                        anyhow::bail!("mystery failure")
                    }
                }),
            )
            .unwrap();
        registry
            .register(
                "extract_content",
                "extract",
                json!({}),
                handler_fn(|_action, _ctx| async move { Ok(HandlerOutput::from("content")) }),
            )
            .unwrap();
        registry
            .register(
                "done",
                "done",
                json!({}),
                handler_fn(|_action, _ctx| async move {
                    Ok(HandlerOutput::Result(ActionResult::done("finished", true)))
                }),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn graph(planner: ScriptedPlanner, config: OrchestratorConfig) -> (WorkflowGraph, Arc<AtomicUsize>) {
        let failures = Arc::new(AtomicUsize::new(0));
        let graph = WorkflowGraph::new(
            registry(failures.clone()),
            Arc::new(FixedProvider),
            Arc::new(planner),
            config,
        );
        (graph, failures)
    }

    #[tokio::test]
    async fn completes_when_done_is_reached() {
        let planner = ScriptedPlanner::new(vec![
            json!([{ "extract_content": { "goal": "prices" } }]),
            json!([{ "done": { "text": "all done" } }]),
        ]);
        let (graph, _) = graph(planner, OrchestratorConfig::minimal());
        let outcome = graph.run("find prices", &never_pause).await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Completed);
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.final_result().unwrap().is_done);
    }

    #[tokio::test]
    async fn escalates_after_max_retries_with_partial_results() {
        let planner = ScriptedPlanner::new(vec![
            json!([{ "extract_content": { "goal": "first" } }]),
            json!([{ "click_element": { "index": 1 } }]),
            json!([{ "click_element": { "index": 1 } }]),
            json!([{ "click_element": { "index": 1 } }]),
        ]);
        let (graph, failures) = graph(planner, OrchestratorConfig::minimal().max_retries(3));
        let err = graph.run("click forever", &never_pause).await.unwrap_err();
        match err {
            AgentError::RecoveryExhausted {
                attempts,
                last_error,
                results,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("mystery failure"));
                assert_eq!(results.len(), 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(failures.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn invalid_planner_output_takes_the_alternative_route() {
        let planner = ScriptedPlanner::new(vec![
            json!([{ "click_element": { "index": "first" } }]),
            json!([{ "done": { "text": "recovered" } }]),
        ]);
        let (graph, _) = graph(planner, OrchestratorConfig::minimal());
        let outcome = graph.run("task", &never_pause).await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Completed);
        assert_eq!(outcome.retries, 1);
        // The alternative route re-plans without re-analyzing state.
        assert_eq!(outcome.steps, 1);
    }

    #[tokio::test]
    async fn step_limit_ends_the_run() {
        let planner = ScriptedPlanner::new(vec![
            json!([{ "extract_content": { "goal": "a" } }]),
            json!([{ "extract_content": { "goal": "b" } }]),
            json!([{ "extract_content": { "goal": "c" } }]),
        ]);
        let (graph, _) = graph(planner, OrchestratorConfig::minimal().max_steps(2));
        let outcome = graph.run("task", &never_pause).await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::MaxStepsReached);
        assert_eq!(outcome.steps, 2);
    }

    #[tokio::test]
    async fn pause_cancels_before_the_first_node() {
        let (graph, _) = graph(ScriptedPlanner::new(Vec::new()), OrchestratorConfig::minimal());
        let outcome = graph.run("task", &|| true).await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Cancelled);
        assert_eq!(outcome.steps, 0);
    }

    #[tokio::test]
    async fn aborted_plan_results_are_kept() {
        let planner = ScriptedPlanner::new(vec![
            json!([
                { "extract_content": { "goal": "a" } },
                { "extract_content": { "goal": "b" } },
                { "go_to_url": { "url": "https://example.com/next" } }
            ]),
            json!([{ "done": { "text": "finished" } }]),
        ]);
        let (graph, _) = graph(planner, OrchestratorConfig::minimal().parallel_actions(1));
        let outcome = graph.run("task", &never_pause).await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Completed);
        assert_eq!(outcome.retries, 1);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.results[0].extracted_content.as_deref(), Some("content"));
        assert!(outcome.final_result().unwrap().is_done);
    }
}
