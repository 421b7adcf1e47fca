//! Bounded parallel execution for index-free, side-effect-light actions.

use std::sync::Arc;

use action_registry::{Action, ActionContext, ActionError, ActionRegistry, ActionResult};
use futures::future::join_all;
use serde_json::json;
use soulbrowser_event_bus::EventType;
use tracing::{debug, info};

use crate::errors::{AgentError, ErrorClass};
use crate::events::EventEmitter;
use crate::state::PauseCheck;

pub struct ParallelActionExecutor {
    registry: Arc<ActionRegistry>,
    context: ActionContext,
    max_parallel: usize,
    events: EventEmitter,
}

impl ParallelActionExecutor {
    pub fn new(registry: Arc<ActionRegistry>, context: ActionContext, max_parallel: usize) -> Self {
        Self {
            registry,
            context,
            max_parallel: max_parallel.max(1),
            events: EventEmitter::silent("parallel_executor"),
        }
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    /// True when every action may share a batch and batching is enabled.
    pub fn can_run(&self, actions: &[Action]) -> bool {
        self.max_parallel > 1
            && actions.len() > 1
            && actions
                .iter()
                .all(|action| action.is_parallel_safe() && !action.is_index_addressed())
    }

    /// Run `actions` in batches of at most `max_parallel`. Results keep plan
    /// order. Stops after the first batch containing a terminal result, or
    /// before the next batch once `pause` reports true.
    pub async fn run(
        &self,
        actions: &[Action],
        pause: PauseCheck<'_>,
    ) -> Result<Vec<ActionResult>, AgentError> {
        let mut results = Vec::with_capacity(actions.len());
        for (batch_index, batch) in actions.chunks(self.max_parallel).enumerate() {
            if pause() {
                info!(completed = results.len(), "parallel plan paused");
                self.events
                    .emit(EventType::AgentPaused, json!({ "completed": results.len() }));
                break;
            }
            debug!(batch = batch_index, size = batch.len(), "running parallel batch");
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|action| self.registry.execute(action, &self.context)),
            )
            .await;

            let mut stop = false;
            for (offset, (action, outcome)) in batch.iter().zip(outcomes).enumerate() {
                let index = batch_index * self.max_parallel + offset;
                let result = match outcome {
                    Ok(result) => result,
                    Err(ActionError::Handler(err)) => ActionResult::error(err.to_string()),
                    Err(source) => return Err(AgentError::ActionAborted { source, results }),
                };
                match &result.error {
                    Some(error) => {
                        self.events.emit(
                            EventType::ActionFailed,
                            json!({
                                "index": index,
                                "action": action.name(),
                                "error": error,
                                "class": ErrorClass::classify(error),
                                "phase": "parallel_executor",
                            }),
                        );
                    }
                    None => {
                        self.events.emit(
                            EventType::ActionCompleted,
                            json!({ "index": index, "action": action.name(), "parallel": true }),
                        );
                    }
                }
                stop |= result.is_terminal();
                results.push(result);
            }
            if stop {
                break;
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::never_pause;
    use action_registry::{handler_fn, HandlerOutput};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn registry(in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Arc<ActionRegistry> {
        let mut registry = ActionRegistry::new();
        registry
            .register(
                "extract_content",
                "extract",
                json!({}),
                handler_fn(move |action, _ctx| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        match action {
                            Action::ExtractContent(p) if p.goal == "fail" => {
                                anyhow::bail!("extraction timeout")
                            }
                            Action::ExtractContent(p) => Ok(HandlerOutput::Text(p.goal)),
                            _ => Ok(HandlerOutput::Empty),
                        }
                    }
                }),
            )
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn batches_are_bounded_and_ordered() {
        let peak = Arc::new(AtomicUsize::new(0));
        let executor = ParallelActionExecutor::new(
            registry(Arc::new(AtomicUsize::new(0)), peak.clone()),
            ActionContext::new(),
            2,
        );
        let actions: Vec<Action> = ["a", "b", "c", "d", "e"].iter().map(|g| Action::extract(*g)).collect();
        assert!(executor.can_run(&actions));

        let results = executor.run(&actions, &never_pause).await.unwrap();
        let goals: Vec<&str> = results
            .iter()
            .map(|r| r.extracted_content.as_deref().unwrap())
            .collect();
        assert_eq!(goals, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stops_after_batch_with_error() {
        let executor = ParallelActionExecutor::new(
            registry(Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0))),
            ActionContext::new(),
            2,
        );
        let actions = vec![
            Action::extract("a"),
            Action::extract("fail"),
            Action::extract("never"),
        ];
        let results = executor.run(&actions, &never_pause).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[1].has_error());
    }

    #[test]
    fn index_addressed_actions_are_not_batched() {
        let executor = ParallelActionExecutor::new(Arc::new(ActionRegistry::new()), ActionContext::new(), 3);
        assert!(!executor.can_run(&[Action::extract("a"), Action::click(1)]));
        assert!(!executor.can_run(&[Action::extract("a")]));
        let serial = ParallelActionExecutor::new(Arc::new(ActionRegistry::new()), ActionContext::new(), 1);
        assert!(!serial.can_run(&[Action::extract("a"), Action::wait(1)]));
    }

    #[tokio::test]
    async fn pause_is_checked_between_batches() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let executor = ParallelActionExecutor::new(
            registry(in_flight, Arc::new(AtomicUsize::new(0))),
            ActionContext::new(),
            2,
        );
        let actions: Vec<Action> = ["a", "b", "c", "d"].iter().map(|g| Action::extract(*g)).collect();
        let batches = AtomicUsize::new(0);
        let pause = move || batches.fetch_add(1, Ordering::SeqCst) >= 1;

        let results = executor.run(&actions, &pause).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].extracted_content.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn rejected_output_keeps_results_before_it() {
        let mut registry = ActionRegistry::new();
        registry
            .register(
                "extract_content",
                "extract",
                json!({}),
                handler_fn(|action, _ctx| async move {
                    match action {
                        Action::ExtractContent(p) if p.goal == "bad" => {
                            Ok(HandlerOutput::Other(json!({ "bad": 1 })))
                        }
                        Action::ExtractContent(p) => Ok(HandlerOutput::Text(p.goal)),
                        _ => Ok(HandlerOutput::Empty),
                    }
                }),
            )
            .unwrap();
        let executor = ParallelActionExecutor::new(Arc::new(registry), ActionContext::new(), 2);
        let actions = vec![Action::extract("a"), Action::extract("b"), Action::extract("bad")];

        let err = executor.run(&actions, &never_pause).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::ActionAborted {
                source: ActionError::InvalidHandlerResult { .. },
                ..
            }
        ));
        assert_eq!(err.partial_results().len(), 2);
    }
}
