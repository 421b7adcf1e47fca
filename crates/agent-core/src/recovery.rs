//! Reactive recovery driven by error events on the bus.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use action_registry::{Action, ActionContext, ActionRegistry};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use soulbrowser_event_bus::{
    async_callback, EventCategory, EventType, ReactiveEvent, ReactiveEventBus, SubscriptionId,
};
use tracing::{debug, info, warn};

use crate::errors::ErrorClass;

const SOURCE: &str = "recovery";

/// Everything a strategy knows about one failure.
#[derive(Debug, Clone)]
pub struct RecoveryContext {
    pub error: String,
    pub class: ErrorClass,
    /// Component or workflow node that reported the failure.
    pub phase: String,
    /// Recovery attempts made before this one.
    pub retry_count: u32,
    pub event: ReactiveEvent,
}

/// Pluggable policy mapping a failure to a named remedial action.
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    /// Name of the action to run, or `None` to leave the failure alone.
    async fn recovery_action(
        &self,
        error: &str,
        ctx: &RecoveryContext,
    ) -> anyhow::Result<Option<String>>;

    async fn execute_recovery_action(
        &self,
        action: &str,
        error: &str,
        ctx: &RecoveryContext,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryStats {
    pub attempts: u32,
    pub recovery_actions: u64,
    pub failed_recoveries: u64,
    pub exhausted: bool,
}

/// Listens for error-category events and runs the strategy's remedy.
///
/// Failures inside the strategy are logged and counted, never re-raised into
/// the dispatcher.
pub struct RecoveryCoordinator {
    strategy: Arc<dyn RecoveryStrategy>,
    max_retries: u32,
    attempts: AtomicU32,
    recovery_actions: AtomicU64,
    failed_recoveries: AtomicU64,
    exhausted: AtomicBool,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl RecoveryCoordinator {
    pub fn new(strategy: Arc<dyn RecoveryStrategy>, max_retries: u32) -> Arc<Self> {
        Arc::new(Self {
            strategy,
            max_retries,
            attempts: AtomicU32::new(0),
            recovery_actions: AtomicU64::new(0),
            failed_recoveries: AtomicU64::new(0),
            exhausted: AtomicBool::new(false),
            subscription: Mutex::new(None),
        })
    }

    /// Subscribe to the error category of `bus`. Re-attaching replaces the
    /// previous subscription.
    pub fn attach(self: &Arc<Self>, bus: &Arc<ReactiveEventBus>) -> SubscriptionId {
        self.detach(bus);
        let coordinator = Arc::clone(self);
        let weak_bus: Weak<ReactiveEventBus> = Arc::downgrade(bus);
        let id = bus.subscribe(
            EventCategory::Error,
            async_callback(move |event| {
                let coordinator = Arc::clone(&coordinator);
                let bus = weak_bus.upgrade();
                async move {
                    coordinator.handle_error_event(event, bus.as_deref()).await;
                    Ok(())
                }
            }),
        );
        *self.subscription.lock() = Some(id);
        info!(subscription = %id, max_retries = self.max_retries, "recovery coordinator attached");
        id
    }

    pub fn detach(&self, bus: &ReactiveEventBus) -> bool {
        match self.subscription.lock().take() {
            Some(id) => bus.unsubscribe(id),
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Clear the attempt budget for a new run.
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
        self.exhausted.store(false, Ordering::SeqCst);
    }

    pub fn stats(&self) -> RecoveryStats {
        RecoveryStats {
            attempts: self.attempts.load(Ordering::SeqCst),
            recovery_actions: self.recovery_actions.load(Ordering::SeqCst),
            failed_recoveries: self.failed_recoveries.load(Ordering::SeqCst),
            exhausted: self.exhausted.load(Ordering::SeqCst),
        }
    }

    /// React to one error event. Public so callers without a bus can drive it.
    pub async fn handle_error_event(&self, event: ReactiveEvent, bus: Option<&ReactiveEventBus>) {
        let emit = |event_type: EventType, metadata: Value| {
            if let Some(bus) = bus {
                bus.emit(SOURCE, event_type, metadata, 0);
            }
        };

        let retry_count = self.attempts.load(Ordering::SeqCst);
        if retry_count >= self.max_retries {
            if !self.exhausted.swap(true, Ordering::SeqCst) {
                warn!(attempts = retry_count, "recovery budget exhausted");
                emit(
                    EventType::RecoveryExhausted,
                    json!({ "attempts": retry_count, "trigger": event.event_id }),
                );
            }
            return;
        }

        let error = event
            .metadata_str("error")
            .map(str::to_string)
            .unwrap_or_else(|| event.event_type.as_str().to_string());
        let phase = event
            .metadata_str("phase")
            .map(str::to_string)
            .unwrap_or_else(|| event.source.clone());
        let ctx = RecoveryContext {
            class: ErrorClass::classify(&error),
            error: error.clone(),
            phase,
            retry_count,
            event,
        };

        let action = match self.strategy.recovery_action(&error, &ctx).await {
            Ok(Some(action)) => action,
            Ok(None) => {
                debug!(class = %ctx.class, phase = %ctx.phase, "no recovery action for error");
                return;
            }
            Err(err) => {
                self.failed_recoveries.fetch_add(1, Ordering::SeqCst);
                warn!(error = %err, "recovery strategy failed to choose an action");
                emit(
                    EventType::RecoveryFailed,
                    json!({ "error": error, "reason": err.to_string() }),
                );
                return;
            }
        };

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!(action = %action, attempt, class = %ctx.class, "starting recovery");
        emit(
            EventType::RecoveryStarted,
            json!({
                "action": action,
                "attempt": attempt,
                "error": error,
                "class": ctx.class,
                "phase": ctx.phase,
            }),
        );

        let outcome = self
            .strategy
            .execute_recovery_action(&action, &error, &ctx)
            .await;
        self.recovery_actions.fetch_add(1, Ordering::SeqCst);
        match outcome {
            Ok(()) => {
                info!(action = %action, attempt, "recovery succeeded");
                emit(
                    EventType::RecoverySucceeded,
                    json!({ "action": action, "attempt": attempt }),
                );
            }
            Err(err) => {
                self.failed_recoveries.fetch_add(1, Ordering::SeqCst);
                warn!(action = %action, attempt, error = %err, "recovery action failed");
                emit(
                    EventType::RecoveryFailed,
                    json!({ "action": action, "attempt": attempt, "reason": err.to_string() }),
                );
            }
        }
    }
}

impl std::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("max_retries", &self.max_retries)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Default strategy: classify the error and run a remedial action through the
/// same registry the plan uses.
pub struct RegistryRecoveryStrategy {
    registry: Arc<ActionRegistry>,
    context: ActionContext,
    backoff: Duration,
}

impl RegistryRecoveryStrategy {
    pub fn new(registry: Arc<ActionRegistry>, context: ActionContext) -> Self {
        Self {
            registry,
            context,
            backoff: Duration::from_secs(1),
        }
    }

    /// Base wait for transient failures; doubled per prior attempt. The
    /// `wait` action takes whole seconds, so the result is rounded up.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn wait_seconds(&self, retry_count: u32) -> u64 {
        let factor = 1u128 << retry_count.min(5);
        let millis = self.backoff.as_millis().saturating_mul(factor);
        u64::try_from(millis.saturating_add(999) / 1000).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl RecoveryStrategy for RegistryRecoveryStrategy {
    async fn recovery_action(
        &self,
        _error: &str,
        ctx: &RecoveryContext,
    ) -> anyhow::Result<Option<String>> {
        let action = match ctx.class {
            ErrorClass::Timeout | ErrorClass::RateLimit => Some("wait"),
            ErrorClass::Navigation => Some("go_back"),
            ErrorClass::StaleElement => Some("scroll_up"),
            ErrorClass::Validation | ErrorClass::Other => None,
        };
        Ok(action
            .filter(|name| self.registry.contains(name))
            .map(str::to_string))
    }

    async fn execute_recovery_action(
        &self,
        action: &str,
        _error: &str,
        ctx: &RecoveryContext,
    ) -> anyhow::Result<()> {
        let action = match action {
            "wait" => Action::wait(self.wait_seconds(ctx.retry_count)),
            other => {
                let mut wire = serde_json::Map::new();
                wire.insert(other.to_string(), json!({}));
                Action::from_json(&Value::Object(wire))?
            }
        };
        let result = self.registry.execute(&action, &self.context).await?;
        match result.error {
            Some(error) => anyhow::bail!("recovery action '{}' failed: {error}", action.name()),
            None => Ok(()),
        }
    }
}
