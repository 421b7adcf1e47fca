//! Facade wiring registry, bus, recovery and execution for one browser page.
//!
//! At most one plan or workflow executes at a time; a second caller gets
//! [`AgentError::Busy`] instead of waiting. A run holds the guard until the
//! bus has dispatched its events, so recovery actions never overlap the next
//! run.

use std::sync::Arc;

use action_registry::{Action, ActionContext, ActionRegistry, ActionResult};
use agent_core::{
    ActionPlanner, AgentError, BrowserStateProvider, OrchestratorConfig, PlanExecutor,
    RecoveryCoordinator, RecoveryStats, RecoveryStrategy, RegistryRecoveryStrategy,
    WorkflowGraph, WorkflowOutcome, WorkflowState,
};
use parking_lot::Mutex;
use soulbrowser_core_types::{BrowserStateSnapshot, TaskId};
use soulbrowser_event_bus::ReactiveEventBus;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

use crate::config::OrchestratorSettings;
use crate::observability::run_span;

pub struct AgentRuntimeBuilder {
    registry: Arc<ActionRegistry>,
    provider: Arc<dyn BrowserStateProvider>,
    config: OrchestratorConfig,
    context: ActionContext,
    strategy: Option<Arc<dyn RecoveryStrategy>>,
}

impl AgentRuntimeBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Apply loaded settings: orchestration options and the upload allowlist.
    pub fn settings(mut self, settings: &OrchestratorSettings) -> Self {
        self.config = settings.orchestrator.clone();
        self.context.available_file_paths = settings.actions.available_file_paths.clone();
        self
    }

    pub fn context(mut self, context: ActionContext) -> Self {
        self.context = context;
        self
    }

    /// Replace the default registry-backed recovery strategy.
    pub fn recovery_strategy(mut self, strategy: Arc<dyn RecoveryStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn build(self) -> AgentRuntime {
        let bus = ReactiveEventBus::new(self.config.event_bus_config());
        let recovery = if self.config.enable_event_system && self.config.auto_recovery {
            let strategy = self.strategy.unwrap_or_else(|| {
                Arc::new(RegistryRecoveryStrategy::new(
                    Arc::clone(&self.registry),
                    self.context.clone(),
                ))
            });
            Some(RecoveryCoordinator::new(strategy, self.config.max_retries))
        } else {
            None
        };
        AgentRuntime {
            config: self.config,
            registry: self.registry,
            provider: self.provider,
            context: self.context,
            bus,
            recovery,
            run_guard: tokio::sync::Mutex::new(()),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }
}

pub struct AgentRuntime {
    config: OrchestratorConfig,
    registry: Arc<ActionRegistry>,
    provider: Arc<dyn BrowserStateProvider>,
    context: ActionContext,
    bus: Arc<ReactiveEventBus>,
    recovery: Option<Arc<RecoveryCoordinator>>,
    run_guard: tokio::sync::Mutex<()>,
    cancel: Mutex<CancellationToken>,
}

impl AgentRuntime {
    pub fn builder(
        registry: Arc<ActionRegistry>,
        provider: Arc<dyn BrowserStateProvider>,
    ) -> AgentRuntimeBuilder {
        AgentRuntimeBuilder {
            registry,
            provider,
            config: OrchestratorConfig::default(),
            context: ActionContext::default(),
            strategy: None,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<ReactiveEventBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn recovery_stats(&self) -> Option<RecoveryStats> {
        self.recovery.as_ref().map(|coordinator| coordinator.stats())
    }

    /// Start the event dispatcher and attach recovery.
    pub fn start(&self) -> Result<(), AgentError> {
        self.bus.start()?;
        if let Some(recovery) = &self.recovery {
            if !recovery.is_attached() {
                recovery.attach(&self.bus);
            }
        }
        info!(
            events = self.config.enable_event_system,
            auto_recovery = self.recovery.is_some(),
            "agent runtime started"
        );
        Ok(())
    }

    /// Cancel any running plan, detach recovery and drain the bus.
    pub async fn stop(&self) -> Result<(), AgentError> {
        self.cancel();
        if let Some(recovery) = &self.recovery {
            recovery.detach(&self.bus);
        }
        self.bus.stop().await?;
        info!("agent runtime stopped");
        Ok(())
    }

    /// Ask the current run to stop at its next boundary.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    pub fn is_busy(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    /// Execute one plan. Fetches a snapshot when none is supplied.
    pub async fn run_plan(
        &self,
        actions: &[Action],
        snapshot: Option<Arc<BrowserStateSnapshot>>,
    ) -> Result<Vec<ActionResult>, AgentError> {
        let _guard = self.run_guard.try_lock().map_err(|_| AgentError::Busy)?;
        let token = self.begin_run();
        let task_id = TaskId::new();

        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => self
                .provider
                .get_state()
                .await
                .map_err(AgentError::StateProvider)?,
        };

        let executor = PlanExecutor::new(Arc::clone(&self.registry), Arc::clone(&self.provider))
            .with_bus(Arc::clone(&self.bus))
            .with_task(task_id.clone())
            .with_context(self.context.clone())
            .with_wait_between_actions(self.config.wait_between_actions());
        let pause = || token.is_cancelled();
        let outcome = executor
            .run(actions, snapshot, &pause, self.config.check_for_new_elements)
            .instrument(run_span("plan", &task_id.0))
            .await;
        // Recovery triggered by this plan must finish before the guard drops.
        self.bus.flush().await;
        outcome
    }

    /// Drive `task` through the workflow graph with `planner`.
    pub async fn run_workflow(
        &self,
        task: &str,
        planner: Arc<dyn ActionPlanner>,
    ) -> Result<WorkflowOutcome, AgentError> {
        let _guard = self.run_guard.try_lock().map_err(|_| AgentError::Busy)?;
        let token = self.begin_run();
        let state = WorkflowState::new(task);
        let span = run_span("workflow", &state.task_id.0);

        let graph = WorkflowGraph::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.provider),
            planner,
            self.config.clone(),
        )
        .with_bus(Arc::clone(&self.bus))
        .with_context(self.context.clone());
        let pause = || token.is_cancelled();
        let outcome = graph.run_with_state(state, &pause).instrument(span).await;
        self.bus.flush().await;
        outcome
    }

    /// Fresh cancellation token and recovery budget for a new run.
    fn begin_run(&self) -> CancellationToken {
        if let Some(recovery) = &self.recovery {
            recovery.reset();
        }
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        token
    }
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("bus", &self.bus)
            .field("recovery", &self.recovery)
            .finish()
    }
}
