use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use soulbrowser_orchestrator::action_registry::{handler_fn, HandlerOutput};
use soulbrowser_orchestrator::agent_core::{RegistryRecoveryStrategy, ScriptedPlanner};
use soulbrowser_orchestrator::event_bus::{BusError, EventCategory, SubscriptionFilter};
use soulbrowser_orchestrator::{
    Action, ActionContext, ActionRegistry, ActionResult, AgentError, AgentRuntime,
    BrowserStateProvider, BrowserStateSnapshot, DomElement, EventType, OrchestratorConfig,
    SettingsLoader, WorkflowStatus,
};
use tokio::sync::Notify;

struct StaticPage;

#[async_trait]
impl BrowserStateProvider for StaticPage {
    async fn get_state(&self) -> anyhow::Result<Arc<BrowserStateSnapshot>> {
        Ok(Arc::new(BrowserStateSnapshot::new(
            "https://shop.example.com/cart",
            [
                (1, DomElement::new("button", "/html/body/main/button[1]")),
                (2, DomElement::new("button", "/html/body/main/button[2]")),
            ],
        )))
    }
}

/// Click handler that parks until released, so a run can be held open.
struct Gate {
    entered: Notify,
    release: Notify,
    clicks: AtomicUsize,
}

fn gated_registry(gate: Arc<Gate>) -> Arc<ActionRegistry> {
    let mut registry = ActionRegistry::new();
    registry
        .register(
            "click_element",
            "Click element by index",
            json!({}),
            handler_fn(move |_action, _ctx| {
                let gate = gate.clone();
                async move {
                    gate.clicks.fetch_add(1, Ordering::SeqCst);
                    gate.entered.notify_one();
                    gate.release.notified().await;
                    Ok(HandlerOutput::from("clicked"))
                }
            }),
        )
        .expect("register click");
    Arc::new(registry)
}

fn gate() -> Arc<Gate> {
    Arc::new(Gate {
        entered: Notify::new(),
        release: Notify::new(),
        clicks: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn second_run_is_rejected_while_busy() {
    let gate = gate();
    let runtime = Arc::new(
        AgentRuntime::builder(gated_registry(gate.clone()), Arc::new(StaticPage))
            .config(OrchestratorConfig::minimal())
            .build(),
    );
    runtime.start().expect("start runtime");

    let first = {
        let runtime = runtime.clone();
        tokio::spawn(async move { runtime.run_plan(&[Action::click(1)], None).await })
    };
    gate.entered.notified().await;

    assert!(runtime.is_busy());
    let second = runtime.run_plan(&[Action::click(2)], None).await;
    assert!(matches!(second, Err(AgentError::Busy)));

    gate.release.notify_one();
    let results = first.await.expect("join").expect("first run");
    assert_eq!(results.len(), 1);
    assert!(!runtime.is_busy());

    runtime.stop().await.expect("stop runtime");
}

#[tokio::test]
async fn cancel_stops_the_plan_at_the_next_boundary() {
    let gate = gate();
    let runtime = Arc::new(
        AgentRuntime::builder(gated_registry(gate.clone()), Arc::new(StaticPage))
            .config(OrchestratorConfig::minimal())
            .build(),
    );
    runtime.start().expect("start runtime");

    let run = {
        let runtime = runtime.clone();
        tokio::spawn(async move {
            runtime
                .run_plan(&[Action::click(1), Action::click(2)], None)
                .await
        })
    };
    gate.entered.notified().await;
    runtime.cancel();
    gate.release.notify_one();

    let results = run.await.expect("join").expect("run");
    assert_eq!(results.len(), 1);
    assert_eq!(gate.clicks.load(Ordering::SeqCst), 1);

    runtime.bus().flush().await;
    let paused = runtime
        .bus()
        .recent(1, Some(SubscriptionFilter::EventType(EventType::AgentPaused)));
    assert_eq!(paused.len(), 1);
    runtime.stop().await.expect("stop runtime");
}

#[tokio::test]
async fn stopped_runtime_cannot_restart() {
    let runtime = AgentRuntime::builder(Arc::new(ActionRegistry::new()), Arc::new(StaticPage))
        .config(OrchestratorConfig::minimal())
        .build();
    runtime.start().expect("start");
    runtime.start().expect("second start is a no-op");
    runtime.stop().await.expect("stop");
    runtime.stop().await.expect("second stop is a no-op");

    let err = runtime.start().expect_err("restart after stop");
    assert!(matches!(err, AgentError::Bus(BusError::Stopped)));
}

fn flaky_registry(clicks: Arc<AtomicUsize>, waits: Arc<AtomicUsize>) -> Arc<ActionRegistry> {
    let mut registry = ActionRegistry::new();
    registry
        .register(
            "click_element",
            "Click element by index",
            json!({}),
            handler_fn(move |_action, _ctx| {
                let clicks = clicks.clone();
                async move {
                    if clicks.fetch_add(1, Ordering::SeqCst) == 0 {
                        anyhow::bail!("Request timeout while clicking");
                    }
                    Ok(HandlerOutput::from("clicked"))
                }
            }),
        )
        .expect("register click");
    registry
        .register(
            "wait",
            "Wait",
            json!({}),
            handler_fn(move |_action, _ctx| {
                let waits = waits.clone();
                async move {
                    waits.fetch_add(1, Ordering::SeqCst);
                    Ok(HandlerOutput::Empty)
                }
            }),
        )
        .expect("register wait");
    registry
        .register(
            "done",
            "Done",
            json!({}),
            handler_fn(|_action, _ctx| async move {
                Ok(HandlerOutput::Result(ActionResult::done("paid", true)))
            }),
        )
        .expect("register done");
    Arc::new(registry)
}

#[tokio::test]
async fn workflow_recovers_through_the_runtime() {
    let clicks = Arc::new(AtomicUsize::new(0));
    let waits = Arc::new(AtomicUsize::new(0));
    let registry = flaky_registry(clicks.clone(), waits.clone());
    let strategy = RegistryRecoveryStrategy::new(registry.clone(), ActionContext::new())
        .with_backoff(Duration::ZERO);
    let runtime = AgentRuntime::builder(registry, Arc::new(StaticPage))
        .config(OrchestratorConfig::minimal())
        .recovery_strategy(Arc::new(strategy))
        .build();
    runtime.start().expect("start runtime");

    let planner = Arc::new(ScriptedPlanner::new(vec![
        json!([{ "click_element": { "index": 1 } }]),
        json!([{ "click_element": { "index": 1 } }]),
        json!([{ "done": { "text": "paid" } }]),
    ]));
    let outcome = runtime
        .run_workflow("pay for the cart", planner)
        .await
        .expect("workflow");

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    assert!(outcome.is_success());
    assert_eq!(clicks.load(Ordering::SeqCst), 2);
    assert_eq!(waits.load(Ordering::SeqCst), 1);
    let stats = runtime.recovery_stats().expect("recovery enabled");
    assert_eq!(stats.attempts, 1);
    assert_eq!(stats.recovery_actions, 1);

    runtime.bus().flush().await;
    let recovery = runtime
        .bus()
        .recent(10, Some(SubscriptionFilter::Category(EventCategory::Recovery)));
    assert_eq!(recovery.len(), 2);
    runtime.stop().await.expect("stop runtime");
}

#[tokio::test]
async fn settings_disable_recovery() {
    let settings = SettingsLoader::new()
        .with_env_prefix("SOUL_RUNTIME_TEST")
        .with_yaml_str("orchestrator:\n  auto_recovery: false\n  wait_between_actions_ms: 0\nactions:\n  available_file_paths: [\"/tmp/invoice.pdf\"]\n")
        .load()
        .expect("settings");
    let runtime = AgentRuntime::builder(Arc::new(ActionRegistry::new()), Arc::new(StaticPage))
        .settings(&settings)
        .build();

    assert!(runtime.recovery_stats().is_none());
    assert!(!runtime.config().auto_recovery);
    assert!(runtime.config().wait_between_actions().is_zero());
}

/// Click fails once with a timeout; the `wait` remedy holds the page for a
/// while and records any click that lands during it.
struct SlowRemedy {
    clicks: AtomicUsize,
    waits: AtomicUsize,
    recovering: AtomicBool,
    overlaps: AtomicUsize,
}

fn slow_remedy_registry(page: Arc<SlowRemedy>) -> Arc<ActionRegistry> {
    let mut registry = ActionRegistry::new();
    let clicks = page.clone();
    registry
        .register(
            "click_element",
            "Click element by index",
            json!({}),
            handler_fn(move |_action, _ctx| {
                let page = clicks.clone();
                async move {
                    if page.recovering.load(Ordering::SeqCst) {
                        page.overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    if page.clicks.fetch_add(1, Ordering::SeqCst) == 0 {
                        anyhow::bail!("Request timeout while clicking");
                    }
                    Ok(HandlerOutput::from("clicked"))
                }
            }),
        )
        .expect("register click");
    registry
        .register(
            "wait",
            "Wait",
            json!({}),
            handler_fn(move |_action, _ctx| {
                let page = page.clone();
                async move {
                    page.recovering.store(true, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    page.waits.fetch_add(1, Ordering::SeqCst);
                    page.recovering.store(false, Ordering::SeqCst);
                    Ok(HandlerOutput::Empty)
                }
            }),
        )
        .expect("register wait");
    Arc::new(registry)
}

#[tokio::test]
async fn recovery_finishes_before_the_next_plan_starts() {
    let page = Arc::new(SlowRemedy {
        clicks: AtomicUsize::new(0),
        waits: AtomicUsize::new(0),
        recovering: AtomicBool::new(false),
        overlaps: AtomicUsize::new(0),
    });
    let registry = slow_remedy_registry(page.clone());
    let strategy = RegistryRecoveryStrategy::new(registry.clone(), ActionContext::new())
        .with_backoff(Duration::ZERO);
    let runtime = AgentRuntime::builder(registry, Arc::new(StaticPage))
        .config(OrchestratorConfig::minimal())
        .recovery_strategy(Arc::new(strategy))
        .build();
    runtime.start().expect("start runtime");

    let first = runtime
        .run_plan(&[Action::click(1)], None)
        .await
        .expect("first run");
    assert!(first[0].has_error());
    assert_eq!(page.waits.load(Ordering::SeqCst), 1);
    assert!(!runtime.is_busy());

    let second = runtime
        .run_plan(&[Action::click(1)], None)
        .await
        .expect("second run");
    assert_eq!(second[0].extracted_content.as_deref(), Some("clicked"));
    assert_eq!(page.overlaps.load(Ordering::SeqCst), 0);

    runtime.stop().await.expect("stop runtime");
}
