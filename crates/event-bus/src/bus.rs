//! Reactive event bus: unbounded intake, single dispatcher, bounded history.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EventBusConfig;
use crate::errors::BusError;
use crate::event::{EventType, ReactiveEvent};
use crate::history::EventHistory;
use crate::subscription::{EventCallback, Subscription, SubscriptionFilter, SubscriptionId};

const BUS_SOURCE: &str = "event_bus";

enum Envelope {
    Event(ReactiveEvent),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Default)]
struct BusCounters {
    emitted: AtomicU64,
    dispatched: AtomicU64,
    callback_failures: AtomicU64,
    evicted: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub emitted: u64,
    pub dispatched: u64,
    pub callback_failures: u64,
    pub evicted: u64,
    pub dropped: u64,
    pub subscribers: usize,
    pub history_len: usize,
}

/// Event bus with one background dispatcher per instance.
///
/// Events emitted before `start` are queued and dispatched once the
/// dispatcher runs. After `stop` the bus rejects further events.
pub struct ReactiveEventBus {
    config: EventBusConfig,
    intake_tx: mpsc::UnboundedSender<Envelope>,
    intake_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    subscriptions: RwLock<Vec<Subscription>>,
    history: EventHistory,
    next_subscription: AtomicU64,
    state: Mutex<BusState>,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    counters: BusCounters,
}

impl ReactiveEventBus {
    pub fn new(config: EventBusConfig) -> Arc<Self> {
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            history: EventHistory::new(config.buffer_size),
            config,
            intake_tx,
            intake_rx: Mutex::new(Some(intake_rx)),
            subscriptions: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            state: Mutex::new(BusState::Idle),
            shutdown: CancellationToken::new(),
            dispatcher: Mutex::new(None),
            counters: BusCounters::default(),
        })
    }

    /// A bus whose `emit` is a no-op.
    pub fn disabled() -> Arc<Self> {
        Self::new(EventBusConfig::disabled())
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn is_running(&self) -> bool {
        *self.state.lock() == BusState::Running
    }

    /// Spawn the dispatcher. Calling it again while running is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<(), BusError> {
        if !self.config.enabled {
            debug!("event bus disabled; dispatcher not started");
            return Ok(());
        }

        let mut state = self.state.lock();
        match *state {
            BusState::Running => return Ok(()),
            BusState::Stopped => return Err(BusError::Stopped),
            BusState::Idle => {}
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BusError::NoRuntime)?;
        let receiver = self.intake_rx.lock().take().ok_or(BusError::Stopped)?;
        let bus = Arc::clone(self);
        let token = self.shutdown.clone();
        let handle = runtime.spawn(async move { bus.dispatch_loop(receiver, token).await });

        *self.dispatcher.lock() = Some(handle);
        *state = BusState::Running;
        drop(state);

        info!(
            buffer_size = self.config.buffer_size,
            "event bus dispatcher started"
        );
        self.emit(BUS_SOURCE, EventType::SystemStartup, Value::Null, 0);
        Ok(())
    }

    /// Stop the dispatcher, draining queued events within the shutdown timeout.
    pub async fn stop(&self) -> Result<(), BusError> {
        {
            let state = self.state.lock();
            if *state == BusState::Stopped {
                return Ok(());
            }
        }

        self.emit(BUS_SOURCE, EventType::SystemShutdown, Value::Null, i32::MAX);
        *self.state.lock() = BusState::Stopped;
        self.shutdown.cancel();

        let handle = self.dispatcher.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        let abort = handle.abort_handle();
        let timeout = self.config.shutdown_timeout();
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => {
                info!("event bus dispatcher stopped");
                Ok(())
            }
            Ok(Err(err)) => {
                error!(error = %err, "event bus dispatcher terminated abnormally");
                Ok(())
            }
            Err(_) => {
                abort.abort();
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "event bus drain timed out; dispatcher aborted"
                );
                Err(BusError::ShutdownTimeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Non-blocking emit. Returns the event id when the event was accepted.
    pub fn emit(
        &self,
        source: &str,
        event_type: EventType,
        payload: Value,
        priority: i32,
    ) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        let event = ReactiveEvent::new(source, event_type, payload).with_priority(priority);
        self.emit_event(event)
    }

    /// Emit a prebuilt event (session/task ids, severity override).
    pub fn emit_event(&self, event: ReactiveEvent) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        if *self.state.lock() == BusState::Stopped {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let event_id = event.event_id.clone();
        match self.intake_tx.send(Envelope::Event(event)) {
            Ok(()) => {
                self.counters.emitted.fetch_add(1, Ordering::Relaxed);
                Some(event_id)
            }
            Err(_) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Wait until every event emitted before this call has been dispatched.
    pub async fn flush(&self) {
        if !self.is_running() {
            return;
        }
        let (tx, rx) = oneshot::channel();
        if self.intake_tx.send(Envelope::Flush(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }

    pub fn subscribe(
        &self,
        filter: impl Into<SubscriptionFilter>,
        callback: EventCallback,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let filter = filter.into();
        self.subscriptions.write().push(Subscription {
            id,
            filter,
            callback,
        });
        debug!(subscription = %id, ?filter, "subscriber registered");
        id
    }

    /// Remove a subscription. Returns false when the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut guard = self.subscriptions.write();
        let before = guard.len();
        guard.retain(|sub| sub.id != id);
        before != guard.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn history(&self) -> Vec<ReactiveEvent> {
        self.history.snapshot()
    }

    pub fn recent(&self, limit: usize, filter: Option<SubscriptionFilter>) -> Vec<ReactiveEvent> {
        self.history.tail(limit, filter.as_ref())
    }

    pub fn clear_history(&self) {
        self.history.clear();
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            emitted: self.counters.emitted.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            callback_failures: self.counters.callback_failures.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
            history_len: self.history.len(),
        }
    }

    async fn dispatch_loop(
        self: Arc<Self>,
        mut receiver: mpsc::UnboundedReceiver<Envelope>,
        token: CancellationToken,
    ) {
        let poll = self.config.poll_interval();
        loop {
            if token.is_cancelled() {
                break;
            }
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                polled = tokio::time::timeout(poll, receiver.recv()) => polled,
            };
            match next {
                Ok(Some(envelope)) => self.handle(envelope).await,
                Ok(None) => break,
                Err(_) => continue,
            }
        }

        let mut drained = 0usize;
        while let Ok(envelope) = receiver.try_recv() {
            self.handle(envelope).await;
            drained += 1;
        }
        debug!(drained, "event bus dispatcher exiting");
    }

    async fn handle(&self, envelope: Envelope) {
        match envelope {
            Envelope::Flush(ack) => {
                let _ = ack.send(());
            }
            Envelope::Event(event) => self.dispatch(event).await,
        }
    }

    async fn dispatch(&self, event: ReactiveEvent) {
        let evicted = self.history.push(event.clone());
        if evicted > 0 {
            self.counters
                .evicted
                .fetch_add(evicted as u64, Ordering::Relaxed);
        }
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        for (id, callback) in self.matching_callbacks(&event) {
            let invoked = std::panic::catch_unwind(AssertUnwindSafe(|| callback(event.clone())));
            let outcome = match invoked {
                Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
                Err(panic) => Err(panic),
            };
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    self.counters.callback_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscription = %id,
                        event_type = %event.event_type,
                        error = %err,
                        "event subscriber failed"
                    );
                }
                Err(_) => {
                    self.counters.callback_failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        subscription = %id,
                        event_type = %event.event_type,
                        "event subscriber panicked"
                    );
                }
            }
        }
    }

    /// Exact-type subscribers first, then wildcards, then category matches.
    fn matching_callbacks(&self, event: &ReactiveEvent) -> Vec<(SubscriptionId, EventCallback)> {
        let guard = self.subscriptions.read();
        let exact = guard
            .iter()
            .filter(|sub| matches!(sub.filter, SubscriptionFilter::EventType(t) if t == event.event_type));
        let wildcard = guard
            .iter()
            .filter(|sub| matches!(sub.filter, SubscriptionFilter::All));
        let category = guard
            .iter()
            .filter(|sub| matches!(sub.filter, SubscriptionFilter::Category(c) if c == event.category));
        exact
            .chain(wildcard)
            .chain(category)
            .map(|sub| (sub.id, Arc::clone(&sub.callback)))
            .collect()
    }
}

impl std::fmt::Debug for ReactiveEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveEventBus")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
