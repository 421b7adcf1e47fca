//! Subscription filters and the unified callback type.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::event::{EventCategory, EventType, ReactiveEvent};

/// Opaque handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// What a subscriber wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionFilter {
    EventType(EventType),
    Category(EventCategory),
    All,
}

impl SubscriptionFilter {
    pub fn matches(&self, event: &ReactiveEvent) -> bool {
        match self {
            SubscriptionFilter::EventType(event_type) => event.event_type == *event_type,
            SubscriptionFilter::Category(category) => event.category == *category,
            SubscriptionFilter::All => true,
        }
    }
}

impl From<EventType> for SubscriptionFilter {
    fn from(value: EventType) -> Self {
        SubscriptionFilter::EventType(value)
    }
}

impl From<EventCategory> for SubscriptionFilter {
    fn from(value: EventCategory) -> Self {
        SubscriptionFilter::Category(value)
    }
}

pub type EventFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Callback invoked by the dispatcher. Sync and async handlers share this type.
pub type EventCallback = Arc<dyn Fn(ReactiveEvent) -> EventFuture + Send + Sync>;

/// Wrap a synchronous handler.
pub fn callback<F>(handler: F) -> EventCallback
where
    F: Fn(&ReactiveEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |event: ReactiveEvent| {
        let handler = Arc::clone(&handler);
        Box::pin(async move { handler(&event) }) as EventFuture
    })
}

/// Wrap an async handler.
pub fn async_callback<F, Fut>(handler: F) -> EventCallback
where
    F: Fn(ReactiveEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |event: ReactiveEvent| Box::pin(handler(event)) as EventFuture)
}

pub(crate) struct Subscription {
    pub id: SubscriptionId,
    pub filter: SubscriptionFilter,
    pub callback: EventCallback,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish()
    }
}
