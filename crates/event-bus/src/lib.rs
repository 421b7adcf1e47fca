//! Reactive event bus for the orchestration core.
//!
//! Producers hand events off without blocking; one dispatcher task per bus
//! appends them to a bounded history and fans them out to subscribers by exact
//! type, category, or wildcard. Subscriber failures are logged and isolated.

pub mod bus;
pub mod config;
pub mod errors;
pub mod event;
pub mod history;
pub mod subscription;

pub use bus::{BusStats, ReactiveEventBus};
pub use config::EventBusConfig;
pub use errors::BusError;
pub use event::{EventCategory, EventType, ReactiveEvent, Severity};
pub use history::EventHistory;
pub use subscription::{
    async_callback, callback, EventCallback, EventFuture, SubscriptionFilter, SubscriptionId,
};
