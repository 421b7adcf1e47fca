use std::sync::Arc;

use serde_json::Value;
use soulbrowser_core_types::TaskId;
use soulbrowser_event_bus::{EventType, ReactiveEvent, ReactiveEventBus};

/// Thin emitter stamping a fixed source and the current task on each event.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    bus: Option<Arc<ReactiveEventBus>>,
    source: &'static str,
    task_id: Option<TaskId>,
}

impl EventEmitter {
    pub fn new(bus: Option<Arc<ReactiveEventBus>>, source: &'static str) -> Self {
        Self {
            bus,
            source,
            task_id: None,
        }
    }

    pub fn silent(source: &'static str) -> Self {
        Self::new(None, source)
    }

    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn bus(&self) -> Option<&Arc<ReactiveEventBus>> {
        self.bus.as_ref()
    }

    pub fn emit(&self, event_type: EventType, metadata: Value) -> Option<String> {
        self.emit_with_priority(event_type, metadata, 0)
    }

    pub fn emit_with_priority(
        &self,
        event_type: EventType,
        metadata: Value,
        priority: i32,
    ) -> Option<String> {
        let bus = self.bus.as_ref()?;
        let mut event =
            ReactiveEvent::new(self.source, event_type, metadata).with_priority(priority);
        if let Some(task_id) = &self.task_id {
            event = event.with_task(task_id.clone());
        }
        bus.emit_event(event)
    }

    /// Wait for the dispatcher to catch up with everything emitted so far.
    pub async fn flush(&self) {
        if let Some(bus) = &self.bus {
            bus.flush().await;
        }
    }
}
