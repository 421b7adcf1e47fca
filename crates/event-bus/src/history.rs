use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::event::ReactiveEvent;
use crate::subscription::SubscriptionFilter;

/// Capacity-bounded event history. Oldest entries are evicted first.
#[derive(Debug)]
pub struct EventHistory {
    capacity: usize,
    queue: Mutex<VecDeque<ReactiveEvent>>,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
        }
    }

    /// Append an event, returning how many entries were evicted.
    pub fn push(&self, event: ReactiveEvent) -> usize {
        let mut guard = self.queue.lock();
        let mut evicted = 0;
        while guard.len() >= self.capacity {
            guard.pop_front();
            evicted += 1;
        }
        guard.push_back(event);
        evicted
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshot(&self) -> Vec<ReactiveEvent> {
        self.queue.lock().iter().cloned().collect()
    }

    /// Up to `limit` most recent events matching `filter`, oldest first.
    pub fn tail(&self, limit: usize, filter: Option<&SubscriptionFilter>) -> Vec<ReactiveEvent> {
        let guard = self.queue.lock();
        let mut out = Vec::new();
        for event in guard.iter().rev() {
            if out.len() == limit {
                break;
            }
            if filter.map(|f| f.matches(event)).unwrap_or(true) {
                out.push(event.clone());
            }
        }
        out.reverse();
        out
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }
}
