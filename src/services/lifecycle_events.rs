//! Bounded lifecycle event collector.
//!
//! Components emit lifecycle events at decision points; the collector keeps
//! the most recent ones in a ring and answers by-type and by-task queries.
//! Events are observability, never control flow.

use std::collections::VecDeque;
use std::sync::RwLock;

use uuid::Uuid;

use crate::domain::models::LifecycleEvent;
use crate::services::config::EVENT_RING_CAPACITY;

#[derive(Debug, Default)]
struct RingState {
    events: VecDeque<LifecycleEvent>,
    dropped: u64,
}

/// Thread-safe bounded ring of lifecycle events.
#[derive(Debug)]
pub struct LifecycleEventCollector {
    capacity: usize,
    state: RwLock<RingState>,
}

impl Default for LifecycleEventCollector {
    fn default() -> Self {
        Self::new(EVENT_RING_CAPACITY)
    }
}

impl LifecycleEventCollector {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: RwLock::new(RingState::default()),
        }
    }

    /// Record an event, evicting the oldest when the ring is full.
    pub fn record(&self, event: LifecycleEvent) {
        let mut state = self.state.write().expect("event ring lock poisoned");
        if state.events.len() >= self.capacity {
            state.events.pop_front();
            state.dropped += 1;
        }
        state.events.push_back(event);
    }

    /// All retained events, oldest first.
    pub fn all(&self) -> Vec<LifecycleEvent> {
        let state = self.state.read().expect("event ring lock poisoned");
        state.events.iter().cloned().collect()
    }

    /// Retained events whose type name matches, oldest first.
    pub fn by_type(&self, type_name: &str) -> Vec<LifecycleEvent> {
        let state = self.state.read().expect("event ring lock poisoned");
        state
            .events
            .iter()
            .filter(|e| e.kind.name() == type_name)
            .cloned()
            .collect()
    }

    /// Retained events attached to a task, oldest first.
    pub fn by_task(&self, task_id: Uuid) -> Vec<LifecycleEvent> {
        let state = self.state.read().expect("event ring lock poisoned");
        state
            .events
            .iter()
            .filter(|e| e.task_id == Some(task_id))
            .cloned()
            .collect()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.state.read().expect("event ring lock poisoned").events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many events have been evicted since construction.
    pub fn dropped(&self) -> u64 {
        self.state.read().expect("event ring lock poisoned").dropped
    }
}
