//! Fan-out broadcaster with last-fulfillment replay.
//!
//! An `ObserverSet` is a single-slot behavior subject: it mirrors its
//! variable's state as `Pending | Fulfilled | Rejected` and separately caches
//! the last fulfilled value. A newly attached observer immediately receives
//! that cached value if one exists; pending and rejected states are never
//! replayed.

use rill_core::Error;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub type ObserverId = u64;
pub type ObserverCallback = Arc<dyn Fn(&ObserverEvent) + Send + Sync>;

/// Current state of a reactive binding.
#[derive(Clone, Debug)]
pub enum ObserverState {
    Pending,
    Fulfilled(Value),
    Rejected(Arc<Error>),
}

impl ObserverState {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Notification delivered to observers on every state transition.
#[derive(Clone, Debug)]
pub enum ObserverEvent {
    Fulfilled(Value),
    Rejected(Arc<Error>),
    /// The binding went back to pending (redefinition in flight or deletion).
    Invalidated,
}

struct Inner {
    state: ObserverState,
    last_value: Option<Value>,
    next_id: ObserverId,
    observers: BTreeMap<ObserverId, ObserverCallback>,
}

pub struct ObserverSet {
    inner: Mutex<Inner>,
}

impl Default for ObserverSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverSet {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ObserverState::Pending,
                last_value: None,
                next_id: 0,
                observers: BTreeMap::new(),
            }),
        }
    }

    pub fn state(&self) -> ObserverState {
        self.inner.lock().unwrap().state.clone()
    }

    /// Last fulfilled value, surviving a later rejection.
    pub fn value(&self) -> Option<Value> {
        self.inner.lock().unwrap().last_value.clone()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lock().unwrap().observers.len()
    }

    /// Attach an observer. Replays the cached fulfilled value synchronously,
    /// before any newer notification can arrive.
    pub fn add_observer(&self, callback: ObserverCallback) -> ObserverId {
        let (id, replay) = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.observers.insert(id, callback.clone());
            (id, inner.last_value.clone())
        };
        if let Some(value) = replay {
            callback(&ObserverEvent::Fulfilled(value));
        }
        id
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.lock().unwrap().observers.remove(&id).is_some()
    }

    pub fn fulfilled(&self, value: Value) {
        let snapshot = {
            let mut inner = self.inner.lock().unwrap();
            inner.state = ObserverState::Fulfilled(value.clone());
            inner.last_value = Some(value.clone());
            inner.observers.values().cloned().collect::<Vec<_>>()
        };
        let event = ObserverEvent::Fulfilled(value);
        for callback in snapshot {
            callback(&event);
        }
    }

    pub fn rejected(&self, error: Arc<Error>) {
        let snapshot = {
            let mut inner = self.inner.lock().unwrap();
            inner.state = ObserverState::Rejected(error.clone());
            inner.observers.values().cloned().collect::<Vec<_>>()
        };
        let event = ObserverEvent::Rejected(error);
        for callback in snapshot {
            callback(&event);
        }
    }

    /// Reset to pending and drop the replay cache, notifying observers.
    pub fn invalidate(&self) {
        let snapshot = {
            let mut inner = self.inner.lock().unwrap();
            inner.state = ObserverState::Pending;
            inner.last_value = None;
            inner.observers.values().cloned().collect::<Vec<_>>()
        };
        for callback in snapshot {
            callback(&ObserverEvent::Invalidated);
        }
    }

    /// Drop every observer and reset state. Nothing is notified.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.observers.clear();
        inner.state = ObserverState::Pending;
        inner.last_value = None;
    }
}
