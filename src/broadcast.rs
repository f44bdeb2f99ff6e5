//! Cross-instance state synchronization.
//!
//! Every widget instance that shows a persisted value subscribes to its key.
//! Whoever changes the value writes it to the store and then publishes it
//! here; all instances bound to the key update in place, synchronously and in
//! subscription order, without a store read and without a re-render.
//!
//! ```text
//!  click ─► store.set(key, 3) ─► bus.publish(key, 3) ─┬─► tracker #1  (3/6)
//!                                                     ├─► tracker #2  (3/6)
//!                                                     └─► tracker #3  (3/4, clamped)
//! ```

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

/// A value change announced to every listener of `key`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateEvent {
    pub key: String,
    pub value: Value,
}

impl StateEvent {
    /// The value as a non-negative count (tracker fill level).
    pub fn as_count(&self) -> Option<usize> {
        match &self.value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .and_then(|n| usize::try_from(n).ok()),
            _ => None,
        }
    }

    /// The value as a boolean array (checklist state).
    pub fn as_bools(&self) -> Option<Vec<bool>> {
        self.value
            .as_array()
            .map(|items| items.iter().map(|v| v.as_bool().unwrap_or(false)).collect())
    }
}

type Listener = Rc<dyn Fn(&StateEvent)>;

#[derive(Default)]
struct Channels {
    next_id: u64,
    listeners: FxHashMap<String, Vec<(u64, Listener)>>,
}

impl Channels {
    fn contains(&self, key: &str, id: u64) -> bool {
        self.listeners
            .get(key)
            .is_some_and(|list| list.iter().any(|(i, _)| *i == id))
    }
}

/// Publish/subscribe service keyed by logical value key.
///
/// Passed by reference to whoever needs it; clones share the same channels.
#[derive(Clone, Default)]
pub struct Broadcast {
    channels: Rc<RefCell<Channels>>,
}

impl Broadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen for changes of `key` until the returned guard is dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(
        &self,
        key: impl Into<String>,
        listener: impl Fn(&StateEvent) + 'static,
    ) -> Subscription {
        let key = key.into();
        let mut channels = self.channels.borrow_mut();
        channels.next_id += 1;
        let id = channels.next_id;
        channels
            .listeners
            .entry(key.clone())
            .or_default()
            .push((id, Rc::new(listener)));

        Subscription {
            channels: Rc::downgrade(&self.channels),
            key,
            id,
        }
    }

    /// Deliver `value` to every current listener of `key`.
    ///
    /// Listeners run before this returns, in subscription order. A listener
    /// removed by an earlier one during delivery is skipped; listeners added
    /// during delivery only see later events. Returns the number of listeners
    /// called.
    pub fn publish(&self, key: &str, value: Value) -> usize {
        let snapshot: Vec<(u64, Listener)> = match self.channels.borrow().listeners.get(key) {
            Some(list) => list.clone(),
            None => return 0,
        };

        let event = StateEvent {
            key: key.to_string(),
            value,
        };

        let mut delivered = 0;
        for (id, listener) in snapshot {
            if self.channels.borrow().contains(key, id) {
                listener(&event);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn listener_count(&self, key: &str) -> usize {
        self.channels.borrow().listeners.get(key).map_or(0, Vec::len)
    }
}

/// Unsubscribes on drop.
pub struct Subscription {
    channels: Weak<RefCell<Channels>>,
    key: String,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(channels) = self.channels.upgrade() else {
            return;
        };
        // Dropped while the channels are borrowed means the bus is being torn down.
        let Ok(mut channels) = channels.try_borrow_mut() else {
            return;
        };
        if let Some(list) = channels.listeners.get_mut(&self.key) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                channels.listeners.remove(&self.key);
            }
        }
    }
}
