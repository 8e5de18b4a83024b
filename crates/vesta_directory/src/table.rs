//! The shared key/value table behind every directory node.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{ListenCallback, Subscription};

/// Identifies one registered callback within a [`Table`].
pub type ListenerId = u64;

#[derive(Default)]
struct Inner {
    values: HashMap<String, Vec<String>>,
    listeners: HashMap<String, Vec<(ListenerId, ListenCallback)>>,
    next_listener: ListenerId,
}

/// Multi-valued key/value store with publication callbacks.
///
/// Values under a key keep arrival order and identical values are stored
/// once. Every `put` that adds a value notifies that key's listeners with
/// the full value list.
#[derive(Default)]
pub struct Table {
    inner: Mutex<Inner>,
}

impl Table {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` under `key` and notifies listeners.
    ///
    /// Returns `false` if the value was already present, in which case no
    /// listener fires.
    pub fn put(&self, key: &str, value: &str) -> bool {
        let mut inner = self.inner.lock();
        let Inner {
            values, listeners, ..
        } = &mut *inner;

        let stored = values.entry(key.to_string()).or_default();
        if stored.iter().any(|v| v == value) {
            return false;
        }
        stored.push(value.to_string());
        let snapshot: &[String] = stored.as_slice();

        if let Some(callbacks) = listeners.get_mut(key) {
            callbacks.retain_mut(|(_, cb)| cb(snapshot));
            if callbacks.is_empty() {
                listeners.remove(key);
            }
        }
        true
    }

    /// Every value under `key`, in arrival order.
    pub fn get(&self, key: &str) -> Vec<String> {
        self.inner
            .lock()
            .values
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Registers `callback` for `key`, firing it at once if values exist.
    ///
    /// A callback that returns `false` on that first call is never stored;
    /// its id is still returned and [`unlisten`](Table::unlisten) ignores it.
    pub fn listen(&self, key: &str, mut callback: ListenCallback) -> ListenerId {
        let mut inner = self.inner.lock();
        let id = inner.next_listener;
        inner.next_listener += 1;
        if let Some(stored) = inner.values.get(key) {
            if !stored.is_empty() && !callback(stored) {
                return id;
            }
        }
        inner
            .listeners
            .entry(key.to_string())
            .or_default()
            .push((id, callback));
        id
    }

    /// Removes the callback registered as `id` under `key`.
    ///
    /// Returns `false` if it already deregistered itself.
    pub fn unlisten(&self, key: &str, id: ListenerId) -> bool {
        let mut inner = self.inner.lock();
        let Some(callbacks) = inner.listeners.get_mut(key) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|(registered, _)| *registered != id);
        let removed = callbacks.len() != before;
        if callbacks.is_empty() {
            inner.listeners.remove(key);
        }
        removed
    }

    /// Registers `callback` and ties its lifetime to the returned handle.
    pub fn subscribe(self: &Arc<Self>, key: &str, callback: ListenCallback) -> Subscription {
        let id = self.listen(key, callback);
        let table: Weak<Table> = Arc::downgrade(self);
        let key = key.to_string();
        Subscription::new(move || {
            if let Some(table) = table.upgrade() {
                table.unlisten(&key, id);
            }
        })
    }

    /// Number of active subscriptions for `key`.
    pub fn listener_count(&self, key: &str) -> usize {
        self.inner.lock().listeners.get(key).map_or(0, Vec::len)
    }

    /// Drops every subscription.
    pub fn clear_listeners(&self) {
        self.inner.lock().listeners.clear();
    }
}
