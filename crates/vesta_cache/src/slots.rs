//! Per-key slots serializing lookup and insertion.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use vesta_common::SpecKey;

/// A slot holds the live artifact for one key, if any.
pub type Slot<A> = Arc<Mutex<Option<Arc<A>>>>;

/// A map from key to slot where each slot has its own lock.
///
/// The outer lock is held only long enough to find or create a slot. A
/// resolver then holds the slot lock across its whole check-build-insert
/// sequence, so concurrent resolvers of one key serialize while different
/// keys proceed in parallel. Slots are never removed from the map: taking
/// an artifact empties the slot but keeps it, so a resolver that already
/// holds the slot cannot race a newcomer that would otherwise get a fresh one.
pub struct KeyedSlots<A> {
    slots: Mutex<BTreeMap<SpecKey, Slot<A>>>,
}

impl<A> KeyedSlots<A> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the slot for `key`, creating an empty one if needed.
    pub fn slot(&self, key: SpecKey) -> Slot<A> {
        self.slots.lock().entry(key).or_default().clone()
    }

    /// Returns the live artifact for `key` without touching its link state.
    pub fn get(&self, key: SpecKey) -> Option<Arc<A>> {
        let slot = self.slots.lock().get(&key).cloned()?;
        let entry = slot.lock();
        entry.clone()
    }

    /// Empties the slot for `key`, returning what it held.
    pub fn take(&self, key: SpecKey) -> Option<Arc<A>> {
        let slot = self.slots.lock().get(&key).cloned()?;
        let mut entry = slot.lock();
        entry.take()
    }

    /// Whether `key` currently holds an artifact.
    pub fn contains(&self, key: SpecKey) -> bool {
        self.get(key).is_some()
    }

    /// Keys that currently hold an artifact, in key order.
    pub fn keys(&self) -> Vec<SpecKey> {
        let slots: Vec<(SpecKey, Slot<A>)> = self
            .slots
            .lock()
            .iter()
            .map(|(k, s)| (*k, s.clone()))
            .collect();
        slots
            .into_iter()
            .filter(|(_, slot)| slot.lock().is_some())
            .map(|(k, _)| k)
            .collect()
    }

    /// Every live artifact, in key order.
    pub fn values(&self) -> Vec<Arc<A>> {
        let slots: Vec<Slot<A>> = self.slots.lock().values().cloned().collect();
        slots.iter().filter_map(|slot| slot.lock().clone()).collect()
    }

    /// Number of keys holding an artifact.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// Whether no key holds an artifact.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A> Default for KeyedSlots<A> {
    fn default() -> Self {
        Self::new()
    }
}
