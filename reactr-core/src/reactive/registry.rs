//! Subscriber Registries
//!
//! Each container owns one [`Registry`] holding three independent maps from
//! field name to observers:
//!
//! - plain callbacks, in registration order,
//! - weak bound-method entries, in registration order,
//! - one lazily created wait signal per field.
//!
//! A field name missing from a map means zero observers of that kind. Lists
//! emptied by removal are dropped from the map.
//!
//! # Locking
//!
//! Each map sits behind its own mutex, held only long enough to copy or edit
//! a list. Fan-out works on snapshots, so observers may call back into the
//! registry while they run.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::subscriber::{Callback, SubscriptionId, WeakEntry};
use super::wait::WaitSignal;

/// Snapshot of one field's observers of a single kind.
pub(crate) type Snapshot<T> = SmallVec<[T; 4]>;

pub(crate) struct Registry<M> {
    callbacks: Mutex<IndexMap<String, Vec<Callback<M>>>>,
    weak: Mutex<IndexMap<String, Vec<WeakEntry<M>>>>,
    signals: Mutex<IndexMap<String, Arc<WaitSignal>>>,
}

impl<M> Registry<M> {
    pub(crate) fn new() -> Self {
        Self {
            callbacks: Mutex::new(IndexMap::new()),
            weak: Mutex::new(IndexMap::new()),
            signals: Mutex::new(IndexMap::new()),
        }
    }

    pub(crate) fn add_callback(&self, field: &str, callback: Callback<M>) {
        self.callbacks
            .lock()
            .entry(field.to_owned())
            .or_default()
            .push(callback);
    }

    pub(crate) fn add_weak(&self, field: &str, entry: WeakEntry<M>) {
        self.weak
            .lock()
            .entry(field.to_owned())
            .or_default()
            .push(entry);
    }

    /// Remove a weak entry from every field's list.
    ///
    /// Returns `true` if anything was removed.
    pub(crate) fn remove_weak(&self, id: SubscriptionId) -> bool {
        let mut weak = self.weak.lock();
        let mut removed = false;

        for entries in weak.values_mut() {
            let before = entries.len();
            entries.retain(|entry| entry.id != id);
            removed |= entries.len() != before;
        }
        weak.retain(|_, entries| !entries.is_empty());

        removed
    }

    /// Remove every weak entry whose target is gone.
    ///
    /// Returns the number of entries removed.
    pub(crate) fn remove_dead(&self) -> usize {
        let mut weak = self.weak.lock();
        let mut removed = 0;

        for entries in weak.values_mut() {
            let before = entries.len();
            entries.retain(|entry| entry.observer.is_alive());
            removed += before - entries.len();
        }
        weak.retain(|_, entries| !entries.is_empty());

        removed
    }

    pub(crate) fn callbacks(&self, field: &str) -> Snapshot<Callback<M>> {
        self.callbacks
            .lock()
            .get(field)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn weak_entries(&self, field: &str) -> Snapshot<WeakEntry<M>> {
        self.weak
            .lock()
            .get(field)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Get the wait signal for a field, creating it on first use.
    pub(crate) fn signal_or_insert(&self, field: &str) -> Arc<WaitSignal> {
        let mut signals = self.signals.lock();
        if let Some(signal) = signals.get(field) {
            return Arc::clone(signal);
        }
        let signal = Arc::new(WaitSignal::new());
        signals.insert(field.to_owned(), Arc::clone(&signal));
        signal
    }

    pub(crate) fn signal(&self, field: &str) -> Option<Arc<WaitSignal>> {
        self.signals.lock().get(field).cloned()
    }

    pub(crate) fn callback_count(&self, field: &str) -> usize {
        self.callbacks.lock().get(field).map_or(0, Vec::len)
    }

    pub(crate) fn weak_count(&self, field: &str) -> usize {
        self.weak.lock().get(field).map_or(0, Vec::len)
    }

    pub(crate) fn has_signal(&self, field: &str) -> bool {
        self.signals.lock().contains_key(field)
    }
}
