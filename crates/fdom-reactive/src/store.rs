#![forbid(unsafe_code)]

//! Keyed collections of independent signals.
//!
//! A [`Store<K, V>`] holds one [`Signal<V>`] per key, in insertion order.
//! Writing one key notifies only the effects that read that key.

use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::runtime::Runtime;
use crate::signal::Signal;

/// An ordered map of per-key signals.
pub struct Store<K, V> {
    runtime: Runtime,
    entries: IndexMap<K, Signal<V>, ahash::RandomState>,
}

impl<K: Hash + Eq, V: 'static> Store<K, V> {
    /// Build a store with one signal per initial entry.
    pub fn new(runtime: &Runtime, initial: impl IntoIterator<Item = (K, V)>) -> Self {
        let entries = initial
            .into_iter()
            .map(|(key, value)| (key, runtime.signal(value)))
            .collect();
        Self {
            runtime: runtime.clone(),
            entries,
        }
    }

    /// The signal for `key`.
    #[must_use]
    pub fn signal(&self, key: &K) -> Option<&Signal<V>> {
        self.entries.get(key)
    }

    /// Current value of `key`; subscribes the running effect.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.entries.get(key).map(Signal::get)
    }

    /// Set `key`. Returns `false` when the key is unknown.
    pub fn set(&self, key: &K, value: V) -> bool
    where
        V: PartialEq,
    {
        match self.entries.get(key) {
            Some(signal) => {
                signal.set(value);
                true
            }
            None => false,
        }
    }

    /// Update `key` from its current value. Returns `false` when the key is
    /// unknown.
    pub fn update(&self, key: &K, f: impl FnOnce(&V) -> V) -> bool
    where
        V: PartialEq,
    {
        match self.entries.get(key) {
            Some(signal) => {
                signal.update(f);
                true
            }
            None => false,
        }
    }

    /// Add a key, or set it if present. Returns the key's signal.
    pub fn insert(&mut self, key: K, value: V) -> &Signal<V>
    where
        V: PartialEq,
    {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                let signal = entry.into_mut();
                signal.set(value);
                signal
            }
            Entry::Vacant(entry) => entry.insert(self.runtime.signal(value)),
        }
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Store<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl Runtime {
    /// Create a store of per-key signals.
    pub fn store<K: Hash + Eq, V: 'static>(
        &self,
        initial: impl IntoIterator<Item = (K, V)>,
    ) -> Store<K, V> {
        Store::new(self, initial)
    }
}
