//! MemStore — generic in-memory keyed container.
//!
//! One reader/writer lock guards each instance: reads overlap, a write
//! excludes everything else. Key cardinality is low and writes are
//! infrequent, so there is no per-key locking.
//!
//! # Re-entrancy
//!
//! The visitor passed to [`MemStore::for_each`] runs while the read lock is
//! held. It must not call back into the same store; a write from inside
//! the visitor deadlocks or panics.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;
use tracing::debug;

use crate::codec::{RawValue, merge};
use crate::error::StateError;
use crate::types::{Metric, MetricKey, MetricValue};

/// Cooperative cancellation consulted between visits of [`MemStore::for_each`].
pub trait Cancellation {
    fn is_cancelled(&self) -> bool;
}

/// Shutdown channels cancel once `true` has been sent.
impl Cancellation for watch::Receiver<bool> {
    fn is_cancelled(&self) -> bool {
        *self.borrow()
    }
}

/// Never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uncancellable;

impl Cancellation for Uncancellable {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Thread-safe keyed container.
#[derive(Debug)]
pub struct MemStore<K, V> {
    entries: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> Clone for MemStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K, V> Default for MemStore<K, V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K, V> MemStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation is a single map operation, so a poisoned lock still
    // guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the value under `key`.
    pub fn set(&self, key: K, value: V) {
        self.write().insert(key, value);
    }

    /// Clone of the value under `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        self.read().get(key).cloned()
    }

    /// Remove `key`. Returns true if it existed.
    pub fn delete(&self, key: &K) -> bool {
        self.write().remove(key).is_some()
    }

    /// Atomic read-modify-write. `f` sees the current value and returns the
    /// replacement; the write lock is held throughout.
    pub fn update<F>(&self, key: K, f: F) -> V
    where
        F: FnOnce(Option<&V>) -> V,
    {
        let mut entries = self.write();
        let next = f(entries.get(&key));
        entries.insert(key, next.clone());
        next
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.read().keys().cloned().collect()
    }

    /// Cloned copy of every entry.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Visit every entry under the read lock.
    ///
    /// Stops at the first visitor error, or with [`StateError::Cancelled`]
    /// when `cancel` fires between visits. The visitor must not touch this
    /// store.
    pub fn for_each<C, F, E>(&self, cancel: &C, mut visit: F) -> Result<(), E>
    where
        C: Cancellation + ?Sized,
        F: FnMut(&K, &V) -> Result<(), E>,
        E: From<StateError>,
    {
        let entries = self.read();
        for (key, value) in entries.iter() {
            if cancel.is_cancelled() {
                return Err(StateError::Cancelled.into());
            }
            visit(key, value)?;
        }
        Ok(())
    }
}

// ── Metric store ───────────────────────────────────────────────────

/// Store of raw metric values keyed by `(kind, name)`.
pub type MetricStore = MemStore<MetricKey, RawValue>;

impl MemStore<MetricKey, RawValue> {
    /// Merge `metric` into the store and return the resulting value.
    pub fn apply(&self, metric: &Metric) -> MetricValue {
        let key = metric.key();
        let kind = key.kind();
        let raw = self.update(key, |previous| merge(previous, metric.value).to_raw());
        let merged = MetricValue::from_raw(kind, &raw);
        debug!(name = %metric.name, %kind, value = %merged, "metric applied");
        merged
    }

    /// Decoded value under `key`, if present.
    pub fn value(&self, key: &MetricKey) -> Option<MetricValue> {
        self.get(key).map(|raw| MetricValue::from_raw(key.kind(), &raw))
    }

    /// Every stored metric, decoded. Counters carry their totals.
    pub fn metrics(&self) -> Vec<Metric> {
        self.snapshot()
            .into_iter()
            .map(|(key, raw)| Metric::new(key.name(), MetricValue::from_raw(key.kind(), &raw)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{RAW_VALUE_LEN, decode_counter, encode_counter, encode_gauge};
    use std::thread;

    #[test]
    fn set_get_delete() {
        let store: MemStore<String, Vec<u8>> = MemStore::new();
        store.set("a".into(), vec![1]);

        assert_eq!(store.get(&"a".to_string()), Some(vec![1]));
        assert_eq!(store.len(), 1);
        assert!(store.delete(&"a".to_string()));
        assert!(!store.delete(&"a".to_string()));
        assert!(store.is_empty());
    }

    #[test]
    fn get_unknown_key_is_none() {
        let store: MemStore<String, u64> = MemStore::new();
        assert_eq!(store.get(&"nope".to_string()), None);
    }

    #[test]
    fn for_each_on_empty_store_visits_nothing() {
        let store: MemStore<String, u64> = MemStore::new();
        let mut visits = 0;
        store
            .for_each(&Uncancellable, |_, _| -> Result<(), StateError> {
                visits += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(visits, 0);
    }

    #[test]
    fn for_each_stops_on_visitor_error() {
        let store: MemStore<u32, u32> = MemStore::new();
        for i in 0..10 {
            store.set(i, i);
        }
        let mut visits = 0;
        let result = store.for_each(&Uncancellable, |_, _| {
            visits += 1;
            if visits == 3 {
                Err(StateError::EmptyName)
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(StateError::EmptyName)));
        assert_eq!(visits, 3);
    }

    #[test]
    fn for_each_honours_cancellation() {
        let store: MemStore<u32, u32> = MemStore::new();
        store.set(1, 1);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let result = store.for_each(&rx, |_, _| -> Result<(), StateError> { Ok(()) });
        assert!(matches!(result, Err(StateError::Cancelled)));
    }

    #[test]
    fn keys_and_snapshot() {
        let store: MemStore<String, u8> = MemStore::new();
        store.set("x".into(), 1);
        store.set("y".into(), 2);

        let mut keys = store.keys();
        keys.sort();
        assert_eq!(keys, vec!["x".to_string(), "y".to_string()]);

        let mut snapshot = store.snapshot();
        snapshot.sort();
        assert_eq!(snapshot, vec![("x".to_string(), 1), ("y".to_string(), 2)]);
    }

    #[test]
    fn clones_share_entries() {
        let store: MemStore<u8, u8> = MemStore::new();
        let other = store.clone();
        other.set(1, 2);
        assert_eq!(store.get(&1), Some(2));
    }

    #[test]
    fn update_is_atomic_under_contention() {
        let store: MemStore<&'static str, RawValue> = MemStore::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        store.update("n", |prev| {
                            encode_counter(prev.map(|r| decode_counter(r)).unwrap_or(0) + 1)
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(decode_counter(&store.get(&"n").unwrap()), 8000);
    }

    #[test]
    fn concurrent_set_and_for_each_never_tear_values() {
        let store: MemStore<u32, Vec<u8>> = MemStore::new();
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..500u32 {
                        store.set(i % 16, encode_counter(i64::from(i * w)).to_vec());
                    }
                })
            })
            .collect();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        store
                            .for_each(&Uncancellable, |_, v| -> Result<(), StateError> {
                                assert!(v.is_empty() || v.len() == RAW_VALUE_LEN);
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in writers.into_iter().chain(readers) {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 16);
    }

    // ── Metric store ───────────────────────────────────────────────

    #[test]
    fn apply_counter_accumulates() {
        let store = MetricStore::new();
        assert_eq!(store.apply(&Metric::counter("cnt", 1)), MetricValue::Counter(1));
        assert_eq!(store.apply(&Metric::counter("CNT", 2)), MetricValue::Counter(3));
        assert_eq!(store.value(&MetricKey::counter("cnt")), Some(MetricValue::Counter(3)));
    }

    #[test]
    fn apply_gauge_replaces() {
        let store = MetricStore::new();
        store.apply(&Metric::gauge("g", 1.0));
        store.apply(&Metric::gauge("g", 2.5));
        assert_eq!(store.value(&MetricKey::gauge("g")), Some(MetricValue::Gauge(2.5)));
    }

    #[test]
    fn gauge_and_counter_with_same_name_are_distinct() {
        let store = MetricStore::new();
        store.set(MetricKey::gauge("x"), encode_gauge(1.5));
        store.set(MetricKey::counter("x"), encode_counter(4));
        assert_eq!(store.len(), 2);
        assert_eq!(store.value(&MetricKey::gauge("x")), Some(MetricValue::Gauge(1.5)));
        assert_eq!(store.value(&MetricKey::counter("x")), Some(MetricValue::Counter(4)));
    }

    #[test]
    fn metrics_decodes_every_entry() {
        let store = MetricStore::new();
        store.apply(&Metric::gauge("Alloc", 10.0));
        store.apply(&Metric::counter("PollCount", 3));

        let mut metrics = store.metrics();
        metrics.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            metrics,
            vec![Metric::gauge("alloc", 10.0), Metric::counter("pollcount", 3)]
        );
    }
}
