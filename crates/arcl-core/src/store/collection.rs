// ── Keyed mirror collection ──
//
// Concurrent storage for one mirrored entity type. Readers get cheap
// `Arc` snapshots; writers are the owning manager's tasks only.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

/// A concurrent, reactive map for a single entity type.
///
/// Every mutation bumps a version counter and republishes the snapshot
/// that [`MirrorStream`](crate::MirrorStream) subscribers receive.
pub(crate) struct Mirror<T: Clone + Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, republished on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Mirror<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Insert or replace an entity. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: impl Into<String>, entity: T) -> bool {
        let is_new = self.by_key.insert(key.into(), Arc::new(entity)).is_none();
        self.publish();
        is_new
    }

    /// Insert only if absent. Returns `true` if inserted.
    pub(crate) fn insert_if_absent(&self, key: &str, make: impl FnOnce() -> T) -> bool {
        let inserted = match self.by_key.entry(key.to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(make()));
                true
            }
        };
        if inserted {
            self.publish();
        }
        inserted
    }

    /// Read-modify-write one key under its shard lock.
    ///
    /// `f` sees `None` for an absent key. Leaving `Some` stores the value,
    /// leaving `None` removes the key. No other writer can touch the key
    /// while `f` runs.
    pub(crate) fn merge<R>(&self, key: &str, f: impl FnOnce(&mut Option<T>) -> R) -> R {
        let (result, changed) = match self.by_key.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let mut slot = Some(T::clone(occupied.get()));
                let result = f(&mut slot);
                match slot {
                    Some(value) => {
                        occupied.insert(Arc::new(value));
                    }
                    None => {
                        occupied.remove();
                    }
                }
                (result, true)
            }
            Entry::Vacant(vacant) => {
                let mut slot = None;
                let result = f(&mut slot);
                let changed = slot.is_some();
                if let Some(value) = slot {
                    vacant.insert(Arc::new(value));
                }
                (result, changed)
            }
        };
        // Shard lock is released here; publishing iterates the map.
        if changed {
            self.publish();
        }
        result
    }

    /// Mutate an existing entity. Returns `false` if the key is absent.
    pub(crate) fn update(&self, key: &str, f: impl FnOnce(&mut T)) -> bool {
        self.merge(key, |slot| match slot {
            Some(entity) => {
                f(entity);
                true
            }
            None => false,
        })
    }

    /// Apply `f` to every entity.
    pub(crate) fn update_all(&self, mut f: impl FnMut(&mut T)) {
        if self.by_key.is_empty() {
            return;
        }
        for mut entry in self.by_key.iter_mut() {
            f(Arc::make_mut(entry.value_mut()));
        }
        self.publish();
    }

    /// Remove an entity by key. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    /// Remove all entities.
    pub(crate) fn clear(&self) {
        self.by_key.clear();
        self.publish();
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.by_key.iter().map(|r| r.key().clone()).collect()
    }

    /// Wait until `pred` holds, re-checking after every mutation.
    /// Returns `false` if `timeout` elapses first.
    pub(crate) async fn wait_until(&self, timeout: Duration, mut pred: impl FnMut(&Self) -> bool) -> bool {
        // Subscribe before the first check so no mutation slips between.
        let mut version = self.version.subscribe();
        let wait = async {
            loop {
                if pred(self) {
                    return true;
                }
                if version.changed().await.is_err() {
                    return false;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.unwrap_or(false)
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn publish(&self) {
        // Collected under the channel lock so concurrent writers cannot
        // publish snapshots out of order.
        self.snapshot.send_modify(|snap| {
            *snap = Arc::new(self.by_key.iter().map(|r| Arc::clone(r.value())).collect());
        });
        self.version.send_modify(|v| *v += 1);
    }
}
