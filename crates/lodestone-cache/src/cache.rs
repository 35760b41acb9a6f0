//! The cache itself: a mutex-guarded map of deadline-stamped entries.
//!
//! # Locking
//!
//! Every operation takes the internal `std::sync::Mutex` for a short,
//! purely synchronous critical section. The lock is never held across an
//! `.await` and never held while the eviction listener runs: evicted
//! entries are collected under the lock and handed to the listener after
//! it is released. A listener may therefore call back into the cache
//! without deadlocking.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{CacheConfig, MAX_TTL};

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// The deadline passed and a sweep removed the entry.
    Expired,
    /// The entry was removed explicitly (`remove` / `clear`).
    Removed,
    /// A new value was inserted under the same key.
    Replaced,
}

/// Callback invoked synchronously for every evicted entry.
///
/// Listeners run on whatever thread performed the eviction (a request
/// task, the sweeper task, ...). They must not block and cannot await.
pub type EvictionListener<K, V> =
    Arc<dyn Fn(&K, &V, EvictionReason) + Send + Sync>;

/// Result of [`TtlCache::peek`]: the value and its deadline, tagged with
/// whether that deadline has already passed.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    /// The entry is within its TTL.
    Live { value: V, deadline: Instant },
    /// The deadline passed but no sweep has evicted the entry yet.
    Expired { value: V, deadline: Instant },
}

impl<V> Lookup<V> {
    /// Returns `true` for [`Lookup::Live`].
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }

    /// Borrows the value regardless of liveness.
    pub fn value(&self) -> &V {
        match self {
            Self::Live { value, .. } | Self::Expired { value, .. } => value,
        }
    }

    /// The instant at which the entry expires (or expired).
    pub fn deadline(&self) -> Instant {
        match self {
            Self::Live { deadline, .. } | Self::Expired { deadline, .. } => {
                *deadline
            }
        }
    }

    /// Unwraps the value regardless of liveness.
    pub fn into_inner(self) -> V {
        match self {
            Self::Live { value, .. } | Self::Expired { value, .. } => value,
        }
    }
}

struct Entry<V> {
    value: V,
    ttl: Duration,
    deadline: Instant,
}

impl<V> Entry<V> {
    fn new(value: V, ttl: Duration, now: Instant) -> Self {
        let ttl = ttl.min(MAX_TTL);
        Self {
            value,
            ttl,
            deadline: now + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Pushes the deadline to `now + ttl`. Never moves it backwards.
    fn slide(&mut self, now: Instant) -> Instant {
        self.deadline = self.deadline.max(now + self.ttl);
        self.deadline
    }
}

struct Inner<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    listener: Option<EvictionListener<K, V>>,
    config: CacheConfig,
}

/// A thread-safe key/value cache with per-entry sliding TTLs.
///
/// Cloning a `TtlCache` is cheap and yields another handle to the same
/// underlying map, so one instance can be shared by every component that
/// needs it.
pub struct TtlCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty cache with no eviction listener.
    pub fn new(config: CacheConfig) -> Self {
        Self::build(config, None)
    }

    /// Creates an empty cache that reports every eviction to `listener`.
    pub fn with_listener(
        config: CacheConfig,
        listener: impl Fn(&K, &V, EvictionReason) + Send + Sync + 'static,
    ) -> Self {
        Self::build(config, Some(Arc::new(listener)))
    }

    fn build(
        config: CacheConfig,
        listener: Option<EvictionListener<K, V>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                listener,
                config: config.validated(),
            }),
        }
    }

    /// The (validated) configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Inserts or overwrites `key` with a fresh deadline of `now + ttl`
    /// and returns that deadline.
    ///
    /// `ttl` is capped at [`MAX_TTL`]. An existing value (live or expired)
    /// is reported to the listener as [`EvictionReason::Replaced`].
    pub fn insert(&self, key: K, value: V, ttl: Duration) -> Instant {
        let entry = Entry::new(value, ttl, Instant::now());
        let deadline = entry.deadline;

        let replaced = {
            let mut entries = self.lock();
            let old = entries.remove_entry(&key);
            entries.insert(key, entry);
            old
        };

        if let Some((key, old)) = replaced {
            self.notify(vec![(key, old.value, EvictionReason::Replaced)]);
        }
        deadline
    }

    /// Inserts `value` only if `key` holds no live entry, and returns the
    /// new deadline. Returns `None` and leaves the live entry untouched
    /// otherwise.
    ///
    /// An expired entry awaiting a sweep is overwritten and reported as
    /// [`EvictionReason::Replaced`].
    pub fn insert_unless_live(&self, key: K, value: V, ttl: Duration) -> Option<Instant> {
        let now = Instant::now();
        let entry = Entry::new(value, ttl, now);
        let deadline = entry.deadline;

        let replaced = {
            let mut entries = self.lock();
            if entries.get(&key).is_some_and(|e| !e.is_expired(now)) {
                return None;
            }
            let old = entries.remove_entry(&key);
            entries.insert(key, entry);
            old
        };

        if let Some((key, old)) = replaced {
            self.notify(vec![(key, old.value, EvictionReason::Replaced)]);
        }
        Some(deadline)
    }

    /// Inserts with the configured default TTL.
    pub fn insert_default(&self, key: K, value: V) -> Instant {
        self.insert(key, value, self.inner.config.default_ttl)
    }

    /// Returns a clone of the value if the entry is live.
    ///
    /// Reading does not slide the TTL; use [`touch`](Self::touch) for that.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entries = self.lock();
        entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone())
    }

    /// Returns the value along with its liveness, including entries that
    /// have expired but not been swept yet.
    pub fn peek(&self, key: &K) -> Option<Lookup<V>> {
        let now = Instant::now();
        let entries = self.lock();
        entries.get(key).map(|e| {
            let value = e.value.clone();
            let deadline = e.deadline;
            if e.is_expired(now) {
                Lookup::Expired { value, deadline }
            } else {
                Lookup::Live { value, deadline }
            }
        })
    }

    /// Returns `true` if `key` holds a live entry.
    pub fn contains_live(&self, key: &K) -> bool {
        let now = Instant::now();
        self.lock().get(key).is_some_and(|e| !e.is_expired(now))
    }

    /// Slides a live entry's deadline to `now + ttl` and returns it.
    ///
    /// Returns `None` (and changes nothing) for absent or expired entries:
    /// touching never resurrects.
    pub fn touch(&self, key: &K) -> Option<Instant> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.slide(now)),
            _ => None,
        }
    }

    /// Mutates a live value in place and slides its deadline, atomically.
    ///
    /// Returns whatever `f` returns, or `None` if the entry is absent or
    /// expired (in which case `f` is not called).
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                let out = f(&mut entry.value);
                entry.slide(now);
                Some(out)
            }
            _ => None,
        }
    }

    /// Removes `key` immediately, live or expired.
    ///
    /// The listener sees [`EvictionReason::Removed`].
    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.lock().remove_entry(key);
        let (key, entry) = removed?;
        let value = entry.value.clone();
        self.notify(vec![(key, entry.value, EvictionReason::Removed)]);
        Some(value)
    }

    /// Time left before `key` expires, or `None` if it is absent or
    /// already expired.
    pub fn remaining_ttl(&self, key: &K) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.lock();
        entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.deadline.saturating_duration_since(now))
    }

    /// Evicts every expired entry and returns how many were evicted.
    ///
    /// Each evicted entry is reported as [`EvictionReason::Expired`].
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let evicted: Vec<_> = {
            let mut entries = self.lock();
            let expired: Vec<K> = entries
                .iter()
                .filter(|(_, e)| e.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            expired
                .iter()
                .filter_map(|k| entries.remove_entry(k))
                .map(|(k, e)| (k, e.value, EvictionReason::Expired))
                .collect()
        };

        let count = evicted.len();
        if count > 0 {
            tracing::debug!(evicted = count, "cache sweep evicted entries");
        }
        self.notify(evicted);
        count
    }

    /// Removes every entry, reporting each as [`EvictionReason::Removed`].
    pub fn clear(&self) {
        let drained: Vec<_> = self
            .lock()
            .drain()
            .map(|(k, e)| (k, e.value, EvictionReason::Removed))
            .collect();
        self.notify(drained);
    }

    /// Number of stored entries, including expired ones awaiting a sweep.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Spawns a task that calls [`sweep`](Self::sweep) every
    /// `sweep_interval`. Abort the returned handle to stop it.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let cache = self.clone();
        let period = self.inner.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                cache.sweep();
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        // A panicking listener never runs under the lock, so poisoning can
        // only come from a panic inside a short map operation; the map is
        // still structurally sound.
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, evicted: Vec<(K, V, EvictionReason)>) {
        let Some(listener) = &self.inner.listener else {
            return;
        };
        for (key, value, reason) in &evicted {
            listener(key, value, *reason);
        }
    }
}
