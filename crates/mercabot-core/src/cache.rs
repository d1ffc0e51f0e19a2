//! Time-based read-through cache with an injectable clock.
//!
//! Entries expire by comparing their insertion time with the clock, never by
//! eviction count. One cache instance is built per process and shared by
//! reference; readers never block each other.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};

// ─────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────

/// Source of "now". Swapped for [`ManualClock`] in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        ManualClock::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The process clock used when nothing is injected.
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

// ─────────────────────────────────────────────
// TtlCache
// ─────────────────────────────────────────────

struct Entry<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        TtlCache {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| now - entry.stored_at < self.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Store `value`, dropping expired entries first so the map only ever
    /// holds what was inserted within one TTL.
    pub fn insert(&self, key: K, value: V) {
        let stored_at = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| stored_at - entry.stored_at < self.ttl);
        entries.insert(key, Entry { value, stored_at });
    }

    /// Drop `key`. Returns whether an entry (fresh or stale) was present.
    pub fn invalidate(&self, key: &K) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| now - entry.stored_at < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-through: return the fresh value or populate it with `load`.
    ///
    /// The lock is not held while `load` runs, so two concurrent misses may
    /// both load; the later insert wins. Errors are not cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = load().await?;
        self.insert(key, value.clone());
        Ok(value)
    }
}
