//! TTL cache with version-guarded lazy eviction.
//!
//! Reads never mutate: an expired value stays visible until the background
//! sweep drains its pending deletion. Every `set` stamps the entry with a
//! fresh version and, when a TTL is given, queues a deletion tagged with
//! that version. The sweep only removes an entry whose live version still
//! matches the tag, so overwriting a key cancels the older deletion.
//!
//! # Concurrency model
//!
//! Entries and pending deletions sit behind two separate mutexes that are
//! never held together. The sweep task only holds a `Weak` reference and
//! stops when the cache is stopped or every handle is dropped.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// A cached value and the version it was written with.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub version: u64,
}

/// A deletion scheduled against a specific entry version.
#[derive(Debug)]
struct PendingDeletion {
    key: String,
    version: u64,
    due: Instant,
}

struct Inner<V> {
    name: String,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    pending: Mutex<Vec<PendingDeletion>>,
    counter: AtomicU64,
    default_ttl: Duration,
    stop_tx: watch::Sender<bool>,
}

impl<V> Inner<V> {
    fn next_version(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn schedule_deletion(&self, key: &str, version: u64, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        lock(&self.pending).push(PendingDeletion {
            key: key.to_string(),
            version,
            due: Instant::now() + ttl,
        });
    }

    /// Apply every due deletion whose version still matches. Returns the
    /// number of entries removed.
    fn sweep(&self) -> usize {
        let now = Instant::now();
        let due: Vec<PendingDeletion> = {
            let mut pending = lock(&self.pending);
            if pending.is_empty() {
                return 0;
            }
            let (due, later): (Vec<_>, Vec<_>) = pending.drain(..).partition(|d| d.due <= now);
            *pending = later;
            due
        };

        let mut entries = lock(&self.entries);
        let mut removed = 0;
        for deletion in due {
            let current = entries.get(&deletion.key).map(|e| e.version);
            if current == Some(deletion.version) {
                entries.remove(&deletion.key);
                removed += 1;
            }
        }
        removed
    }
}

/// Keyed store with per-entry TTL and lazy background eviction.
///
/// Cloning is cheap; all clones share the same entries and sweep task.
/// Must be created inside a tokio runtime.
pub struct TtlCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + 'static,
{
    /// Create a cache whose populated entries live for `default_ttl`.
    pub fn new(name: &str, default_ttl: Duration) -> Self {
        Self::with_sweep_interval(name, default_ttl, DEFAULT_SWEEP_INTERVAL)
    }

    /// Create a cache with a custom sweep interval.
    pub fn with_sweep_interval(name: &str, default_ttl: Duration, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let inner = Arc::new(Inner {
            name: name.to_string(),
            entries: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
            default_ttl,
            stop_tx,
        });

        tokio::spawn(run_sweeper(Arc::downgrade(&inner), interval, stop_rx));
        debug!(cache = name, ?default_ttl, "cache started");

        Self { inner }
    }

    /// Read a value. Never mutates the cache.
    pub fn get(&self, key: &str) -> Option<V> {
        lock(&self.inner.entries).get(key).map(|e| e.value.clone())
    }

    /// Store a value under a fresh version. A non-zero `ttl` schedules a
    /// deletion of exactly this version.
    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let version = self.inner.next_version();
        lock(&self.inner.entries).insert(key.to_string(), CacheEntry { value, version });
        self.inner.schedule_deletion(key, version, ttl);
    }

    /// Store a value only if the key is absent. Returns whether it was stored.
    pub fn set_if_absent(&self, key: &str, value: V, ttl: Duration) -> bool {
        let version = {
            let mut entries = lock(&self.inner.entries);
            if entries.contains_key(key) {
                return false;
            }
            let version = self.inner.next_version();
            entries.insert(key.to_string(), CacheEntry { value, version });
            version
        };
        self.inner.schedule_deletion(key, version, ttl);
        true
    }

    /// Remove a key immediately.
    pub fn delete(&self, key: &str) {
        lock(&self.inner.entries).remove(key);
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached value, or run `primary` and cache its result for
    /// the default TTL. When `primary` fails, `fallback` builds a degraded
    /// value that is returned but not cached.
    ///
    /// Concurrent misses on the same key each run `primary`; the last
    /// successful result wins.
    pub async fn get_or_populate<P, Fut, E, F>(&self, key: &str, primary: P, fallback: F) -> V
    where
        P: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
        F: FnOnce(&E) -> V,
    {
        if let Some(value) = self.get(key) {
            return value;
        }

        match primary().await {
            Ok(value) => {
                self.set(key, value.clone(), self.inner.default_ttl);
                value
            }
            Err(e) => {
                warn!(cache = %self.inner.name, %key, error = %e, "cache populate failed, using fallback");
                fallback(&e)
            }
        }
    }

    /// Drain due deletions one last time and stop the sweep task.
    pub fn stop(&self) {
        self.inner.sweep();
        let _ = self.inner.stop_tx.send(true);
        debug!(cache = %self.inner.name, "cache stopped");
    }
}

async fn run_sweeper<V>(inner: Weak<Inner<V>>, interval: Duration, mut stop: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| inner.sweep())) {
            Ok(0) => {}
            Ok(removed) => debug!(cache = %inner.name, removed, "cache sweep evicted entries"),
            Err(_) => error!(cache = %inner.name, "cache sweep panicked"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
