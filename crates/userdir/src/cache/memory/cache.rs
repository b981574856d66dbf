//! In-memory TTL cache with load collapsing.
//!
//! Values are computed lazily by a caller-supplied loader and memoized until
//! they are `ttl` old. Concurrent misses on the same key share one loader
//! call: the first caller installs an in-flight marker in the same critical
//! section as the freshness check, and everyone arriving after it waits on
//! that marker instead of loading again.
//!
//! A background task sweeps expired entries on a fixed tick so keys that are
//! never read again do not linger. Eviction is purely time-based; there is
//! no bound on the number of keys.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::{broadcast, Notify, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Tick of the background sweep when none is configured.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Settings for one [`TtlCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Label used in logs only.
    pub name: String,
    /// How long a loaded value stays valid.
    pub ttl: Duration,
    /// How often the background sweep runs. Zero falls back to
    /// [`DEFAULT_SWEEP_INTERVAL`].
    pub sweep_interval: Duration,
}

impl CacheConfig {
    /// Creates a config with the default sweep interval.
    pub fn new(name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            name: name.into(),
            ttl,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }
}

/// A single memoized value.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    /// An entry is expired once its age reaches the ttl, boundary included.
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= ttl
    }
}

/// A load in progress, shared by the caller running it and every caller
/// waiting on it.
///
/// The outcome is `None` when the loading caller went away (cancelled or
/// panicked) before producing a result.
struct InFlight<V, E> {
    outcome: OnceCell<Option<Result<V, E>>>,
    notify: Notify,
}

impl<V: Clone, E: Clone> InFlight<V, E> {
    fn new() -> Self {
        Self {
            outcome: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    fn finish(&self, outcome: Option<Result<V, E>>) {
        let _ = self.outcome.set(outcome);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> Option<Result<V, E>> {
        loop {
            // Register before checking so a finish in between is not missed.
            let notified = self.notify.notified();
            if let Some(outcome) = self.outcome.get() {
                return outcome.clone();
            }
            notified.await;
        }
    }
}

struct Store<K, V, E> {
    entries: HashMap<K, CacheEntry<V>>,
    in_flight: HashMap<K, Arc<InFlight<V, E>>>,
}

/// State shared between cache handles and the sweep task.
struct Shared<K, V, E> {
    name: String,
    ttl: Duration,
    store: RwLock<Store<K, V, E>>,
}

impl<K, V, E> Shared<K, V, E>
where
    K: Eq + Hash,
{
    // Every critical section leaves the maps consistent, so a poisoned lock
    // is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, Store<K, V, E>> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store<K, V, E>> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes every expired entry and returns how many were removed.
    fn sweep(&self) -> usize {
        if self.read().entries.is_empty() {
            return 0;
        }

        let mut store = self.write();
        let now = Instant::now();
        let before = store.entries.len();
        store
            .entries
            .retain(|_, entry| !entry.is_expired(self.ttl, now));
        before - store.entries.len()
    }
}

enum Lookup<V, E> {
    Hit(V),
    Wait(Arc<InFlight<V, E>>),
    Lead(Arc<InFlight<V, E>>),
}

/// Clears the in-flight marker if the loading caller is dropped before it
/// finishes, so waiters can retry instead of hanging.
struct LoadGuard<'a, K, V, E>
where
    K: Eq + Hash,
    V: Clone,
    E: Clone,
{
    shared: &'a Shared<K, V, E>,
    key: &'a K,
    flight: &'a Arc<InFlight<V, E>>,
    armed: bool,
}

impl<K, V, E> LoadGuard<'_, K, V, E>
where
    K: Eq + Hash,
    V: Clone,
    E: Clone,
{
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<K, V, E> Drop for LoadGuard<'_, K, V, E>
where
    K: Eq + Hash,
    V: Clone,
    E: Clone,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut store = self.shared.write();
            if store
                .in_flight
                .get(self.key)
                .is_some_and(|current| Arc::ptr_eq(current, self.flight))
            {
                store.in_flight.remove(self.key);
            }
        }
        self.flight.finish(None);
        tracing::warn!(cache = %self.shared.name, "Load abandoned before completing");
    }
}

/// Keyed memoization store with time-based expiry.
///
/// Cloning yields another handle to the same cache. The sweep task stops
/// when [`TtlCache::close`] is called or when the last handle is dropped.
///
/// Loader errors are never stored: a failed load leaves whatever entry was
/// there untouched, and the next call is free to try again.
pub struct TtlCache<K, V, E> {
    shared: Arc<Shared<K, V, E>>,
    shutdown_tx: broadcast::Sender<()>,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<K, V, E> Clone for TtlCache<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            shutdown_tx: self.shutdown_tx.clone(),
            sweeper: Arc::clone(&self.sweeper),
        }
    }
}

impl<K, V, E> fmt::Debug for TtlCache<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("name", &self.shared.name)
            .field("ttl", &self.shared.ttl)
            .finish_non_exhaustive()
    }
}

impl<K, V, E> TtlCache<K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + fmt::Display + Send + Sync + 'static,
{
    /// Creates a cache and starts its sweep task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: CacheConfig) -> Self {
        let shared = Arc::new(Shared {
            name: config.name,
            ttl: config.ttl,
            store: RwLock::new(Store {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            }),
        });

        let interval = if config.sweep_interval.is_zero() {
            DEFAULT_SWEEP_INTERVAL
        } else {
            config.sweep_interval
        };

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn_sweeper(Arc::clone(&shared), interval, shutdown_rx);

        tracing::debug!(
            cache = %shared.name,
            ttl = ?shared.ttl,
            sweep_interval = ?interval,
            "Cache created"
        );

        Self {
            shared,
            shutdown_tx,
            sweeper: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Returns the cached value for `key`, loading it if missing or expired.
    ///
    /// `loader` runs at most once per miss episode: callers that arrive while
    /// a load for the same key is in flight wait for it and receive the same
    /// value or error. A load never blocks lookups of other keys.
    pub async fn get_or_load<F, Fut>(&self, key: K, loader: F) -> Result<V, E>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let flight = loop {
            match self.lookup(&key) {
                Lookup::Hit(value) => {
                    tracing::trace!(cache = %self.shared.name, ?key, "Cache hit");
                    return Ok(value);
                }
                Lookup::Wait(flight) => {
                    tracing::trace!(cache = %self.shared.name, ?key, "Waiting on in-flight load");
                    if let Some(outcome) = flight.wait().await {
                        return outcome;
                    }
                    // The loading caller went away; start over.
                }
                Lookup::Lead(flight) => break flight,
            }
        };

        tracing::trace!(cache = %self.shared.name, ?key, "Cache miss");
        self.load(key, flight, loader).await
    }

    fn lookup(&self, key: &K) -> Lookup<V, E> {
        {
            let store = self.shared.read();
            if let Some(entry) = store.entries.get(key) {
                if !entry.is_expired(self.shared.ttl, Instant::now()) {
                    return Lookup::Hit(entry.value.clone());
                }
            }
        }

        // Re-check under the exclusive lock; the marker is installed in the
        // same critical section as the check.
        let mut store = self.shared.write();
        if let Some(entry) = store.entries.get(key) {
            if !entry.is_expired(self.shared.ttl, Instant::now()) {
                return Lookup::Hit(entry.value.clone());
            }
        }
        if let Some(flight) = store.in_flight.get(key) {
            return Lookup::Wait(Arc::clone(flight));
        }

        let flight = Arc::new(InFlight::new());
        store.in_flight.insert(key.clone(), Arc::clone(&flight));
        Lookup::Lead(flight)
    }

    async fn load<F, Fut>(&self, key: K, flight: Arc<InFlight<V, E>>, loader: F) -> Result<V, E>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let guard = LoadGuard {
            shared: &self.shared,
            key: &key,
            flight: &flight,
            armed: true,
        };

        let started = Instant::now();
        let outcome = loader(key.clone()).await;

        {
            let mut store = self.shared.write();
            // A clear() during the load removes our marker; the result still
            // goes to our waiters but is not stored.
            if store
                .in_flight
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &flight))
            {
                store.in_flight.remove(&key);
                if let Ok(value) = &outcome {
                    store
                        .entries
                        .insert(key.clone(), CacheEntry::new(value.clone()));
                }
            }
        }
        flight.finish(Some(outcome.clone()));
        guard.disarm();

        match &outcome {
            Ok(_) => tracing::debug!(
                cache = %self.shared.name,
                ?key,
                elapsed = ?started.elapsed(),
                "Loaded entry"
            ),
            Err(err) => tracing::warn!(
                cache = %self.shared.name,
                ?key,
                error = %err,
                "Load failed"
            ),
        }

        outcome
    }

    /// Discards every entry.
    ///
    /// Loads already in flight still answer their waiters but do not
    /// repopulate the cache. The sweep keeps running.
    pub fn clear(&self) {
        let mut store = self.shared.write();
        let dropped = store.entries.len();
        store.entries.clear();
        store.in_flight.clear();
        tracing::debug!(cache = %self.shared.name, dropped, "Cache cleared");
    }

    /// Stops the sweep task and waits for it to exit.
    ///
    /// The cache stays usable afterwards; expired entries are then only
    /// replaced lazily on access. Calling this more than once is a no-op.
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(());

        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!(cache = %self.shared.name, error = %err, "Sweep task ended abnormally");
            }
        }
    }

    /// Removes expired entries now, outside the regular tick.
    pub fn purge_expired(&self) -> usize {
        self.shared.sweep()
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.shared.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.read().entries.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }
}

fn spawn_sweeper<K, V, E>(
    shared: Arc<Shared<K, V, E>>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = shared.sweep();
                    if removed > 0 {
                        tracing::debug!(cache = %shared.name, removed, "Swept expired entries");
                    }
                }
                // Fires on close() and when every cache handle is gone.
                _ = shutdown_rx.recv() => break,
            }
        }

        tracing::debug!(cache = %shared.name, "Sweep task stopped");
    })
}
