//! Keyed, deduplicated, background-refreshing read cache.
//!
//! Each key remembers the fetcher it was last read with. A fetch runs as a
//! spawned task shared by every reader that arrives while it is in flight, so
//! it completes even when the reader that started it goes away. Readers see
//! the last good value until a newer one lands; failures keep that value and
//! only set the error.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::task::TaskHandle;

pub type Fetcher<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V, ApiError>> + Send + Sync>;

/// Wrap an async closure as a store fetcher.
pub fn fetcher<V, F, Fut>(f: F) -> Fetcher<V>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Reads within this span of the last fetch start reuse it.
    pub dedup_window: Duration,
    /// Background refresh period; `None` disables the timer for the key.
    pub refresh_interval: Option<Duration>,
    pub revalidate_on_focus: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(5),
            refresh_interval: None,
            revalidate_on_focus: true,
        }
    }
}

impl ReadOptions {
    pub fn with_refresh(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }
}

/// What a consumer sees for one key.
#[derive(Debug, Clone)]
pub struct Snapshot<V> {
    pub data: Option<V>,
    pub error: Option<Arc<ApiError>>,
    /// First fetch in flight, nothing to show yet.
    pub is_loading: bool,
    /// Any fetch in flight.
    pub is_validating: bool,
    /// Completion time of the last successful fetch, changed or not.
    pub fetched_at: Option<Instant>,
}

impl<V> Snapshot<V> {
    fn empty() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
            is_validating: false,
            fetched_at: None,
        }
    }
}

/// Emitted only when a fetch produced a value different from the cached one.
#[derive(Debug, Clone)]
pub struct Change<V> {
    pub key: String,
    pub value: V,
}

type InFlight = Shared<BoxFuture<'static, ()>>;

struct Entry<V> {
    data: Option<V>,
    error: Option<Arc<ApiError>>,
    fetcher: Fetcher<V>,
    options: ReadOptions,
    started_at: Option<Instant>,
    fetched_at: Option<Instant>,
    stale: bool,
    in_flight: Option<(u64, InFlight)>,
}

impl<V> Entry<V> {
    fn new(fetcher: Fetcher<V>, options: ReadOptions) -> Self {
        Self {
            data: None,
            error: None,
            fetcher,
            options,
            started_at: None,
            fetched_at: None,
            stale: false,
            in_flight: None,
        }
    }

    fn started_within(&self, now: Instant, window: Duration) -> bool {
        self.started_at
            .map_or(false, |at| now.saturating_duration_since(at) < window)
    }

    fn needs_fetch(&self, now: Instant) -> bool {
        self.stale || !self.started_within(now, self.options.dedup_window)
    }

    fn snapshot(&self) -> Snapshot<V>
    where
        V: Clone,
    {
        let validating = self.in_flight.is_some();
        Snapshot {
            data: self.data.clone(),
            error: self.error.clone(),
            is_loading: validating && self.data.is_none(),
            is_validating: validating,
            fetched_at: self.fetched_at,
        }
    }
}

struct Inner<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    generation: AtomicU64,
    changes: broadcast::Sender<Change<V>>,
    focus_throttle: Duration,
    last_focus: Mutex<Option<Instant>>,
}

pub struct Store<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for Store<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

const CHANGE_CAPACITY: usize = 64;

impl<V> Store<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(focus_throttle: Duration) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                changes,
                focus_throttle,
                last_focus: Mutex::new(None),
            }),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        lock(&self.inner.entries)
    }

    /// Read `key`, fetching unless a fetch started within the dedup window.
    /// Resolves once any fetch this read joined or started has completed.
    pub async fn read(&self, key: &str, fetcher: Fetcher<V>, options: ReadOptions) -> Snapshot<V> {
        let pending = {
            let mut entries = self.entries();
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::new(fetcher.clone(), options.clone()));
            entry.fetcher = fetcher;
            entry.options = options;
            if entry.in_flight.is_none() && entry.needs_fetch(Instant::now()) {
                self.start(key, entry);
            }
            entry.in_flight.as_ref().map(|(_, fut)| fut.clone())
        };
        if let Some(fut) = pending {
            fut.await;
        }
        self.peek(key)
    }

    /// Current state of `key` without triggering anything.
    pub fn peek(&self, key: &str) -> Snapshot<V> {
        self.entries()
            .get(key)
            .map_or_else(Snapshot::empty, Entry::snapshot)
    }

    /// Force a re-fetch of `key`, ignoring the dedup window. A fetch already
    /// in flight is superseded and its result discarded.
    pub fn mutate(&self, key: &str) -> bool {
        let mut entries = self.entries();
        match entries.get_mut(key) {
            Some(entry) => {
                self.start(key, entry);
                true
            }
            None => false,
        }
    }

    /// Mark `key` stale; the next read or trigger fetches regardless of the window.
    pub fn invalidate(&self, key: &str) -> bool {
        match self.entries().get_mut(key) {
            Some(entry) => {
                entry.stale = true;
                true
            }
            None => false,
        }
    }

    pub fn mutate_where<P: Fn(&str) -> bool>(&self, pred: P) -> usize {
        let mut entries = self.entries();
        let mut n = 0;
        for (key, entry) in entries.iter_mut().filter(|(k, _)| pred(k)) {
            self.start(key, entry);
            n += 1;
        }
        n
    }

    pub fn invalidate_where<P: Fn(&str) -> bool>(&self, pred: P) -> usize {
        let mut entries = self.entries();
        let mut n = 0;
        for (_, entry) in entries.iter_mut().filter(|(k, _)| pred(k)) {
            entry.stale = true;
            n += 1;
        }
        n
    }

    pub fn mutate_all(&self) -> usize {
        self.mutate_where(|_| true)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }

    /// Start fetches for keys whose refresh interval has elapsed.
    pub fn revalidate_due(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let mut n = 0;
        for (key, entry) in entries.iter_mut() {
            let Some(interval) = entry.options.refresh_interval else {
                continue;
            };
            if entry.in_flight.is_none() && (entry.stale || !entry.started_within(now, interval)) {
                self.start(key, entry);
                n += 1;
            }
        }
        n
    }

    /// Window regained focus. Throttled; keys fetched within their dedup
    /// window are left alone.
    pub fn focus_regained(&self) -> usize {
        let now = Instant::now();
        {
            let mut last = lock(&self.inner.last_focus);
            if let Some(at) = *last {
                if now.saturating_duration_since(at) < self.inner.focus_throttle {
                    debug!("focus revalidation throttled");
                    return 0;
                }
            }
            *last = Some(now);
        }
        let mut entries = self.entries();
        let mut n = 0;
        for (key, entry) in entries.iter_mut() {
            if entry.options.revalidate_on_focus && entry.in_flight.is_none() && entry.needs_fetch(now) {
                self.start(key, entry);
                n += 1;
            }
        }
        n
    }

    /// Background loop calling [`Store::revalidate_due`] every `tick`.
    pub fn spawn_refresher(&self, tick: Duration) -> TaskHandle {
        let store = self.clone();
        TaskHandle::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                let started = store.revalidate_due();
                if started > 0 {
                    debug!(started, "background refresh");
                }
            }
        })
    }

    /// Value changes, after the equality short-circuit.
    pub fn changes(&self) -> broadcast::Receiver<Change<V>> {
        self.inner.changes.subscribe()
    }

    /// Spawn a fetch for `key` and make it the entry's in-flight fetch.
    fn start(&self, key: &str, entry: &mut Entry<V>) {
        let gen = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let inner = Arc::clone(&self.inner);
        let fetch = (entry.fetcher)();
        let owned_key = key.to_string();
        let fut = async move {
            let result = fetch.await;
            complete(&inner, &owned_key, gen, result);
        }
        .boxed()
        .shared();
        entry.in_flight = Some((gen, fut.clone()));
        entry.started_at = Some(Instant::now());
        entry.stale = false;
        tokio::spawn(fut);
    }
}

fn complete<V>(inner: &Inner<V>, key: &str, gen: u64, result: Result<V, ApiError>)
where
    V: Clone + PartialEq,
{
    let change = {
        let mut entries = lock(&inner.entries);
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if entry.in_flight.as_ref().map(|(g, _)| *g) != Some(gen) {
            debug!(key, gen, "discarding superseded fetch");
            return;
        }
        entry.in_flight = None;
        match result {
            Ok(value) => {
                entry.error = None;
                entry.fetched_at = Some(Instant::now());
                if entry.data.as_ref() == Some(&value) {
                    None
                } else {
                    entry.data = Some(value.clone());
                    Some(Change {
                        key: key.to_string(),
                        value,
                    })
                }
            }
            Err(err) => {
                warn!(key, %err, keeps_data = entry.data.is_some(), "fetch failed");
                entry.error = Some(Arc::new(err));
                None
            }
        }
    };
    if let Some(change) = change {
        let _ = inner.changes.send(change);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
