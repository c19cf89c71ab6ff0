//! Keyed query cache
//!
//! A [`QueryCache`] maps a [`QueryKey`] (operation, address, endpoint) to the
//! cached state of one read. Reads are cache-aside: a fresh successful entry
//! is returned as is, anything else starts a fetch. At most one fetch per key
//! is in flight; concurrent callers for the same key await the same shared
//! future and receive the same value or error.
//!
//! Fetches run as spawned tasks that record their own outcome into the entry,
//! so the result is kept even when every caller goes away. An invalidation
//! bumps the entry's generation: a fetch started before it never clears the
//! stale flag, and later reads start a fresh fetch instead of joining it.
//! Entries count their observers through [`QueryObserver`] guards; an entry
//! without observers is evicted once it has been unobserved for the
//! configured `gc_time`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, instrument, trace};

use crate::error::{Error, Result};

/// Read operation a query belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Native balance
    Balance,
    /// Token accounts
    TokenAccounts,
    /// Signature history
    Signatures,
    /// Cluster version check
    Version,
}

impl QueryKind {
    /// Short name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Balance => "balance",
            QueryKind::TokenAccounts => "token-accounts",
            QueryKind::Signatures => "signatures",
            QueryKind::Version => "version",
        }
    }
}

/// Identity of one cached read
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    /// Operation
    pub kind: QueryKind,
    /// Target address, `None` for cluster-wide reads
    pub address: Option<Pubkey>,
    /// Endpoint the data was read from
    pub endpoint: String,
}

impl QueryKey {
    /// Key for an address-scoped read
    pub fn new(kind: QueryKind, address: Pubkey, endpoint: impl Into<String>) -> Self {
        Self {
            kind,
            address: Some(address),
            endpoint: endpoint.into(),
        }
    }

    /// Key for a cluster-wide read
    pub fn cluster(kind: QueryKind, endpoint: impl Into<String>) -> Self {
        Self {
            kind,
            address: None,
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Some(address) => write!(f, "{}:{}@{}", self.kind.as_str(), address, self.endpoint),
            None => write!(f, "{}@{}", self.kind.as_str(), self.endpoint),
        }
    }
}

/// Lifecycle state of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Created, never fetched
    Idle,
    /// A fetch is in flight
    Loading,
    /// Last fetch succeeded
    Success,
    /// Last fetch failed
    Error,
}

/// Point-in-time view of an entry
#[derive(Debug, Clone)]
pub struct QuerySnapshot<T> {
    /// Entry key
    pub key: QueryKey,
    /// Current status
    pub status: QueryStatus,
    /// Last successfully fetched data
    pub data: Option<T>,
    /// Message of the last failure
    pub error: Option<String>,
    /// When the last fetch settled
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Marked for refetch on next read
    pub is_stale: bool,
    /// Live observers
    pub observers: usize,
}

type SharedFetch<T> = Shared<BoxFuture<'static, std::result::Result<T, Arc<Error>>>>;

struct QueryEntry<T> {
    status: QueryStatus,
    data: Option<T>,
    error: Option<Arc<Error>>,
    last_fetched_at: Option<DateTime<Utc>>,
    stale: bool,
    generation: u64,
    in_flight: Option<InFlight<T>>,
    observers: usize,
    unobserved_since: Option<Instant>,
}

struct InFlight<T> {
    id: u64,
    generation: u64,
    fetch: SharedFetch<T>,
}

impl<T> QueryEntry<T> {
    fn new() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            last_fetched_at: None,
            stale: false,
            generation: 0,
            in_flight: None,
            observers: 0,
            unobserved_since: Some(Instant::now()),
        }
    }
}

struct CacheState<T> {
    entries: HashMap<QueryKey, QueryEntry<T>>,
    next_fetch_id: u64,
}

impl<T> CacheState<T> {
    fn collect_garbage(&mut self, gc_time: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            let expired = entry.observers == 0
                && entry.in_flight.is_none()
                && entry
                    .unobserved_since
                    .map_or(false, |since| since.elapsed() >= gc_time);
            if expired {
                trace!(%key, "evicting unobserved query");
            }
            !expired
        });
        before - self.entries.len()
    }
}

fn lock<T>(state: &Mutex<CacheState<T>>) -> MutexGuard<'_, CacheState<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Lookup<T> {
    Cached(T),
    Pending(SharedFetch<T>),
}

/// Cache of one kind of read result
pub struct QueryCache<T> {
    state: Arc<Mutex<CacheState<T>>>,
    gc_time: Duration,
}

impl<T> QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a cache that evicts entries unobserved for `gc_time`
    pub fn new(gc_time: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                next_fetch_id: 0,
            })),
            gc_time,
        }
    }

    /// Cached data for `key` when fresh, otherwise the result of a fetch
    /// (joining one already in flight)
    pub async fn fetch<F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.run(key, false, fetcher).await
    }

    /// Fetch `key` regardless of cached data, joining a fetch already in flight
    pub async fn refetch<F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.run(key, true, fetcher).await
    }

    #[instrument(skip_all, fields(key = %key, force = force))]
    async fn run<F, Fut>(&self, key: QueryKey, force: bool, fetcher: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let lookup = {
            let mut state = lock(&self.state);
            state.collect_garbage(self.gc_time);

            let fetch_id = state.next_fetch_id;
            state.next_fetch_id = state.next_fetch_id.wrapping_add(1);

            let entry = state
                .entries
                .entry(key.clone())
                .or_insert_with(QueryEntry::new);

            let fresh = !force && !entry.stale && entry.status == QueryStatus::Success;
            let joinable = entry
                .in_flight
                .as_ref()
                .filter(|pending| pending.generation == entry.generation);

            if let Some(pending) = joinable {
                debug!("joining in-flight fetch");
                Lookup::Pending(pending.fetch.clone())
            } else if let (true, Some(data), None) = (fresh, &entry.data, &entry.in_flight) {
                trace!("serving cached data");
                Lookup::Cached(data.clone())
            } else {
                debug!("starting fetch");
                let generation = entry.generation;
                let pending = self.track(key.clone(), fetch_id, generation, fetcher());
                entry.status = QueryStatus::Loading;
                entry.in_flight = Some(InFlight {
                    id: fetch_id,
                    generation,
                    fetch: pending.clone(),
                });
                Lookup::Pending(pending)
            }
        };

        match lookup {
            Lookup::Cached(data) => Ok(data),
            Lookup::Pending(pending) => pending.await.map_err(Error::Query),
        }
    }

    /// Spawn a fetch that records its outcome in the entry and share its result
    fn track<Fut>(
        &self,
        key: QueryKey,
        fetch_id: u64,
        generation: u64,
        fetch: Fut,
    ) -> SharedFetch<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let state: Weak<Mutex<CacheState<T>>> = Arc::downgrade(&self.state);

        let task = tokio::spawn(async move {
            let result = fetch.await.map_err(Arc::new);

            if let Some(state) = state.upgrade() {
                let mut state = lock(&state);
                if let Some(entry) = state.entries.get_mut(&key) {
                    let current = entry.in_flight.as_ref().map(|pending| pending.id);
                    if current == Some(fetch_id) {
                        entry.in_flight = None;
                        entry.last_fetched_at = Some(Utc::now());
                        match &result {
                            Ok(data) => {
                                entry.status = QueryStatus::Success;
                                entry.data = Some(data.clone());
                                entry.error = None;
                                // Invalidated while loading: the data predates it
                                entry.stale = entry.generation != generation;
                            }
                            Err(err) => {
                                debug!(%key, error = %err, "query failed");
                                entry.status = QueryStatus::Error;
                                entry.error = Some(err.clone());
                            }
                        }
                    }
                }
            }

            result
        });

        async move {
            task.await.unwrap_or_else(|err| {
                Err(Arc::new(Error::illegal_state(format!(
                    "Query task failed: {}",
                    err
                ))))
            })
        }
        .boxed()
        .shared()
    }

    /// Mark `key` stale so the next read refetches it; returns whether an entry existed
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let mut state = lock(&self.state);
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.stale = true;
                entry.generation = entry.generation.wrapping_add(1);
                debug!(%key, generation = entry.generation, "query invalidated");
                true
            }
            None => false,
        }
    }

    /// Register an observer of `key`; the entry is kept while the guard lives
    pub fn observe(&self, key: QueryKey) -> QueryObserver<T> {
        let mut state = lock(&self.state);
        let entry = state
            .entries
            .entry(key.clone())
            .or_insert_with(QueryEntry::new);
        entry.observers += 1;
        entry.unobserved_since = None;

        QueryObserver {
            state: Arc::downgrade(&self.state),
            key,
        }
    }

    /// Current state of `key`
    pub fn snapshot(&self, key: &QueryKey) -> Option<QuerySnapshot<T>> {
        let state = lock(&self.state);
        state.entries.get(key).map(|entry| QuerySnapshot {
            key: key.clone(),
            status: entry.status,
            data: entry.data.clone(),
            error: entry.error.as_ref().map(|e| e.to_string()),
            last_fetched_at: entry.last_fetched_at,
            is_stale: entry.stale,
            observers: entry.observers,
        })
    }

    /// Evict expired unobserved entries now; returns how many were removed
    pub fn collect_garbage(&self) -> usize {
        lock(&self.state).collect_garbage(self.gc_time)
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    /// Whether no entry is held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> fmt::Debug for QueryCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &lock(&self.state).entries.len())
            .field("gc_time", &self.gc_time)
            .finish()
    }
}

/// Observer guard for one key
pub struct QueryObserver<T> {
    state: Weak<Mutex<CacheState<T>>>,
    key: QueryKey,
}

impl<T> QueryObserver<T> {
    /// Observed key
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl<T> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            let mut state = lock(&state);
            if let Some(entry) = state.entries.get_mut(&self.key) {
                entry.observers = entry.observers.saturating_sub(1);
                if entry.observers == 0 {
                    entry.unobserved_since = Some(Instant::now());
                }
            }
        }
    }
}

impl<T> fmt::Debug for QueryObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryObserver").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(endpoint: &str) -> QueryKey {
        QueryKey::new(QueryKind::Balance, Pubkey::new_from_array([7; 32]), endpoint)
    }

    fn counting(calls: &Arc<AtomicUsize>, value: u64) -> impl Future<Output = Result<u64>> {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(value)
        }
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_call() {
        let cache = QueryCache::<u64>::new(Duration::from_secs(300));
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.fetch(key("http://a"), || counting(&calls, 42)),
            cache.fetch(key("http://a"), || counting(&calls, 99)),
        );

        assert_eq!(a.unwrap(), 42);
        assert_eq!(b.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_entry_is_served_from_cache() {
        let cache = QueryCache::<u64>::new(Duration::from_secs(300));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.fetch(key("http://a"), || counting(&calls, 1)).await.unwrap();
        let cached = cache.fetch(key("http://a"), || counting(&calls, 2)).await.unwrap();

        assert_eq!(cached, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let snapshot = cache.snapshot(&key("http://a")).unwrap();
        assert_eq!(snapshot.status, QueryStatus::Success);
        assert!(snapshot.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_keys_differing_by_endpoint_are_isolated() {
        let cache = QueryCache::<u64>::new(Duration::from_secs(300));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.fetch(key("http://a"), || counting(&calls, 1)).await.unwrap();
        let other = cache.fetch(key("http://b"), || counting(&calls, 2)).await.unwrap();

        assert_eq!(other, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.snapshot(&key("http://a")).unwrap().data, Some(1));
    }

    #[tokio::test]
    async fn test_invalidate_and_refetch() {
        let cache = QueryCache::<u64>::new(Duration::from_secs(300));
        let calls = Arc::new(AtomicUsize::new(0));

        assert!(!cache.invalidate(&key("http://a")));
        cache.fetch(key("http://a"), || counting(&calls, 1)).await.unwrap();

        assert!(cache.invalidate(&key("http://a")));
        assert!(cache.snapshot(&key("http://a")).unwrap().is_stale);
        assert_eq!(cache.fetch(key("http://a"), || counting(&calls, 2)).await.unwrap(), 2);
        assert!(!cache.snapshot(&key("http://a")).unwrap().is_stale);

        assert_eq!(cache.refetch(key("http://a"), || counting(&calls, 3)).await.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_errors_are_recorded_and_shared() {
        let cache = QueryCache::<u64>::new(Duration::from_secs(300));

        let err = cache
            .fetch(key("http://a"), || async { Err(Error::rpc("connection refused")) })
            .await
            .unwrap_err();
        assert!(err.is_rpc());

        let snapshot = cache.snapshot(&key("http://a")).unwrap();
        assert_eq!(snapshot.status, QueryStatus::Error);
        assert_eq!(snapshot.error.as_deref(), Some("RPC error: connection refused"));

        // A failed entry is retried on the next read
        let value = cache.fetch(key("http://a"), || async { Ok(5) }).await.unwrap();
        assert_eq!(value, 5);
        assert_eq!(cache.snapshot(&key("http://a")).unwrap().error, None);
    }

    #[tokio::test]
    async fn test_result_recorded_when_caller_goes_away() {
        let cache = QueryCache::<u64>::new(Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));

        // Start a fetch and drop it before it completes
        let started = tokio::time::timeout(
            Duration::from_millis(1),
            cache.fetch(key("http://a"), || counting(&calls, 8)),
        )
        .await;
        assert!(started.is_err());
        assert_eq!(cache.snapshot(&key("http://a")).unwrap().status, QueryStatus::Loading);

        // Nobody joins; the fetch still finishes on its own
        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = cache.snapshot(&key("http://a")).unwrap();
        assert_eq!(snapshot.status, QueryStatus::Success);
        assert_eq!(snapshot.data, Some(8));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(cache.collect_garbage(), 1);
        assert!(cache.snapshot(&key("http://a")).is_none());
    }

    #[tokio::test]
    async fn test_invalidation_during_fetch_is_not_lost() {
        let cache = QueryCache::<u64>::new(Duration::from_secs(300));
        let calls = Arc::new(AtomicUsize::new(0));

        let slow = {
            let calls = calls.clone();
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(100)
            }
        };

        let (first, invalidated) = tokio::join!(cache.fetch(key("http://a"), slow), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cache.invalidate(&key("http://a"))
        });

        assert_eq!(first.unwrap(), 100);
        assert!(invalidated);
        assert!(cache.snapshot(&key("http://a")).unwrap().is_stale);

        let next = cache.fetch(key("http://a"), || counting(&calls, 200)).await.unwrap();
        assert_eq!(next, 200);
        assert!(!cache.snapshot(&key("http://a")).unwrap().is_stale);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_after_invalidation_skips_older_fetch() {
        let cache = QueryCache::<u64>::new(Duration::from_secs(300));
        let calls = Arc::new(AtomicUsize::new(0));

        let slow = {
            let calls = calls.clone();
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(100)
            }
        };

        let (first, second) = tokio::join!(cache.fetch(key("http://a"), slow), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cache.invalidate(&key("http://a"));
            cache.fetch(key("http://a"), || counting(&calls, 200)).await
        });

        assert_eq!(first.unwrap(), 100);
        assert_eq!(second.unwrap(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The older fetch finishes last but does not overwrite the newer result
        tokio::time::sleep(Duration::from_millis(40)).await;
        let snapshot = cache.snapshot(&key("http://a")).unwrap();
        assert_eq!(snapshot.data, Some(200));
        assert!(!snapshot.is_stale);
    }

    #[tokio::test]
    async fn test_observers_keep_entries_alive() {
        let cache = QueryCache::<u64>::new(Duration::ZERO);
        let observer = cache.observe(key("http://a"));
        cache.fetch(key("http://a"), || async { Ok(1) }).await.unwrap();

        assert_eq!(cache.collect_garbage(), 0);
        assert_eq!(cache.snapshot(&key("http://a")).unwrap().observers, 1);

        drop(observer);
        assert_eq!(cache.collect_garbage(), 1);
        assert!(cache.is_empty());
    }
}
