//! Read-through cache keyed by request path, with optimistic mutations.
//!
//! # Overview
//! One `Cache` is shared by every view. Each key (for example `/api/todos`)
//! holds the last good value, the last read error, the in-flight fetch if any,
//! and a `watch` channel that subscribers observe for re-rendering.
//!
//! # Reads
//! `read` joins an in-flight fetch for the key if there is one, serves the
//! cached value if the last fetch started less than `dedup_interval` ago, and
//! otherwise fetches. A failed fetch records the error but keeps the stale
//! value.
//!
//! # Mutations
//! `mutate` captures the current value, optionally writes an optimistic
//! projection before any I/O, then runs the updater. Every mutation takes a
//! ticket from a monotonic clock:
//! - a commit is applied only if no later-ticketed mutation has committed;
//! - a rollback is applied only if the key still holds this mutation's own
//!   optimistic write, and it hands the key back to whoever wrote the
//!   snapshot. If that writer has itself failed in the meantime, the rollback
//!   keeps walking back to the value it replaced;
//! - a fetch that started before the latest mutation, or that lands while a
//!   mutation is pending, does not overwrite the key. One discarded while a
//!   mutation was pending is re-issued once the last mutation settles.
//!
//! A `mutate` future dropped before its updater resolves settles as a failure.
//!
//! Values are always replaced whole. The internal mutex is never held across
//! an `.await`; projections run under it, so they must not call back into
//! the cache.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tracing::debug;

use crate::error::ApiError;
use crate::mutation::{Mutation, MutationState};

/// SWR's default deduplication window.
pub const DEFAULT_DEDUP_INTERVAL: Duration = Duration::from_secs(2);

type FetchFuture<V> = Shared<BoxFuture<'static, Result<V, ApiError>>>;
type Fetcher<V> = Arc<dyn Fn(String) -> BoxFuture<'static, Result<V, ApiError>> + Send + Sync>;
type Projection<V> = Box<dyn FnOnce(Option<&V>) -> V + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Reads within this window of the last fetch are served from the cache.
    pub dedup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dedup_interval: DEFAULT_DEDUP_INTERVAL,
        }
    }
}

/// What a view sees for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadState<V> {
    pub data: Option<V>,
    pub error: Option<ApiError>,
    /// A fetch is in flight and there is no data yet.
    pub is_loading: bool,
    /// A fetch is in flight.
    pub is_validating: bool,
}

impl<V> Default for ReadState<V> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
            is_validating: false,
        }
    }
}

/// Options for `Cache::mutate`. Rollback and revalidation are on by default.
pub struct MutateOptions<V> {
    optimistic_data: Option<Projection<V>>,
    rollback_on_error: bool,
    revalidate: bool,
}

impl<V> MutateOptions<V> {
    pub fn new() -> Self {
        Self {
            optimistic_data: None,
            rollback_on_error: true,
            revalidate: true,
        }
    }

    /// Project the current value into what the cache should show while the
    /// request is in flight.
    #[must_use]
    pub fn optimistic_data(mut self, project: impl FnOnce(Option<&V>) -> V + Send + 'static) -> Self {
        self.optimistic_data = Some(Box::new(project));
        self
    }

    #[must_use]
    pub fn rollback_on_error(mut self, rollback: bool) -> Self {
        self.rollback_on_error = rollback;
        self
    }

    #[must_use]
    pub fn revalidate(mut self, revalidate: bool) -> Self {
        self.revalidate = revalidate;
        self
    }
}

impl<V> Default for MutateOptions<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// How a successful (non-`Err`) mutation settled.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<V> {
    /// The authoritative value is now cached.
    Committed(V),
    /// The server accepted the write, but a later mutation had already
    /// committed, so this value was not cached.
    Superseded(V),
    /// The response carried no payload; the key was marked stale and is
    /// being revalidated.
    Stale,
}

struct Entry<V> {
    data: Option<V>,
    error: Option<ApiError>,
    in_flight: Option<(u64, FetchFuture<V>)>,
    fetched_at: Option<Instant>,
    last_mutation: u64,
    pending_mutations: usize,
    last_write: u64,
    last_commit: u64,
    /// Failed writers whose rollback was skipped, by ticket.
    abandoned: HashMap<u64, Abandoned<V>>,
    /// A fetch was discarded while mutations were pending.
    missed_fetch: bool,
    notify: watch::Sender<ReadState<V>>,
}

struct Abandoned<V> {
    snapshot: Option<V>,
    previous_writer: u64,
}

impl<V: Clone> Entry<V> {
    fn new() -> Self {
        let (notify, _) = watch::channel(ReadState::default());
        Self {
            data: None,
            error: None,
            in_flight: None,
            fetched_at: None,
            last_mutation: 0,
            pending_mutations: 0,
            last_write: 0,
            last_commit: 0,
            abandoned: HashMap::new(),
            missed_fetch: false,
            notify,
        }
    }

    fn state(&self) -> ReadState<V> {
        let is_validating = self.in_flight.is_some();
        ReadState {
            data: self.data.clone(),
            error: self.error.clone(),
            is_loading: is_validating && self.data.is_none(),
            is_validating,
        }
    }

    fn publish(&self) {
        self.notify.send_replace(self.state());
    }

    /// Settle a mutation that failed or was dropped. Returns whether the key
    /// should be revalidated.
    fn fail(&mut self, key: &str, mutation: &mut Mutation<V>, rollback_on_error: bool) -> bool {
        let ticket = mutation.ticket();
        let projected = mutation.projected();
        if !(rollback_on_error && projected) {
            mutation.discard();
            return projected;
        }
        if self.last_write != ticket {
            debug!(key, ticket, "key rewritten since mutation began; skipping rollback");
            self.abandoned.insert(
                ticket,
                Abandoned {
                    snapshot: mutation.snapshot().cloned(),
                    previous_writer: mutation.previous_writer(),
                },
            );
            mutation.discard();
            return true;
        }

        debug!(key, ticket, "rolling back optimistic write");
        let mut writer = mutation.previous_writer();
        let mut restored = mutation.roll_back();
        while let Some(failed) = self.abandoned.remove(&writer) {
            restored = failed.snapshot;
            writer = failed.previous_writer;
        }
        self.data = restored;
        self.last_write = writer;
        self.publish();
        false
    }

    /// Count one mutation as settled. Returns whether a fetch discarded while
    /// mutations were pending must now be re-issued.
    fn settle(&mut self) -> bool {
        self.pending_mutations = self.pending_mutations.saturating_sub(1);
        if self.pending_mutations > 0 {
            return false;
        }
        self.abandoned.clear();
        std::mem::take(&mut self.missed_fetch)
    }
}

/// A mutation counted as pending on its key. Dropping it unsettled settles
/// it as a failure.
struct Pending<'a, V>
where
    V: Clone + Send + Sync + 'static,
{
    cache: &'a Cache<V>,
    key: &'a str,
    mutation: Mutation<V>,
    rollback_on_error: bool,
}

impl<V> Drop for Pending<'_, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.mutation.is_settled() || matches!(self.mutation.state(), MutationState::Idle) {
            return;
        }
        let (cache, key) = (self.cache, self.key);
        let rollback_on_error = self.rollback_on_error;
        let mutation = &mut self.mutation;
        debug!(key, ticket = mutation.ticket(), "mutation dropped before settling");
        let refetch = cache.with_entry(key, |entry| {
            let refetch = entry.fail(key, mutation, rollback_on_error);
            entry.settle() || refetch
        });
        if refetch {
            cache.spawn_revalidate(key);
        }
    }
}

struct Inner<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    fetcher: Fetcher<V>,
    config: CacheConfig,
    clock: AtomicU64,
}

/// Shared client cache. Cloning is cheap and every clone sees the same keys.
pub struct Cache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(fetcher: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        Self::with_config(CacheConfig::default(), fetcher)
    }

    pub fn with_config<F, Fut>(config: CacheConfig, fetcher: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                fetcher: Arc::new(move |key| fetcher(key).boxed()),
                config,
                clock: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.inner.config
    }

    /// Current state of `key` without fetching.
    pub fn snapshot(&self, key: &str) -> ReadState<V> {
        let entries = self.lock();
        entries.get(key).map(Entry::state).unwrap_or_default()
    }

    /// Watch `key`. The receiver sees every change from now on.
    pub fn subscribe(&self, key: &str) -> watch::Receiver<ReadState<V>> {
        self.with_entry(key, |entry| entry.notify.subscribe())
    }

    /// Read `key`, fetching unless a recent or in-flight fetch can be reused.
    pub async fn read(&self, key: &str) -> ReadState<V> {
        let dedup_interval = self.inner.config.dedup_interval;
        let fresh = self.with_entry(key, |entry| {
            entry.in_flight.is_none()
                && entry.data.is_some()
                && entry
                    .fetched_at
                    .is_some_and(|at| at.elapsed() < dedup_interval)
        });
        if fresh {
            debug!(key, "serving read from cache within dedup window");
            return self.snapshot(key);
        }
        self.revalidate(key).await
    }

    /// Fetch `key` now, joining an in-flight fetch if there is one.
    pub async fn revalidate(&self, key: &str) -> ReadState<V> {
        let (ticket, request) = self.start_fetch(key);
        let result = request.await;
        self.finish_fetch(key, ticket, result);
        self.snapshot(key)
    }

    /// Drop the cached value for `key` and mark it stale.
    pub fn invalidate(&self, key: &str) {
        self.with_entry(key, |entry| {
            entry.data = None;
            entry.error = None;
            entry.fetched_at = None;
            entry.publish();
        });
    }

    /// Run `updater` against `key` with optional optimistic projection,
    /// rollback and revalidation. The updater receives the value captured
    /// before the optimistic write.
    pub async fn mutate<U, Fut>(
        &self,
        key: &str,
        updater: U,
        options: MutateOptions<V>,
    ) -> Result<MutationOutcome<V>, ApiError>
    where
        U: FnOnce(Option<V>) -> Fut,
        Fut: Future<Output = Result<V, ApiError>>,
    {
        let MutateOptions {
            optimistic_data,
            rollback_on_error,
            revalidate,
        } = options;
        let mut pending = Pending {
            cache: self,
            key,
            mutation: Mutation::new(self.tick()),
            rollback_on_error,
        };
        let ticket = pending.mutation.ticket();

        self.with_entry(key, |entry| {
            let snapshot = entry.data.clone();
            let previous_writer = entry.last_write;
            entry.last_mutation = ticket;
            entry.pending_mutations += 1;
            let projected = optimistic_data.is_some();
            if let Some(project) = optimistic_data {
                entry.data = Some(project(snapshot.as_ref()));
                entry.last_write = ticket;
                entry.publish();
            }
            pending.mutation.begin(snapshot, previous_writer, projected);
        });

        let result = updater(pending.mutation.snapshot().cloned()).await;

        let mutation = &mut pending.mutation;
        let (outcome, refetch) = self.with_entry(key, |entry| {
            let (outcome, refetch) = match result {
                Ok(value) if ticket > entry.last_commit => {
                    entry.data = Some(value.clone());
                    entry.error = None;
                    entry.last_commit = ticket;
                    entry.last_write = ticket;
                    entry.publish();
                    mutation.commit(value.clone());
                    (Ok(MutationOutcome::Committed(value)), revalidate)
                }
                Ok(value) => {
                    debug!(key, ticket, "a later mutation already committed; result not cached");
                    mutation.discard();
                    (Ok(MutationOutcome::Superseded(value)), false)
                }
                Err(ApiError::MissingPayload) => {
                    debug!(key, ticket, "mutation response had no payload; marking key stale");
                    entry.fetched_at = None;
                    mutation.discard();
                    (Ok(MutationOutcome::Stale), true)
                }
                Err(error) => {
                    let refetch = entry.fail(key, mutation, rollback_on_error);
                    (Err(error), refetch)
                }
            };
            let missed = entry.settle();
            (outcome, refetch || missed)
        });

        debug_assert!(pending.mutation.is_settled());
        if refetch {
            self.spawn_revalidate(key);
        }
        outcome
    }

    fn start_fetch(&self, key: &str) -> (u64, FetchFuture<V>) {
        self.with_entry(key, |entry| {
            if let Some((ticket, request)) = &entry.in_flight {
                debug!(key, "joining in-flight fetch");
                return (*ticket, request.clone());
            }
            let ticket = self.tick();
            let request = (self.inner.fetcher)(key.to_string()).shared();
            entry.in_flight = Some((ticket, request.clone()));
            entry.fetched_at = Some(Instant::now());
            entry.publish();
            (ticket, request)
        })
    }

    fn finish_fetch(&self, key: &str, ticket: u64, result: Result<V, ApiError>) {
        self.with_entry(key, |entry| {
            if !entry.in_flight.as_ref().is_some_and(|(t, _)| *t == ticket) {
                return;
            }
            entry.in_flight = None;
            if entry.pending_mutations > 0 {
                debug!(key, ticket, "fetch landed while a mutation was pending; discarding its result");
                entry.missed_fetch = true;
                entry.fetched_at = None;
            } else if entry.last_mutation > ticket {
                debug!(key, ticket, "fetch raced a mutation; discarding its result");
            } else {
                match result {
                    Ok(value) => {
                        entry.data = Some(value);
                        entry.error = None;
                    }
                    Err(error) => {
                        debug!(key, %error, "fetch failed; keeping stale data");
                        entry.error = Some(error);
                    }
                }
            }
            entry.publish();
        });
    }

    fn spawn_revalidate(&self, key: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(key, "no runtime; skipping background revalidation");
            return;
        };
        let cache = self.clone();
        let key = key.to_string();
        runtime.spawn(async move {
            cache.revalidate(&key).await;
        });
    }

    fn tick(&self) -> u64 {
        self.inner.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry<V>>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn with_entry<R>(&self, key: &str, f: impl FnOnce(&mut Entry<V>) -> R) -> R {
        let mut entries = self.lock();
        let entry = entries.entry(key.to_string()).or_insert_with(Entry::new);
        f(entry)
    }
}
