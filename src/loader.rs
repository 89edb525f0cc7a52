use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::batch::{guarded_fetch, BatchCell, OpenBatch, Trigger};
use crate::context::Context;
use crate::error::{ErrorSlice, LoadError};
use crate::fetcher::{Fetcher, MappedFetcher};
use crate::mapped::Mapped;
#[cfg(feature = "stats")]
use crate::stats::LoaderStats;
use crate::thunk::Thunk;
use crate::tracer::{Tracer, SPAN_LOAD, SPAN_WAIT};

/// How long a batch keeps accumulating before its fetch is dispatched, unless
/// the key ceiling closes it first.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(16);

/// Batch loads values from some expensive resource, primarily intended for
/// mitigating GraphQL's N+1 problem.
///
/// Individually-arriving [`load`](Loader::load) calls are coalesced into one
/// bulk [`Fetcher::fetch`] invocation per batch. A batch accumulates keys
/// until its wait window elapses or it reaches the configured key ceiling,
/// whichever comes first, and the fetch runs exactly once per batch on a
/// detached task. Every outcome, success or error, is memoized: a key is
/// fetched at most once for the lifetime of the loader, and repeated requests
/// return the cached outcome until [`clear`](Loader::clear) removes it.
/// Values can be inserted out-of-band with [`prime`](Loader::prime).
///
/// Loaders are cheap handles around shared state; clone one to share it
/// across tasks. All methods take `&self` and may be called concurrently.
pub struct Loader<F: Fetcher> {
    inner: Arc<Inner<F>>,
}

impl<F: Fetcher> Clone for Loader<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<F: Fetcher> {
    fetcher: F,
    wait: Duration,
    max_batch: usize,
    tracer: Option<Arc<dyn Tracer>>,
    state: Mutex<State<F>>,
}

struct State<F: Fetcher> {
    /// One memoized thunk per key, until cleared.
    thunks: HashMap<F::Key, Thunk<F::Value>>,
    /// The at-most-one currently-forming batch.
    batch: Option<OpenBatch<F>>,
    #[cfg(feature = "stats")]
    stats: LoaderStats,
}

impl<F: Fetcher> State<F> {
    fn new() -> Self {
        Self {
            thunks: HashMap::new(),
            batch: None,
            #[cfg(feature = "stats")]
            stats: LoaderStats::new(),
        }
    }
}

/// Configures and builds a [`Loader`].
pub struct Builder<F: Fetcher> {
    fetcher: F,
    wait: Duration,
    max_batch: usize,
    tracer: Option<Arc<dyn Tracer>>,
}

impl<F: Fetcher> Builder<F> {
    /// How long a batch keeps accumulating before dispatch, default
    /// [`DEFAULT_WAIT`]. This is a lower bound on dispatch delay: the fetch
    /// runs after the window plus scheduling and lock latency.
    pub fn wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Key ceiling past which a batch is dispatched immediately, default 0
    /// meaning unbounded.
    pub fn batch_capacity(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    /// Emit spans describing load registration, per-request wait and fetch
    /// timing.
    pub fn tracer(mut self, tracer: impl Tracer) -> Self {
        self.tracer = Some(Arc::new(tracer));
        self
    }

    pub fn build(self) -> Loader<F> {
        Loader {
            inner: Arc::new(Inner {
                fetcher: self.fetcher,
                wait: self.wait,
                max_batch: self.max_batch,
                tracer: self.tracer,
                state: Mutex::new(State::new()),
            }),
        }
    }
}

impl<F: Fetcher> Loader<F> {
    /// A loader with default configuration.
    pub fn new(fetcher: F) -> Self {
        Self::builder(fetcher).build()
    }

    /// Starts configuring a loader.
    pub fn builder(fetcher: F) -> Builder<F> {
        Builder {
            fetcher,
            wait: DEFAULT_WAIT,
            max_batch: 0,
            tracer: None,
        }
    }

    /// Loads one value, with batching and caching applied automatically.
    pub async fn load(&self, cx: &Context, key: F::Key) -> Result<F::Value, LoadError> {
        self.load_thunk(cx, key).get().await
    }

    /// Registers `key` and returns a handle to its eventual outcome without
    /// waiting. Use this to enqueue keys on several loaders before blocking
    /// on any of them; this method never suspends.
    ///
    /// Must be called from within a tokio runtime: opening a batch arms its
    /// wait timer on a detached task.
    pub fn load_thunk(&self, cx: &Context, key: F::Key) -> Thunk<F::Value> {
        let mut guard = self.inner.state.lock().unwrap();
        let state = &mut *guard;
        #[cfg(feature = "stats")]
        state.stats.record_request();

        if let Some(thunk) = state.thunks.get(&key) {
            #[cfg(feature = "stats")]
            state.stats.record_cache_hit();
            return thunk.clone();
        }

        let newly_opened = state.batch.is_none();
        let batch = state
            .batch
            .get_or_insert_with(|| OpenBatch::new(cx.clone()));
        if newly_opened {
            self.arm_wait_timer(Arc::clone(&batch.cell));
        }

        let _load_span = self
            .inner
            .tracer
            .as_ref()
            .map(|tracer| tracer.start(cx, SPAN_LOAD));
        if let Some(tracer) = &self.inner.tracer {
            batch.contexts.push(cx.clone());
            batch.wait_spans.push(tracer.start(cx, SPAN_WAIT));
        }

        let pos = batch.keys.len();
        batch.keys.push(key.clone());
        let thunk = Thunk::batched(Arc::clone(&batch.cell), pos);
        state.thunks.insert(key, thunk.clone());

        // Size trigger: the adding call dispatches, and the parked timer
        // finds the batch gone when it fires.
        if self.inner.max_batch != 0 && batch.keys.len() >= self.inner.max_batch {
            if let Some(full) = state.batch.take() {
                drop(guard);
                self.dispatch(full, Trigger::KeyLimit);
            }
        }

        thunk
    }

    /// Loads many keys at once, split into batches per the loader's
    /// configuration.
    ///
    /// Returns `Ok` iff every key loaded; otherwise an [`ErrorSlice`] with
    /// one positional entry per requested key.
    pub async fn load_all(
        &self,
        cx: &Context,
        keys: &[F::Key],
    ) -> Result<Vec<F::Value>, ErrorSlice> {
        let thunks: Vec<_> = keys
            .iter()
            .map(|key| self.load_thunk(cx, key.clone()))
            .collect();
        resolve_all(thunks).await
    }

    /// As [`load_all`](Loader::load_all), but assembly is deferred into the
    /// returned future, so many independent multi-key loads can be registered
    /// before any of them is awaited. Registration happens before this
    /// method returns.
    pub fn load_all_thunk(
        &self,
        cx: &Context,
        keys: &[F::Key],
    ) -> impl Future<Output = Result<Vec<F::Value>, ErrorSlice>> + Send + 'static {
        let thunks: Vec<_> = keys
            .iter()
            .map(|key| self.load_thunk(cx, key.clone()))
            .collect();
        resolve_all(thunks)
    }

    /// Adds a value to the cache. Returns `false` without effect if the key
    /// is already cached; to overwrite, [`clear`](Loader::clear) the key
    /// first.
    pub fn prime(&self, key: F::Key, value: F::Value) -> bool {
        let mut guard = self.inner.state.lock().unwrap();
        match guard.thunks.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Thunk::ready(Ok(value)));
                true
            }
        }
    }

    /// Adds many values to the cache at once; returns how many keys were
    /// actually inserted.
    pub fn prime_many(&self, pairs: impl IntoIterator<Item = (F::Key, F::Value)>) -> usize {
        let mut guard = self.inner.state.lock().unwrap();
        let mut inserted = 0;
        for (key, value) in pairs {
            if let Entry::Vacant(slot) = guard.thunks.entry(key) {
                slot.insert(Thunk::ready(Ok(value)));
                inserted += 1;
            }
        }
        inserted
    }

    /// Removes a key from the cache so that its next request refetches. Has
    /// no effect on a batch that is already forming or dispatched.
    pub fn clear(&self, key: &F::Key) {
        self.inner.state.lock().unwrap().thunks.remove(key);
    }

    /// Removes several keys from the cache at once.
    pub fn clear_many(&self, keys: &[F::Key]) {
        let mut guard = self.inner.state.lock().unwrap();
        for key in keys {
            guard.thunks.remove(key);
        }
    }

    /// Drops every cached outcome.
    pub fn clear_all(&self) {
        self.inner.state.lock().unwrap().thunks.clear();
    }

    /// Number of memoized keys.
    pub fn cached_len(&self) -> usize {
        self.inner.state.lock().unwrap().thunks.len()
    }

    /// Arms the wait-window timer for a freshly opened batch. When the timer
    /// fires it dispatches the batch unless the size trigger already did;
    /// "already did" is detected by the armed cell no longer being the
    /// loader's current open batch.
    fn arm_wait_timer(&self, cell: Arc<BatchCell<F::Value>>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.wait).await;
            let batch = {
                let mut guard = inner.state.lock().unwrap();
                let armed_is_current = guard
                    .batch
                    .as_ref()
                    .is_some_and(|open| Arc::ptr_eq(&open.cell, &cell));
                if armed_is_current {
                    guard.batch.take()
                } else {
                    // The size trigger dispatched this batch first.
                    None
                }
            };
            if let Some(batch) = batch {
                inner.run_fetch(batch, Trigger::TimeLimit).await;
            }
        });
    }

    /// Hands a closed batch to a fresh task that runs the fetch.
    fn dispatch(&self, batch: OpenBatch<F>, trigger: Trigger) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run_fetch(batch, trigger).await;
        });
    }
}

impl<F: MappedFetcher> Loader<Mapped<F>> {
    /// A loader over a mapping-style fetcher; keys the fetch omits resolve to
    /// [`LoadError::NotFound`].
    pub fn new_mapped(fetcher: F) -> Self {
        Self::mapped_builder(fetcher).build()
    }

    /// Starts configuring a loader over a mapping-style fetcher.
    pub fn mapped_builder(fetcher: F) -> Builder<Mapped<F>> {
        Self::builder(Mapped::new(fetcher))
    }
}

impl<F: Fetcher> Inner<F> {
    /// Runs the fetch for a closed batch and publishes its output. The batch
    /// is already detached from the loader, so no lock is held across the
    /// fetch.
    async fn run_fetch(&self, batch: OpenBatch<F>, trigger: Trigger) {
        let OpenBatch {
            keys,
            first_cx,
            contexts,
            wait_spans,
            cell,
        } = batch;

        // One fetch span per joined context, held for the duration of the
        // fetch.
        let _fetch_spans: Vec<_> = match &self.tracer {
            Some(tracer) => contexts
                .iter()
                .map(|cx| tracer.start(cx, trigger.span_name()))
                .collect(),
            None => Vec::new(),
        };

        tracing::debug!(size = keys.len(), ?trigger, "dispatching batch");
        #[cfg(feature = "stats")]
        self.state
            .lock()
            .unwrap()
            .stats
            .record_dispatch(keys.len(), trigger);

        let output = guarded_fetch(&self.fetcher, &first_cx, &keys).await;

        drop(wait_spans);
        cell.complete(keys.len(), output);
    }
}

async fn resolve_all<V>(thunks: Vec<Thunk<V>>) -> Result<Vec<V>, ErrorSlice>
where
    V: Clone + Send + Sync + 'static,
{
    let mut values = Vec::with_capacity(thunks.len());
    let mut errors = Vec::with_capacity(thunks.len());
    let mut failed = false;
    for thunk in &thunks {
        match thunk.get().await {
            Ok(value) => {
                values.push(Some(value));
                errors.push(None);
            }
            Err(err) => {
                failed = true;
                values.push(None);
                errors.push(Some(err));
            }
        }
    }
    if failed {
        Err(ErrorSlice::new(errors))
    } else {
        Ok(values.into_iter().flatten().collect())
    }
}
