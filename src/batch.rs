use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::error::LoadError;
use crate::fetcher::{FetchOutput, Fetcher};
use crate::tracer::{Span, SPAN_FETCH_KEYLIMIT, SPAN_FETCH_TIMELIMIT};

/// Which condition closed a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    /// The wait window elapsed.
    TimeLimit,
    /// The batch reached its key ceiling.
    KeyLimit,
}

impl Trigger {
    pub(crate) fn span_name(self) -> &'static str {
        match self {
            Trigger::TimeLimit => SPAN_FETCH_TIMELIMIT,
            Trigger::KeyLimit => SPAN_FETCH_KEYLIMIT,
        }
    }
}

/// Completion side of a batch, shared between its dispatcher and every thunk.
///
/// `output` is written exactly once, before the token is cancelled; the
/// cancellation is the publish edge, so readers must await [`done`] before
/// calling [`slot`].
///
/// [`done`]: BatchCell::done
/// [`slot`]: BatchCell::slot
pub(crate) struct BatchCell<V> {
    done: CancellationToken,
    output: OnceLock<Output<V>>,
}

struct Output<V> {
    key_count: usize,
    values: Vec<Option<V>>,
    errors: Vec<Option<LoadError>>,
}

impl<V: Clone> BatchCell<V> {
    pub(crate) fn new() -> Self {
        Self {
            done: CancellationToken::new(),
            output: OnceLock::new(),
        }
    }

    /// Resolves once the batch has completed. Safe to call repeatedly.
    pub(crate) async fn done(&self) {
        self.done.cancelled().await;
    }

    /// Publishes the fetch output and wakes every waiting thunk.
    pub(crate) fn complete(&self, key_count: usize, output: FetchOutput<V>) {
        let stored = self.output.set(Output {
            key_count,
            values: output.values,
            errors: output.errors,
        });
        if stored.is_err() {
            debug_assert!(false, "batch completed twice");
        }
        self.done.cancel();
    }

    /// The outcome for slot `pos`. Only valid after [`done`](Self::done)
    /// resolves.
    pub(crate) fn slot(&self, pos: usize) -> Result<V, LoadError> {
        let output = self
            .output
            .get()
            .expect("batch signalled done without output");

        // A lone error covers the whole batch, panics included.
        if output.errors.len() == 1 {
            if let Some(err) = &output.errors[0] {
                return Err(err.clone());
            }
        }

        if output.values.len() != output.key_count {
            return Err(LoadError::ValueCount {
                returned: output.values.len(),
                requested: output.key_count,
            });
        }

        if !output.errors.is_empty() {
            match output.errors.get(pos) {
                Some(Some(err)) => return Err(err.clone()),
                Some(None) => {}
                None => {
                    return Err(LoadError::ErrorCount {
                        returned: output.errors.len(),
                        requested: output.key_count,
                        last: output.errors.last().and_then(|e| e.clone()).map(Box::new),
                    })
                }
            }
        }

        match &output.values[pos] {
            Some(value) => Ok(value.clone()),
            None => Err(LoadError::NotFound),
        }
    }
}

/// The currently-forming batch. Owned by the loader's mutex while
/// accumulating; moved into the dispatching task once a trigger fires, after
/// which `keys` is frozen.
pub(crate) struct OpenBatch<F: Fetcher> {
    /// Accumulated keys; a key's index is its requester's slot.
    pub(crate) keys: Vec<F::Key>,
    /// Context of the request that opened the batch; the one the fetch sees.
    pub(crate) first_cx: Context,
    /// Joined contexts, collected only when a tracer is configured.
    pub(crate) contexts: Vec<Context>,
    /// Per-request wait spans, ended once the fetch has returned.
    pub(crate) wait_spans: Vec<Box<dyn Span>>,
    pub(crate) cell: Arc<BatchCell<F::Value>>,
}

impl<F: Fetcher> OpenBatch<F> {
    pub(crate) fn new(first_cx: Context) -> Self {
        Self {
            keys: Vec::new(),
            first_cx,
            contexts: Vec::new(),
            wait_spans: Vec::new(),
            cell: Arc::new(BatchCell::new()),
        }
    }
}

/// Runs the fetch behind a panic guard: a panicking fetch becomes a lone
/// batch-wide error instead of wedging its waiters.
pub(crate) async fn guarded_fetch<F: Fetcher>(
    fetcher: &F,
    cx: &Context,
    keys: &[F::Key],
) -> FetchOutput<F::Value> {
    match AssertUnwindSafe(fetcher.fetch(cx, keys)).catch_unwind().await {
        Ok(output) => output,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            tracing::debug!(%msg, "fetch panicked");
            FetchOutput {
                values: Vec::new(),
                errors: vec![Some(LoadError::Panic(msg))],
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "opaque panic payload".to_owned()
    }
}
