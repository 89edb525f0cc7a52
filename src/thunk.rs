use std::sync::Arc;

use crate::batch::BatchCell;
use crate::error::LoadError;

/// A deferred handle to the outcome of one key's load.
///
/// Thunks are cached by the loader, so every requester of a key holds the
/// same thunk and observes the same outcome. [`get`](Thunk::get) may be
/// called any number of times, from any number of tasks; it blocks until the
/// key's batch completes and returns the same result on every call
/// thereafter.
#[derive(Clone)]
pub struct Thunk<V> {
    inner: Inner<V>,
}

#[derive(Clone)]
enum Inner<V> {
    /// Waiting on slot `pos` of a batch.
    Batched { cell: Arc<BatchCell<V>>, pos: usize },
    /// Known up front (`prime`).
    Ready(Result<V, LoadError>),
}

impl<V: Clone + Send + Sync + 'static> Thunk<V> {
    pub(crate) fn batched(cell: Arc<BatchCell<V>>, pos: usize) -> Self {
        Self {
            inner: Inner::Batched { cell, pos },
        }
    }

    pub(crate) fn ready(result: Result<V, LoadError>) -> Self {
        Self {
            inner: Inner::Ready(result),
        }
    }

    /// Waits for the batch holding this key and returns its slot.
    pub async fn get(&self) -> Result<V, LoadError> {
        match &self.inner {
            Inner::Ready(result) => result.clone(),
            Inner::Batched { cell, pos } => {
                cell.done().await;
                cell.slot(*pos)
            }
        }
    }
}
