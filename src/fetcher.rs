use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{LoadError, MappedFetchError};

/// The bulk lookup behind a [`Loader`](crate::Loader).
///
/// The loader hands over every key accumulated in one batch, in registration
/// order, and fans the output slots back out to the requesters by position.
/// One fetcher instance is shared by all of a loader's batches and must
/// tolerate concurrent invocation, since a size-triggered batch can overlap a
/// timed one.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    type Key: Eq + Hash + Clone + Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;

    /// Resolves `keys` in bulk. `cx` is the context of the request that
    /// opened the batch.
    async fn fetch(&self, cx: &Context, keys: &[Self::Key]) -> FetchOutput<Self::Value>;
}

/// Positional result of one bulk fetch: slot `i` answers `keys[i]`.
#[derive(Debug, Clone)]
pub struct FetchOutput<V> {
    /// One entry per key. A `None` slot without a matching error surfaces
    /// [`LoadError::NotFound`] to that requester.
    pub values: Vec<Option<V>>,
    /// Per-slot errors; may be empty when every key succeeded. A list with a
    /// single non-empty entry is treated as a batch-wide failure and returned
    /// to every requester.
    pub errors: Vec<Option<LoadError>>,
}

impl<V> FetchOutput<V> {
    /// Output with a value for every key and no errors.
    pub fn from_values(values: Vec<V>) -> Self {
        Self {
            values: values.into_iter().map(Some).collect(),
            errors: Vec::new(),
        }
    }

    /// Output assembled from one `Result` per key, in key order.
    pub fn from_results(results: Vec<Result<V, LoadError>>) -> Self {
        let mut values = Vec::with_capacity(results.len());
        let mut errors = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(value) => {
                    values.push(Some(value));
                    errors.push(None);
                }
                Err(err) => {
                    values.push(None);
                    errors.push(Some(err));
                }
            }
        }
        Self { values, errors }
    }

    /// A failure covering the whole batch; every requester receives `err`.
    pub fn whole_batch_error(err: LoadError) -> Self {
        Self {
            values: Vec::new(),
            errors: vec![Some(err)],
        }
    }
}

/// A keyed-mapping flavor of [`Fetcher`] for sources that naturally return a
/// map, adapted to the positional contract by [`Mapped`](crate::Mapped).
#[async_trait]
pub trait MappedFetcher: Send + Sync + 'static {
    type Key: Eq + Hash + Clone + Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;

    /// Resolves `keys` in bulk. Requested keys absent from the returned map
    /// surface [`LoadError::NotFound`] to their requesters.
    async fn fetch(
        &self,
        cx: &Context,
        keys: &[Self::Key],
    ) -> MappedOutput<Self::Key, Self::Value>;
}

/// Result of one mapped fetch: the resolved values plus an optional error,
/// which may name individual keys or cover the batch as a whole.
#[derive(Debug, Clone)]
pub struct MappedOutput<K, V> {
    pub values: HashMap<K, V>,
    pub error: Option<MappedFetchError<K>>,
}

impl<K, V> MappedOutput<K, V> {
    /// Successful output: every resolved key maps to its value.
    pub fn from_map(values: HashMap<K, V>) -> Self {
        Self {
            values,
            error: None,
        }
    }

    /// Output carrying both resolved values and an error.
    pub fn with_error(values: HashMap<K, V>, error: MappedFetchError<K>) -> Self {
        Self {
            values,
            error: Some(error),
        }
    }
}
