use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// A fetch-produced error, shared by every requester of the slots it covers.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// The outcome of a failed load.
///
/// Outcomes are memoized, so the same `LoadError` value is returned to every
/// requester of a key, including requesters that arrive after the batch
/// completed. User errors are wrapped in [`LoadError::Fetch`] behind an `Arc`
/// to make that sharing cheap.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The fetch did not produce a value for the requested key.
    #[error("batchfetch: not found")]
    NotFound,

    /// The fetch panicked. Every requester in the batch receives this.
    #[error("panic during fetch: {0}")]
    Panic(String),

    /// The fetch returned a different number of values than keys.
    #[error("bug in fetch function: {returned} values returned for {requested} keys")]
    ValueCount { returned: usize, requested: usize },

    /// The fetch returned a non-empty error list shorter than the key list,
    /// leaving the trailing slots unaccounted for.
    #[error("bug in fetch function: {returned} errors returned for {requested} keys; last error: {}", fmt_last(.last))]
    ErrorCount {
        returned: usize,
        requested: usize,
        last: Option<Box<LoadError>>,
    },

    /// An error the fetch reported for this slot.
    #[error("{0}")]
    Fetch(SharedError),
}

fn fmt_last(last: &Option<Box<LoadError>>) -> String {
    match last {
        Some(err) => err.to_string(),
        None => "<none>".to_owned(),
    }
}

impl LoadError {
    /// Wraps an arbitrary error produced by a fetch.
    pub fn fetch<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        LoadError::Fetch(Arc::from(err.into()))
    }

    /// True for the sentinel produced when a mapped fetch omits a key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound)
    }
}

/// Positional per-key errors from a multi-key load.
///
/// Returned by `load_all`/`load_all_thunk` when at least one key failed; the
/// entry at index `i` corresponds to `keys[i]`, with `None` marking keys that
/// succeeded.
#[derive(Debug, Clone, Default)]
pub struct ErrorSlice(Vec<Option<LoadError>>);

impl ErrorSlice {
    pub(crate) fn new(errors: Vec<Option<LoadError>>) -> Self {
        Self(errors)
    }

    /// The error for position `index`, if that key failed.
    pub fn get(&self, index: usize) -> Option<&LoadError> {
        self.0.get(index).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates positions in key order.
    pub fn iter(&self) -> impl Iterator<Item = Option<&LoadError>> + '_ {
        self.0.iter().map(Option::as_ref)
    }

    pub fn into_inner(self) -> Vec<Option<LoadError>> {
        self.0
    }
}

impl fmt::Display for ErrorSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        for err in self.0.iter().flatten() {
            if wrote {
                f.write_str("\n")?;
            }
            write!(f, "{err}")?;
            wrote = true;
        }
        if !wrote {
            f.write_str("no error data")?;
        }
        Ok(())
    }
}

impl StdError for ErrorSlice {}

/// Error value returned by a mapped fetch.
#[derive(Debug, Clone)]
pub enum MappedFetchError<K> {
    /// Failures attributed to individual keys. Consulted only for keys the
    /// fetch resolved a value for; keys absent from the value map always
    /// surface [`LoadError::NotFound`] instead.
    Keyed(HashMap<K, LoadError>),
    /// A single failure covering every key the fetch resolved.
    Whole(LoadError),
}

impl<K: fmt::Debug> fmt::Display for MappedFetchError<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyed(errors) => {
                f.write_str("Mapped errors: [")?;
                for (i, (key, err)) in errors.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key:?}: {err}")?;
                }
                f.write_str("]")
            }
            Self::Whole(err) => write!(f, "{err}"),
        }
    }
}

impl<K: fmt::Debug> StdError for MappedFetchError<K> {}

impl<K> From<LoadError> for MappedFetchError<K> {
    fn from(err: LoadError) -> Self {
        Self::Whole(err)
    }
}
