use async_trait::async_trait;

use crate::context::Context;
use crate::error::{LoadError, MappedFetchError};
use crate::fetcher::{FetchOutput, Fetcher, MappedFetcher, MappedOutput};

/// Adapter presenting a [`MappedFetcher`] as a positional [`Fetcher`].
///
/// Slot `i` of the output answers `keys[i]`: a key missing from the returned
/// map yields [`LoadError::NotFound`] for its slot, a
/// [`MappedFetchError::Keyed`] error attaches to the slots of the keys it
/// names, and a [`MappedFetchError::Whole`] error is broadcast to every slot
/// the fetch did resolve.
pub struct Mapped<F> {
    fetcher: F,
}

impl<F> Mapped<F> {
    pub(crate) fn new(fetcher: F) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl<F: MappedFetcher> Fetcher for Mapped<F> {
    type Key = F::Key;
    type Value = F::Value;

    async fn fetch(&self, cx: &Context, keys: &[Self::Key]) -> FetchOutput<Self::Value> {
        let MappedOutput { values, error } = self.fetcher.fetch(cx, keys).await;

        let mut out = FetchOutput {
            values: Vec::with_capacity(keys.len()),
            errors: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            // get, not remove: the same key may occupy several slots.
            match values.get(key) {
                None => {
                    out.values.push(None);
                    out.errors.push(Some(LoadError::NotFound));
                }
                Some(value) => {
                    out.values.push(Some(value.clone()));
                    out.errors.push(match &error {
                        None => None,
                        Some(MappedFetchError::Keyed(errors)) => errors.get(key).cloned(),
                        Some(MappedFetchError::Whole(err)) => Some(err.clone()),
                    });
                }
            }
        }
        out
    }
}
