mod batch;
mod context;
mod error;
mod fetcher;
mod loader;
mod mapped;
mod thunk;
mod tracer;

#[cfg(feature = "stats")]
mod stats;

pub use context::Context;
pub use error::{ErrorSlice, LoadError, MappedFetchError, SharedError};
pub use fetcher::{FetchOutput, Fetcher, MappedFetcher, MappedOutput};
pub use loader::{Builder, Loader, DEFAULT_WAIT};
pub use mapped::Mapped;
pub use thunk::Thunk;
pub use tracer::{
    Span, Tracer, TracingTracer, SPAN_FETCH_KEYLIMIT, SPAN_FETCH_TIMELIMIT, SPAN_LOAD, SPAN_WAIT,
};
