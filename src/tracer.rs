use tracing::Level;

use crate::context::Context;

/// Span covering the registration of a single `load_thunk` call.
pub const SPAN_LOAD: &str = "batchfetch.load";
/// Span covering one request's wait, from registration until its batch completes.
pub const SPAN_WAIT: &str = "batchfetch.wait";
/// Span covering the fetch of a batch closed by its wait window elapsing.
pub const SPAN_FETCH_TIMELIMIT: &str = "batchfetch.fetch.timelimit";
/// Span covering the fetch of a batch closed by reaching its key ceiling.
pub const SPAN_FETCH_KEYLIMIT: &str = "batchfetch.fetch.keylimit";

/// An open span. Dropping the span ends it.
pub trait Span: Send {}

/// Emits spans at well-defined moments of a load's life.
///
/// `start` is invoked with [`SPAN_LOAD`] and [`SPAN_WAIT`] once per
/// registered request, and with [`SPAN_FETCH_TIMELIMIT`] or
/// [`SPAN_FETCH_KEYLIMIT`] once per joined context for the duration of the
/// fetch, named for the trigger that closed the batch. The requesting context
/// is passed so implementations can correlate spans with callers. When no
/// tracer is configured these paths are skipped entirely.
pub trait Tracer: Send + Sync + 'static {
    fn start(&self, cx: &Context, name: &'static str) -> Box<dyn Span>;
}

/// A [`Tracer`] that opens a `tracing` span per emission point.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTracer;

struct TracingSpan {
    _span: tracing::Span,
}

impl Span for TracingSpan {}

impl Tracer for TracingTracer {
    fn start(&self, _cx: &Context, name: &'static str) -> Box<dyn Span> {
        Box::new(TracingSpan {
            _span: tracing::span!(Level::TRACE, "batchfetch", op = name),
        })
    }
}
