use tokio_util::sync::CancellationToken;

/// Per-request context handed to `load*` calls and forwarded to the fetch.
///
/// Only the context of the request that opened a batch reaches the fetch;
/// contexts of later joiners are used for tracing alone. Whether an in-flight
/// fetch honors cancellation is up to the fetch itself, the loader only passes
/// the token through. A waiting requester whose own context is cancelled can
/// stop waiting at its call site by racing `cancellation().cancelled()`
/// against the thunk; the shared batch is never cancelled piecemeal.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancellation: CancellationToken,
}

impl Context {
    /// A context that is never cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context backed by the provided cancellation token.
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self { cancellation }
    }

    /// The cancellation token carried by this context.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// True once the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
