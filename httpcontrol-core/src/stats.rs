use std::sync::Arc;
use std::time::Duration;

use http::request::Parts as RequestParts;
use http::response::Parts as ResponseParts;

use crate::error::Error;

/// This attempt's position within the call, and whether the
/// Transport Core intends to retry after it.
#[derive(Debug, Clone, Copy)]
pub struct RetryState {
    /// Zero-based index of this attempt; the first attempt is 0.
    pub count: usize,
    /// True iff the retry policy chose to retry after this attempt.
    /// Exactly one `AttemptStats` per call has this set to `false`,
    /// and it is always the last one delivered.
    pub pending: bool,
}

/// An immutable snapshot of one attempt, delivered to the observer
/// exactly once, synchronously, after the attempt's outcome is known
/// and before the transport loops to a retry or returns.
///
/// `request`/`response` carry headers and metadata only — never a
/// body — since the observer must not read the response body, and by
/// the same logic has no business holding the request body either.
pub struct AttemptStats<'a> {
    pub request: &'a RequestParts,
    pub response: Option<&'a ResponseParts>,
    pub error: Option<&'a Error>,
    pub retry: RetryState,
    pub duration: Duration,
}

/// A caller-supplied per-attempt statistics sink.
///
/// Invoked synchronously on the task driving the attempt. Observer
/// code is trusted: a panic inside it is not caught and propagates to
/// whoever called `Transport::round_trip`.
pub type Observer = Arc<dyn Fn(&AttemptStats<'_>) + Send + Sync>;
