use http::Method;

use crate::error::Error;

/// Methods safe to replay automatically: GET, HEAD, OPTIONS, PUT,
/// DELETE, TRACE. POST and PATCH are never retried automatically.
fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET
            | Method::HEAD
            | Method::OPTIONS
            | Method::PUT
            | Method::DELETE
            | Method::TRACE
    )
}

/// Classifies a failed attempt as retriable or terminal and enforces
/// the attempt cap. Stateless beyond the configured `max_tries` —
/// everything else needed for the decision is passed in per call.
pub(crate) struct RetryPolicy {
    max_tries: usize,
}

impl RetryPolicy {
    pub(crate) fn new(max_tries: usize) -> Self {
        Self { max_tries: max_tries.max(1) }
    }

    /// `bytes_received` is the number of response bytes read on the
    /// wire during the failed attempt — used to tell a timeout that
    /// fired before any server byte arrived (retriable) from one that
    /// fired mid-response (not retried; the server may already be
    /// acting on the request). `body_rewindable` is false once a
    /// request body exceeds the buffering cap and has started being
    /// consumed (see DESIGN.md's request-body rewind cap decision).
    pub(crate) fn should_retry(
        &self,
        method: &Method,
        error: &Error,
        bytes_received: u64,
        attempt_index: usize,
        body_rewindable: bool,
    ) -> bool {
        if attempt_index + 1 >= self.max_tries {
            return false;
        }
        if !is_idempotent(method) {
            return false;
        }
        if !body_rewindable {
            return false;
        }

        match error {
            Error::Connect { .. } => true,
            Error::HeaderTimeout => bytes_received == 0,
            Error::PeerReset(_) => bytes_received == 0,
            Error::BodyTimeout | Error::Protocol(_) | Error::Closed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn connect_error() -> Error {
        Error::connect("127.0.0.1:0", io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
    }

    #[test]
    fn retries_idempotent_connect_errors() {
        let policy = RetryPolicy::new(2);
        assert!(policy.should_retry(&Method::GET, &connect_error(), 0, 0, true));
    }

    #[test]
    fn never_retries_post() {
        let policy = RetryPolicy::new(5);
        assert!(!policy.should_retry(&Method::POST, &connect_error(), 0, 0, true));
    }

    #[test]
    fn stops_at_max_tries() {
        let policy = RetryPolicy::new(2);
        assert!(!policy.should_retry(&Method::GET, &connect_error(), 1, 1, true));
    }

    #[test]
    fn header_timeout_only_retries_with_no_bytes() {
        let policy = RetryPolicy::new(3);
        assert!(policy.should_retry(&Method::GET, &Error::HeaderTimeout, 0, 0, true));
        assert!(!policy.should_retry(&Method::GET, &Error::HeaderTimeout, 1, 0, true));
    }

    #[test]
    fn body_timeout_never_retries() {
        let policy = RetryPolicy::new(5);
        assert!(!policy.should_retry(&Method::GET, &Error::BodyTimeout, 0, 0, true));
    }

    #[test]
    fn non_rewindable_body_never_retries() {
        let policy = RetryPolicy::new(5);
        assert!(!policy.should_retry(&Method::PUT, &connect_error(), 0, 0, false));
    }
}
