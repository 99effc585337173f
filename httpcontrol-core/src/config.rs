use std::time::Duration;

use http::Uri;

use crate::stats::Observer;

/// Transport configuration. `Default` gives the zero value for every
/// field: no timeouts, no retry, a platform-default TLS connector.
#[derive(Clone)]
pub struct Config {
    /// Max duration of a single TCP dial. `None` means no dial
    /// deadline.
    pub connect_timeout: Option<Duration>,
    /// Max time from request written to response headers fully
    /// received. `None` means no header deadline.
    pub response_header_timeout: Option<Duration>,
    /// Max wall-clock time for the entire round-trip including body
    /// read start. `None` means no overall deadline.
    pub request_timeout: Option<Duration>,
    /// Upper bound on total attempts, not retries. `0` or `1` means
    /// no retry.
    pub max_tries: usize,
    /// Optional observer invoked once per attempt.
    pub stats: Option<Observer>,
    /// Pass-through: disables HTTP keep-alive, so every attempt's
    /// connection is closed rather than returned to the pool.
    pub disable_keep_alives: bool,
    /// Pass-through: if set, requests negotiate `identity` encoding
    /// instead of leaving `Accept-Encoding` as the caller set it.
    pub disable_compression: bool,
    /// Pass-through: idle connections kept per host.
    pub max_idle_conns_per_host: usize,
    /// Pass-through: custom TLS client configuration for `https://`
    /// destinations. `None` uses the platform default.
    pub tls: Option<native_tls::TlsConnector>,
    /// Pass-through: forward-proxy to dial instead of the request's
    /// own host. Only plain-HTTP destinations are proxied this way —
    /// CONNECT-tunneled HTTPS-via-proxy is out of scope (DESIGN.md).
    pub proxy: Option<Uri>,
    /// Request bodies larger than this are not buffered for retry;
    /// such requests degrade to stop-on-first-error.
    pub max_retry_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            response_header_timeout: None,
            request_timeout: None,
            max_tries: 1,
            stats: None,
            disable_keep_alives: false,
            disable_compression: false,
            max_idle_conns_per_host: 2,
            tls: None,
            proxy: None,
            max_retry_body_bytes: 64 * 1024,
        }
    }
}
