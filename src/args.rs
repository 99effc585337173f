use std::time::Duration;

use clap::Parser;
use http::{Method, Uri};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
/// Fires a single HTTP/1.1 request through a controllable transport and
/// reports the outcome of every attempt.
pub struct Args {
    #[clap(value_parser = check_uri)]
    /// The URL to request, e.g. `http://127.0.0.1:8080/`.
    pub url: Uri,

    #[clap(long, env, default_value_t = http::Method::GET)]
    /// The HTTP method to use.
    pub method: Method,

    #[clap(long, env, value_parser = parse_duration)]
    /// Max duration of the TCP dial, e.g. `500ms`. Unset means no
    /// dial deadline.
    pub dial_timeout: Option<Duration>,

    #[clap(long, env, value_parser = parse_duration)]
    /// Max time from request written to response headers received.
    /// Unset means no header deadline.
    pub response_header_timeout: Option<Duration>,

    #[clap(long, env, value_parser = parse_duration)]
    /// Max wall-clock time for the entire round-trip. Unset means no
    /// overall deadline.
    pub request_timeout: Option<Duration>,

    #[clap(long, env, default_value_t = 1)]
    /// Upper bound on total attempts for idempotent methods. `1`
    /// disables retry.
    pub max_tries: usize,

    #[clap(long, env)]
    /// Disable HTTP keep-alive; the attempt's connection is closed
    /// instead of returned to the pool.
    pub disable_keep_alives: bool,
}

fn check_uri(s: &str) -> Result<Uri, String> {
    s.parse().map_err(|e: http::uri::InvalidUri| e.to_string())
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s).map_err(|e| e.to_string())
}
