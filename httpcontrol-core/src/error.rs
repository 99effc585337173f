use std::fmt;
use std::io;

use thiserror::Error;

/// The taxonomy of things that can go wrong on a single attempt
/// against the wrapped transport.
///
/// Message text is part of the external contract: `Connect` messages
/// contain the substring `"dial"`, and the two timer-triggered
/// variants contain `"use of closed network connection"`, since
/// callers commonly match on these substrings.
#[derive(Debug, Error)]
pub enum Error {
    /// Dialing the remote host failed, or the connect timeout expired
    /// before the TCP (or TLS) handshake completed.
    #[error("dial tcp {addr}: {source}")]
    Connect { addr: String, #[source] source: io::Error },

    /// The response-header timer fired before any response header
    /// byte was observed.
    #[error("read response header: use of closed network connection")]
    HeaderTimeout,

    /// The whole-request timer fired, forcing the connection closed
    /// while headers or body were still outstanding.
    #[error("read response body: use of closed network connection")]
    BodyTimeout,

    /// The peer closed the connection mid-exchange, with no timer
    /// involved.
    #[error("connection closed by peer: {0}")]
    PeerReset(#[source] hyper::Error),

    /// The peer sent a response hyper could not parse as valid
    /// HTTP/1.1.
    #[error("malformed response: {0}")]
    Protocol(#[source] hyper::Error),

    /// `Transport::close` has already run; no further attempts may
    /// be started.
    #[error("http: transport closed")]
    Closed,
}

impl Error {
    pub(crate) fn connect(addr: impl fmt::Display, source: io::Error) -> Self {
        Self::Connect { addr: addr.to_string(), source }
    }

    /// Classifies a raw hyper error once it's established that
    /// neither timer was the cause (the dial already succeeded, so
    /// only the send/receive phase of the attempt can be at fault).
    pub(crate) fn from_hyper(e: hyper::Error) -> Self {
        if e.is_parse() || e.is_parse_status() || e.is_parse_too_large() || e.is_user() {
            Error::Protocol(e)
        } else {
            Error::PeerReset(e)
        }
    }
}
