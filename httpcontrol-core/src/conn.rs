use std::net::SocketAddr;
use std::time::Duration;

use hyper::client::conn::{self, SendRequest};
use hyper::{Body, Request, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use crate::dialer;
use crate::error::Error;
use crate::killswitch::KillSwitch;
use crate::usage::IoUsageTracker;

/// A destination as resolved from a request URI: where to dial and,
/// for TLS, what hostname to verify against.
#[derive(Clone)]
pub(crate) enum Scheme {
    Http,
    Https(tokio_native_tls::TlsConnector),
}

/// A single live HTTP/1.1 connection plus the task driving its I/O.
///
/// Owned by the Timeout Controller for the duration of one attempt;
/// either returned to the idle pool on success or dropped (which
/// aborts the driver task and closes the socket) on failure.
pub(crate) struct Connection {
    send_request: SendRequest<Body>,
    driver: JoinHandle<()>,
    usage: IoUsageTracker,
    pub(crate) kill: KillSwitch,
}

impl Connection {
    pub(crate) async fn establish(
        addr: SocketAddr,
        scheme: &Scheme,
        host: &str,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, Error> {
        let kill = KillSwitch::new();
        let tcp = dialer::dial(addr, connect_timeout, &kill).await?;

        let usage = IoUsageTracker::new();
        let tcp = usage.wrap_stream(tcp);

        match scheme {
            Scheme::Http => Self::handshake(tcp, kill, usage).await,
            Scheme::Https(connector) => {
                let tls = connector.connect(host, tcp).await.map_err(|e| {
                    Error::connect(addr, std::io::Error::new(std::io::ErrorKind::Other, e))
                })?;
                Self::handshake(tls, kill, usage).await
            },
        }
    }

    async fn handshake<S>(stream: S, kill: KillSwitch, usage: IoUsageTracker) -> Result<Self, Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (send_request, connection) =
            conn::Builder::new().handshake(stream).await.map_err(Error::Protocol)?;

        let driver = tokio::spawn(async move {
            if let Err(error) = connection.await {
                trace!(?error, "connection driver exited");
            }
        });

        Ok(Self { send_request, driver, usage, kill })
    }

    /// True once hyper has decided this connection cannot be reused
    /// (peer asked for `Connection: close`, HTTP/1.0 without
    /// keep-alive, or the driver task has already errored out).
    pub(crate) fn is_reusable(&mut self) -> bool {
        use std::task::{Context, Poll, Waker};

        let waker = Waker::noop();
        let mut cx = Context::from_waker(waker);
        !matches!(self.send_request.poll_ready(&mut cx), Poll::Ready(Err(_)))
    }

    pub(crate) fn received_bytes(&self) -> u64 {
        self.usage.get_received_count()
    }

    pub(crate) async fn send(&mut self, request: Request<Body>) -> Result<Response<Body>, hyper::Error> {
        self.send_request.send_request(request).await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
