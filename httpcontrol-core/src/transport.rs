use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use http::header::{HeaderValue, ACCEPT_ENCODING, HOST};
use http::request::Parts as RequestParts;
use http::{Request, Response, Uri};
use hyper::body::Bytes;
use hyper::Body;

use crate::conn::{Connection, Scheme};
use crate::config::Config;
use crate::error::Error;
use crate::killswitch::KillSwitch;
use crate::pool::{ConnPool, PoolKey, TimedBody};
use crate::retry::RetryPolicy;
use crate::stats::{AttemptStats, RetryState};
use crate::timeout::Timer;

/// A controllable HTTP/1.1 client transport.
///
/// Cheap to clone — every clone shares the same idle-connection pool
/// and configuration, so a single `Transport` can be installed into
/// many concurrent callers, the same way the wrapped transport it
/// replaces would be.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    pool: ConnPool,
    retry: RetryPolicy,
    tls: tokio_native_tls::TlsConnector,
    closed: AtomicBool,
}

impl Transport {
    pub fn new(config: Config) -> Self {
        let native = config
            .tls
            .clone()
            .unwrap_or_else(|| native_tls::TlsConnector::new().expect("build default TLS connector"));

        let inner = Inner {
            pool: ConnPool::new(config.max_idle_conns_per_host),
            retry: RetryPolicy::new(config.max_tries),
            tls: tokio_native_tls::TlsConnector::from(native),
            closed: AtomicBool::new(false),
            config,
        };

        Self { inner: Arc::new(inner) }
    }

    /// Performs one logical round-trip, retrying idempotent requests
    /// per the configured policy. Returns the first successful response
    /// or the last attempt's error.
    pub async fn round_trip(&self, request: Request<Bytes>) -> Result<Response<TimedBody>, Error> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let (parts, body) = request.into_parts();
        let rewindable = (body.len() as u64) <= self.inner.config.max_retry_body_bytes as u64;

        let mut attempt_index = 0usize;
        loop {
            let start = Instant::now();
            let outcome = self.attempt(&parts, body.clone()).await;
            let duration = start.elapsed();

            match outcome {
                AttemptOutcome::Success { response, conn, key, request_timer } => {
                    let keep_alive = !self.inner.config.disable_keep_alives;
                    let (resp_parts, resp_body) = response.into_parts();

                    let stats = AttemptStats {
                        request: &parts,
                        response: Some(&resp_parts),
                        error: None,
                        retry: RetryState { count: attempt_index, pending: false },
                        duration,
                    };
                    self.notify(&stats, true);

                    let kill = conn.kill.clone();
                    let wrapped = TimedBody::new(
                        resp_body,
                        request_timer,
                        kill,
                        conn,
                        self.inner.pool.clone(),
                        key,
                        keep_alive,
                    );
                    return Ok(Response::from_parts(resp_parts, wrapped));
                },
                AttemptOutcome::Failure { error, bytes_received } => {
                    let pending = self.inner.retry.should_retry(
                        &parts.method,
                        &error,
                        bytes_received,
                        attempt_index,
                        rewindable,
                    );

                    let stats = AttemptStats {
                        request: &parts,
                        response: None,
                        error: Some(&error),
                        retry: RetryState { count: attempt_index, pending },
                        duration,
                    };
                    self.notify(&stats, false);

                    if pending {
                        attempt_index += 1;
                        continue;
                    }
                    return Err(error);
                },
            }
        }
    }

    /// Disconnects idle connections and forbids new attempts.
    /// Idempotent: a second call just finds nothing idle left to
    /// close. In-flight attempts are not cancelled — callers abort by
    /// dropping the request/response they hold.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.pool.close_idle();
    }

    fn notify(&self, stats: &AttemptStats<'_>, success: bool) {
        if let Some(error) = stats.error {
            if stats.retry.pending {
                warn!(attempt = stats.retry.count, %error, "attempt failed, retrying");
            } else {
                error!(attempt = stats.retry.count, %error, "attempt failed, giving up");
            }
        } else if success {
            debug!(attempt = stats.retry.count, ?stats.duration, "attempt succeeded");
        }

        if let Some(observer) = &self.inner.config.stats {
            observer(stats);
        }
    }

    async fn attempt(&self, parts: &RequestParts, body: Bytes) -> AttemptOutcome {
        let dest = match destination(&parts.uri, self.inner.config.proxy.as_ref()) {
            Ok(dest) => dest,
            Err(error) => return AttemptOutcome::Failure { error, bytes_received: 0 },
        };

        let key = PoolKey::new(dest.is_https, &dest.tls_host, dest.origin_port);

        let conn = match self.inner.pool.checkout(&key) {
            Some(conn) => conn,
            None => {
                let addr = match resolve(&dest.dial_host, dest.dial_port).await {
                    Ok(addr) => addr,
                    Err(error) => return AttemptOutcome::Failure { error, bytes_received: 0 },
                };

                let scheme = if dest.is_https {
                    Scheme::Https(self.inner.tls.clone())
                } else {
                    Scheme::Http
                };

                match Connection::establish(addr, &scheme, &dest.tls_host, self.inner.config.connect_timeout).await
                {
                    Ok(conn) => conn,
                    Err(error) => return AttemptOutcome::Failure { error, bytes_received: 0 },
                }
            },
        };

        self.send_on(conn, parts, body, &dest).await
    }

    async fn send_on(
        &self,
        mut conn: Connection,
        parts: &RequestParts,
        body: Bytes,
        dest: &Destination,
    ) -> AttemptOutcome {
        let kill: KillSwitch = conn.kill.clone();
        let header_timer = self
            .inner
            .config
            .response_header_timeout
            .map(|dur| Timer::arm(dur, kill.clone()));
        let request_timer = self.inner.config.request_timeout.map(|dur| Timer::arm(dur, kill.clone()));

        let bytes_before = conn.received_bytes();
        let request = build_request(parts, body, dest, self.inner.config.disable_compression);
        let result = conn.send(request).await;

        let header_fired = header_timer.as_ref().map_or(false, Timer::has_fired);
        if let Some(timer) = header_timer {
            timer.disarm();
        }

        match result {
            Ok(response) => {
                let key = PoolKey::new(dest.is_https, &dest.tls_host, dest.origin_port);
                AttemptOutcome::Success { response, conn, key, request_timer }
            },
            Err(hyper_error) => {
                let bytes_received = conn.received_bytes().saturating_sub(bytes_before);
                let request_fired = request_timer.as_ref().map_or(false, Timer::has_fired);
                if let Some(timer) = request_timer {
                    timer.disarm();
                }

                let error = if header_fired {
                    Error::HeaderTimeout
                } else if request_fired {
                    Error::BodyTimeout
                } else {
                    Error::from_hyper(hyper_error)
                };

                drop(conn);
                AttemptOutcome::Failure { error, bytes_received }
            },
        }
    }
}

enum AttemptOutcome {
    Success { response: Response<Body>, conn: Connection, key: PoolKey, request_timer: Option<Timer> },
    Failure { error: Error, bytes_received: u64 },
}

struct Destination {
    dial_host: String,
    dial_port: u16,
    tls_host: String,
    origin_port: u16,
    is_https: bool,
}

fn destination(uri: &Uri, proxy: Option<&Uri>) -> Result<Destination, Error> {
    let is_https = match uri.scheme_str().unwrap_or("http") {
        "http" => false,
        "https" => true,
        other => return Err(Error::connect(uri, io_err(format!("unsupported scheme {other:?}")))),
    };

    let authority = uri.authority().ok_or_else(|| Error::connect(uri, io_err("missing host")))?;
    let tls_host = authority.host().to_string();
    let origin_port = authority.port_u16().unwrap_or(if is_https { 443 } else { 80 });

    let (dial_host, dial_port) = match proxy {
        Some(proxy_uri) if !is_https => {
            let proxy_authority =
                proxy_uri.authority().ok_or_else(|| Error::connect(proxy_uri, io_err("missing proxy host")))?;
            (proxy_authority.host().to_string(), proxy_authority.port_u16().unwrap_or(80))
        },
        _ => (tls_host.clone(), origin_port),
    };

    Ok(Destination { dial_host, dial_port, tls_host, origin_port, is_https })
}

/// Resolves a host:port to a socket address, preferring IPv4 when
/// both families are returned.
async fn resolve(host: &str, port: u16) -> Result<SocketAddr, Error> {
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::connect(format!("{host}:{port}"), e))?;

    let mut last = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Ok(addr);
        }
        last = Some(addr);
    }

    last.ok_or_else(|| Error::connect(format!("{host}:{port}"), io_err("no addresses found")))
}

fn io_err(msg: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, msg.to_string())
}

/// Rewrites the request into origin-form (direct) or leaves it in
/// absolute-form (plain-HTTP proxy), sets the Host header, and
/// optionally forces `identity` encoding.
fn build_request(parts: &RequestParts, body: Bytes, dest: &Destination, disable_compression: bool) -> Request<Body> {
    let proxied = dest.dial_host != dest.tls_host || dest.dial_port != dest.origin_port;

    let uri = if proxied {
        parts.uri.clone()
    } else {
        let mut builder = Uri::builder();
        if let Some(path_and_query) = parts.uri.path_and_query() {
            builder = builder.path_and_query(path_and_query.clone());
        } else {
            builder = builder.path_and_query("/");
        }
        builder.build().unwrap_or_else(|_| parts.uri.clone())
    };

    let mut request = Request::builder()
        .method(parts.method.clone())
        .version(parts.version)
        .uri(uri)
        .body(Body::from(body))
        .expect("rebuilding a previously valid request");

    *request.headers_mut() = parts.headers.clone();

    let host_header = if dest.origin_port == if dest.is_https { 443 } else { 80 } {
        dest.tls_host.clone()
    } else {
        format!("{}:{}", dest.tls_host, dest.origin_port)
    };
    if let Ok(value) = HeaderValue::from_str(&host_header) {
        request.headers_mut().insert(HOST, value);
    }

    if disable_compression {
        request.headers_mut().insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    }

    request
}
