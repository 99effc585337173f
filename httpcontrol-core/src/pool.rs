use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use hyper::body::{Bytes, HttpBody};
use hyper::{Body, HeaderMap};
use pin_project_lite::pin_project;

use crate::conn::Connection;
use crate::killswitch::KillSwitch;
use crate::timeout::Timer;

/// Identifies a host a connection can be reused for: scheme
/// discriminant folded into the string so http and https to the same
/// host/port never share a slot.
#[derive(Clone, Hash, Eq, PartialEq)]
pub(crate) struct PoolKey(String);

impl PoolKey {
    pub(crate) fn new(is_https: bool, host: &str, port: u16) -> Self {
        let scheme = if is_https { "https" } else { "http" };
        Self(format!("{scheme}://{host}:{port}"))
    }
}

/// The idle-connection pool backing the wrapped transport. A
/// connection is checked out for the duration of exactly one attempt
/// and never shared across attempts.
#[derive(Clone)]
pub(crate) struct ConnPool {
    idle: Arc<Mutex<HashMap<PoolKey, Vec<Connection>>>>,
    max_idle_per_host: usize,
}

impl ConnPool {
    pub(crate) fn new(max_idle_per_host: usize) -> Self {
        Self { idle: Arc::new(Mutex::new(HashMap::new())), max_idle_per_host }
    }

    /// Takes an idle, still-reusable connection for `key`, if any.
    pub(crate) fn checkout(&self, key: &PoolKey) -> Option<Connection> {
        let mut idle = self.idle.lock().expect("pool poisoned");
        let bucket = idle.get_mut(key)?;
        while let Some(mut conn) = bucket.pop() {
            if conn.is_reusable() {
                return Some(conn);
            }
            // Stale: dropped here, closing its socket.
        }
        None
    }

    /// Returns a connection to the pool for future reuse, subject to
    /// the per-host idle cap. Over the cap, the connection is simply
    /// dropped, closing it.
    pub(crate) fn checkin(&self, key: PoolKey, conn: Connection) {
        let mut idle = self.idle.lock().expect("pool poisoned");
        let bucket = idle.entry(key).or_default();
        if bucket.len() < self.max_idle_per_host {
            bucket.push(conn);
        }
    }

    /// Closes every idle connection. Idempotent: calling it again
    /// just finds nothing left to close.
    pub(crate) fn close_idle(&self) {
        self.idle.lock().expect("pool poisoned").clear();
    }
}

/// The response body handed to the caller on a successful attempt.
///
/// Keeps the whole-request timer armed and the connection's kill
/// switch alive until the body is fully read (EOF) or dropped — this
/// is the scope of the request timer. On EOF the
/// connection is returned to the pool if still reusable; on early
/// drop or any other ending it is closed instead.
pin_project! {
    pub struct TimedBody {
        #[pin]
        inner: Body,
        guard: Option<BodyGuard>,
    }

    impl PinnedDrop for TimedBody {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Some(guard) = this.guard.take() {
                guard.finish(false);
            }
        }
    }
}

impl std::fmt::Debug for TimedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedBody").finish_non_exhaustive()
    }
}

struct BodyGuard {
    timer: Option<Timer>,
    kill: KillSwitch,
    conn: Connection,
    pool: ConnPool,
    key: PoolKey,
    keep_alive: bool,
}

impl BodyGuard {
    fn finish(mut self, reached_eof: bool) {
        if let Some(timer) = self.timer {
            timer.disarm();
        }

        if reached_eof && self.keep_alive && self.conn.is_reusable() {
            self.pool.checkin(self.key, self.conn);
        } else {
            // Either abandoned early or not eligible for reuse.
            // Closing is redundant with `conn`'s Drop (which aborts
            // the driver task and closes the socket) but kept
            // explicit so the switch's state matches reality even if
            // the driver task hasn't been scheduled to run yet.
            self.kill.close();
        }
    }
}

impl TimedBody {
    pub(crate) fn new(
        inner: Body,
        timer: Option<Timer>,
        kill: KillSwitch,
        conn: Connection,
        pool: ConnPool,
        key: PoolKey,
        keep_alive: bool,
    ) -> Self {
        Self { inner, guard: Some(BodyGuard { timer, kill, conn, pool, key, keep_alive }) }
    }
}

impl HttpBody for TimedBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_data(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        let this = self.project();
        let poll = this.inner.poll_data(cx);

        if let Poll::Ready(None) = &poll {
            if let Some(guard) = this.guard.take() {
                guard.finish(true);
            }
        }

        poll
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<HeaderMap>, Self::Error>> {
        self.project().inner.poll_trailers(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener as StdTcpListener;

    use crate::conn::{Connection, Scheme};

    use super::*;

    #[tokio::test]
    async fn dropping_an_unread_body_releases_the_kill_switch() {
        let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc");
            }
        });

        let conn = Connection::establish(addr, &Scheme::Http, "example.invalid", None)
            .await
            .expect("connect to the local listener");

        let kill = conn.kill.clone();

        let body = TimedBody::new(
            Body::empty(),
            None,
            conn.kill.clone(),
            conn,
            ConnPool::new(1),
            PoolKey::new(false, "example.invalid", 80),
            true,
        );
        drop(body);

        assert_eq!(
            kill.strong_count(),
            1,
            "the body's drop should release every clone it held (its own plus the connection's), not just close the socket"
        );
    }
}
