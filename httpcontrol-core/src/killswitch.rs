use std::net::{Shutdown, TcpStream as StdTcpStream};
use std::sync::{Arc, Mutex};

/// A handle that can force-close the TCP socket backing the current
/// attempt's connection from a task other than the one reading or
/// writing it, unblocking whatever I/O is pending inside the wrapped
/// transport.
///
/// Every clone shares the same underlying socket handle, so closing
/// from any clone closes it for all of them. Closing twice — from two
/// racing timers, or a timer racing a normal completion — is a no-op
/// the second time: the first `close` wins, the rest see an empty
/// slot and do nothing.
#[derive(Clone, Default)]
pub(crate) struct KillSwitch {
    inner: Arc<Mutex<Option<StdTcpStream>>>,
}

impl KillSwitch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers the socket this switch should close. Called once by
    /// the dialer right after the connection is established, before
    /// the connection is handed off for use.
    pub(crate) fn bind(&self, raw: StdTcpStream) {
        *self.inner.lock().expect("killswitch poisoned") = Some(raw);
    }

    /// Forcibly closes the bound socket, if any and if not already
    /// closed. Safe to call from any thread, any number of times.
    pub(crate) fn close(&self) {
        if let Some(sock) = self.inner.lock().expect("killswitch poisoned").take() {
            let _ = sock.shutdown(Shutdown::Both);
        }
    }

    #[cfg(test)]
    pub(crate) fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}
