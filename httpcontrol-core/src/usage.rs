use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Tracks bytes read off a connection so the retry policy can tell
/// whether any response byte arrived before an attempt failed.
#[derive(Clone, Default)]
pub(crate) struct IoUsageTracker {
    received: Arc<AtomicU64>,
}

impl IoUsageTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn wrap_stream<I>(&self, stream: I) -> RecordStream<I> {
        RecordStream { inner: stream, usage: self.clone() }
    }

    pub(crate) fn get_received_count(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }
}

pin_project! {
    pub(crate) struct RecordStream<I> {
        #[pin]
        inner: I,
        usage: IoUsageTracker,
    }
}

impl<I: AsyncRead> AsyncRead for RecordStream<I> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        let poll_result = this.inner.poll_read(cx, buf);
        let after = buf.filled().len();

        this.usage
            .received
            .fetch_add((after - before) as u64, Ordering::SeqCst);

        poll_result
    }
}

impl<I: AsyncWrite> AsyncWrite for RecordStream<I> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}
