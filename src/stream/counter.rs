use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use futures::io::{AsyncBufRead, AsyncRead, AsyncWrite};

/// Counts the bytes flowing through the inner stream in both directions,
/// to trigger a re-key once enough data was exchanged under the same keys.
pub struct IoCounter<C> {
    inner: C,
    count: usize,
}

impl<C> IoCounter<C> {
    pub fn new(inner: C) -> Self {
        Self { inner, count: 0 }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

impl<C: AsyncRead + Unpin> AsyncRead for IoCounter<C> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);

        if let Poll::Ready(Ok(bytes)) = poll {
            self.count = self.count.saturating_add(bytes);
        }

        poll
    }
}

impl<C: AsyncBufRead + Unpin> AsyncBufRead for IoCounter<C> {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().inner).poll_fill_buf(cx)
    }

    fn consume(mut self: Pin<&mut Self>, amt: usize) {
        self.count = self.count.saturating_add(amt);

        Pin::new(&mut self.inner).consume(amt)
    }
}

impl<C: AsyncWrite + Unpin> AsyncWrite for IoCounter<C> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);

        if let Poll::Ready(Ok(bytes)) = poll {
            self.count = self.count.saturating_add(bytes);
        }

        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_close(cx)
    }
}
