//! Ceiling enforcement for otherwise unbounded body streams.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

use crate::protocol::QuasiHttpError;

pin_project! {
    /// A reader that fails with `BodyTooLarge` once its source would deliver
    /// more than a configured number of bytes, instead of returning the
    /// excess.
    #[derive(Debug)]
    pub struct MaxLengthEnforcingReader<R> {
        #[pin]
        inner: R,
        max: u64,
        delivered: u64,
    }
}

impl<R> MaxLengthEnforcingReader<R> {
    pub fn new(inner: R, max: u64) -> Self {
        Self { inner, max, delivered: 0 }
    }
}

impl<R: AsyncRead> AsyncRead for MaxLengthEnforcingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        // read at most one byte past the ceiling so an overrun is detected
        // without consuming arbitrarily far beyond it
        let allowed = this.max.saturating_sub(*this.delivered).saturating_add(1);
        let take = allowed.min(buf.remaining() as u64) as usize;
        let mut limited = buf.take(take);
        ready!(this.inner.poll_read(cx, &mut limited))?;
        let n = limited.filled().len();
        if n == 0 {
            return Poll::Ready(Ok(()));
        }
        if *this.delivered + n as u64 > *this.max {
            return Poll::Ready(Err(QuasiHttpError::BodyTooLarge { max_size: *this.max }.into_io()));
        }

        // SAFETY: the inner reader initialized `n` bytes through the limited
        // view, which shares its memory with `buf`.
        unsafe { buf.assume_init(n) };
        buf.advance(n);
        *this.delivered += n as u64;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_under_limit_passes() {
        let mut reader = MaxLengthEnforcingReader::new(Cursor::new(b"abcdef".to_vec()), 16);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abcdef");
    }

    #[tokio::test]
    async fn test_at_limit_passes() {
        let mut reader = MaxLengthEnforcingReader::new(Cursor::new(b"abcdef".to_vec()), 6);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abcdef");
    }

    #[tokio::test]
    async fn test_over_limit_fails() {
        let mut reader = MaxLengthEnforcingReader::new(Cursor::new(b"abcdefg".to_vec()), 6);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert!(matches!(
            QuasiHttpError::from_io(err),
            QuasiHttpError::BodyTooLarge { max_size: 6 }
        ));
    }
}
