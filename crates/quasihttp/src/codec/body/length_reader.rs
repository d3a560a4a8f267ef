//! Content-length enforcement for body streams.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

use crate::protocol::QuasiHttpError;

pin_project! {
    /// A reader delivering exactly the declared number of bytes from its
    /// source.
    ///
    /// Each read returns at most `min(requested, remaining)` bytes. Once the
    /// declared count has been delivered, further reads report end of stream
    /// without touching the source; if the source ends early the reader fails
    /// with `ContentLengthNotSatisfied`. Constructing with a negative length
    /// disables enforcement and passes reads straight through.
    #[derive(Debug)]
    pub struct LengthEnforcingReader<R> {
        #[pin]
        inner: R,
        expected: Option<u64>,
        received: u64,
    }
}

impl<R> LengthEnforcingReader<R> {
    pub fn new(inner: R, content_length: i64) -> Self {
        let expected = u64::try_from(content_length).ok();
        Self { inner, expected, received: 0 }
    }

    /// Bytes delivered so far.
    pub fn received(&self) -> u64 {
        self.received
    }
}

impl<R: AsyncRead> AsyncRead for LengthEnforcingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let Some(expected) = *this.expected else {
            return this.inner.poll_read(cx, buf);
        };

        let remaining = expected - *this.received;
        if remaining == 0 || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let take = remaining.min(buf.remaining() as u64) as usize;
        let mut limited = buf.take(take);
        ready!(this.inner.poll_read(cx, &mut limited))?;
        let n = limited.filled().len();
        if n == 0 {
            return Poll::Ready(Err(QuasiHttpError::ContentLengthNotSatisfied {
                expected,
                received: *this.received,
            }
            .into_io()));
        }

        // SAFETY: the inner reader initialized `n` bytes through the limited
        // view, which shares its memory with `buf`.
        unsafe { buf.assume_init(n) };
        buf.advance(n);
        *this.received += n as u64;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_exact_length_succeeds() {
        let mut reader = LengthEnforcingReader::new(Cursor::new(b"hello world".to_vec()), 5);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");

        // at the boundary, reads no longer touch the source
        let mut byte = [0u8; 1];
        assert_eq!(reader.read(&mut byte).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_short_source_fails() {
        let mut reader = LengthEnforcingReader::new(Cursor::new(b"abc".to_vec()), 10);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        match QuasiHttpError::from_io(err) {
            QuasiHttpError::ContentLengthNotSatisfied { expected, received } => {
                assert_eq!(expected, 10);
                assert_eq!(received, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_zero_length_is_immediate_eof() {
        struct NeverRead;
        impl AsyncRead for NeverRead {
            fn poll_read(
                self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
                _buf: &mut ReadBuf<'_>,
            ) -> Poll<io::Result<()>> {
                panic!("source must not be read");
            }
        }

        let mut reader = LengthEnforcingReader::new(NeverRead, 0);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_negative_length_passes_through() {
        let mut reader = LengthEnforcingReader::new(Cursor::new(b"anything".to_vec()), -1);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"anything");
    }

    #[tokio::test]
    async fn test_byte_at_a_time() {
        let mut reader = LengthEnforcingReader::new(Cursor::new(b"xyz!".to_vec()), 3);
        let mut collected = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            let n = reader.read(&mut byte).await.unwrap();
            if n == 0 {
                break;
            }
            collected.push(byte[0]);
        }
        assert_eq!(collected, b"xyz");
    }
}
