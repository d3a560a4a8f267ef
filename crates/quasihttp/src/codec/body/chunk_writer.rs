//! Chunk-encoding write path for unknown-length bodies.

use std::fmt;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Buf, BytesMut};
use tokio::io::AsyncWrite;
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::body::TlvEncoder;
use crate::protocol::{PayloadItem, QuasiHttpError};

/// A writer framing everything written through it as a TLV record sequence.
///
/// Writes are buffered up to the configured chunk size before being flushed
/// as one header-plus-value record; an explicit [`finish`](Self::finish) (or a
/// shutdown) flushes the buffered remainder and writes the terminating
/// zero-length record. A plain flush also forces out whatever is buffered, as
/// a smaller record. Requires `W: Unpin` since the write halves it decorates
/// are boxed or owned halves anyway.
pub struct ChunkEncodingWriter<W> {
    inner: W,
    encoder: TlvEncoder,
    pending: BytesMut,
    out: BytesMut,
    max_chunk_size: usize,
    finished: bool,
}

impl<W: AsyncWrite + Unpin> ChunkEncodingWriter<W> {
    pub fn new(inner: W, tag: u32, max_chunk_size: usize) -> Self {
        Self {
            inner,
            encoder: TlvEncoder::new(tag),
            pending: BytesMut::new(),
            out: BytesMut::new(),
            max_chunk_size: max_chunk_size.max(1),
            finished: false,
        }
    }

    /// Flushes any buffered remainder, writes the terminating record, flushes
    /// the inner writer and hands it back without shutting it down.
    pub async fn finish(mut self) -> io::Result<W> {
        poll_fn(|cx| self.poll_finish(cx)).await?;
        trace!("finished chunked body");
        Ok(self.inner)
    }

    fn stage_pending(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let chunk = self.pending.split().freeze();
            self.encoder
                .encode(PayloadItem::Chunk(chunk), &mut self.out)
                .map_err(QuasiHttpError::into_io)?;
        }
        Ok(())
    }

    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.out.is_empty() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.out))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.out.advance(n);
        }
        Poll::Ready(Ok(()))
    }

    fn poll_finish(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if !self.finished {
            self.stage_pending()?;
            self.encoder
                .encode(PayloadItem::Eof, &mut self.out)
                .map_err(QuasiHttpError::into_io)?;
            self.finished = true;
        }
        ready!(self.poll_drain(cx))?;
        Pin::new(&mut self.inner).poll_flush(cx)
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ChunkEncodingWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(Err(io::Error::other(
                QuasiHttpError::protocol_violation("write after terminating record"),
            )));
        }
        ready!(this.poll_drain(cx))?;
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let room = this.max_chunk_size - this.pending.len();
        let n = room.min(buf.len());
        this.pending.extend_from_slice(&buf[..n]);
        if this.pending.len() >= this.max_chunk_size {
            this.stage_pending()?;
        }
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.stage_pending()?;
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_finish(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

impl<W> fmt::Debug for ChunkEncodingWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkEncodingWriter")
            .field("pending", &self.pending.len())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::body::ChunkDecodingReader;
    use crate::codec::framing::TAG_BODY;
    use std::io::Cursor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn round_trip(input: &[u8], max_chunk_size: usize) -> Vec<u8> {
        let mut writer = ChunkEncodingWriter::new(Vec::new(), TAG_BODY, max_chunk_size);
        writer.write_all(input).await.unwrap();
        let wire = writer.finish().await.unwrap();

        let mut reader = ChunkDecodingReader::new(Cursor::new(wire), TAG_BODY, max_chunk_size);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_round_trip_empty() {
        assert!(round_trip(b"", 16).await.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_single_byte() {
        assert_eq!(round_trip(b"z", 16).await, b"z");
    }

    #[tokio::test]
    async fn test_round_trip_multiple_chunks() {
        let input: Vec<u8> = (0..100u8).collect();
        assert_eq!(round_trip(&input, 16).await, input);
    }

    #[tokio::test]
    async fn test_empty_body_is_just_terminator() {
        let writer = ChunkEncodingWriter::new(Vec::new(), TAG_BODY, 16);
        let wire = writer.finish().await.unwrap();

        let mut expected = TAG_BODY.to_be_bytes().to_vec();
        expected.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(wire, expected);
    }

    #[tokio::test]
    async fn test_buffers_up_to_chunk_size() {
        let mut writer = ChunkEncodingWriter::new(Vec::new(), TAG_BODY, 4);
        writer.write_all(b"abcdefghij").await.unwrap();
        let wire = writer.finish().await.unwrap();

        // 4 + 4 + 2 data records plus the terminator
        let mut expected = Vec::new();
        for chunk in [&b"abcd"[..], &b"efgh"[..], &b"ij"[..], &b""[..]] {
            expected.extend_from_slice(&TAG_BODY.to_be_bytes());
            expected.extend_from_slice(&(chunk.len() as u32).to_be_bytes());
            expected.extend_from_slice(chunk);
        }
        assert_eq!(wire, expected);
    }

    #[tokio::test]
    async fn test_flush_emits_partial_chunk() {
        let mut writer = ChunkEncodingWriter::new(Vec::new(), TAG_BODY, 1024);
        writer.write_all(b"abc").await.unwrap();
        writer.flush().await.unwrap();

        let mut expected = TAG_BODY.to_be_bytes().to_vec();
        expected.extend_from_slice(&3u32.to_be_bytes());
        expected.extend_from_slice(b"abc");
        assert_eq!(writer.inner, expected);
    }

    #[tokio::test]
    async fn test_write_after_shutdown_fails() {
        let mut writer = ChunkEncodingWriter::new(Vec::new(), TAG_BODY, 16);
        writer.shutdown().await.unwrap();
        assert!(writer.write_all(b"late").await.is_err());
    }

    #[tokio::test]
    async fn test_zero_length_write_is_not_a_terminator() {
        let mut writer = ChunkEncodingWriter::new(Vec::new(), TAG_BODY, 16);
        writer.write_all(b"").await.unwrap();
        writer.flush().await.unwrap();
        assert!(writer.inner.is_empty());
    }
}
