//! Byte-stream view over a TLV-framed body chunk sequence.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Buf, Bytes};
use futures::Stream;
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::codec::FramedRead;
use tracing::trace;

use crate::codec::body::TlvDecoder;
use crate::codec::framing::HARD_MAX_CHUNK_SIZE_LIMIT;
use crate::protocol::{PayloadItem, QuasiHttpError};

pin_project! {
    /// A reader exposing the concatenated value bytes of a terminated TLV
    /// record sequence as one logical byte stream.
    ///
    /// Once the terminating zero-length record has been observed, all
    /// subsequent reads report end of stream without touching the source.
    #[derive(Debug)]
    pub struct ChunkDecodingReader<R> {
        #[pin]
        frames: FramedRead<R, TlvDecoder>,
        current: Bytes,
        done: bool,
    }
}

impl<R: AsyncRead> ChunkDecodingReader<R> {
    /// Creates a decoding reader over `reader` for records tagged `tag`.
    ///
    /// Declared record lengths are capped at the larger of `max_chunk_size`
    /// and the hard limit, so peers using bigger chunks than ours still
    /// decode.
    pub fn new(reader: R, tag: u32, max_chunk_size: usize) -> Self {
        let ceiling = max_chunk_size.max(HARD_MAX_CHUNK_SIZE_LIMIT);
        Self {
            frames: FramedRead::new(reader, TlvDecoder::new(tag, ceiling)),
            current: Bytes::new(),
            done: false,
        }
    }

    /// Additionally skip records carrying `tag` instead of failing on them.
    pub fn with_ignored_tag(mut self, tag: u32) -> Self {
        self.frames.decoder_mut().set_ignored_tag(tag);
        self
    }
}

impl<R: AsyncRead> AsyncRead for ChunkDecodingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut this = self.project();
        loop {
            if *this.done {
                return Poll::Ready(Ok(()));
            }
            if !this.current.is_empty() {
                let n = buf.remaining().min(this.current.len());
                buf.put_slice(&this.current[..n]);
                this.current.advance(n);
                return Poll::Ready(Ok(()));
            }
            if buf.remaining() == 0 {
                return Poll::Ready(Ok(()));
            }
            match ready!(this.frames.as_mut().poll_next(cx)) {
                Some(Ok(PayloadItem::Chunk(bytes))) => *this.current = bytes,
                Some(Ok(PayloadItem::Eof)) => {
                    trace!("finished reading chunked body");
                    *this.done = true;
                    return Poll::Ready(Ok(()));
                }
                Some(Err(e)) => return Poll::Ready(Err(e.into_io())),
                None => {
                    return Poll::Ready(Err(QuasiHttpError::UnexpectedEndOfInput.into_io()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::framing::{encode_tag_length, TAG_BODY, TAG_HEADERS};
    use std::io::Cursor;
    use tokio::io::AsyncReadExt;

    fn record(tag: u32, value: &[u8]) -> Vec<u8> {
        let mut out = encode_tag_length(tag, value.len() as u32).unwrap().to_vec();
        out.extend_from_slice(value);
        out
    }

    #[tokio::test]
    async fn test_multi_record_body() {
        let mut wire = record(TAG_BODY, b"hello");
        wire.extend_from_slice(&record(TAG_BODY, b", w"));
        wire.extend_from_slice(&record(TAG_BODY, b"orld"));
        wire.extend_from_slice(&record(TAG_BODY, b""));

        let mut reader = ChunkDecodingReader::new(Cursor::new(wire), TAG_BODY, 8192);
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello, world");
    }

    #[tokio::test]
    async fn test_empty_body() {
        let wire = record(TAG_BODY, b"");
        let mut reader = ChunkDecodingReader::new(Cursor::new(wire), TAG_BODY, 8192);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_missing_terminator_fails() {
        let wire = record(TAG_BODY, b"dangling");
        let mut reader = ChunkDecodingReader::new(Cursor::new(wire), TAG_BODY, 8192);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert!(matches!(QuasiHttpError::from_io(err), QuasiHttpError::UnexpectedEndOfInput));
    }

    #[tokio::test]
    async fn test_wrong_tag_fails() {
        let wire = record(TAG_HEADERS, b"nope");
        let mut reader = ChunkDecodingReader::new(Cursor::new(wire), TAG_BODY, 8192);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert!(matches!(QuasiHttpError::from_io(err), QuasiHttpError::ProtocolViolation { .. }));
    }

    #[tokio::test]
    async fn test_byte_at_a_time_reads() {
        let mut wire = record(TAG_BODY, b"ab");
        wire.extend_from_slice(&record(TAG_BODY, b""));

        let mut reader = ChunkDecodingReader::new(Cursor::new(wire), TAG_BODY, 8192);
        let mut collected = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            let n = reader.read(&mut byte).await.unwrap();
            if n == 0 {
                break;
            }
            collected.push(byte[0]);
        }
        assert_eq!(collected, b"ab");
    }
}
