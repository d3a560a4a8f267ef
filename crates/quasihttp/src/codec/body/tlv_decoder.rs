//! Decoder for TLV-framed body chunk sequences.
//!
//! An unknown-length body travels as a run of TLV records sharing one tag,
//! terminated by a zero-length record with that same tag. The decoder yields
//! the value bytes of each record as they arrive and a single `Eof` once the
//! terminator is seen; records carrying a configured tag-to-ignore are
//! skipped wholesale.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::framing::{decode_length, decode_tag};
use crate::ensure;
use crate::protocol::{PayloadItem, QuasiHttpError};

const RECORD_HEADER_LEN: usize = 8;

/// A decoder for a terminated sequence of TLV records with a fixed tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvDecoder {
    expected_tag: u32,
    ignored_tag: Option<u32>,
    max_value_length: usize,
    state: TlvState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TlvState {
    /// Waiting for the 8 bytes of the next record header
    Header,
    /// Delivering the value bytes of the current record
    Value { remaining: usize },
    /// Discarding the value bytes of an ignored record
    Skip { remaining: usize },
    /// Terminator seen, `Eof` not yet emitted
    End,
    /// `Eof` emitted; the logical stream is over
    Terminated,
}

impl TlvDecoder {
    /// Creates a decoder expecting records tagged `expected_tag`, each with a
    /// value no longer than `max_value_length`.
    pub fn new(expected_tag: u32, max_value_length: usize) -> Self {
        Self { expected_tag, ignored_tag: None, max_value_length, state: TlvState::Header }
    }

    /// Additionally skip any record carrying `tag` instead of failing on it.
    pub fn with_ignored_tag(mut self, tag: u32) -> Self {
        self.set_ignored_tag(tag);
        self
    }

    /// See [`Self::with_ignored_tag`].
    pub fn set_ignored_tag(&mut self, tag: u32) {
        self.ignored_tag = Some(tag);
    }

    /// Whether the terminating zero-length record has been consumed.
    pub fn is_terminated(&self) -> bool {
        matches!(self.state, TlvState::End | TlvState::Terminated)
    }
}

impl Decoder for TlvDecoder {
    type Item = PayloadItem;
    type Error = QuasiHttpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                TlvState::Header => {
                    if src.len() < RECORD_HEADER_LEN {
                        return Ok(None);
                    }
                    let tag = decode_tag(&src[..4])?;
                    let length = decode_length(&src[4..8])? as usize;
                    src.advance(RECORD_HEADER_LEN);

                    if self.ignored_tag == Some(tag) {
                        trace!(tag, length, "skipping ignored record");
                        self.state = TlvState::Skip { remaining: length };
                        continue;
                    }
                    ensure!(
                        tag == self.expected_tag,
                        QuasiHttpError::protocol_violation(format!(
                            "unexpected tag: {tag:#x}, expected {:#x}",
                            self.expected_tag
                        ))
                    );
                    ensure!(
                        length <= self.max_value_length,
                        QuasiHttpError::message_too_large(length, self.max_value_length)
                    );
                    if length == 0 {
                        trace!("read terminating record");
                        self.state = TlvState::End;
                        continue;
                    }
                    self.state = TlvState::Value { remaining: length };
                }

                TlvState::Value { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let take = remaining.min(src.len());
                    let bytes = src.split_to(take).freeze();
                    self.state = if take == remaining {
                        TlvState::Header
                    } else {
                        TlvState::Value { remaining: remaining - take }
                    };
                    trace!(len = bytes.len(), "read record bytes");
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                TlvState::Skip { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let take = remaining.min(src.len());
                    src.advance(take);
                    self.state = if take == remaining {
                        TlvState::Header
                    } else {
                        TlvState::Skip { remaining: remaining - take }
                    };
                }

                TlvState::End => {
                    self.state = TlvState::Terminated;
                    return Ok(Some(PayloadItem::Eof));
                }

                TlvState::Terminated => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        match self.state {
            TlvState::Terminated => Ok(None),
            // end of stream before the terminating record
            _ => Err(QuasiHttpError::UnexpectedEndOfInput),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::framing::{encode_tag_length, TAG_BODY, TAG_HEADERS};

    fn record(tag: u32, value: &[u8]) -> Vec<u8> {
        let mut out = encode_tag_length(tag, value.len() as u32).unwrap().to_vec();
        out.extend_from_slice(value);
        out
    }

    #[test]
    fn test_basic() {
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&record(TAG_BODY, b"hello"));
        buffer.extend_from_slice(&record(TAG_BODY, b""));

        let mut decoder = TlvDecoder::new(TAG_BODY, 8192);

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(item.as_bytes().unwrap().as_ref(), b"hello");

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(item.is_eof());
        assert!(decoder.is_terminated());

        assert!(decoder.decode(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut wire = record(TAG_BODY, b"ab");
        wire.extend_from_slice(&record(TAG_BODY, b""));

        let mut decoder = TlvDecoder::new(TAG_BODY, 8192);
        let mut buffer = BytesMut::new();
        let mut collected = Vec::new();
        let mut saw_eof = false;

        for byte in wire {
            buffer.extend_from_slice(&[byte]);
            while let Some(item) = decoder.decode(&mut buffer).unwrap() {
                match item {
                    PayloadItem::Chunk(bytes) => collected.extend_from_slice(&bytes),
                    PayloadItem::Eof => {
                        saw_eof = true;
                        break;
                    }
                }
            }
        }
        assert_eq!(collected, b"ab");
        assert!(saw_eof);
    }

    #[test]
    fn test_unexpected_tag() {
        let mut buffer = BytesMut::from(&record(TAG_HEADERS, b"oops")[..]);
        let mut decoder = TlvDecoder::new(TAG_BODY, 8192);
        assert!(matches!(
            decoder.decode(&mut buffer),
            Err(QuasiHttpError::ProtocolViolation { .. })
        ));
    }

    #[test]
    fn test_ignored_tag_skipped() {
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&record(TAG_HEADERS, b"meta"));
        buffer.extend_from_slice(&record(TAG_BODY, b"data"));
        buffer.extend_from_slice(&record(TAG_BODY, b""));

        let mut decoder = TlvDecoder::new(TAG_BODY, 8192).with_ignored_tag(TAG_HEADERS);

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(item.as_bytes().unwrap().as_ref(), b"data");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_over_limit_record() {
        let mut buffer = BytesMut::from(&record(TAG_BODY, &[b'x'; 64])[..]);
        let mut decoder = TlvDecoder::new(TAG_BODY, 16);
        assert!(matches!(
            decoder.decode(&mut buffer),
            Err(QuasiHttpError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_eof_before_terminator() {
        let mut buffer = BytesMut::from(&record(TAG_BODY, b"partial")[..]);
        let mut decoder = TlvDecoder::new(TAG_BODY, 8192);

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(item.as_bytes().unwrap().as_ref(), b"partial");

        assert!(matches!(
            decoder.decode_eof(&mut buffer),
            Err(QuasiHttpError::UnexpectedEndOfInput)
        ));
    }

    #[test]
    fn test_negative_length_record() {
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&TAG_BODY.to_be_bytes());
        buffer.extend_from_slice(&0x8000_0000u32.to_be_bytes());
        let mut decoder = TlvDecoder::new(TAG_BODY, 8192);
        assert!(matches!(decoder.decode(&mut buffer), Err(QuasiHttpError::InvalidFrame { .. })));
    }
}
