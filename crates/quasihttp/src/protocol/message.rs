use bytes::Bytes;

/// Represents an item in a quasi-http body payload stream.
///
/// This enum is produced by the TLV body decoder and consumed by the TLV body
/// encoder, carrying either a chunk of value bytes or the end-of-body marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    /// A chunk of payload data
    Chunk(Bytes),
    /// Marks the end of the payload stream
    Eof,
}

impl PayloadItem {
    /// Returns true if this item represents the end of the payload stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    /// Returns a reference to the contained bytes if this is a Chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    /// Consumes the item and returns the contained bytes if this is a Chunk
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

/// Classifies how a body is carried on the wire.
///
/// Quasi-http communicates body sizes through a signed content-length
/// sentinel: `0` means no body, a positive value means exactly that many raw
/// bytes, and a negative value means a chunk-encoded body of unknown length.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodySize {
    /// No body at all
    Empty,
    /// Body with a known exact length in bytes
    Length(u64),
    /// Body of unknown length, carried as a terminated TLV chunk sequence
    Unbounded,
}

impl BodySize {
    /// Maps a wire-level content-length sentinel to a body classification.
    pub fn from_content_length(value: i64) -> Self {
        match value {
            0 => BodySize::Empty,
            n if n > 0 => BodySize::Length(n as u64),
            _ => BodySize::Unbounded,
        }
    }

    /// Maps back to the wire-level content-length sentinel.
    pub fn to_content_length(self) -> i64 {
        match self {
            BodySize::Empty => 0,
            BodySize::Length(n) => n as i64,
            BodySize::Unbounded => -1,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, BodySize::Empty)
    }

    #[inline]
    pub fn is_unbounded(&self) -> bool {
        matches!(self, BodySize::Unbounded)
    }
}
