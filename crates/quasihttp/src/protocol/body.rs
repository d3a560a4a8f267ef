use std::fmt;
use std::io::Cursor;

use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::protocol::BodySize;

/// A boxed byte-stream producer used for request and response bodies.
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// A quasi-http message body.
///
/// The actual length of a body is communicated out of band via the lead
/// chunk's content-length sentinel; a `Stream` body therefore carries the
/// declared length alongside its reader. Ownership of the reader transfers to
/// whichever adapter wraps it for transmission, and dropping the body releases
/// any resources tied to it.
pub enum Body {
    /// No body
    Empty,
    /// A body fully held in memory
    Full(Bytes),
    /// A live byte stream with a declared content length
    /// (negative = unknown length, chunk-encoded on the wire)
    Stream { reader: BodyReader, content_length: i64 },
}

impl Body {
    pub fn empty() -> Self {
        Body::Empty
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() { Body::Empty } else { Body::Full(bytes) }
    }

    pub fn from_reader(reader: BodyReader, content_length: i64) -> Self {
        Body::Stream { reader, content_length }
    }

    /// Classifies this body for wire transfer.
    pub fn size(&self) -> BodySize {
        match self {
            Body::Empty => BodySize::Empty,
            Body::Full(bytes) => BodySize::from_content_length(bytes.len() as i64),
            Body::Stream { content_length, .. } => BodySize::from_content_length(*content_length),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// Consumes the body, yielding a reader over its bytes.
    ///
    /// Returns `None` for an empty body.
    pub fn into_reader(self) -> Option<BodyReader> {
        match self {
            Body::Empty => None,
            Body::Full(bytes) => Some(Box::new(Cursor::new(bytes))),
            Body::Stream { reader, .. } => Some(reader),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::Empty
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Full(bytes) => f.debug_tuple("Body::Full").field(&bytes.len()).finish(),
            Body::Stream { content_length, .. } => {
                f.debug_struct("Body::Stream").field("content_length", content_length).finish()
            }
        }
    }
}
