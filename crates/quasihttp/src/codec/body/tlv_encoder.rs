//! Encoder for TLV-framed body chunk sequences.

use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::framing::encode_tag_length;
use crate::ensure;
use crate::protocol::{PayloadItem, QuasiHttpError};

/// An encoder framing each payload chunk as one TLV record with a fixed tag.
///
/// `Eof` emits the terminating zero-length record and poisons the encoder for
/// further data writes; encoding `Eof` again is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvEncoder {
    tag: u32,
    eof: bool,
}

impl TlvEncoder {
    pub fn new(tag: u32) -> Self {
        Self { tag, eof: false }
    }

    /// Whether the terminating record has been written.
    pub fn is_finished(&self) -> bool {
        self.eof
    }
}

impl Encoder<PayloadItem> for TlvEncoder {
    type Error = QuasiHttpError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                ensure!(
                    !self.eof,
                    QuasiHttpError::protocol_violation("write after terminating record")
                );
                // a zero-length ordinary write must not be mistaken for the terminator
                if bytes.is_empty() {
                    return Ok(());
                }
                let length = u32::try_from(bytes.len())
                    .map_err(|_| QuasiHttpError::invalid_frame("record value too long"))?;
                let header = encode_tag_length(self.tag, length)?;
                dst.reserve(header.len() + bytes.len());
                dst.extend_from_slice(&header);
                dst.extend_from_slice(&bytes);
                trace!(len = bytes.len(), "wrote record");
                Ok(())
            }
            PayloadItem::Eof => {
                if !self.eof {
                    self.eof = true;
                    dst.extend_from_slice(&encode_tag_length(self.tag, 0)?);
                    trace!("wrote terminating record");
                }
                Ok(())
            }
        }
    }
}
