//! Reading and writing lead chunks over a connection.
//!
//! A lead chunk occupies exactly one TLV record with [`TAG_HEADERS`]. A clean
//! end of stream before the first header byte means the peer sent no lead
//! chunk at all; the caller decides whether that is acceptable. End of stream
//! anywhere inside the record is an error.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::codec::framing::{decode_length, decode_tag, encode_tag_length, TAG_HEADERS};
use crate::codec::headers::{decode_lead_chunk, encode_lead_chunk, LeadKind};
use crate::ensure;
use crate::protocol::{LeadChunk, QuasiHttpError};

/// Serializes `lead` and writes it framed to `writer`, flushing afterwards.
pub async fn write_lead_chunk<W>(
    writer: &mut W,
    lead: &LeadChunk,
    kind: LeadKind,
    max_size: usize,
) -> Result<(), QuasiHttpError>
where
    W: AsyncWrite + Unpin,
{
    let block = encode_lead_chunk(lead, kind, max_size)?;
    let header = encode_tag_length(TAG_HEADERS, block.len() as u32)?;
    writer.write_all(&header).await.map_err(QuasiHttpError::io)?;
    writer.write_all(&block).await.map_err(QuasiHttpError::io)?;
    writer.flush().await.map_err(QuasiHttpError::io)?;
    trace!(len = block.len(), "wrote lead chunk");
    Ok(())
}

/// Reads one framed lead chunk from `reader`.
///
/// Returns `Ok(None)` when the stream ends cleanly before the first byte.
pub async fn read_lead_chunk<R>(
    reader: &mut R,
    kind: LeadKind,
    max_size: usize,
) -> Result<Option<LeadChunk>, QuasiHttpError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 8];
    let mut filled = 0;
    while filled < header.len() {
        let n = reader.read(&mut header[filled..]).await.map_err(QuasiHttpError::from_io)?;
        if n == 0 {
            if filled == 0 {
                trace!("stream ended before a lead chunk");
                return Ok(None);
            }
            return Err(QuasiHttpError::UnexpectedEndOfInput);
        }
        filled += n;
    }

    let tag = decode_tag(&header[..4])?;
    ensure!(
        tag == TAG_HEADERS,
        QuasiHttpError::protocol_violation(format!("unexpected tag: {tag:#x}"))
    );
    let length = decode_length(&header[4..])? as usize;
    ensure!(length > 0, QuasiHttpError::protocol_violation("empty lead chunk record"));
    ensure!(length <= max_size, QuasiHttpError::message_too_large(length, max_size));

    let mut block = vec![0u8; length];
    reader.read_exact(&mut block).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            QuasiHttpError::UnexpectedEndOfInput
        } else {
            QuasiHttpError::from_io(e)
        }
    })?;
    trace!(len = length, "read lead chunk");
    decode_lead_chunk(&block, kind).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DEFAULT_PROTOCOL_VERSION;
    use std::io::Cursor;

    fn sample_lead() -> LeadChunk {
        LeadChunk {
            method: Some("GET".into()),
            target: Some("/x".into()),
            version: Some(DEFAULT_PROTOCOL_VERSION.into()),
            content_length: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let mut wire = Vec::new();
        write_lead_chunk(&mut wire, &sample_lead(), LeadKind::Request, 8192).await.unwrap();

        let mut reader = Cursor::new(wire);
        let decoded = read_lead_chunk(&mut reader, LeadKind::Request, 8192).await.unwrap().unwrap();
        assert_eq!(decoded, sample_lead());
    }

    #[tokio::test]
    async fn test_clean_eof_yields_none() {
        let mut reader = Cursor::new(Vec::new());
        let decoded = read_lead_chunk(&mut reader, LeadKind::Request, 8192).await.unwrap();
        assert!(decoded.is_none());
    }

    #[tokio::test]
    async fn test_eof_inside_header_fails() {
        let mut reader = Cursor::new(vec![0x71, 0x68, 0x64]);
        assert!(matches!(
            read_lead_chunk(&mut reader, LeadKind::Request, 8192).await,
            Err(QuasiHttpError::UnexpectedEndOfInput)
        ));
    }

    #[tokio::test]
    async fn test_eof_inside_value_fails() {
        let mut wire = Vec::new();
        write_lead_chunk(&mut wire, &sample_lead(), LeadKind::Request, 8192).await.unwrap();
        wire.truncate(wire.len() - 2);

        let mut reader = Cursor::new(wire);
        assert!(matches!(
            read_lead_chunk(&mut reader, LeadKind::Request, 8192).await,
            Err(QuasiHttpError::UnexpectedEndOfInput)
        ));
    }

    #[tokio::test]
    async fn test_wrong_tag_fails() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_tag_length(crate::codec::framing::TAG_BODY, 4).unwrap());
        wire.extend_from_slice(b"abcd");

        let mut reader = Cursor::new(wire);
        assert!(matches!(
            read_lead_chunk(&mut reader, LeadKind::Request, 8192).await,
            Err(QuasiHttpError::ProtocolViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_oversize_record_fails() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_tag_length(TAG_HEADERS, 100).unwrap());
        wire.extend_from_slice(&[b'x'; 100]);

        let mut reader = Cursor::new(wire);
        assert!(matches!(
            read_lead_chunk(&mut reader, LeadKind::Request, 64).await,
            Err(QuasiHttpError::MessageTooLarge { .. })
        ));
    }
}
