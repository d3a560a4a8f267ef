//! Binary TLV framing primitives.
//!
//! Every framed unit on a quasi-http connection is a tag-length-value record:
//! a 4-byte big-endian positive tag, a 4-byte big-endian non-negative length,
//! and `length` value bytes. Tags and lengths are confined to the positive
//! range of a 32-bit signed integer; a record whose high bit is set would read
//! as negative on the wire and is rejected.

use crate::ensure;
use crate::protocol::QuasiHttpError;

/// Tag of the TLV record carrying a serialized lead chunk.
pub const TAG_HEADERS: u32 = 0x7168_6472; // "qhdr"

/// Tag of the TLV records carrying body chunks.
pub const TAG_BODY: u32 = 0x7162_6479; // "qbdy"

/// Ceiling applied to declared record lengths when decoding bodies, so a peer
/// using larger chunks than ours still decodes while absurd lengths fail fast.
pub const HARD_MAX_CHUNK_SIZE_LIMIT: usize = 8 * 1024 * 1024;

const MAX_SIGNED: u32 = i32::MAX as u32;

/// Encodes a record header: tag and length as two big-endian 32-bit values.
///
/// Fails with `InvalidFrame` unless `tag` is positive and both values fit the
/// non-negative 32-bit signed range.
pub fn encode_tag_length(tag: u32, length: u32) -> Result<[u8; 8], QuasiHttpError> {
    ensure!(
        tag >= 1 && tag <= MAX_SIGNED,
        QuasiHttpError::invalid_frame(format!("tag out of range: {tag:#x}"))
    );
    ensure!(
        length <= MAX_SIGNED,
        QuasiHttpError::invalid_frame(format!("length out of range: {length:#x}"))
    );
    let mut header = [0u8; 8];
    header[..4].copy_from_slice(&tag.to_be_bytes());
    header[4..].copy_from_slice(&length.to_be_bytes());
    Ok(header)
}

/// Decodes the tag half of a record header.
///
/// Fails with `UnexpectedEndOfInput` on fewer than 4 bytes and `InvalidFrame`
/// on a zero or negative (high bit set) tag.
pub fn decode_tag(bytes: &[u8]) -> Result<u32, QuasiHttpError> {
    ensure!(bytes.len() >= 4, QuasiHttpError::UnexpectedEndOfInput);
    let tag = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    ensure!(
        tag >= 1 && tag <= MAX_SIGNED,
        QuasiHttpError::invalid_frame(format!("tag out of range: {tag:#x}"))
    );
    Ok(tag)
}

/// Decodes the length half of a record header.
///
/// Fails with `UnexpectedEndOfInput` on fewer than 4 bytes and `InvalidFrame`
/// on a negative (high bit set) length.
pub fn decode_length(bytes: &[u8]) -> Result<u32, QuasiHttpError> {
    ensure!(bytes.len() >= 4, QuasiHttpError::UnexpectedEndOfInput);
    let length = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    ensure!(
        length <= MAX_SIGNED,
        QuasiHttpError::invalid_frame(format!("length out of range: {length:#x}"))
    );
    Ok(length)
}
