//! Body stream adapters.
//!
//! Three decorator readers and one decorator writer are layered over a raw
//! connection stream depending on the content-length sentinel of the message
//! being transferred:
//!
//! - [`LengthEnforcingReader`]: exact byte-count enforcement for bodies with
//!   a known content length
//! - [`MaxLengthEnforcingReader`]: ceiling enforcement for otherwise
//!   unbounded reads
//! - [`ChunkDecodingReader`] / [`ChunkEncodingWriter`]: TLV-delimited
//!   transfer of bodies with unknown length
//!
//! The low-level record parsing is handled by [`TlvDecoder`] and
//! [`TlvEncoder`], which the stream adapters drive.

mod chunk_reader;
mod chunk_writer;
mod length_reader;
mod max_length_reader;
mod tlv_decoder;
mod tlv_encoder;

pub use chunk_reader::ChunkDecodingReader;
pub use chunk_writer::ChunkEncodingWriter;
pub use length_reader::LengthEnforcingReader;
pub use max_length_reader::MaxLengthEnforcingReader;
pub use tlv_decoder::TlvDecoder;
pub use tlv_encoder::TlvEncoder;
