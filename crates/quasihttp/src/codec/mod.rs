//! Wire-format encoding and decoding.
//!
//! Everything on a quasi-http connection is framed as TLV records
//! ([`framing`]): the lead chunk travels as one record holding a CSV-encoded
//! header block ([`headers`], [`lead`]), known-length bodies follow as raw
//! bytes, and unknown-length bodies as a terminated record sequence
//! ([`body`]).

pub mod body;
pub mod framing;
pub mod headers;
mod lead;

pub use headers::{decode_lead_chunk, encode_lead_chunk, LeadKind};
pub use lead::{read_lead_chunk, write_lead_chunk};
