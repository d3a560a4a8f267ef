//! Protocol types and abstractions for quasi-http.
//!
//! This module defines the message model (requests, responses, lead chunks,
//! bodies), the error taxonomy, and the option types that parameterize a
//! transfer. The wire-level encoding of these types lives in [`crate::codec`].

mod body;
mod error;
mod lead;
mod message;
mod options;
mod request;
mod response;

use std::collections::BTreeMap;

pub use body::{Body, BodyReader};
pub use error::QuasiHttpError;
pub use lead::LeadChunk;
pub use message::{BodySize, PayloadItem};
pub use options::{
    EffectiveSendOptions, QuasiHttpSendOptions, DEFAULT_MAX_CHUNK_SIZE,
    DEFAULT_RESPONSE_BODY_BUFFERING_SIZE_LIMIT,
};
pub use request::Request;
pub use response::Response;

/// Header map: name to ordered list of values.
///
/// Names are normalized to lowercase when decoded off the wire; values keep
/// their row order across multiple rows with the same name.
pub type Headers = BTreeMap<String, Vec<String>>;

/// Protocol version string stamped on requests and responses by default.
pub const DEFAULT_PROTOCOL_VERSION: &str = "QH/1.0";

/// Environment key set on a response whose body was eagerly drained into
/// memory, so downstream layers skip re-buffering it.
pub const ENV_RESPONSE_BUFFERING_APPLIED: &str = "quasihttp.response_buffering_applied";
