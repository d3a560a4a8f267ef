//! A transport-agnostic quasi-http protocol engine
//!
//! This crate implements HTTP-like request/response semantics — method and
//! target, status, headers, streamed bodies — over arbitrary duplex
//! byte-stream connections: TCP sockets, in-memory pipes, or callback-based
//! "bypass" transports. It assumes nothing about IP networking and exposes no
//! transport-specific types to application code.
//!
//! # Features
//!
//! - Self-delimiting binary TLV framing for headers and unknown-length bodies
//! - Content-length and ceiling enforcement on body streams
//! - A client-side send protocol racing concurrent body transfer against
//!   response reception
//! - Timeout- and cancellation-bounded transfer lifecycle with exactly-once
//!   resource release
//! - Optional eager buffering of response bodies
//! - Asynchronous I/O using tokio
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use quasi_http::client::QuasiHttpClient;
//! use quasi_http::protocol::{Body, Request};
//! use quasi_http::transport::Transport;
//!
//! # async fn run(transport: Arc<dyn Transport>) {
//! let mut client = QuasiHttpClient::new();
//! client.transport = Some(transport);
//! let client = Arc::new(client);
//!
//! let request = Request::new("POST", "/items")
//!     .with_header("content-type", "text/plain")
//!     .with_body(Body::from_bytes("hello"));
//!
//! match client.send("node7", request, None).await {
//!     Ok(Some(response)) => println!("status: {}", response.status_code),
//!     Ok(None) => println!("no response"),
//!     Err(e) => eprintln!("send failed: {e}"),
//! }
//! # }
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`codec`]: TLV framing, lead chunk serialization and body stream adapters
//! - [`protocol`]: Message types, options and the error taxonomy
//! - [`transport`]: The narrow interfaces connections are obtained through
//! - [`client`]: The send protocols and the transfer coordinator
//!
//! # Wire format
//!
//! Every framed unit is a TLV record: 4-byte big-endian positive tag, 4-byte
//! big-endian non-negative length, then the value bytes. A message starts
//! with one record holding a CSV-encoded header block (the lead chunk). A
//! body with known content length follows as raw bytes; a body of unknown
//! length follows as a sequence of records terminated by a zero-length one.
//!
//! # Limitations
//!
//! - No connection pooling, TLS or DNS; transports own those concerns
//! - No compatibility with HTTP/1.1 or HTTP/2 on the wire
//! - Header blocks are limited by the configured chunk size (8 KiB default)

pub mod client;
pub mod codec;
pub mod protocol;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;
