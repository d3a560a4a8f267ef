//! Transport abstractions.
//!
//! The protocol engine never touches sockets directly; it speaks to narrow
//! transport interfaces. A connection-oriented [`Transport`] hands out
//! [`Connection`]s wrapping duplex byte streams, while a [`BypassTransport`]
//! short-circuits the wire entirely and produces a response future plus an
//! opaque cancellation handle.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::protocol::{QuasiHttpError, Request, Response};

/// Boxed read half of a connection.
pub type ConnectionReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a connection.
pub type ConnectionWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opaque handle a bypass transport hands back for cancelling an in-flight
/// send.
pub type BypassCancellationHandle = Box<dyn Any + Send>;

/// The response a bypass transport eventually produces.
pub type BypassResponseFuture =
    Pin<Box<dyn Future<Output = Result<Option<Response>, QuasiHttpError>> + Send>>;

/// Identifies the remote endpoint of a send, in transport-defined terms, plus
/// extra parameters passed through unmodified.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityParams {
    pub endpoint: String,
    pub extra: HashMap<String, String>,
}

impl ConnectivityParams {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), extra: HashMap::new() }
    }
}

/// A duplex byte-stream connection allocated by a [`Transport`].
///
/// The halves are taken out exactly once by the send protocol; whatever shell
/// remains is handed back through [`Transport::release_connection`] on
/// exactly one path. The environment map is a key/value side channel for
/// transport-specific metadata.
pub struct Connection {
    reader: Option<ConnectionReader>,
    writer: Option<ConnectionWriter>,
    pub environment: HashMap<String, String>,
}

impl Connection {
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self { reader: Some(Box::new(reader)), writer: Some(Box::new(writer)), environment: HashMap::new() }
    }

    pub fn with_environment(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    /// Takes ownership of the read half; subsequent calls return `None`.
    pub fn take_reader(&mut self) -> Option<ConnectionReader> {
        self.reader.take()
    }

    /// Takes ownership of the write half; subsequent calls return `None`.
    pub fn take_writer(&mut self) -> Option<ConnectionWriter> {
        self.writer.take()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("reader", &self.reader.is_some())
            .field("writer", &self.writer.is_some())
            .field("environment", &self.environment)
            .finish()
    }
}

/// A connection-oriented transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Allocates a fresh connection to the endpoint named by `params`.
    async fn allocate_connection(
        &self,
        params: &ConnectivityParams,
    ) -> Result<Connection, QuasiHttpError>;

    /// Releases a connection previously allocated by this transport.
    ///
    /// Called at most once per connection; transports must also tolerate
    /// connections that are simply dropped when a send is torn down before
    /// the handoff completes.
    fn release_connection(&self, connection: Connection);
}

/// A transport that produces a response directly from a request, without an
/// explicit connection object.
#[async_trait]
pub trait BypassTransport: Send + Sync {
    /// Starts processing `request`, returning the pending response and an
    /// optional handle for cancelling the work.
    async fn process_send_request(
        &self,
        request: Request,
        params: &ConnectivityParams,
    ) -> Result<(BypassResponseFuture, Option<BypassCancellationHandle>), QuasiHttpError>;

    /// Cancels an in-flight send identified by a handle previously returned
    /// from [`Self::process_send_request`].
    async fn cancel_send_request(&self, handle: BypassCancellationHandle);
}
