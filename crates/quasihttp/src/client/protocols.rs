//! Send protocol implementations.
//!
//! All variants share one capability set: drive a request to a response, and
//! release whatever underlies the exchange on cancellation. They differ only
//! in how the connection or response is obtained — a direct
//! connection-oriented transport, a bypass transport producing a
//! response-promise plus cancellation handle, or a plain pass-through over an
//! already obtained response.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tracing::{debug, trace};

use crate::codec::body::{
    ChunkDecodingReader, ChunkEncodingWriter, LengthEnforcingReader, MaxLengthEnforcingReader,
};
use crate::codec::framing::TAG_BODY;
use crate::codec::{read_lead_chunk, write_lead_chunk, LeadKind};
use crate::ensure;
use crate::protocol::{
    Body, BodyReader, BodySize, EffectiveSendOptions, LeadChunk, QuasiHttpError, Request, Response,
    ENV_RESPONSE_BUFFERING_APPLIED,
};
use crate::transport::{
    BypassCancellationHandle, BypassTransport, Connection, ConnectionReader, ConnectionWriter,
    ConnectivityParams, Transport,
};
use crate::utils::lock;

/// What a send protocol resolves to.
#[derive(Debug)]
pub struct ProtocolSendResult {
    pub response: Option<Response>,
    /// Whether the response body was drained into memory, leaving no live
    /// stream tied to a connection.
    pub response_buffering_applied: bool,
}

/// The capability set shared by all send protocol variants.
#[async_trait]
pub trait SendProtocol: Send + Sync {
    /// Drives the request handed to this protocol at construction to a
    /// response. Consumes the request; a second call fails with
    /// `MissingDependency`.
    async fn send(&self) -> Result<ProtocolSendResult, QuasiHttpError>;

    /// Releases or unblocks whatever underlies this send. Safe to call even
    /// if `send` never completed setup, and safe to call more than once.
    async fn cancel(&self);
}

/// Send protocol over a connection-oriented transport.
pub(crate) struct DefaultSendProtocol {
    transport: Arc<dyn Transport>,
    params: ConnectivityParams,
    options: EffectiveSendOptions,
    ensure_non_null_response: bool,
    request: Mutex<Option<Request>>,
    connection: Mutex<Option<Connection>>,
}

impl DefaultSendProtocol {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        request: Request,
        params: ConnectivityParams,
        options: EffectiveSendOptions,
        ensure_non_null_response: bool,
    ) -> Self {
        Self {
            transport,
            params,
            options,
            ensure_non_null_response,
            request: Mutex::new(Some(request)),
            connection: Mutex::new(None),
        }
    }

    async fn transfer_request_body(
        writer: ConnectionWriter,
        body: Body,
        max_chunk_size: usize,
    ) -> Result<(), QuasiHttpError> {
        match body.size() {
            BodySize::Empty => Ok(()),
            BodySize::Length(n) => {
                let Some(reader) = body.into_reader() else {
                    return Err(QuasiHttpError::protocol_violation(
                        "request declares body bytes but has no readable body",
                    ));
                };
                let mut reader = LengthEnforcingReader::new(reader, n as i64);
                let mut writer = writer;
                tokio::io::copy(&mut reader, &mut writer).await.map_err(QuasiHttpError::from_io)?;
                writer.flush().await.map_err(QuasiHttpError::io)?;
                trace!(len = n, "request body transferred");
                Ok(())
            }
            BodySize::Unbounded => {
                let mut chunked = ChunkEncodingWriter::new(writer, TAG_BODY, max_chunk_size);
                if let Some(mut reader) = body.into_reader() {
                    tokio::io::copy(&mut reader, &mut chunked)
                        .await
                        .map_err(QuasiHttpError::from_io)?;
                }
                chunked.finish().await.map_err(QuasiHttpError::from_io)?;
                trace!("request body transferred chunked");
                Ok(())
            }
        }
    }

    async fn build_response(
        &self,
        lead: LeadChunk,
        reader: ConnectionReader,
    ) -> Result<ProtocolSendResult, QuasiHttpError> {
        let size = lead.body_size();
        let content_length = lead.content_length;
        let mut response = lead.into_response();

        if size.is_empty() {
            // the coordinator's abort routine releases the connection
            return Ok(ProtocolSendResult { response: Some(response), response_buffering_applied: false });
        }

        let raw: BodyReader = match size {
            BodySize::Length(n) => Box::new(LengthEnforcingReader::new(reader, n as i64)),
            BodySize::Unbounded => {
                Box::new(ChunkDecodingReader::new(reader, TAG_BODY, self.options.max_chunk_size))
            }
            BodySize::Empty => Box::new(tokio::io::empty()),
        };

        if self.options.response_buffering_enabled {
            let limit = self.options.response_body_buffering_size_limit;
            if let BodySize::Length(n) = size {
                ensure!(n <= limit, QuasiHttpError::BodySizeLimitExceeded { limit });
            }
            let bytes = drain_body(raw, limit).await?;
            debug!(len = bytes.len(), "response body buffered, releasing connection");
            response.body = Body::from_bytes(bytes);
            response
                .environment
                .insert(ENV_RESPONSE_BUFFERING_APPLIED.to_string(), "true".to_string());
            self.cancel().await;
            Ok(ProtocolSendResult { response: Some(response), response_buffering_applied: true })
        } else {
            // the response body stays tied to the connection; releasing it
            // becomes the caller's business when the body is dropped
            let guard = lock(&self.connection).take().map(|connection| ConnectionGuard {
                transport: Arc::clone(&self.transport),
                connection: Some(connection),
            });
            response.body = Body::from_reader(
                Box::new(GuardedBodyReader { inner: raw, _guard: guard }),
                content_length,
            );
            Ok(ProtocolSendResult { response: Some(response), response_buffering_applied: false })
        }
    }
}

#[async_trait]
impl SendProtocol for DefaultSendProtocol {
    async fn send(&self) -> Result<ProtocolSendResult, QuasiHttpError> {
        let request = lock(&self.request)
            .take()
            .ok_or(QuasiHttpError::missing_dependency("request"))?;

        debug!(endpoint = %self.params.endpoint, "allocating connection");
        let mut connection = self.transport.allocate_connection(&self.params).await?;
        let mut reader = connection
            .take_reader()
            .ok_or(QuasiHttpError::missing_dependency("connection reader"))?;
        let mut writer = connection
            .take_writer()
            .ok_or(QuasiHttpError::missing_dependency("connection writer"))?;
        *lock(&self.connection) = Some(connection);

        let lead = LeadChunk::from_request(&request);
        write_lead_chunk(&mut writer, &lead, LeadKind::Request, self.options.max_chunk_size).await?;

        let body = request.body;
        let max_chunk_size = self.options.max_chunk_size;
        let response_lead = {
            let transfer = Self::transfer_request_body(writer, body, max_chunk_size);
            let receive = read_lead_chunk(&mut reader, LeadKind::Response, max_chunk_size);
            tokio::pin!(transfer);
            tokio::pin!(receive);
            let mut body_done = false;
            loop {
                if body_done {
                    break (&mut receive).await?;
                }
                tokio::select! {
                    // a request-body failure takes priority over a pending
                    // response; a response arriving first supersedes the
                    // remaining upload
                    biased;
                    sent = &mut transfer => {
                        sent?;
                        body_done = true;
                    }
                    lead = &mut receive => break lead?,
                }
            }
        };

        let Some(response_lead) = response_lead else {
            if self.ensure_non_null_response {
                return Err(QuasiHttpError::NoResponse);
            }
            return Ok(ProtocolSendResult { response: None, response_buffering_applied: false });
        };
        debug!(status = ?response_lead.status_code, "response lead chunk received");
        self.build_response(response_lead, reader).await
    }

    async fn cancel(&self) {
        let connection = lock(&self.connection).take();
        if let Some(connection) = connection {
            debug!("releasing connection");
            self.transport.release_connection(connection);
        }
    }
}

/// Send protocol over a bypass transport.
pub(crate) struct BypassSendProtocol {
    bypass: Arc<dyn BypassTransport>,
    params: ConnectivityParams,
    options: EffectiveSendOptions,
    ensure_non_null_response: bool,
    request: Mutex<Option<Request>>,
    cancellation_handle: Mutex<Option<BypassCancellationHandle>>,
}

impl BypassSendProtocol {
    pub(crate) fn new(
        bypass: Arc<dyn BypassTransport>,
        request: Request,
        params: ConnectivityParams,
        options: EffectiveSendOptions,
        ensure_non_null_response: bool,
    ) -> Self {
        Self {
            bypass,
            params,
            options,
            ensure_non_null_response,
            request: Mutex::new(Some(request)),
            cancellation_handle: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SendProtocol for BypassSendProtocol {
    async fn send(&self) -> Result<ProtocolSendResult, QuasiHttpError> {
        let request = lock(&self.request)
            .take()
            .ok_or(QuasiHttpError::missing_dependency("request"))?;

        debug!(endpoint = %self.params.endpoint, "sending via bypass transport");
        let (response_future, handle) =
            self.bypass.process_send_request(request, &self.params).await?;
        if let Some(handle) = handle {
            *lock(&self.cancellation_handle) = Some(handle);
        }
        let response = response_future.await?;
        finalize_response(response, &self.options, self.ensure_non_null_response).await
    }

    async fn cancel(&self) {
        let handle = lock(&self.cancellation_handle).take();
        if let Some(handle) = handle {
            debug!("cancelling bypass send");
            self.bypass.cancel_send_request(handle).await;
        }
    }
}

/// Send protocol over an already obtained response; performs no wrapping
/// beyond the shared response-construction policy.
pub(crate) struct PassThroughSendProtocol {
    options: EffectiveSendOptions,
    ensure_non_null_response: bool,
    response: Mutex<Option<Result<Option<Response>, QuasiHttpError>>>,
}

impl PassThroughSendProtocol {
    pub(crate) fn new(
        response: Result<Option<Response>, QuasiHttpError>,
        options: EffectiveSendOptions,
        ensure_non_null_response: bool,
    ) -> Self {
        Self { options, ensure_non_null_response, response: Mutex::new(Some(response)) }
    }
}

#[async_trait]
impl SendProtocol for PassThroughSendProtocol {
    async fn send(&self) -> Result<ProtocolSendResult, QuasiHttpError> {
        let response = lock(&self.response)
            .take()
            .ok_or(QuasiHttpError::missing_dependency("response"))??;
        finalize_response(response, &self.options, self.ensure_non_null_response).await
    }

    async fn cancel(&self) {}
}

/// Applies the shared response policy: null-response enforcement and optional
/// eager buffering of the body, honoring a transport's pre-buffering marker.
pub(crate) async fn finalize_response(
    response: Option<Response>,
    options: &EffectiveSendOptions,
    ensure_non_null_response: bool,
) -> Result<ProtocolSendResult, QuasiHttpError> {
    let Some(mut response) = response else {
        if ensure_non_null_response {
            return Err(QuasiHttpError::NoResponse);
        }
        return Ok(ProtocolSendResult { response: None, response_buffering_applied: false });
    };

    let already_buffered = response
        .environment
        .get(ENV_RESPONSE_BUFFERING_APPLIED)
        .is_some_and(|v| v == "true");
    if already_buffered || response.body.is_empty() || !options.response_buffering_enabled {
        return Ok(ProtocolSendResult {
            response_buffering_applied: already_buffered,
            response: Some(response),
        });
    }

    let limit = options.response_body_buffering_size_limit;
    if let BodySize::Length(n) = response.body.size() {
        ensure!(n <= limit, QuasiHttpError::BodySizeLimitExceeded { limit });
    }
    let body = std::mem::take(&mut response.body);
    let Some(reader) = body.into_reader() else {
        return Ok(ProtocolSendResult { response: Some(response), response_buffering_applied: false });
    };
    let bytes = drain_body(reader, limit).await?;
    trace!(len = bytes.len(), "response body buffered");
    response.body = Body::from_bytes(bytes);
    response.environment.insert(ENV_RESPONSE_BUFFERING_APPLIED.to_string(), "true".to_string());
    Ok(ProtocolSendResult { response: Some(response), response_buffering_applied: true })
}

/// Drains a body stream into memory, failing with `BodySizeLimitExceeded`
/// once the drain would pass `limit`.
async fn drain_body(reader: BodyReader, limit: u64) -> Result<Bytes, QuasiHttpError> {
    let mut bounded = MaxLengthEnforcingReader::new(reader, limit);
    let mut collected = Vec::new();
    bounded.read_to_end(&mut collected).await.map_err(|e| match QuasiHttpError::from_io(e) {
        QuasiHttpError::BodyTooLarge { max_size } => {
            QuasiHttpError::BodySizeLimitExceeded { limit: max_size }
        }
        other => other,
    })?;
    Ok(Bytes::from(collected))
}

/// Hands a connection back to its transport exactly once, when dropped.
struct ConnectionGuard {
    transport: Arc<dyn Transport>,
    connection: Option<Connection>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            trace!("releasing connection on response body drop");
            self.transport.release_connection(connection);
        }
    }
}

/// A response body reader that keeps its connection alive and releases it
/// when dropped.
struct GuardedBodyReader {
    inner: BodyReader,
    _guard: Option<ConnectionGuard>,
}

impl AsyncRead for GuardedBodyReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}
