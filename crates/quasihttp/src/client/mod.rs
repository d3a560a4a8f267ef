//! The client-side transfer coordinator.
//!
//! [`QuasiHttpClient`] owns the lifecycle of every send: it merges effective
//! options, picks a send protocol variant for the configured transports, arms
//! an optional timeout, and guarantees idempotent abort and cleanup whether a
//! transfer ends in success, timeout or external cancellation.
//!
//! The coordination backbone is a settle-once completion slot per transfer
//! (an `oneshot` sender taken out of a mutex, so the first writer wins) plus
//! an idempotent abort routine: a cancellation arriving after natural
//! completion is a no-op, and a natural completion arriving after
//! cancellation only disposes its own result.

mod protocols;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, trace};

pub use protocols::{ProtocolSendResult, SendProtocol};
use protocols::{BypassSendProtocol, DefaultSendProtocol};

use crate::protocol::{
    EffectiveSendOptions, QuasiHttpError, QuasiHttpSendOptions, Request, Response,
};
use crate::transport::{BypassTransport, ConnectivityParams, Transport};
use crate::utils::lock;

/// What a send resolves to: a response, `None` when the peer sent nothing and
/// the non-null policy is disabled, or a typed error.
pub type TransferResult = Result<Option<Response>, QuasiHttpError>;

/// Completion future of a send started with
/// [`QuasiHttpClient::send_with_handle`].
pub type SendCompletion = Pin<Box<dyn Future<Output = TransferResult> + Send>>;

/// A quasi-http client.
///
/// Configure the transports and defaults after construction, then share the
/// client behind an `Arc`; every send method takes `self: &Arc<Self>` so
/// spawned transfer tasks can reach back into the client.
pub struct QuasiHttpClient {
    /// Connection-oriented transport, used when no bypass transport applies.
    pub transport: Option<Arc<dyn Transport>>,
    /// Bypass transport, preferred when configured.
    pub bypass_transport: Option<Arc<dyn BypassTransport>>,
    /// Probability of picking the bypass transport when both transports are
    /// configured; 1.0 always picks the bypass, 0.0 never does.
    pub bypass_probability: f64,
    /// When set, sends fail with `NoResponse` instead of resolving to a null
    /// response.
    pub ensure_non_null_response: bool,
    /// Client-wide option defaults, overridable per call.
    pub default_options: QuasiHttpSendOptions,
    transfers: Mutex<HashMap<u64, Arc<Transfer>>>,
    next_transfer_id: AtomicU64,
}

/// The mutable state of one in-flight send.
struct Transfer {
    id: u64,
    /// Signals the send task to drop its in-flight work after an external
    /// abort settled the transfer.
    cancel_notify: Notify,
    state: Mutex<TransferState>,
}

#[derive(Default)]
struct TransferState {
    /// Settle-once completion slot; taking the sender is the commit point.
    done: Option<oneshot::Sender<TransferResult>>,
    timeout_task: Option<JoinHandle<()>>,
    protocol: Option<Arc<dyn SendProtocol>>,
}

/// Handle for cancelling one send from outside.
pub struct SendCancellationHandle {
    client: Arc<QuasiHttpClient>,
    transfer: Arc<Transfer>,
}

impl SendCancellationHandle {
    /// Aborts the transfer with a `Cancelled` error.
    ///
    /// Idempotent: cancelling twice, or after natural completion, produces no
    /// additional side effects.
    pub async fn cancel(&self) {
        QuasiHttpClient::abort_transfer(
            &self.client,
            &self.transfer,
            Err(QuasiHttpError::cancelled("send cancelled")),
        )
        .await;
    }
}

impl Default for QuasiHttpClient {
    fn default() -> Self {
        Self {
            transport: None,
            bypass_transport: None,
            bypass_probability: 1.0,
            ensure_non_null_response: true,
            default_options: QuasiHttpSendOptions::default(),
            transfers: Mutex::new(HashMap::new()),
            next_transfer_id: AtomicU64::new(1),
        }
    }
}

impl QuasiHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `request` to `endpoint` and waits for the outcome.
    ///
    /// Resolves to a response, `Ok(None)` when the peer sent no response and
    /// [`Self::ensure_non_null_response`] is disabled, or a typed error.
    pub async fn send(
        self: &Arc<Self>,
        endpoint: impl Into<String>,
        request: Request,
        options: Option<QuasiHttpSendOptions>,
    ) -> TransferResult {
        let (_handle, completion) = self.send_with_handle(endpoint, request, options);
        completion.await
    }

    /// Starts a send and returns a cancellation handle next to the completion
    /// future. Must be called within a tokio runtime.
    pub fn send_with_handle(
        self: &Arc<Self>,
        endpoint: impl Into<String>,
        request: Request,
        options: Option<QuasiHttpSendOptions>,
    ) -> (SendCancellationHandle, SendCompletion) {
        let options = EffectiveSendOptions::merge(options.as_ref(), &self.default_options);
        let params = ConnectivityParams {
            endpoint: endpoint.into(),
            extra: options.extra_connectivity_params.clone(),
        };

        let id = self.next_transfer_id.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();
        let transfer = Arc::new(Transfer {
            id,
            cancel_notify: Notify::new(),
            state: Mutex::new(TransferState { done: Some(done_tx), ..Default::default() }),
        });
        lock(&self.transfers).insert(id, Arc::clone(&transfer));
        trace!(id, endpoint = %params.endpoint, "transfer started");

        match self.choose_protocol(request, params, &options) {
            Ok(protocol) => {
                lock(&transfer.state).protocol = Some(Arc::clone(&protocol));

                if options.timeout_enabled() {
                    let millis = options.timeout_millis as u64;
                    let client = Arc::clone(self);
                    let timed = Arc::clone(&transfer);
                    let timeout_task = tokio::spawn(async move {
                        sleep(Duration::from_millis(millis)).await;
                        // drop our own join handle first so the abort routine
                        // does not cancel the task it is running on
                        lock(&timed.state).timeout_task.take();
                        debug!(id = timed.id, millis, "send timeout fired");
                        Self::abort_transfer(&client, &timed, Err(QuasiHttpError::Timeout)).await;
                    });
                    lock(&transfer.state).timeout_task = Some(timeout_task);
                }

                let client = Arc::clone(self);
                let task_transfer = Arc::clone(&transfer);
                tokio::spawn(async move {
                    let work = protocol.send();
                    tokio::pin!(work);
                    tokio::select! {
                        result = &mut work => {
                            Self::abort_transfer(&client, &task_transfer, result).await;
                        }
                        _ = task_transfer.cancel_notify.notified() => {
                            // the abort routine already settled the slot;
                            // dropping the in-flight send closes the request
                            // body and any un-handed-off connection halves
                            trace!(id = task_transfer.id, "send task stopped by abort");
                        }
                    }
                });
            }
            Err(e) => {
                let client = Arc::clone(self);
                let failed = Arc::clone(&transfer);
                tokio::spawn(async move {
                    Self::abort_transfer(&client, &failed, Err(e)).await;
                });
            }
        }

        let handle = SendCancellationHandle { client: Arc::clone(self), transfer };
        let completion: SendCompletion = Box::pin(async move {
            match done_rx.await {
                Ok(result) => result,
                Err(_) => Err(QuasiHttpError::cancelled("transfer abandoned without a result")),
            }
        });
        (handle, completion)
    }

    /// Aborts every in-flight transfer with a shared cause.
    ///
    /// The tracked set is drained under the lock before the individual
    /// cleanups run, so concurrent new sends are unaffected.
    pub async fn reset(self: &Arc<Self>) {
        let drained: Vec<Arc<Transfer>> =
            lock(&self.transfers).drain().map(|(_, transfer)| transfer).collect();
        info!(count = drained.len(), "client reset, aborting in-flight transfers");
        for transfer in drained {
            Self::abort_transfer(self, &transfer, Err(QuasiHttpError::cancelled("client reset")))
                .await;
        }
    }

    /// Number of transfers currently tracked.
    pub fn in_flight(&self) -> usize {
        lock(&self.transfers).len()
    }

    fn choose_protocol(
        &self,
        request: Request,
        params: ConnectivityParams,
        options: &EffectiveSendOptions,
    ) -> Result<Arc<dyn SendProtocol>, QuasiHttpError> {
        if let Some(bypass) = &self.bypass_transport {
            let sampled_direct =
                self.transport.is_some() && fastrand::f64() >= self.bypass_probability;
            if !sampled_direct {
                return Ok(Arc::new(BypassSendProtocol::new(
                    Arc::clone(bypass),
                    request,
                    params,
                    options.clone(),
                    self.ensure_non_null_response,
                )));
            }
        }
        match &self.transport {
            Some(transport) => Ok(Arc::new(DefaultSendProtocol::new(
                Arc::clone(transport),
                request,
                params,
                options.clone(),
                self.ensure_non_null_response,
            ))),
            None => Err(QuasiHttpError::missing_dependency("transport")),
        }
    }

    /// The abort routine. Idempotent: only the first caller settles the
    /// completion slot; later callers merely dispose a late result.
    async fn abort_transfer(
        client: &Arc<Self>,
        transfer: &Arc<Transfer>,
        result: Result<ProtocolSendResult, QuasiHttpError>,
    ) {
        let (done, timeout_task, protocol) = {
            let mut state = lock(&transfer.state);
            let done = state.done.take();
            let timeout_task = if done.is_some() { state.timeout_task.take() } else { None };
            (done, timeout_task, state.protocol.clone())
        };

        let Some(done) = done else {
            // lost the race against another abort; a successful response that
            // arrived late must still be disposed of
            if let Ok(ProtocolSendResult { response: Some(response), .. }) = result {
                trace!(id = transfer.id, "disposing response that lost the race");
                drop(response);
                if let Some(protocol) = protocol {
                    protocol.cancel().await;
                }
            }
            return;
        };

        if let Some(task) = timeout_task {
            task.abort();
        }

        let (outcome, cancel_needed) = match result {
            Ok(sent) => {
                // leave the connection to the caller only when a live
                // response body is still tied to it
                let streaming = !sent.response_buffering_applied
                    && sent.response.as_ref().is_some_and(|r| !r.body.is_empty());
                (Ok(sent.response), !streaming)
            }
            Err(e) => {
                debug!(id = transfer.id, error = %e, "transfer aborted with error");
                (Err(e), true)
            }
        };

        if done.send(outcome).is_err() {
            trace!(id = transfer.id, "transfer result dropped by caller");
        }

        // stop the send task if this abort came from outside it; dropping the
        // in-flight send future closes the request body, best effort
        transfer.cancel_notify.notify_one();

        if cancel_needed {
            if let Some(protocol) = protocol {
                protocol.cancel().await;
            }
        }

        lock(&client.transfers).remove(&transfer.id);
    }
}

impl fmt::Debug for QuasiHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuasiHttpClient")
            .field("has_transport", &self.transport.is_some())
            .field("has_bypass_transport", &self.bypass_transport.is_some())
            .field("bypass_probability", &self.bypass_probability)
            .field("ensure_non_null_response", &self.ensure_non_null_response)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for SendCancellationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendCancellationHandle").field("transfer_id", &self.transfer.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::protocols::{finalize_response, PassThroughSendProtocol};
    use super::*;
    use crate::protocol::Body;

    fn effective(defaults: &QuasiHttpSendOptions) -> EffectiveSendOptions {
        EffectiveSendOptions::merge(None, defaults)
    }

    #[tokio::test]
    async fn test_send_without_any_transport_fails_fast() {
        let client = Arc::new(QuasiHttpClient::new());
        let result = client.send("nowhere", Request::new("GET", "/x"), None).await;
        assert!(matches!(result, Err(QuasiHttpError::MissingDependency { name: "transport" })));
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_pass_through_protocol_through_abort_routine() {
        let client = Arc::new(QuasiHttpClient::new());
        let protocol: Arc<dyn SendProtocol> = Arc::new(PassThroughSendProtocol::new(
            Ok(Some(Response::new(200).with_body(Body::from_bytes("cached")))),
            effective(&QuasiHttpSendOptions::default()),
            true,
        ));

        let (done_tx, done_rx) = oneshot::channel();
        let transfer = Arc::new(Transfer {
            id: 7,
            cancel_notify: Notify::new(),
            state: Mutex::new(TransferState {
                done: Some(done_tx),
                protocol: Some(Arc::clone(&protocol)),
                ..Default::default()
            }),
        });
        lock(&client.transfers).insert(transfer.id, Arc::clone(&transfer));

        let result = protocol.send().await;
        QuasiHttpClient::abort_transfer(&client, &transfer, result).await;

        let response = done_rx.await.unwrap().unwrap().unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(client.in_flight(), 0);

        // a second abort is ignored
        QuasiHttpClient::abort_transfer(
            &client,
            &transfer,
            Err(QuasiHttpError::cancelled("late")),
        )
        .await;
    }

    #[tokio::test]
    async fn test_finalize_is_reused_by_pass_through() {
        // the pass-through variant shares the response-construction policy
        let options = effective(&QuasiHttpSendOptions::default());
        let result = finalize_response(Some(Response::new(204)), &options, true).await.unwrap();
        assert!(result.response.is_some());
    }
}
