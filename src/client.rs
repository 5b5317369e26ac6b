//! Client side of a connection: issue calls, correlate responses.
//!
//! [`RpcClient`] wraps a [`Communicator`] and implements the generic call
//! path that generated stubs target: allocate a correlation id, register a
//! pending entry, send the request frame, and complete the entry when the
//! matching response arrives. Completion is a callback contract
//! ([`RpcClient::start_call`]); the awaitable adapters
//! ([`RpcClient::call_raw`], [`RpcClient::call`]) build on it with a
//! single-use completion signal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;

use crate::codec::MsgPackCodec;
use crate::comm::{CommConfig, Communicator, FrameHandler};
use crate::controller::CallController;
use crate::error::{Result, WirecallError};
use crate::protocol::{Frame, FrameMeta};
use crate::writer::WriterHandle;

/// Outcome handed to a call's completion callback: the raw response
/// payload, or why the call failed.
pub type CallOutcome = Result<Bytes>;

/// Completion callback for [`RpcClient::start_call`]. Invoked exactly once
/// per issued call, after the controller has been updated.
pub type CompletionCallback = Box<dyn FnOnce(CallOutcome) + Send + 'static>;

struct PendingCall {
    controller: CallController,
    complete: CompletionCallback,
}

struct PendingTable {
    next_id: u64,
    calls: HashMap<u64, PendingCall>,
    closed: bool,
}

impl PendingTable {
    /// Allocate the next unused id. Monotonic; id 0 is never issued, and
    /// wraparound skips any id still pending.
    fn allocate_id(&mut self) -> u64 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if id != 0 && !self.calls.contains_key(&id) {
                return id;
            }
        }
    }
}

struct ClientState {
    pending: Mutex<PendingTable>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            pending: Mutex::new(PendingTable {
                next_id: 1,
                calls: HashMap::new(),
                closed: false,
            }),
        }
    }

    fn take(&self, id: u64) -> Option<PendingCall> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .remove(&id)
    }

    /// Cancel hook installed on each call's controller: tear the entry
    /// down and complete it. A response arriving later hits the
    /// unknown-id path and is discarded.
    fn cancel(&self, id: u64) {
        if let Some(call) = self.take(id) {
            tracing::debug!(id, "call canceled");
            (call.complete)(Err(WirecallError::Canceled));
        }
    }

    /// Fail every pending call. Each completion fires exactly once; the
    /// table is left empty and closed to new calls.
    fn fail_all(&self) {
        let drained: Vec<PendingCall> = {
            let mut table = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            table.closed = true;
            table.calls.drain().map(|(_, call)| call).collect()
        };

        for call in drained {
            call.controller.set_failed("connection closed");
            (call.complete)(Err(WirecallError::ConnectionClosed));
        }
    }
}

impl FrameHandler for ClientState {
    fn frame_received(&self, frame: Frame, _writer: &WriterHandle) {
        if !frame.is_response() {
            tracing::warn!(id = frame.id(), "discarding non-response frame");
            return;
        }

        // Unknown id: already completed, canceled, or forged. Harmless.
        let Some(call) = self.take(frame.id()) else {
            tracing::debug!(id = frame.id(), "response for unknown call id, discarding");
            return;
        };

        if frame.is_failed() {
            let text = frame
                .meta
                .error_text
                .clone()
                .unwrap_or_else(|| "call failed".to_string());
            call.controller.set_failed(&text);
            (call.complete)(Err(WirecallError::Remote(text)));
        } else {
            (call.complete)(Ok(frame.payload));
        }
    }

    fn connection_closed(&self, error: WirecallError) {
        tracing::debug!(error = %error, "connection closed, failing pending calls");
        self.fail_all();
    }
}

/// RPC client over one TCP connection.
pub struct RpcClient {
    comm: Communicator,
    state: Arc<ClientState>,
}

impl RpcClient {
    /// Connect to a server with the default configuration.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::connect_with_config(addr, CommConfig::default()).await
    }

    /// Connect to a server with a custom configuration.
    pub async fn connect_with_config(addr: impl ToSocketAddrs, config: CommConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream, config))
    }

    /// Build a client over an already connected stream.
    pub fn from_stream(stream: TcpStream, config: CommConfig) -> Self {
        let state = Arc::new(ClientState::new());
        let comm = Communicator::spawn(stream, state.clone(), config);
        Self { comm, state }
    }

    /// Issue a call with an explicit completion callback, the generic
    /// path generated stubs target.
    ///
    /// Registers the pending entry, installs the controller's cancel hook,
    /// and sends the request frame. Returns the allocated correlation id.
    /// `on_complete` is invoked exactly once if this returns `Ok`, and
    /// never if it returns `Err` (the call was not issued).
    pub async fn start_call(
        &self,
        service: &str,
        method: &str,
        controller: &CallController,
        request: Bytes,
        on_complete: CompletionCallback,
    ) -> Result<u64> {
        let id = {
            let mut table = self
                .state
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if table.closed {
                return Err(WirecallError::ConnectionClosed);
            }
            let id = table.allocate_id();
            table.calls.insert(
                id,
                PendingCall {
                    controller: controller.clone(),
                    complete: on_complete,
                },
            );
            id
        };

        let cancel_state = self.state.clone();
        controller.notify_on_cancel(move || cancel_state.cancel(id));

        let meta = FrameMeta::request(id, service, method);
        if let Err(e) = self.comm.send(meta, request).await {
            // The request never reached the wire; withdraw the entry so
            // the caller's Err is the only report.
            drop(self.state.take(id));
            controller.set_failed(e.to_string());
            return Err(e);
        }

        Ok(id)
    }

    /// Issue a call and await its completion.
    ///
    /// The wait is a single-use signal satisfied by the completion path;
    /// it is safe against completion happening before the await begins.
    pub async fn call_raw(
        &self,
        service: &str,
        method: &str,
        controller: &CallController,
        request: Bytes,
    ) -> Result<Bytes> {
        let (tx, rx) = oneshot::channel();
        self.start_call(
            service,
            method,
            controller,
            request,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        )
        .await?;

        match rx.await {
            Ok(outcome) => outcome,
            // Completion dropped without firing; only possible if the
            // runtime tore the connection down mid-flight.
            Err(_) => Err(WirecallError::ConnectionClosed),
        }
    }

    /// Typed call: MessagePack-encode the request, decode the response.
    pub async fn call<Req, Resp>(
        &self,
        service: &str,
        method: &str,
        controller: &CallController,
        request: &Req,
    ) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = Bytes::from(MsgPackCodec::encode(request)?);
        let raw = self.call_raw(service, method, controller, payload).await?;
        MsgPackCodec::decode(&raw)
    }

    /// Number of calls currently awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.state
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .len()
    }

    /// Shut the client down: stop issuing new calls, close the underlying
    /// connection, then fail whatever is still pending. Safe to call more
    /// than once.
    pub async fn shutdown(&self) {
        {
            let mut table = self
                .state
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            table.closed = true;
        }
        self.comm.close().await;
        self.state.fail_all();
    }
}
