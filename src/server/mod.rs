//! Server side: accept connections, dispatch requests, reply.
//!
//! [`ServerBuilder`] collects handlers into a [`ServiceRegistry`], then
//! binds a TCP listener. [`RpcServer::serve`] accepts connections and
//! gives each one a fresh [`Communicator`] plus dispatcher; connections
//! are fully independent, so a failure on one never affects another.
//!
//! # Example
//!
//! ```ignore
//! let server = RpcServer::builder()
//!     .register("Echo", "Echo", |req: EchoRequest| async move {
//!         Ok(EchoResponse { num: req.num })
//!     })
//!     .bind("127.0.0.1:0")
//!     .await?;
//!
//! server.serve().await?;
//! ```

mod context;
mod registry;

pub use context::ReplyContext;
pub use registry::{BoxFuture, RawHandler, ServiceRegistry, TypedHandler};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::comm::{CommConfig, CommState, Communicator, FrameHandler};
use crate::error::{Result, WirecallError};
use crate::protocol::Frame;
use crate::writer::WriterHandle;

/// Builder for configuring and binding an RPC server.
pub struct ServerBuilder {
    registry: ServiceRegistry,
    config: CommConfig,
}

impl ServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            registry: ServiceRegistry::new(),
            config: CommConfig::default(),
        }
    }

    /// Register a typed method handler.
    pub fn register<F, Req, Resp, Fut>(mut self, service: &str, method: &str, handler: F) -> Self
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        self.registry.register(service, method, handler);
        self
    }

    /// Register a handler operating on raw payload bytes.
    pub fn register_raw(mut self, service: &str, method: &str, handler: impl RawHandler) -> Self {
        self.registry.register_raw(service, method, handler);
        self
    }

    /// Override the per-connection configuration.
    pub fn config(mut self, config: CommConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind a TCP listener. The registry is frozen from here on.
    pub async fn bind(self, addr: impl ToSocketAddrs) -> Result<RpcServer> {
        let listener = TcpListener::bind(addr).await?;
        Ok(RpcServer {
            listener,
            registry: Arc::new(self.registry),
            config: self.config,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound RPC server.
pub struct RpcServer {
    listener: TcpListener,
    registry: Arc<ServiceRegistry>,
    config: CommConfig,
}

impl RpcServer {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The bound local address (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and serve connections until the process exits.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending::<()>()).await
    }

    /// Accept and serve connections until `shutdown` resolves, then stop
    /// accepting and close every live connection before returning.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut connections: Vec<Communicator> = Vec::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!(%peer, "accepted connection");
                            let dispatcher = Arc::new(ConnDispatcher {
                                registry: self.registry.clone(),
                                peer,
                            });
                            let comm =
                                Communicator::spawn(stream, dispatcher, self.config.clone());

                            connections.retain(|c| c.state() != CommState::Closed);
                            connections.push(comm);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                        }
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        tracing::debug!("server shutting down, closing connections");
        for connection in &connections {
            connection.close().await;
        }
        Ok(())
    }
}

/// Per-connection frame handler: decode requests, dispatch, reply.
struct ConnDispatcher {
    registry: Arc<ServiceRegistry>,
    peer: SocketAddr,
}

impl FrameHandler for ConnDispatcher {
    fn frame_received(&self, frame: Frame, writer: &WriterHandle) {
        if !frame.is_request() {
            tracing::warn!(peer = %self.peer, id = frame.id(), "discarding non-request frame");
            return;
        }

        let ctx = ReplyContext::new(&frame.meta, writer.clone());
        let registry = self.registry.clone();
        let payload = frame.payload;

        // The handler is a black box that may take a while; run it off
        // the read task so the connection keeps making progress.
        tokio::spawn(async move {
            let result = registry
                .dispatch(ctx.service(), ctx.method(), payload)
                .await;

            let reply = match result {
                Ok(response) => ctx.ok(response).await,
                Err(e) => {
                    match &e {
                        WirecallError::UnknownMethod { service, method } => {
                            tracing::debug!(id = ctx.id(), %service, %method, "unknown method");
                        }
                        _ => {
                            tracing::debug!(id = ctx.id(), error = %e, "handler failed");
                        }
                    }
                    ctx.fail(&e.to_string()).await
                }
            };

            if let Err(e) = reply {
                tracing::warn!(id = ctx.id(), error = %e, "failed to send response");
            }
        });
    }

    fn connection_closed(&self, error: WirecallError) {
        tracing::debug!(peer = %self.peer, error = %error, "connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, FrameBuffer, FrameMeta};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn dispatcher_over_duplex(
        registry: ServiceRegistry,
    ) -> (Communicator, tokio::io::DuplexStream) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let (reader, write_half) = tokio::io::split(local);
        let dispatcher = Arc::new(ConnDispatcher {
            registry: Arc::new(registry),
            peer: "127.0.0.1:0".parse().unwrap(),
        });
        let comm = Communicator::spawn_io(reader, write_half, dispatcher, CommConfig::default());
        (comm, remote)
    }

    async fn read_one_frame(remote: &mut tokio::io::DuplexStream) -> crate::protocol::Frame {
        let mut parser = FrameBuffer::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = remote.read(&mut buf).await.unwrap();
            assert!(n > 0, "peer closed before a frame arrived");
            let mut frames = parser.push(&buf[..n]).unwrap();
            if let Some(frame) = frames.pop() {
                return frame;
            }
        }
    }

    #[tokio::test]
    async fn test_request_dispatched_and_answered() {
        let mut registry = ServiceRegistry::new();
        registry.register("Echo", "Echo", |n: i64| async move { Ok(n) });
        let (_comm, mut remote) = dispatcher_over_duplex(registry);

        let payload = crate::codec::MsgPackCodec::encode(&41i64).unwrap();
        let request = build_frame(&FrameMeta::request(5, "Echo", "Echo"), &payload).unwrap();
        remote.write_all(&request).await.unwrap();

        let frame = read_one_frame(&mut remote).await;
        assert_eq!(frame.id(), 5);
        assert!(frame.is_response());
        assert!(!frame.is_failed());
        let echoed: i64 = crate::codec::MsgPackCodec::decode(frame.payload()).unwrap();
        assert_eq!(echoed, 41);
    }

    #[tokio::test]
    async fn test_unknown_method_yields_failed_response() {
        let (_comm, mut remote) = dispatcher_over_duplex(ServiceRegistry::new());

        let request = build_frame(&FrameMeta::request(9, "Ghost", "Walk"), b"").unwrap();
        remote.write_all(&request).await.unwrap();

        let frame = read_one_frame(&mut remote).await;
        assert_eq!(frame.id(), 9);
        assert!(frame.is_failed());
        let text = frame.meta.error_text.as_deref().unwrap();
        assert!(text.contains("Ghost.Walk"), "got: {text}");
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn test_connection_usable_after_unknown_method() {
        let mut registry = ServiceRegistry::new();
        registry.register("Echo", "Echo", |n: i64| async move { Ok(n) });
        let (_comm, mut remote) = dispatcher_over_duplex(registry);

        let miss = build_frame(&FrameMeta::request(1, "Ghost", "Walk"), b"").unwrap();
        remote.write_all(&miss).await.unwrap();
        let frame = read_one_frame(&mut remote).await;
        assert!(frame.is_failed());

        let payload = crate::codec::MsgPackCodec::encode(&7i64).unwrap();
        let hit = build_frame(&FrameMeta::request(2, "Echo", "Echo"), &payload).unwrap();
        remote.write_all(&hit).await.unwrap();
        let frame = read_one_frame(&mut remote).await;
        assert_eq!(frame.id(), 2);
        assert!(!frame.is_failed());
    }

    #[tokio::test]
    async fn test_handler_error_becomes_failed_response() {
        let mut registry = ServiceRegistry::new();
        registry.register("Calc", "Div", |(a, b): (i64, i64)| async move {
            if b == 0 {
                Err(WirecallError::Remote("division by zero".to_string()))
            } else {
                Ok(a / b)
            }
        });
        let (_comm, mut remote) = dispatcher_over_duplex(registry);

        let payload = crate::codec::MsgPackCodec::encode(&(1i64, 0i64)).unwrap();
        let request = build_frame(&FrameMeta::request(3, "Calc", "Div"), &payload).unwrap();
        remote.write_all(&request).await.unwrap();

        let frame = read_one_frame(&mut remote).await;
        assert!(frame.is_failed());
        assert!(frame
            .meta
            .error_text
            .as_deref()
            .unwrap()
            .contains("division by zero"));
    }

    #[tokio::test]
    async fn test_response_frame_to_server_is_discarded() {
        let mut registry = ServiceRegistry::new();
        registry.register("Echo", "Echo", |n: i64| async move { Ok(n) });
        let (_comm, mut remote) = dispatcher_over_duplex(registry);

        // A stray response frame must not produce a reply or kill the
        // connection.
        let stray = build_frame(&FrameMeta::response(77, "Echo", "Echo"), b"").unwrap();
        remote.write_all(&stray).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let payload = crate::codec::MsgPackCodec::encode(&1i64).unwrap();
        let request = build_frame(&FrameMeta::request(78, "Echo", "Echo"), &payload).unwrap();
        remote.write_all(&request).await.unwrap();

        let frame = read_one_frame(&mut remote).await;
        assert_eq!(frame.id(), 78);
    }

    #[tokio::test]
    async fn test_builder_binds_ephemeral_port() {
        let server = RpcServer::builder()
            .register("Echo", "Echo", |n: i64| async move { Ok(n) })
            .bind("127.0.0.1:0")
            .await
            .unwrap();

        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }
}
