//! # wirecall
//!
//! Full-duplex framed RPC core over TCP with request/response correlation.
//!
//! One connection carries concurrent calls in both directions of the
//! request/response exchange: every frame is a small envelope (header +
//! MessagePack meta block + opaque payload), requests carry a correlation
//! id the response echoes back, and a per-connection writer task keeps
//! sends strictly ordered.
//!
//! ## Architecture
//!
//! - **protocol**: wire format, frame types, incremental frame extraction
//! - **comm**: the per-connection engine (read loop + FIFO writer task),
//!   driven through an injected [`FrameHandler`] capability
//! - **client**: correlation ids, pending-call table, stub call path
//! - **server**: service registry, per-connection dispatcher, accept loop
//! - **controller**: per-call failure/cancellation state
//!
//! ## Example
//!
//! ```ignore
//! use wirecall::{CallController, RpcClient, RpcServer};
//!
//! #[tokio::main]
//! async fn main() -> wirecall::Result<()> {
//!     let server = RpcServer::builder()
//!         .register("Echo", "Echo", |num: i64| async move { Ok(num) })
//!         .bind("127.0.0.1:0")
//!         .await?;
//!     let addr = server.local_addr()?;
//!     tokio::spawn(server.serve());
//!
//!     let client = RpcClient::connect(addr).await?;
//!     let controller = CallController::new();
//!     let echoed: i64 = client.call("Echo", "Echo", &controller, &100i64).await?;
//!     assert_eq!(echoed, 100);
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod comm;
pub mod controller;
pub mod error;
pub mod protocol;
pub mod server;
pub mod writer;

mod client;

pub use client::{CallOutcome, CompletionCallback, RpcClient};
pub use comm::{CommConfig, CommState, Communicator, FrameHandler};
pub use controller::CallController;
pub use error::{Result, WirecallError};
pub use server::{ReplyContext, RpcServer, ServerBuilder, ServiceRegistry};
