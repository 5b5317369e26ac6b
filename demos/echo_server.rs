//! Echo server - serves the classic echo service over TCP.
//!
//! Run with:
//! ```sh
//! cargo run --example echo_server
//! ```
//! then point `echo_client` at the printed address.

use serde::{Deserialize, Serialize};
use wirecall::RpcServer;

#[derive(Deserialize, Debug)]
struct EchoRequest {
    num: i32,
}

#[derive(Serialize, Debug)]
struct EchoResponse {
    num: i32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wirecall=debug".into()),
        )
        .init();

    let server = RpcServer::builder()
        .register("Echo", "Echo", |request: EchoRequest| async move {
            Ok(EchoResponse { num: request.num })
        })
        .bind("127.0.0.1:10002")
        .await?;

    tracing::info!(addr = %server.local_addr()?, "echo server listening");
    server.serve().await?;
    Ok(())
}
