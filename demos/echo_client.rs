//! Echo client - calls the echo service through a typed stub.
//!
//! Run `echo_server` first, then:
//! ```sh
//! cargo run --example echo_client
//! ```

use serde::{Deserialize, Serialize};
use wirecall::{CallController, RpcClient};

#[derive(Serialize, Debug)]
struct EchoRequest {
    num: i32,
}

#[derive(Deserialize, Debug)]
struct EchoResponse {
    num: i32,
}

/// Typed stub over the generic call path, the shape code generation
/// would produce.
struct EchoStub<'a> {
    client: &'a RpcClient,
}

impl EchoStub<'_> {
    async fn echo(
        &self,
        controller: &CallController,
        request: &EchoRequest,
    ) -> wirecall::Result<EchoResponse> {
        self.client.call("Echo", "Echo", controller, request).await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wirecall=debug".into()),
        )
        .init();

    let client = RpcClient::connect("127.0.0.1:10002").await?;
    let stub = EchoStub { client: &client };

    let controller = CallController::new();
    let response = stub.echo(&controller, &EchoRequest { num: 100 }).await?;
    tracing::info!(num = response.num, "echo replied");

    client.shutdown().await;
    Ok(())
}
