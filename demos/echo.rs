//! Echo round trip - a responder and a client on one endpoint.
//!
//! Binds the endpoint given as the first argument (default
//! `tcp://127.0.0.1:0`), serves an echo handler on it, then sends a few
//! concurrent requests and prints the replies.
//!
//! ```text
//! RUST_LOG=corrwire=debug cargo run --example echo -- unix:///tmp/echo.sock
//! ```

use std::sync::Arc;

use corrwire::{Client, CorrwireError, Endpoint, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Serialize, Deserialize, Debug)]
struct Greeting {
    message: String,
    count: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("corrwire=info".parse()?),
        )
        .init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tcp://127.0.0.1:0".to_string());
    let listener = Endpoint::parse(&address)?.bind().await?;
    let endpoint = listener.local_endpoint()?;
    tracing::info!("Listening on {}", endpoint);

    let server = tokio::spawn(async move {
        let stream = listener.accept().await?;
        Responder::builder()
            .serve(stream, |request| async move { Ok::<_, CorrwireError>(request) })
            .await
    });

    let client = Arc::new(Client::builder().connect_endpoint(&endpoint).await?);

    let reply = client.send(&json!({"a": 1, "b": "x", "c": [true, null]})).await?;
    println!("echo: {reply}");

    let mut tasks = Vec::new();
    for count in 0..4 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let greeting = Greeting {
                message: format!("hello #{count}"),
                count,
            };
            client.call::<_, Greeting>(&greeting).await
        }));
    }
    for task in tasks {
        println!("typed: {:?}", task.await??);
    }

    client.disconnect().await;
    server.await??;
    Ok(())
}
