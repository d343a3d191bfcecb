//! Echo server and client sharing one multiplexed connection.
//!
//! This example demonstrates:
//! - The bind/handle/start server lifecycle
//! - A closure handler echoing each payload back
//! - A client issuing requests over a single connection
//!
//! Run with: `cargo run --example echo`

use std::sync::Arc;

use multiplex::{Client, HandlerResult, Packet, Serializer, Server, ServerConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> multiplex::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .compact()
        .init();

    let mut server = Server::new();
    server
        .bind("127.0.0.1", 0, ServerConfig::default())
        .await?
        .handle(|packet: Packet, _serializer: Arc<dyn Serializer>| async move {
            HandlerResult::Ok(packet.into_payload())
        });
    let addr = server.local_addr().expect("server is bound");

    tokio::spawn(async move {
        if let Err(e) = server.start().await {
            tracing::error!("Server error: {}", e);
        }
    });

    let client = Client::connect("127.0.0.1", addr.port()).await?;

    for message in ["hello", "multiplex", "world"] {
        let reply = client.request(message).await?;
        info!("{} -> {}", message, String::from_utf8_lossy(&reply));
    }

    Ok(())
}
