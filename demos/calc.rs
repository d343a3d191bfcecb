//! Calculator service over one multiplexed connection.
//!
//! This example demonstrates:
//! - Swapping in the JSON serializer on both ends
//! - Using the serializer handed to the handler
//! - Handler failures surfacing as remote errors while the
//!   connection keeps serving
//!
//! Requests are `<op> <a> <b>` strings; the last one divides by zero
//! on purpose.
//!
//! Run with: `cargo run --example calc`

use std::sync::Arc;

use multiplex::{
    Client, ClientConfig, HandlerResult, JsonSerializer, Packet, Serializer, Server, ServerConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn eval(expr: &str) -> Result<i64, String> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    let &[op, a, b] = parts.as_slice() else {
        return Err(format!("expected `<op> <a> <b>`, got {:?}", expr));
    };
    let a: i64 = a.parse().map_err(|_| format!("bad operand {:?}", a))?;
    let b: i64 = b.parse().map_err(|_| format!("bad operand {:?}", b))?;

    match op {
        "add" => Ok(a + b),
        "sub" => Ok(a - b),
        "mul" => Ok(a * b),
        "div" if b == 0 => Err("division by zero".to_string()),
        "div" => Ok(a / b),
        other => Err(format!("unknown op {:?}", other)),
    }
}

#[tokio::main]
async fn main() -> multiplex::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut server = Server::with_serializer(JsonSerializer);
    server
        .bind("127.0.0.1", 0, ServerConfig::default())
        .await?
        .handle(|packet: Packet, serializer: Arc<dyn Serializer>| async move {
            let data = serializer.deserialize(packet.payload())?.into_result()?;
            let expr = String::from_utf8_lossy(&data);
            let value = eval(&expr)?;
            HandlerResult::Ok(value.to_string().into())
        });
    let addr = server.local_addr().expect("server is bound");

    tokio::spawn(async move {
        if let Err(e) = server.start().await {
            tracing::error!("Server error: {}", e);
        }
    });

    let client = Client::connect_with(
        "127.0.0.1",
        addr.port(),
        JsonSerializer,
        ClientConfig::default(),
    )
    .await?;

    for expr in ["add 2 3", "mul 7 6", "div 10 2", "div 1 0"] {
        match client.request(expr).await {
            Ok(reply) => info!("{} = {}", expr, String::from_utf8_lossy(&reply)),
            Err(e) => info!("{} failed: {}", expr, e),
        }
    }

    Ok(())
}
