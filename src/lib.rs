//! # multiplex
//!
//! Request multiplexing over a single duplex connection.
//!
//! Any number of requests share one TCP connection: each packet carries
//! a `u32` correlation id, the server dispatches every packet on its
//! own task, and responses return whenever they are ready. The id ties
//! a response back to its request, so a slow request never holds up a
//! fast one.
//!
//! ## Architecture
//!
//! - **[`Packet`]**: correlation id plus opaque payload
//! - **[`Packer`]** / [`framing::FrameBuffer`]: length-prefixed wire
//!   codec and incremental frame extraction
//! - **[`Server`]**: bind/handle/start lifecycle; one read loop, one
//!   writer task, and one dispatch task per packet
//! - **[`Client`]**: correlation table mapping ids to pending waiters
//! - **[`Serializer`]**: pluggable payload encoding shared by both ends
//!
//! ## Wire format
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────┐
//! │ Length       │ Id           │ Payload              │
//! │ (u32 BE)     │ (u32 BE)     │ (length - 4 bytes)   │
//! └──────────────┴──────────────┴──────────────────────┘
//! ```
//!
//! The length prefix covers everything after itself. Id 0 is reserved
//! for the heartbeat `ping`/`pong` sentinels.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use multiplex::{Client, HandlerResult, Packet, Serializer, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> multiplex::Result<()> {
//!     let mut server = Server::new();
//!     server
//!         .bind("127.0.0.1", 0, ServerConfig::default())
//!         .await?
//!         .handle(|packet: Packet, _serializer: Arc<dyn Serializer>| async move {
//!             HandlerResult::Ok(packet.into_payload())
//!         });
//!     let addr = server.local_addr().unwrap();
//!     tokio::spawn(async move { server.start().await });
//!
//!     let client = Client::connect("127.0.0.1", addr.port()).await?;
//!     let reply = client.request("hello").await?;
//!     assert_eq!(&reply[..], b"hello");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod framing;
pub mod handler;
pub mod packer;
pub mod packet;
pub mod serializer;
pub mod server;

mod writer;

pub use client::{Client, ClientConfig};
pub use error::{MultiplexError, Result};
pub use handler::{BoxError, BoxFuture, HandlerResult, RequestHandler};
pub use packer::Packer;
pub use packet::{Packet, HEARTBEAT_ID, PING, PONG};
pub use serializer::{JsonSerializer, Outcome, Serializer, StringSerializer};
pub use server::{Server, ServerConfig};
