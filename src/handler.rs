//! Request handler contract.
//!
//! The handler is a caller-supplied capability with a single method,
//! invoked once per non-heartbeat inbound packet together with the
//! active serializer. One handler serves a whole server; requests are
//! distinguished by their payloads, not by method routing.
//!
//! Handler failures are ordinary values: the dispatcher captures them
//! and serializes them into the response packet, so a handler may fail
//! freely without ever touching the connection.
//!
//! Implemented for async closures via a blanket impl:
//!
//! ```
//! use std::sync::Arc;
//!
//! use multiplex::handler::{HandlerResult, RequestHandler};
//! use multiplex::serializer::Serializer;
//! use multiplex::Packet;
//!
//! fn assert_handler(_: impl RequestHandler) {}
//!
//! assert_handler(|packet: Packet, _serializer: Arc<dyn Serializer>| async move {
//!     HandlerResult::Ok(packet.into_payload())
//! });
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

use crate::packet::Packet;
use crate::serializer::Serializer;

/// Failure type a handler may raise.
///
/// Captured by the dispatcher and reified into the response payload,
/// never propagated to the connection loop.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for handler functions.
pub type HandlerResult = std::result::Result<Bytes, BoxError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for request handlers.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle one inbound packet, producing the response payload value.
    fn call(
        &self,
        packet: Packet,
        serializer: Arc<dyn Serializer>,
    ) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> RequestHandler for F
where
    F: Fn(Packet, Arc<dyn Serializer>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(
        &self,
        packet: Packet,
        serializer: Arc<dyn Serializer>,
    ) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(packet, serializer))
    }
}
