//! Multiplexed request/response server over a single TCP listener.
//!
//! The server follows a bind/handle/start lifecycle:
//!
//! 1. [`Server::bind`] opens the TCP listener (exactly once)
//! 2. [`Server::handle`] installs the request handler
//! 3. [`Server::start`] runs the accept loop
//!
//! Each accepted connection gets its own read loop plus a dedicated
//! writer task. Every decoded packet is dispatched on its own task, so
//! responses leave in completion order rather than arrival order and a
//! slow request never holds up the requests behind it. The correlation
//! id carried by each packet is what lets the peer match responses back
//! to requests.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use multiplex::{HandlerResult, Packet, Serializer, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> multiplex::Result<()> {
//!     let mut server = Server::new();
//!     server
//!         .bind("127.0.0.1", 9501, ServerConfig::default())
//!         .await?
//!         .handle(|packet: Packet, _serializer: Arc<dyn Serializer>| async move {
//!             HandlerResult::Ok(packet.into_payload())
//!         });
//!     server.start().await
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinError;

use crate::error::{MultiplexError, Result};
use crate::framing::{FrameBuffer, DEFAULT_MAX_FRAME_LENGTH};
use crate::handler::RequestHandler;
use crate::packer::Packer;
use crate::packet::Packet;
use crate::serializer::{Outcome, Serializer, StringSerializer};
use crate::writer::{spawn_writer_task, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Per-listener configuration supplied at bind time.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Maximum frame length in bytes accepted on this listener, length
    /// prefix included. Defaults to 2 MiB.
    pub max_frame_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

/// A multiplexing server.
///
/// Must be bound exactly once and given a handler before `start()`.
pub struct Server {
    /// Frame codec shared by every connection.
    packer: Packer,
    /// Serializer handed to the handler and used for responses.
    serializer: Arc<dyn Serializer>,
    /// Request handler; required before `start()`.
    handler: Option<Arc<dyn RequestHandler>>,
    /// Bound listener; set by `bind()`.
    listener: Option<TcpListener>,
    /// Maximum accepted frame length, from the bind-time config.
    max_frame_length: usize,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("packer", &self.packer)
            .field("handler", &self.handler.as_ref().map(|_| "RequestHandler"))
            .field("listener", &self.listener)
            .field("max_frame_length", &self.max_frame_length)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Create a server using the default [`StringSerializer`].
    pub fn new() -> Self {
        Self::with_serializer(StringSerializer)
    }

    /// Create a server using a custom serializer.
    pub fn with_serializer(serializer: impl Serializer) -> Self {
        Self {
            packer: Packer::new(),
            serializer: Arc::new(serializer),
            handler: None,
            listener: None,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }

    /// Bind the listener to `host:port`.
    ///
    /// Port 0 asks the OS for an ephemeral port; use [`Server::local_addr`]
    /// to discover it. Binding twice fails with [`MultiplexError::Bind`]
    /// and leaves the original binding untouched.
    pub async fn bind(&mut self, host: &str, port: u16, config: ServerConfig) -> Result<&mut Self> {
        if self.listener.is_some() {
            return Err(MultiplexError::Bind(
                "the server is already bound".to_string(),
            ));
        }

        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| MultiplexError::Bind(e.to_string()))?;

        if let Ok(addr) = listener.local_addr() {
            tracing::debug!("Bound to {}", addr);
        }

        self.listener = Some(listener);
        self.max_frame_length = config.max_frame_length;
        Ok(self)
    }

    /// Install the request handler invoked for every non-heartbeat packet.
    ///
    /// Closures of the shape `Fn(Packet, Arc<dyn Serializer>) -> Future`
    /// work directly; see [`RequestHandler`].
    pub fn handle<H>(&mut self, handler: H) -> &mut Self
    where
        H: RequestHandler,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// The serializer connections of this server use.
    pub fn serializer(&self) -> Arc<dyn Serializer> {
        self.serializer.clone()
    }

    /// Address of the bound listener, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Run the accept loop.
    ///
    /// Fails fast with [`MultiplexError::Start`] when the server was
    /// never bound or has no handler. Otherwise runs until the task is
    /// cancelled, spawning one connection task per accepted stream.
    pub async fn start(&mut self) -> Result<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| MultiplexError::Start("the server must be bound".to_string()))?;
        let handler = self
            .handler
            .clone()
            .ok_or_else(|| MultiplexError::Start("a request handler must be set".to_string()))?;

        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Listening on {}", addr);
        }

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                    continue;
                }
            };
            tracing::debug!("Accepted connection from {}", peer);

            let packer = self.packer;
            let serializer = self.serializer.clone();
            let handler = handler.clone();
            let max_frame_length = self.max_frame_length;

            tokio::spawn(async move {
                if let Err(e) =
                    Self::serve_connection(stream, packer, serializer, handler, max_frame_length)
                        .await
                {
                    tracing::error!("Connection error from {}: {}", peer, e);
                }
            });
        }
    }

    /// Serve one accepted connection until EOF or a fatal frame error.
    async fn serve_connection(
        stream: TcpStream,
        packer: Packer,
        serializer: Arc<dyn Serializer>,
        handler: Arc<dyn RequestHandler>,
        max_frame_length: usize,
    ) -> Result<()> {
        let (reader, write_half) = stream.into_split();

        // The write half is owned by a single writer task; dispatch
        // tasks reach it through cloned handles. The task winds down
        // once the read loop and all in-flight dispatches are done.
        let (writer, _writer_task) = spawn_writer_task(write_half, DEFAULT_CHANNEL_CAPACITY);

        Self::connection_loop(reader, packer, serializer, handler, writer, max_frame_length).await
    }

    /// Read loop for one connection: extract frames, spawn one dispatch
    /// task per packet.
    async fn connection_loop<R>(
        mut reader: R,
        packer: Packer,
        serializer: Arc<dyn Serializer>,
        handler: Arc<dyn RequestHandler>,
        writer: WriterHandle,
        max_frame_length: usize,
    ) -> Result<()>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        use tokio::io::AsyncReadExt;

        let mut frames = FrameBuffer::new(max_frame_length);
        let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => return Ok(()), // Peer closed the connection
                Ok(n) => n,
                Err(e) => return Err(MultiplexError::Io(e)),
            };

            // An oversized or malformed frame poisons this connection
            // only; other connections keep going.
            let extracted = frames.push(&buf[..n])?;

            for frame in extracted {
                let packet = packer.unpack(frame)?;
                let serializer = serializer.clone();
                let handler = handler.clone();
                let writer = writer.clone();

                // One task per packet, so a slow handler never blocks
                // the packets behind it.
                tokio::spawn(Self::dispatch(packet, packer, serializer, handler, writer));
            }
        }
    }

    /// Dispatch one packet: answer heartbeats inline, run the handler
    /// for everything else, and send exactly one correlated response.
    async fn dispatch(
        packet: Packet,
        packer: Packer,
        serializer: Arc<dyn Serializer>,
        handler: Arc<dyn RequestHandler>,
        writer: WriterHandle,
    ) {
        // Heartbeats never reach the handler. A PING is answered with
        // PONG; a stray PONG is dropped without a reply.
        if packet.is_heartbeat() {
            if packet.is_ping() {
                let frame = packer.pack(&Packet::pong());
                if let Err(e) = writer.send(frame).await {
                    tracing::debug!("Failed to answer ping: {}", e);
                }
            }
            return;
        }

        let id = packet.id();
        let outcome = Self::run_handler(handler, packet, serializer.clone()).await;

        // Whatever happened above, the peer gets exactly one response
        // carrying the request's id.
        let payload = match serializer.serialize(&outcome) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Serializer error for request {}: {}", id, e);
                let fallback = Outcome::failure(format!("serialization failed: {}", e));
                serializer.serialize(&fallback).unwrap_or_else(|_| Bytes::new())
            }
        };

        let frame = packer.pack(&Packet::new(id, payload));
        if let Err(e) = writer.send(frame).await {
            tracing::error!("Failed to send response for request {}: {}", id, e);
        }
    }

    /// Run the handler, capturing errors and panics as [`Outcome`]s.
    async fn run_handler(
        handler: Arc<dyn RequestHandler>,
        packet: Packet,
        serializer: Arc<dyn Serializer>,
    ) -> Outcome {
        let id = packet.id();

        // The handler runs on its own task so a panic surfaces here as
        // a JoinError instead of tearing down the dispatch.
        let task = tokio::spawn(async move { handler.call(packet, serializer).await });

        match task.await {
            Ok(Ok(data)) => Outcome::success(data),
            Ok(Err(e)) => {
                tracing::debug!("Handler failed for request {}: {}", id, e);
                Outcome::failure(e.to_string())
            }
            Err(e) => {
                let reason = panic_message(e);
                tracing::error!("Handler crashed for request {}: {}", id, reason);
                Outcome::failure(reason)
            }
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a dispatch task failure as a failure message for the peer.
fn panic_message(err: JoinError) -> String {
    if err.is_panic() {
        let panic = err.into_panic();
        if let Some(s) = panic.downcast_ref::<&str>() {
            format!("handler panicked: {}", s)
        } else if let Some(s) = panic.downcast_ref::<String>() {
            format!("handler panicked: {}", s)
        } else {
            "handler panicked".to_string()
        }
    } else {
        "handler task cancelled".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::io::{duplex, AsyncRead, AsyncReadExt};

    use crate::handler::HandlerResult;

    async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Packet {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut frame = Vec::with_capacity(4 + len);
        frame.extend_from_slice(&len_buf);
        frame.resize(4 + len, 0);
        reader.read_exact(&mut frame[4..]).await.unwrap();

        Packer::new().unpack(frame.into()).unwrap()
    }

    fn counting_handler(calls: Arc<AtomicUsize>) -> Arc<dyn RequestHandler> {
        Arc::new(move |_packet: Packet, _serializer: Arc<dyn Serializer>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                HandlerResult::Ok(Bytes::new())
            }
        })
    }

    #[test]
    fn test_config_default() {
        assert_eq!(ServerConfig::default().max_frame_length, 2 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_start_unbound_fails() {
        let err = Server::new().start().await.unwrap_err();
        assert!(matches!(err, MultiplexError::Start(_)));
        assert!(err.to_string().contains("bound"));
    }

    #[tokio::test]
    async fn test_start_without_handler_fails() {
        let mut server = Server::new();
        server
            .bind("127.0.0.1", 0, ServerConfig::default())
            .await
            .unwrap();

        let err = server.start().await.unwrap_err();
        assert!(matches!(err, MultiplexError::Start(_)));
        assert!(err.to_string().contains("handler"));
    }

    #[tokio::test]
    async fn test_double_bind_rejected() {
        let mut server = Server::new();
        server
            .bind("127.0.0.1", 0, ServerConfig::default())
            .await
            .unwrap();
        let first = server.local_addr().unwrap();

        let err = server
            .bind("127.0.0.1", 0, ServerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MultiplexError::Bind(_)));

        // The original binding stays usable.
        assert_eq!(server.local_addr(), Some(first));
    }

    #[tokio::test]
    async fn test_bind_address_in_use() {
        let mut first = Server::new();
        first
            .bind("127.0.0.1", 0, ServerConfig::default())
            .await
            .unwrap();
        let port = first.local_addr().unwrap().port();

        let mut second = Server::new();
        let err = second
            .bind("127.0.0.1", port, ServerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MultiplexError::Bind(_)));
    }

    #[tokio::test]
    async fn test_dispatch_answers_ping_and_drops_stray_pong() {
        let (client, mut peer) = duplex(4096);
        let (writer, _task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);
        let packer = Packer::new();
        let serializer: Arc<dyn Serializer> = Arc::new(StringSerializer);

        let calls = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(calls.clone());

        Server::dispatch(
            Packet::pong(),
            packer,
            serializer.clone(),
            handler.clone(),
            writer.clone(),
        )
        .await;
        Server::dispatch(Packet::ping(), packer, serializer, handler, writer).await;

        // The only frame on the wire is the PONG answering our PING;
        // the stray PONG wrote nothing and the handler never ran.
        let reply = read_frame(&mut peer).await;
        assert!(reply.is_pong());
        assert_eq!(reply.id(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let mut probe = [0u8; 1];
        let extra = tokio::time::timeout(Duration::from_millis(50), peer.read(&mut probe)).await;
        match extra {
            // EOF (writer task gone) or silence: either way, no extra frame.
            Ok(Ok(0)) | Err(_) => {}
            other => panic!("unexpected extra data: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatch_turns_handler_error_into_response() {
        let (client, mut peer) = duplex(4096);
        let (writer, _task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);
        let serializer: Arc<dyn Serializer> = Arc::new(StringSerializer);

        let handler: Arc<dyn RequestHandler> =
            Arc::new(|_packet: Packet, _serializer: Arc<dyn Serializer>| async move {
                HandlerResult::Err("boom".into())
            });

        Server::dispatch(Packet::new(7, "req"), Packer::new(), serializer, handler, writer).await;

        let reply = read_frame(&mut peer).await;
        assert_eq!(reply.id(), 7);
        assert_eq!(reply.payload(), b"boom");
    }

    #[tokio::test]
    async fn test_dispatch_turns_panic_into_response() {
        let (client, mut peer) = duplex(4096);
        let (writer, _task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);
        let serializer: Arc<dyn Serializer> = Arc::new(StringSerializer);

        let handler: Arc<dyn RequestHandler> =
            Arc::new(|packet: Packet, _serializer: Arc<dyn Serializer>| async move {
                assert!(packet.payload() != b"explode", "kaboom");
                HandlerResult::Ok(packet.into_payload())
            });

        Server::dispatch(
            Packet::new(9, "explode"),
            Packer::new(),
            serializer,
            handler,
            writer,
        )
        .await;

        let reply = read_frame(&mut peer).await;
        assert_eq!(reply.id(), 9);
        let message = String::from_utf8_lossy(reply.payload()).into_owned();
        assert!(message.contains("panicked"));
        assert!(message.contains("kaboom"));
    }
}
