//! Multiplexing client: one connection, many in-flight requests.
//!
//! [`Client::connect`] opens a single TCP connection and splits it into
//! a read loop, a writer task, and an optional heartbeat task. Each
//! call to [`Client::request`] claims a fresh correlation id, parks a
//! oneshot waiter in the pending table, and returns once the response
//! carrying that id comes back. Because responses are matched by id
//! rather than by order, any number of requests can be in flight at the
//! same time and slow ones never delay fast ones.
//!
//! # Example
//!
//! ```no_run
//! use multiplex::Client;
//!
//! #[tokio::main]
//! async fn main() -> multiplex::Result<()> {
//!     let client = Client::connect("127.0.0.1", 9501).await?;
//!     let reply = client.request("hello").await?;
//!     println!("{}", String::from_utf8_lossy(&reply));
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::{MultiplexError, Result};
use crate::framing::{FrameBuffer, DEFAULT_MAX_FRAME_LENGTH};
use crate::packer::Packer;
use crate::packet::{Packet, HEARTBEAT_ID};
use crate::serializer::{Outcome, Serializer, StringSerializer};
use crate::writer::{spawn_writer_task, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Default interval between heartbeat pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Default time to wait for a response before giving up on a request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client-side connection configuration.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// Maximum frame length in bytes accepted from the server, length
    /// prefix included. Defaults to 2 MiB.
    pub max_frame_length: usize,
    /// Interval between heartbeat pings keeping an idle connection
    /// alive. `None` disables heartbeats. Defaults to 20 seconds.
    pub heartbeat_interval: Option<Duration>,
    /// How long [`Client::request`] waits for a response. `None` waits
    /// forever. Defaults to 10 seconds.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            heartbeat_interval: Some(DEFAULT_HEARTBEAT_INTERVAL),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

/// Requests parked until their correlated response arrives.
type PendingMap = Arc<Mutex<HashMap<u32, oneshot::Sender<Packet>>>>;

/// A connected multiplexing client.
///
/// `request()` takes `&self`, so one client behind an [`Arc`] can serve
/// any number of concurrent callers.
pub struct Client {
    /// Handle for queueing frames onto the writer task.
    writer: WriterHandle,
    /// In-flight requests keyed by correlation id.
    pending: PendingMap,
    /// Next request id; 0 stays reserved for heartbeats.
    next_id: AtomicU32,
    /// Serializer shared with the server.
    serializer: Arc<dyn Serializer>,
    /// Frame codec.
    packer: Packer,
    /// Per-request response deadline.
    request_timeout: Option<Duration>,
    /// Read loop task; aborted on drop.
    read_task: JoinHandle<()>,
    /// Heartbeat task; aborted on drop.
    heartbeat_task: Option<JoinHandle<()>>,
    /// Writer task handle.
    _writer_task: JoinHandle<Result<()>>,
}

impl Client {
    /// Connect using the default [`StringSerializer`] and configuration.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with(host, port, StringSerializer, ClientConfig::default()).await
    }

    /// Connect with a custom serializer and configuration.
    ///
    /// The serializer must match the one the server was built with.
    pub async fn connect_with(
        host: &str,
        port: u16,
        serializer: impl Serializer,
        config: ClientConfig,
    ) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;

        let (read_half, write_half) = stream.into_split();
        let (writer, writer_task) = spawn_writer_task(write_half, DEFAULT_CHANNEL_CAPACITY);

        let packer = Packer::new();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let read_task = {
            let pending = pending.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    Self::read_loop(read_half, packer, pending.clone(), config.max_frame_length)
                        .await
                {
                    tracing::error!("Read loop error: {}", e);
                }
                // Drop every parked waiter; their responses can no
                // longer arrive.
                pending.lock().await.clear();
            })
        };

        let heartbeat_task = config.heartbeat_interval.map(|interval| {
            let writer = writer.clone();
            tokio::spawn(Self::heartbeat_loop(writer, packer, interval))
        });

        Ok(Self {
            writer,
            pending,
            next_id: AtomicU32::new(1),
            serializer: Arc::new(serializer),
            packer,
            request_timeout: config.request_timeout,
            read_task,
            heartbeat_task,
            _writer_task: writer_task,
        })
    }

    /// Send one request and wait for its correlated response.
    ///
    /// Fails with [`MultiplexError::Remote`] when the handler on the
    /// other side reported a failure, [`MultiplexError::RequestTimeout`]
    /// when the deadline passes, and [`MultiplexError::ConnectionClosed`]
    /// when the connection goes away while waiting.
    pub async fn request(&self, payload: impl Into<Bytes>) -> Result<Bytes> {
        let id = next_request_id(&self.next_id);
        let body = self.serializer.serialize(&Outcome::success(payload.into()))?;
        let frame = self.packer.pack(&Packet::new(id, body));

        // Park the waiter before sending so a fast response cannot
        // slip past registration.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.writer.send(frame).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let response = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(result) => result.map_err(|_| MultiplexError::ConnectionClosed)?,
                Err(_) => {
                    self.pending.lock().await.remove(&id);
                    return Err(MultiplexError::RequestTimeout(id));
                }
            },
            None => rx.await.map_err(|_| MultiplexError::ConnectionClosed)?,
        };

        self.serializer.deserialize(response.payload())?.into_result()
    }

    /// The serializer this client encodes requests with.
    pub fn serializer(&self) -> Arc<dyn Serializer> {
        self.serializer.clone()
    }

    /// Read loop: route each response to the waiter holding its id.
    async fn read_loop<R>(
        mut reader: R,
        packer: Packer,
        pending: PendingMap,
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
                Ok(0) => return Ok(()), // Server closed the connection
                Ok(n) => n,
                Err(e) => return Err(MultiplexError::Io(e)),
            };

            for frame in frames.push(&buf[..n])? {
                let packet = packer.unpack(frame)?;

                // Pongs answering our pings are not routed anywhere.
                if packet.is_heartbeat() {
                    tracing::trace!("Heartbeat from server");
                    continue;
                }

                let waiter = pending.lock().await.remove(&packet.id());
                match waiter {
                    Some(tx) => {
                        // A waiter that timed out is already gone.
                        let _ = tx.send(packet);
                    }
                    None => tracing::warn!("Response for unknown request {}", packet.id()),
                }
            }
        }
    }

    /// Send a ping every `interval` until the writer goes away.
    async fn heartbeat_loop(writer: WriterHandle, packer: Packer, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so pings start one
        // full interval after connecting.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let frame = packer.pack(&Packet::ping());
            if writer.send(frame).await.is_err() {
                return;
            }
            tracing::trace!("Sent heartbeat ping");
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.read_task.abort();
        if let Some(task) = &self.heartbeat_task {
            task.abort();
        }
    }
}

/// Claim the next request id, skipping the reserved heartbeat id on
/// wrap-around.
fn next_request_id(counter: &AtomicU32) -> u32 {
    loop {
        let id = counter.fetch_add(1, Ordering::Relaxed);
        if id != HEARTBEAT_ID {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_frame_length, 2 * 1024 * 1024);
        assert_eq!(config.heartbeat_interval, Some(Duration::from_secs(20)));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_request_ids_start_at_one() {
        let counter = AtomicU32::new(1);
        assert_eq!(next_request_id(&counter), 1);
        assert_eq!(next_request_id(&counter), 2);
        assert_eq!(next_request_id(&counter), 3);
    }

    #[test]
    fn test_request_ids_skip_heartbeat_id_on_wrap() {
        let counter = AtomicU32::new(u32::MAX);
        assert_eq!(next_request_id(&counter), u32::MAX);
        // The counter wrapped to 0, which is reserved.
        assert_eq!(next_request_id(&counter), 1);
    }
}
