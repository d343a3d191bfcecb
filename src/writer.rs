//! Dedicated writer task serializing all writes to one connection.
//!
//! Responses leave independent dispatch tasks in completion order, so
//! the write path needs single-writer discipline to keep two frames
//! from interleaving on the wire. Instead of a mutex around the socket,
//! the write half is owned by exactly one task fed through an mpsc
//! channel; every producer holds a cheap [`WriterHandle`].
//!
//! ```text
//! Dispatch 1 ─┐
//! Dispatch 2 ─┼─► mpsc::Sender<Bytes> ─► Writer Task ─► socket
//! Dispatch N ─┘
//! ```
//!
//! Queued frames are batched into a single vectored write where
//! possible. The task drains whatever is still queued and exits once
//! every handle is dropped.

use std::collections::VecDeque;
use std::io::IoSlice;

use bytes::{Buf, Bytes};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{MultiplexError, Result};

/// Default capacity of the frame queue feeding a writer task.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Handle for sending packed frames to the writer task.
///
/// Cheaply cloneable; every dispatch task gets its own clone.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    /// Channel sender for complete frames.
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Queue one packed frame for writing.
    ///
    /// Waits while the queue is full, which is the only flow control on
    /// the write path. Fails with [`MultiplexError::ConnectionClosed`]
    /// once the writer task is gone.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| MultiplexError::ConnectionClosed)
    }
}

/// Spawn the writer task owning `writer`.
///
/// # Returns
///
/// A tuple of `(WriterHandle, JoinHandle)` where the JoinHandle can be
/// used to wait for the writer task to complete.
pub fn spawn_writer_task<W>(writer: W, capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives frames and writes them out in batches.
async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        // Wait for the first frame
        let first = match rx.recv().await {
            Some(frame) => frame,
            // Every handle dropped: clean shutdown
            None => return Ok(()),
        };

        // Collect additional ready frames without blocking
        let mut batch = VecDeque::with_capacity(MAX_BATCH_SIZE);
        batch.push_back(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push_back(frame),
                Err(_) => break,
            }
        }

        write_batch(&mut writer, &mut batch).await?;
    }
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
///
/// A partial write is resumed by popping fully written frames and
/// advancing into the first unfinished one.
async fn write_batch<W>(writer: &mut W, batch: &mut VecDeque<Bytes>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while !batch.is_empty() {
        let slices: Vec<IoSlice<'_>> = batch
            .iter()
            .map(|frame| IoSlice::new(frame.as_ref()))
            .collect();

        let mut written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(MultiplexError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }

        while written > 0 {
            let front_len = batch[0].len();
            if written >= front_len {
                batch.pop_front();
                written -= front_len;
            } else {
                batch[0].advance(written);
                written = 0;
            }
        }
    }

    writer.flush().await?;
    Ok(())
}
