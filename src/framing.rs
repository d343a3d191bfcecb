//! Frame buffer for accumulating partial reads.
//!
//! The transport delivers arbitrary byte chunks; `FrameBuffer`
//! accumulates them in a single `bytes::BytesMut` and emits complete
//! length-delimited frames, each still carrying its 4-byte prefix,
//! ready for [`Packer::unpack`](crate::Packer::unpack).
//!
//! The length prefix is peeked without being consumed, so no parse
//! state survives between pushes: either a whole frame is available and
//! gets split off (zero-copy `split_to(..).freeze()`), or the bytes
//! stay buffered for the next push.
//!
//! A frame whose declared size exceeds the configured maximum is a
//! protocol violation; the buffer refuses it before the body arrives,
//! and the connection that produced it cannot be resynchronized.
//!
//! # Example
//!
//! ```
//! use multiplex::framing::FrameBuffer;
//! use multiplex::{Packer, Packet};
//!
//! let mut buffer = FrameBuffer::default();
//! let wire = Packer::new().pack(&Packet::new(1, "hi"));
//!
//! // Data arrives in chunks from the socket
//! let frames = buffer.push(&wire).unwrap();
//! assert_eq!(frames.len(), 1);
//! ```

use bytes::{Bytes, BytesMut};

use crate::error::{MultiplexError, Result};
use crate::packer::LENGTH_SIZE;

/// Default maximum frame length in bytes (2 MiB), prefix included.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 2 * 1024 * 1024;

/// Initial buffer capacity (64 KiB).
const INITIAL_CAPACITY: usize = 64 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// All data is stored in a single `BytesMut` to minimize allocations;
/// extracted frames share that allocation.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Maximum allowed frame length, prefix included.
    max_frame_length: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer enforcing the given maximum frame length.
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            max_frame_length,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// This is the main API for processing incoming data from the
    /// socket. If data is fragmented, partial bytes are buffered
    /// internally for the next push.
    ///
    /// # Returns
    ///
    /// Every frame completed by this push (may be empty), each including
    /// its 4-byte length prefix.
    ///
    /// # Errors
    ///
    /// [`MultiplexError::FrameTooLarge`] if a declared frame exceeds the
    /// configured maximum. The stream is unrecoverable past this point
    /// and the connection must be dropped.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Try to extract a single complete frame from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        if self.buffer.len() < LENGTH_SIZE {
            return Ok(None);
        }

        // Peek the prefix without consuming it; the emitted frame keeps it.
        let declared = u32::from_be_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]) as usize;

        let total = declared.saturating_add(LENGTH_SIZE);
        if total > self.max_frame_length {
            return Err(MultiplexError::FrameTooLarge {
                length: total,
                max: self.max_frame_length,
            });
        }

        if self.buffer.len() < total {
            return Ok(None);
        }

        Ok(Some(self.buffer.split_to(total).freeze()))
    }

    /// Get the number of buffered bytes not yet forming a complete frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}
