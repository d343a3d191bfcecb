//! Wire format encoding and decoding.
//!
//! Implements the length-prefixed frame format:
//! ```text
//! ┌──────────┬──────────┬─────────────┐
//! │ Length   │ Id       │ Payload     │
//! │ 4 bytes  │ 4 bytes  │ N - 4 bytes │
//! │ uint32 BE│ uint32 BE│ opaque      │
//! └──────────┴──────────┴─────────────┘
//! ```
//!
//! `Length` counts every byte after itself: the encoded correlation id
//! plus the payload. All multi-byte integers are Big Endian.
//!
//! The correlation id is a fixed-width 4-byte big-endian unsigned
//! integer at body offset 0, so the smallest structurally valid frame
//! is 8 bytes and every declared length is at least 4. This encoding is
//! load-bearing for wire compatibility between peers.
//!
//! # Example
//!
//! ```
//! use multiplex::{Packer, Packet};
//!
//! let packer = Packer::new();
//! let frame = packer.pack(&Packet::new(42, "hello"));
//!
//! // 4-byte id + 5-byte payload declared in the prefix
//! assert_eq!(frame[..4], 9u32.to_be_bytes());
//!
//! let packet = packer.unpack(frame).unwrap();
//! assert_eq!(packet.id(), 42);
//! assert_eq!(packet.payload(), b"hello");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MultiplexError, Result};
use crate::packet::Packet;

/// Size of the length prefix in bytes.
pub const LENGTH_SIZE: usize = 4;

/// Size of the encoded correlation id in bytes.
pub const ID_SIZE: usize = 4;

/// Smallest structurally valid frame: length prefix plus id, empty payload.
pub const MIN_FRAME_SIZE: usize = LENGTH_SIZE + ID_SIZE;

/// Stateless codec between [`Packet`]s and wire frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct Packer;

impl Packer {
    /// Create a new packer.
    pub fn new() -> Self {
        Self
    }

    /// Encode a packet into one complete frame.
    ///
    /// Deterministic and total over valid packets: no failure path for
    /// well-formed input. Payload sizes are bounded far below `u32::MAX`
    /// in practice by the configured maximum frame length.
    pub fn pack(&self, packet: &Packet) -> Bytes {
        let body_len = ID_SIZE + packet.payload_len();
        debug_assert!(body_len <= u32::MAX as usize);

        let mut buf = BytesMut::with_capacity(LENGTH_SIZE + body_len);
        buf.put_u32(body_len as u32);
        buf.put_u32(packet.id());
        buf.put_slice(packet.payload());
        buf.freeze()
    }

    /// Decode one complete, already-delimited frame into a packet.
    ///
    /// The frame must include its 4-byte length prefix — exactly what
    /// [`FrameBuffer`](crate::framing::FrameBuffer) emits. Stream
    /// chunking is the transport's job, never this codec's.
    ///
    /// Payload extraction is zero-copy (`Bytes::slice`).
    ///
    /// # Errors
    ///
    /// [`MultiplexError::MalformedFrame`] when the input is shorter than
    /// [`MIN_FRAME_SIZE`] or the declared length disagrees with the
    /// supplied buffer.
    pub fn unpack(&self, frame: Bytes) -> Result<Packet> {
        if frame.len() < MIN_FRAME_SIZE {
            return Err(MultiplexError::MalformedFrame(format!(
                "frame of {} bytes is shorter than the {}-byte minimum",
                frame.len(),
                MIN_FRAME_SIZE
            )));
        }

        let declared = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        if declared != frame.len() - LENGTH_SIZE {
            return Err(MultiplexError::MalformedFrame(format!(
                "declared length {} does not match body of {} bytes",
                declared,
                frame.len() - LENGTH_SIZE
            )));
        }

        let id = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
        Ok(Packet::new(id, frame.slice(MIN_FRAME_SIZE..)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::HEARTBEAT_ID;

    #[test]
    fn test_pack_unpack_roundtrip() {
        let packer = Packer::new();
        let cases = [
            Packet::new(1, "hello"),
            Packet::new(42, Bytes::new()),
            Packet::new(u32::MAX, "max id"),
            Packet::new(7, Bytes::from_static(&[0x00, 0xFF, 0x80, 0x7F])),
            Packet::ping(),
            Packet::pong(),
        ];

        for packet in cases {
            let frame = packer.pack(&packet);
            let decoded = packer.unpack(frame).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn test_frame_integrity_length_prefix() {
        let packer = Packer::new();
        for packet in [
            Packet::new(1, "x"),
            Packet::new(2, "somewhat longer payload"),
            Packet::new(3, Bytes::new()),
        ] {
            let frame = packer.pack(&packet);
            let declared = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
            assert_eq!(declared as usize, frame.len() - LENGTH_SIZE);
        }
    }

    #[test]
    fn test_pack_big_endian_byte_order() {
        let packer = Packer::new();
        let frame = packer.pack(&Packet::new(0x04050607, "ab"));

        // Length: 4-byte id + 2-byte payload = 0x00000006 in BE
        assert_eq!(frame[0], 0x00);
        assert_eq!(frame[1], 0x00);
        assert_eq!(frame[2], 0x00);
        assert_eq!(frame[3], 0x06);

        // Id: 0x04050607 in BE
        assert_eq!(frame[4], 0x04);
        assert_eq!(frame[5], 0x05);
        assert_eq!(frame[6], 0x06);
        assert_eq!(frame[7], 0x07);

        // Payload verbatim
        assert_eq!(&frame[8..], b"ab");
    }

    #[test]
    fn test_pack_empty_payload_is_minimum_frame() {
        let packer = Packer::new();
        let frame = packer.pack(&Packet::new(9, Bytes::new()));
        assert_eq!(frame.len(), MIN_FRAME_SIZE);
        assert_eq!(frame[..4], 4u32.to_be_bytes());
    }

    #[test]
    fn test_unpack_too_short() {
        let packer = Packer::new();
        for buf in [
            Bytes::new(),
            Bytes::from_static(&[0, 0, 0, 4]),
            Bytes::from_static(&[0, 0, 0, 3, 1, 2, 3]), // 7 bytes total
        ] {
            let err = packer.unpack(buf).unwrap_err();
            assert!(matches!(err, MultiplexError::MalformedFrame(_)));
        }
    }

    #[test]
    fn test_unpack_declared_length_mismatch() {
        let packer = Packer::new();

        // Declares 10 body bytes but carries 4.
        let short = Bytes::from_static(&[0, 0, 0, 10, 0, 0, 0, 1]);
        assert!(matches!(
            packer.unpack(short),
            Err(MultiplexError::MalformedFrame(_))
        ));

        // Declares 4 body bytes but carries 6.
        let long = Bytes::from_static(&[0, 0, 0, 4, 0, 0, 0, 1, 0xAA, 0xBB]);
        assert!(matches!(
            packer.unpack(long),
            Err(MultiplexError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_unpack_heartbeat_frame() {
        let packer = Packer::new();
        let frame = packer.pack(&Packet::ping());
        let packet = packer.unpack(frame).unwrap();
        assert_eq!(packet.id(), HEARTBEAT_ID);
        assert!(packet.is_ping());
    }

    #[test]
    fn test_unpack_payload_zero_copy() {
        let packer = Packer::new();
        let frame = packer.pack(&Packet::new(5, "shared payload"));
        let expected = frame.slice(MIN_FRAME_SIZE..);

        let packet = packer.unpack(frame).unwrap();
        // The payload slice points into the original frame allocation.
        assert_eq!(packet.payload().as_ptr(), expected.as_ptr());
        assert_eq!(packet.payload(), &expected[..]);
    }

    #[test]
    fn test_min_frame_size_is_eight() {
        assert_eq!(MIN_FRAME_SIZE, 8);
    }
}
