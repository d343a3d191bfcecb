//! Packet struct with typed accessors.
//!
//! A packet is the unit of correlation: an identifier plus an opaque
//! payload. Uses `bytes::Bytes` for zero-copy payload sharing between
//! the read loop and dispatch tasks.
//!
//! The id `0` is reserved for the heartbeat sub-protocol and must never
//! be assigned to an application request. A heartbeat packet carries one
//! of two sentinel payloads: [`PING`] (probe) or [`PONG`] (reply).
//!
//! # Example
//!
//! ```
//! use multiplex::Packet;
//!
//! let packet = Packet::new(42, "hello");
//! assert_eq!(packet.id(), 42);
//! assert_eq!(packet.payload(), b"hello");
//! assert!(!packet.is_heartbeat());
//!
//! assert!(Packet::ping().is_heartbeat());
//! ```

use bytes::Bytes;

/// Correlation id reserved for heartbeat probes and replies.
pub const HEARTBEAT_ID: u32 = 0;

/// Sentinel payload of a heartbeat probe.
pub const PING: &[u8] = b"ping";

/// Sentinel payload of a heartbeat reply.
pub const PONG: &[u8] = b"pong";

/// One correlated protocol unit.
///
/// Immutable once constructed: fields are private and only exposed
/// through accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Correlation identifier, caller-assigned per in-flight request.
    id: u32,
    /// Opaque payload bytes, interpreted by the serializer only.
    payload: Bytes,
}

impl Packet {
    /// Create a new packet from an id and a payload.
    pub fn new(id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// Create a heartbeat probe packet (id 0, payload `ping`).
    pub fn ping() -> Self {
        Self::new(HEARTBEAT_ID, Bytes::from_static(PING))
    }

    /// Create a heartbeat reply packet (id 0, payload `pong`).
    pub fn pong() -> Self {
        Self::new(HEARTBEAT_ID, Bytes::from_static(PONG))
    }

    /// Get the correlation id.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Consume the packet, keeping only its payload.
    #[inline]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Check if this packet belongs to the heartbeat sub-protocol:
    /// id 0 and a payload equal to one of the reserved sentinels.
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.id == HEARTBEAT_ID && (self.payload == PING || self.payload == PONG)
    }

    /// Check if this is a heartbeat probe.
    #[inline]
    pub fn is_ping(&self) -> bool {
        self.id == HEARTBEAT_ID && self.payload == PING
    }

    /// Check if this is a heartbeat reply.
    #[inline]
    pub fn is_pong(&self) -> bool {
        self.id == HEARTBEAT_ID && self.payload == PONG
    }
}
