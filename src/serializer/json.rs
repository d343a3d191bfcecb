//! JSON serializer - structured tagged envelope.
//!
//! Encodes the [`Outcome`] envelope as externally tagged JSON:
//! `{"success":[...]}` with the payload as a byte array, or
//! `{"failure":"..."}` with the reified message. Unlike the
//! pass-through strategy, failures survive the wire distinguishably and
//! surface on the client as [`MultiplexError::Remote`].
//!
//! # Example
//!
//! ```
//! use multiplex::serializer::{JsonSerializer, Outcome, Serializer};
//!
//! let bytes = JsonSerializer
//!     .serialize(&Outcome::failure("boom"))
//!     .unwrap();
//! assert_eq!(&bytes[..], br#"{"failure":"boom"}"#);
//! ```
//!
//! [`MultiplexError::Remote`]: crate::MultiplexError::Remote

use bytes::Bytes;

use super::{Outcome, Serializer};
use crate::error::Result;

/// Serializer carrying the outcome envelope as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, outcome: &Outcome) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(outcome)?))
    }

    fn deserialize(&self, payload: &[u8]) -> Result<Outcome> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MultiplexError;

    #[test]
    fn test_success_round_trip() {
        let original = Outcome::success("structured");
        let bytes = JsonSerializer.serialize(&original).unwrap();
        let decoded = JsonSerializer.deserialize(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_failure_round_trip() {
        let original = Outcome::failure("lookup failed");
        let bytes = JsonSerializer.serialize(&original).unwrap();
        let decoded = JsonSerializer.deserialize(&bytes).unwrap();
        assert_eq!(decoded, original);
        assert!(decoded.is_failure());
    }

    #[test]
    fn test_wire_shape() {
        let bytes = JsonSerializer.serialize(&Outcome::success("hi")).unwrap();
        // Payload bytes encode as a JSON array of numbers.
        assert_eq!(&bytes[..], br#"{"success":[104,105]}"#);

        let bytes = JsonSerializer.serialize(&Outcome::failure("x")).unwrap();
        assert_eq!(&bytes[..], br#"{"failure":"x"}"#);
    }

    #[test]
    fn test_binary_payload_round_trip() {
        let all_bytes: Vec<u8> = (0..=255).collect();
        let original = Outcome::success(all_bytes);
        let bytes = JsonSerializer.serialize(&original).unwrap();
        assert_eq!(JsonSerializer.deserialize(&bytes).unwrap(), original);
    }

    #[test]
    fn test_malformed_input_rejected() {
        for bad in [&b"not json"[..], b"", b"{\"neither\":1}"] {
            let err = JsonSerializer.deserialize(bad).unwrap_err();
            assert!(matches!(err, MultiplexError::Json(_)));
        }
    }
}
