//! String serializer - pass-through payloads.
//!
//! The default strategy: success payloads cross the wire unchanged and
//! failures are rendered as their message bytes. Decoding always yields
//! `Success`, so over this codec a remote failure is indistinguishable
//! from a textual payload. Callers that need the distinction should use
//! a structured strategy such as
//! [`JsonSerializer`](crate::serializer::JsonSerializer).
//!
//! # Example
//!
//! ```
//! use multiplex::serializer::{Outcome, Serializer, StringSerializer};
//!
//! let bytes = StringSerializer
//!     .serialize(&Outcome::failure("no such user"))
//!     .unwrap();
//! assert_eq!(&bytes[..], b"no such user");
//! ```

use bytes::Bytes;

use super::{Outcome, Serializer};
use crate::error::Result;

/// Serializer that passes payload bytes through without transformation.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringSerializer;

impl Serializer for StringSerializer {
    fn serialize(&self, outcome: &Outcome) -> Result<Bytes> {
        Ok(match outcome {
            // Cheap clone, no copy.
            Outcome::Success(data) => data.clone(),
            Outcome::Failure(message) => Bytes::copy_from_slice(message.as_bytes()),
        })
    }

    fn deserialize(&self, payload: &[u8]) -> Result<Outcome> {
        Ok(Outcome::Success(Bytes::copy_from_slice(payload)))
    }
}
