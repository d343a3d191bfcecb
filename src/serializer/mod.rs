//! Serializer module - payload value encoding/decoding.
//!
//! A serializer converts between the application-level value carried in
//! a packet payload and the opaque bytes on the wire. The protocol core
//! never interprets payloads itself; it only needs the dispatch outcome
//! encoded uniformly, success or failure. The active strategy is chosen
//! by the caller at construction time and handed to every handler
//! invocation, so serializers are shared as `Arc<dyn Serializer>` trait
//! objects.
//!
//! Provided implementations:
//!
//! - [`StringSerializer`] - pass-through for text/raw payloads (default)
//! - [`JsonSerializer`] - tagged JSON envelope; failures survive the
//!   wire distinguishably
//!
//! # Example
//!
//! ```
//! use multiplex::serializer::{Outcome, Serializer, StringSerializer};
//!
//! let serializer = StringSerializer;
//! let bytes = serializer.serialize(&Outcome::success("hello")).unwrap();
//! assert_eq!(&bytes[..], b"hello");
//!
//! let decoded = serializer.deserialize(&bytes).unwrap();
//! assert_eq!(decoded, Outcome::success("hello"));
//! ```

mod json;
mod string;

pub use json::JsonSerializer;
pub use string::StringSerializer;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{MultiplexError, Result};

/// Outcome of one request dispatch as it travels inside a payload.
///
/// Handler failures are reified into the `Failure` variant instead of
/// being rethrown, so the response path is uniform and every request
/// gets exactly one response. Request payloads travel as `Success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A payload value produced by the caller or the handler.
    Success(Bytes),
    /// A failure raised during handling, carried as its display message.
    Failure(String),
}

impl Outcome {
    /// Wrap application payload bytes.
    pub fn success(data: impl Into<Bytes>) -> Self {
        Self::Success(data.into())
    }

    /// Reify a failure message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }

    /// Check if this is the success variant.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Check if this is the failure variant.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Convert into a result, surfacing failures as
    /// [`MultiplexError::Remote`].
    pub fn into_result(self) -> Result<Bytes> {
        match self {
            Self::Success(data) => Ok(data),
            Self::Failure(message) => Err(MultiplexError::Remote(message)),
        }
    }
}

/// Pluggable codec between payload values and wire bytes.
///
/// The dispatcher serializes every outcome through the active instance,
/// and handlers receive it to decode incoming payloads symmetrically.
pub trait Serializer: Send + Sync + 'static {
    /// Encode one outcome into payload bytes.
    fn serialize(&self, outcome: &Outcome) -> Result<Bytes>;

    /// Decode payload bytes into an outcome.
    fn deserialize(&self, payload: &[u8]) -> Result<Outcome>;
}
