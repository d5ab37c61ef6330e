//! Argument codecs for collective calls.
//!
//! A callback's arguments travel as one tuple, encoded by a [`MessageCodec`].
//! The encoding does not describe its own types: the receiving handle decodes
//! with the argument types it was registered with, and the payload must be
//! consumed exactly. Too few bytes or leftover bytes both surface as
//! [`CodecError::Decode`].
//!
//! # Example
//!
//! ```rust
//! use lockstep_core::{BincodeCodec, MessageCodec};
//!
//! let codec = BincodeCodec;
//! let bytes = codec.encode(&(537_i32, 3.4_f64)).expect("encode");
//!
//! let (i, d): (i32, f64) = codec.decode(&bytes).expect("decode");
//! assert_eq!(i, 537);
//! assert_eq!(d, 3.4);
//!
//! // Decoding with a different signature does not consume the payload exactly.
//! assert!(codec.decode::<(i32,)>(&bytes).is_err());
//! ```

use bincode::Options;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for codec operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to encode arguments to bytes.
    #[error("encode error: {0}")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// Failed to decode bytes into arguments.
    #[error("decode error: {0}")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Pluggable argument serialization format.
///
/// Implementations must be deterministic and must reject payloads that are
/// not consumed exactly by the requested type. `Clone + 'static` lets a
/// dispatcher keep its own copy of the codec.
pub trait MessageCodec: Clone + 'static {
    /// Encode a serializable value to bytes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes into a value, consuming the whole buffer.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` if deserialization fails or bytes remain.
    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError>;
}

/// Compact binary codec backed by bincode.
///
/// Fixed-width little-endian integers, no type tags, trailing bytes rejected.
/// This is the default codec of the dispatcher.
#[derive(Clone, Default, Debug, Copy)]
pub struct BincodeCodec;

impl BincodeCodec {
    fn options() -> impl Options {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_little_endian()
            .reject_trailing_bytes()
    }
}

impl MessageCodec for BincodeCodec {
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError> {
        Self::options()
            .serialize(msg)
            .map_err(|e| CodecError::Encode(e))
    }

    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError> {
        Self::options()
            .deserialize(buf)
            .map_err(|e| CodecError::Decode(e))
    }
}

/// JSON codec using serde_json.
///
/// Readable payloads for debugging a desynchronized group. Argument tuples
/// encode as JSON arrays.
///
/// ```rust
/// use lockstep_core::{JsonCodec, MessageCodec};
///
/// let bytes = JsonCodec.encode(&(1_u8, "two")).expect("encode");
/// assert_eq!(&bytes, br#"[1,"two"]"#);
/// ```
#[derive(Clone, Default, Debug, Copy)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(msg).map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(buf).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}
