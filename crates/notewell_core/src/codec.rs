//! Content codec boundary.
//!
//! # Responsibility
//! - Define the trait through which note bodies are encoded to opaque bytes
//!   and back; the engine never interprets plaintext.
//!
//! # Invariants
//! - `decode` fails with a typed [`DecryptionError`] on wrong key or corrupt
//!   input rather than returning garbage.
//! - Codec failures are fatal for the single item only; batch readers render
//!   the item unavailable instead of aborting the page.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptionError {
    /// The payload could not be decrypted with the available key.
    WrongKey,
    /// The payload is structurally invalid.
    Corrupt(String),
}

impl Display for DecryptionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongKey => write!(f, "content cannot be decrypted with the available key"),
            Self::Corrupt(message) => write!(f, "corrupt content payload: {message}"),
        }
    }
}

impl Error for DecryptionError {}

/// Decoded note body: a type tag plus plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedContent {
    pub kind: String,
    pub text: String,
}

/// Encodes/decodes note bodies. Implemented outside the engine; the engine
/// stores whatever bytes `encode` returns without looking inside.
pub trait ContentCodec {
    fn encode(&self, kind: &str, text: &str) -> Result<Vec<u8>, DecryptionError>;
    fn decode(&self, bytes: &[u8]) -> Result<DecodedContent, DecryptionError>;
}

/// Identity codec: JSON-serializes the body without encryption. Used by
/// tests and by deployments that keep local storage unencrypted.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainCodec;

impl ContentCodec for PlainCodec {
    fn encode(&self, kind: &str, text: &str) -> Result<Vec<u8>, DecryptionError> {
        let decoded = DecodedContent {
            kind: kind.to_string(),
            text: text.to_string(),
        };
        serde_json::to_vec(&decoded).map_err(|err| DecryptionError::Corrupt(err.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<DecodedContent, DecryptionError> {
        serde_json::from_slice(bytes).map_err(|err| DecryptionError::Corrupt(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_codec_round_trips_kind_and_text() {
        let codec = PlainCodec;
        let bytes = codec.encode("tiptap", "hello").unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.kind, "tiptap");
        assert_eq!(decoded.text, "hello");
    }

    #[test]
    fn plain_codec_rejects_garbage() {
        assert!(matches!(
            PlainCodec.decode(b"\x00\x01\x02"),
            Err(DecryptionError::Corrupt(_))
        ));
    }
}
