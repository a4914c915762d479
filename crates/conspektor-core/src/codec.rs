//! Wire codec for deltas
//!
//! Deltas travel inside JSON text frames, so their bytes are carried as
//! lowercase hex. An empty string is a zero-length delta.

use thiserror::Error;

use crate::replica::{CausalSummary, Delta};

/// Errors decoding a hex payload from the wire
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("hex payload has odd length {0}")]
    OddLength(usize),

    #[error("invalid hex character {c:?} at index {index}")]
    InvalidCharacter { c: char, index: usize },
}

impl From<hex::FromHexError> for CodecError {
    fn from(err: hex::FromHexError) -> Self {
        match err {
            hex::FromHexError::InvalidHexCharacter { c, index } => {
                CodecError::InvalidCharacter { c, index }
            }
            // Length is checked before decoding
            hex::FromHexError::OddLength | hex::FromHexError::InvalidStringLength => {
                CodecError::OddLength(0)
            }
        }
    }
}

/// Encode a delta for the wire
pub fn encode_delta(delta: &Delta) -> String {
    hex::encode(delta.as_bytes())
}

/// Decode a delta received from the wire
pub fn decode_delta(payload: &str) -> Result<Delta, CodecError> {
    decode_bytes(payload).map(Delta::from)
}

/// Encode a causal summary for a `sync_request`
pub fn encode_summary(summary: &CausalSummary) -> String {
    hex::encode(summary.as_bytes())
}

fn decode_bytes(payload: &str) -> Result<Vec<u8>, CodecError> {
    if payload.len() % 2 != 0 {
        return Err(CodecError::OddLength(payload.len()));
    }
    Ok(hex::decode(payload)?)
}
