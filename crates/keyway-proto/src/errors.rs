//! Protocol error types.

use thiserror::Error;

/// Result alias for wire-format operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire structures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Fixed-size structure had the wrong length
    #[error("invalid frame: expected {expected} bytes, got {actual}")]
    InvalidFrame {
        /// Required length
        expected: usize,
        /// Received length
        actual: usize,
    },

    /// Reassembled message exceeds the configured limit
    #[error("message too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Announced or accumulated size
        size: usize,
        /// Maximum accepted size
        max: usize,
    },

    /// JSON body could not be parsed or produced
    #[error("malformed json: {0}")]
    Json(String),

    /// A base64 field did not decode
    #[error("field `{field}` is not valid base64")]
    InvalidBase64 {
        /// Name of the offending field
        field: &'static str,
    },

    /// A decoded binary field had the wrong length
    #[error("field `{field}` must be {expected} bytes, got {actual}")]
    InvalidFieldLength {
        /// Name of the offending field
        field: &'static str,
        /// Required length
        expected: usize,
        /// Decoded length
        actual: usize,
    },

    /// Chunk framing violated
    #[error("invalid chunk: {0}")]
    InvalidChunk(&'static str),

    /// MTU too small to carry any chunk payload
    #[error("mtu {0} too small for chunked transfer")]
    MtuTooSmall(usize),

    /// Unknown status byte
    #[error("unknown status code {0:#04x}")]
    UnknownStatus(u8),

    /// Claim payload text did not match `lock:<digits>;code:<code>`
    #[error("invalid claim payload")]
    InvalidClaim,
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
