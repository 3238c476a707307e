//! Crypto error types.

use thiserror::Error;

use crate::keys::KeyRole;

/// Errors from key handling, signing and sealing.
///
/// Messages never include key material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Bytes are not a valid uncompressed P-256 point
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Bytes are not a valid P-256 scalar or PEM document
    #[error("invalid private key")]
    InvalidPrivateKey,

    /// The RNG never produced a usable scalar
    #[error("key generation failed")]
    KeyGeneration,

    /// Message length not allowed for this key role
    #[error("message must be {expected} bytes for this key, got {actual}")]
    InvalidMessageLength {
        /// Required length
        expected: usize,
        /// Offered length
        actual: usize,
    },

    /// Key role cannot perform this operation
    #[error("{role:?} key cannot {operation}")]
    WrongRole {
        /// Role of the key used
        role: KeyRole,
        /// Attempted operation
        operation: &'static str,
    },

    /// Underlying signer failed
    #[error("signing failed")]
    Signing,

    /// Payload could not be serialized canonically
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// AEAD seal or open failed (wrong key, tampered data, bad nonce)
    #[error("sealed data could not be opened")]
    Seal,

    /// Master secret is not 32 bytes of base64
    #[error("master key must be 32 bytes of base64")]
    InvalidMasterKey,
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
