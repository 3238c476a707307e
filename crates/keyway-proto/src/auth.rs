//! Challenge-response messages.
//!
//! # Protocol Flow
//!
//! 1. Lock notifies a [`Challenge`] on `challenge-notify` right after connect
//! 2. Client writes an [`AuthResponse`] (chunk framed) to
//!    `auth-response-write`
//! 3. Lock notifies a single [`AuthResult`] byte on `result-notify`
//!
//! The result byte deliberately carries no reason. Whether the key was
//! unknown or the signature bad stays on the lock.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::{
    SIGNATURE_LEN,
    errors::{ProtocolError, Result},
};

/// Random part of a challenge.
pub const NONCE_LEN: usize = 16;

/// Per-connection challenge issued by the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Challenge {
    /// Fresh random bytes, never reused
    pub nonce: [u8; NONCE_LEN],
    /// Identifier of the issuing lock
    pub lock_id: u32,
}

impl Challenge {
    /// Encoded size in bytes.
    pub const SIZE: usize = 20;

    /// Serialize as `nonce || lock_id (u32 BE)`.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..NONCE_LEN].copy_from_slice(&self.nonce);
        out[NONCE_LEN..].copy_from_slice(&self.lock_id.to_be_bytes());
        out
    }

    /// Parse a challenge notification.
    ///
    /// # Errors
    ///
    /// `InvalidFrame` unless `bytes` is exactly 20 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let invalid = ProtocolError::InvalidFrame { expected: Self::SIZE, actual: bytes.len() };
        let bytes: &[u8; Self::SIZE] = bytes.try_into().map_err(|_| invalid)?;

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);
        let mut lock_id = [0u8; 4];
        lock_id.copy_from_slice(&bytes[NONCE_LEN..]);

        Ok(Self { nonce, lock_id: u32::from_be_bytes(lock_id) })
    }
}

/// Client's answer to a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Key identifier of the signing device key
    pub kid: String,
    /// Base64 raw `r || s` signature over the 20 challenge bytes
    pub sig: String,
}

impl AuthResponse {
    /// Build a response from raw signature bytes.
    pub fn new(kid: impl Into<String>, signature: &[u8; SIGNATURE_LEN]) -> Self {
        Self { kid: kid.into(), sig: STANDARD.encode(signature) }
    }

    /// Decode the signature field.
    pub fn signature_bytes(&self) -> Result<[u8; SIGNATURE_LEN]> {
        decode_fixed(&self.sig, "sig")
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Outcome byte on `result-notify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthResult {
    /// Access refused
    Denied = 0x00,
    /// Access granted, the lock is releasing
    Granted = 0x01,
}

impl AuthResult {
    /// Wire byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Parse a result notification.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [0x00] => Ok(Self::Denied),
            [0x01] => Ok(Self::Granted),
            [other] => Err(ProtocolError::UnknownStatus(*other)),
            _ => Err(ProtocolError::InvalidFrame { expected: 1, actual: bytes.len() }),
        }
    }
}

/// Decode a base64 field that must have an exact length.
pub(crate) fn decode_fixed<const N: usize>(value: &str, field: &'static str) -> Result<[u8; N]> {
    let bytes = STANDARD.decode(value).map_err(|_| ProtocolError::InvalidBase64 { field })?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| ProtocolError::InvalidFieldLength { field, expected: N, actual: len })
}
