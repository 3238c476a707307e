//! Signed ACL envelope.
//!
//! The backend signs an [`AclPayload`] with the lock's admin key and stores
//! the pair as an [`AclEnvelope`]. The same JSON document is served to the
//! mobile client and pushed verbatim to the lock.
//!
//! ```json
//! {"sig":"<b64 64 bytes>","payload":{"lockId":7,"version":3,
//!  "users":[{"kid":"...","pub":"<b64 65 bytes>"}]}}
//! ```
//!
//! Field order in storage is irrelevant. What is signed is the canonical
//! form of the payload (sorted keys), produced by `keyway-crypto`.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::{
    PUBLIC_KEY_LEN, SIGNATURE_LEN,
    auth::decode_fixed,
    chunk::MAX_MESSAGE_SIZE,
    errors::{ProtocolError, Result},
};

/// One authorized device key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserEntry {
    /// Key identifier derived from the public key
    pub kid: String,
    /// Base64 uncompressed P-256 public key
    #[serde(rename = "pub")]
    pub public_key: String,
}

impl UserEntry {
    /// Decode the public key field.
    pub fn public_key_bytes(&self) -> Result<[u8; PUBLIC_KEY_LEN]> {
        decode_fixed(&self.public_key, "pub")
    }
}

/// Versioned list of authorized keys for one lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclPayload {
    /// Lock this list applies to
    #[serde(rename = "lockId")]
    pub lock_id: u32,
    /// Monotonic per (lock, workspace), starting at 1
    pub version: u32,
    /// Authorized keys, sorted by `kid`
    pub users: Vec<UserEntry>,
}

impl AclPayload {
    /// Look up a key by identifier.
    pub fn find(&self, kid: &str) -> Option<&UserEntry> {
        self.users.iter().find(|u| u.kid == kid)
    }
}

/// Payload plus the admin signature over its canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEnvelope {
    /// Base64 raw `r || s` signature
    pub sig: String,
    /// Signed content
    pub payload: AclPayload,
}

impl AclEnvelope {
    /// Wrap a payload with raw signature bytes.
    pub fn new(payload: AclPayload, signature: &[u8; SIGNATURE_LEN]) -> Self {
        Self { sig: STANDARD.encode(signature), payload }
    }

    /// Decode the signature field.
    pub fn signature_bytes(&self) -> Result<[u8; SIGNATURE_LEN]> {
        decode_fixed(&self.sig, "sig")
    }

    /// Serialize to compact JSON text, the form written over the radio.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse JSON text.
    ///
    /// # Errors
    ///
    /// `PayloadTooLarge` beyond [`MAX_MESSAGE_SIZE`], `Json` on bad syntax
    /// or missing fields.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}
