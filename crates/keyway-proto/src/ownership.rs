//! Ownership bootstrap message.
//!
//! # Protocol Flow
//!
//! 1. Owner scans the claim payload printed on the lock
//! 2. Backend hands out the lock's admin public key
//! 3. Client writes [`OwnershipSet`] (chunk framed) to `ownership-write`
//! 4. Lock compares the claim code with its manufacture-time value and, on
//!    match, pins the admin key as its trust root
//!
//! Runs once per lock lifetime; an owned lock answers `Unauthorized`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    PUBLIC_KEY_LEN,
    auth::decode_fixed,
    errors::Result,
};

/// Trust-root transfer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipSet {
    /// Lock being claimed
    #[serde(rename = "lockId")]
    pub lock_id: u32,
    /// Base64 uncompressed P-256 admin public key
    #[serde(rename = "adminPub")]
    pub admin_public_key: String,
    /// Manufacture-time claim code
    #[serde(rename = "claimCode")]
    pub claim_code: String,
}

impl OwnershipSet {
    /// Decode the admin key field.
    pub fn admin_key_bytes(&self) -> Result<[u8; PUBLIC_KEY_LEN]> {
        decode_fixed(&self.admin_public_key, "adminPub")
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse JSON text.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl fmt::Debug for OwnershipSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnershipSet")
            .field("lock_id", &self.lock_id)
            .field("admin_public_key", &self.admin_public_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine, engine::general_purpose::STANDARD};

    use super::*;

    #[test]
    fn wire_names() {
        let msg = OwnershipSet {
            lock_id: 12,
            admin_public_key: STANDARD.encode([4u8; 65]),
            claim_code: "AB-12".into(),
        };
        let json = String::from_utf8(msg.to_json().unwrap()).unwrap();
        assert!(json.starts_with("{\"lockId\":12,\"adminPub\":"));
        assert!(json.ends_with("\"claimCode\":\"AB-12\"}"));
        assert_eq!(OwnershipSet::from_json(json.as_bytes()).unwrap(), msg);
        assert_eq!(msg.admin_key_bytes(), Ok([4u8; 65]));
    }
}
