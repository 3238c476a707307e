//! The lock's current access list.
//!
//! Replacement is all-or-nothing: a candidate envelope is fully parsed,
//! addressed, verified and version-checked before the stored list changes.
//! Any failure leaves the previous list in place.

use std::collections::BTreeMap;

use keyway_crypto::{PublicKey, verify_envelope};
use keyway_proto::AclEnvelope;

use crate::error::AclError;

/// Verified ACL held by a lock.
#[derive(Debug, Clone, Default)]
pub struct AclStore {
    version: u32,
    keys: BTreeMap<String, PublicKey>,
}

impl AclStore {
    /// Empty store at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of the stored list, 0 before the first accepted envelope.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Number of authorized keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no key is authorized.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Public key registered under `kid`.
    pub fn lookup(&self, kid: &str) -> Option<&PublicKey> {
        self.keys.get(kid)
    }

    /// Authorized key ids in ascending order.
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Verify `message` as an envelope for `lock_id` and replace the list.
    ///
    /// Checks run in order: parse, addressee, trust root, signature, version,
    /// key decoding. Returns the new version.
    pub fn apply(
        &mut self,
        message: &[u8],
        lock_id: u32,
        admin: Option<&PublicKey>,
    ) -> Result<u32, AclError> {
        let envelope = AclEnvelope::from_json(message)?;
        let payload = &envelope.payload;

        if payload.lock_id != lock_id {
            return Err(AclError::WrongLock { expected: lock_id, actual: payload.lock_id });
        }
        let admin = admin.ok_or(AclError::NotOwned)?;
        if !verify_envelope(&envelope, admin) {
            return Err(AclError::BadSignature);
        }
        if payload.version <= self.version {
            return Err(AclError::StaleVersion { current: self.version, offered: payload.version });
        }

        let mut keys = BTreeMap::new();
        for user in &payload.users {
            let raw = user.public_key_bytes()?;
            let key = PublicKey::from_bytes(&raw)
                .map_err(|_| AclError::InvalidUserKey { kid: user.kid.clone() })?;
            keys.insert(user.kid.clone(), key);
        }

        self.version = payload.version;
        self.keys = keys;
        Ok(self.version)
    }
}
