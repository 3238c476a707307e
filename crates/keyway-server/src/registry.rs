//! Device key registry.

use keyway_core::Environment;
use keyway_crypto::PublicKey;
use tracing::info;

use crate::{
    error::{Result, ServiceError},
    keyed::{KeyedLocks, hold},
    storage::{Storage, UserKeyRecord},
};

/// Registers, lists and revokes device public keys.
///
/// Key ids are derived from the key itself, so registering the same key
/// twice is idempotent. A key belongs to the first user who registered it.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    locks: KeyedLocks<String>,
}

impl KeyRegistry {
    /// Empty registry handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `public_key_b64` for `owner`.
    ///
    /// Re-registering an owned key refreshes its label and reactivates it.
    ///
    /// # Errors
    ///
    /// - `BadRequest` unless the key is a 65-byte uncompressed P-256 point
    /// - `Conflict` when another user registered it
    pub fn register<E: Environment>(
        &self,
        storage: &dyn Storage,
        env: &E,
        owner: &str,
        public_key_b64: &str,
        label: &str,
    ) -> Result<UserKeyRecord> {
        let public = PublicKey::from_base64(public_key_b64)
            .map_err(|_| ServiceError::BadRequest("public key is not a P-256 point".into()))?;
        let key_id = public.key_id();

        let slot = self.locks.slot(&key_id);
        let _guard = hold(&slot);

        let record = match storage.user_key(&key_id)? {
            Some(existing) if existing.owner_user_id != owner => {
                return Err(ServiceError::Conflict(format!(
                    "key {key_id} is registered to another user"
                )));
            },
            Some(existing) => UserKeyRecord { label: label.to_owned(), active: true, ..existing },
            None => UserKeyRecord {
                key_id: key_id.clone(),
                owner_user_id: owner.to_owned(),
                public_key_b64: public.to_base64(),
                label: label.to_owned(),
                active: true,
                created_at: env.unix_seconds(),
            },
        };
        storage.put_user_key(&record)?;
        info!(owner, key_id = %record.key_id, "device key registered");
        Ok(record)
    }

    /// Keys registered by `owner`.
    pub fn list(&self, storage: &dyn Storage, owner: &str) -> Result<Vec<UserKeyRecord>> {
        Ok(storage.user_keys_for_owner(owner)?)
    }

    /// Deactivate a key. The record is kept.
    ///
    /// Unknown keys and keys of other users are both `NotFound`, so the
    /// caller learns nothing about keys they do not own.
    pub fn revoke(
        &self,
        storage: &dyn Storage,
        owner: &str,
        key_id: &str,
    ) -> Result<UserKeyRecord> {
        let owned = |storage: &dyn Storage| -> Result<UserKeyRecord> {
            storage
                .user_key(key_id)?
                .filter(|r| r.owner_user_id == owner)
                .ok_or_else(|| ServiceError::NotFound(format!("key {key_id}")))
        };
        owned(storage)?;

        let slot = self.locks.slot(&key_id.to_owned());
        let _guard = hold(&slot);
        let record = owned(storage)?;
        let revoked = UserKeyRecord { active: false, ..record };
        storage.put_user_key(&revoked)?;
        info!(owner, key_id, "device key revoked");
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use keyway_core::SystemEnv;
    use keyway_crypto::{KeyPair, KeyRole};

    use super::*;
    use crate::storage::MemoryStorage;

    fn key(seed: u8) -> String {
        KeyPair::from_scalar(KeyRole::User, &[seed; 32]).unwrap().public_key().to_base64()
    }

    #[test]
    fn register_is_idempotent() {
        let storage = MemoryStorage::new();
        let registry = KeyRegistry::new();
        let first = registry.register(&storage, &SystemEnv, "alice", &key(1), "phone").unwrap();
        let again = registry.register(&storage, &SystemEnv, "alice", &key(1), "phone").unwrap();
        assert_eq!(first, again);
        assert_eq!(registry.list(&storage, "alice").unwrap().len(), 1);
        assert_eq!(first.key_id.len(), 32);
    }

    #[test]
    fn foreign_key_conflicts() {
        let storage = MemoryStorage::new();
        let registry = KeyRegistry::new();
        registry.register(&storage, &SystemEnv, "alice", &key(1), "phone").unwrap();
        assert!(matches!(
            registry.register(&storage, &SystemEnv, "mallory", &key(1), "stolen"),
            Err(ServiceError::Conflict(_))
        ));
        assert!(registry.list(&storage, "mallory").unwrap().is_empty());
    }

    #[test]
    fn revoke_then_reregister_reactivates() {
        let storage = MemoryStorage::new();
        let registry = KeyRegistry::new();
        let record = registry.register(&storage, &SystemEnv, "alice", &key(1), "phone").unwrap();

        let revoked = registry.revoke(&storage, "alice", &record.key_id).unwrap();
        assert!(!revoked.active);
        assert!(!storage.user_key(&record.key_id).unwrap().unwrap().active);

        let back = registry.register(&storage, &SystemEnv, "alice", &key(1), "new phone").unwrap();
        assert!(back.active);
        assert_eq!(back.label, "new phone");
        assert_eq!(back.created_at, record.created_at);
    }

    #[test]
    fn only_owner_revokes() {
        let storage = MemoryStorage::new();
        let registry = KeyRegistry::new();
        let record = registry.register(&storage, &SystemEnv, "alice", &key(1), "phone").unwrap();
        assert!(matches!(
            registry.revoke(&storage, "mallory", &record.key_id),
            Err(ServiceError::NotFound(_))
        ));
        assert!(storage.user_key(&record.key_id).unwrap().unwrap().active);
    }

    #[test]
    fn unknown_kids_leave_no_slots_behind() {
        let storage = MemoryStorage::new();
        let registry = KeyRegistry::new();
        let record = registry.register(&storage, &SystemEnv, "alice", &key(1), "phone").unwrap();

        for n in 0..64 {
            let kid = format!("{n:032x}");
            assert!(matches!(
                registry.revoke(&storage, "mallory", &kid),
                Err(ServiceError::NotFound(_))
            ));
        }
        assert!(registry.revoke(&storage, "mallory", &record.key_id).is_err());
        assert!(registry.locks.is_empty());

        registry.revoke(&storage, "alice", &record.key_id).unwrap();
        assert!(registry.locks.is_empty());
    }

    #[test]
    fn invalid_keys_rejected() {
        let storage = MemoryStorage::new();
        let registry = KeyRegistry::new();
        for bad in ["", "not base64!", "AAAA", &key(1)[..40]] {
            assert!(matches!(
                registry.register(&storage, &SystemEnv, "alice", bad, "x"),
                Err(ServiceError::BadRequest(_))
            ));
        }
    }
}
