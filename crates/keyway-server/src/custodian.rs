//! Lock admin key custody.
//!
//! Each `(lock, workspace)` has one active P-256 admin keypair, the lock's
//! trust root. It is generated on first use, PEM-encoded and sealed under the
//! master key before it touches storage. Plaintext is never cached: every
//! signing operation opens the sealed record again.
//!
//! Creation is serialized per slot in-process; `insert_admin_key_if_absent`
//! resolves races against other processes, and every racer ends up signing
//! with the record that won.

use keyway_core::Environment;
use keyway_crypto::{CryptoError, KeyPair, KeyRole, MasterKey, PublicKey};
use tracing::info;

use crate::{
    error::Result,
    keyed::{KeyedLocks, hold},
    storage::{LockAdminRecord, Storage},
};

/// Generates, seals and opens lock admin keys.
#[derive(Debug)]
pub struct KeyCustodian {
    master: MasterKey,
    locks: KeyedLocks<(u32, String)>,
}

impl KeyCustodian {
    /// Custodian sealing under `master`.
    pub fn new(master: MasterKey) -> Self {
        Self { master, locks: KeyedLocks::new() }
    }

    /// Active admin keypair, created and stored when absent.
    pub fn get_or_create<E: Environment>(
        &self,
        storage: &dyn Storage,
        env: &E,
        lock_id: u32,
        workspace_id: &str,
    ) -> Result<KeyPair> {
        let slot = self.locks.slot(&(lock_id, workspace_id.to_owned()));
        let _guard = hold(&slot);

        if let Some(record) = storage.admin_key(lock_id, workspace_id)? {
            return self.open(&record);
        }

        let keypair = KeyPair::generate_with(KeyRole::Admin, |buf| env.random_bytes(buf))?;
        let pem = keypair.to_pkcs8_pem()?;
        let sealed = self.master.seal(pem.as_bytes(), &aad(lock_id, workspace_id), |buf| {
            env.random_bytes(buf);
        })?;
        let record = LockAdminRecord {
            lock_id,
            workspace_id: workspace_id.to_owned(),
            public_key_b64: keypair.public_key().to_base64(),
            sealed,
            active: true,
            created_at: env.unix_seconds(),
        };

        let stored = storage.insert_admin_key_if_absent(record)?;
        if stored.public_key_b64 != keypair.public_key().to_base64() {
            info!(lock_id, workspace_id, "admin key created concurrently, using stored key");
            return self.open(&stored);
        }
        info!(lock_id, workspace_id, admin = ?keypair.public_key(), "admin key created");
        Ok(keypair)
    }

    /// Active admin keypair, if one was ever created.
    pub fn get_active(
        &self,
        storage: &dyn Storage,
        lock_id: u32,
        workspace_id: &str,
    ) -> Result<Option<KeyPair>> {
        storage.admin_key(lock_id, workspace_id)?.map(|record| self.open(&record)).transpose()
    }

    /// Active admin public key, without opening the sealed half.
    pub fn public_key(
        &self,
        storage: &dyn Storage,
        lock_id: u32,
        workspace_id: &str,
    ) -> Result<Option<PublicKey>> {
        Ok(storage
            .admin_key(lock_id, workspace_id)?
            .map(|record| PublicKey::from_base64(&record.public_key_b64))
            .transpose()?)
    }

    fn open(&self, record: &LockAdminRecord) -> Result<KeyPair> {
        let pem = self.master.open(&record.sealed, &aad(record.lock_id, &record.workspace_id))?;
        let pem = std::str::from_utf8(&pem).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(KeyPair::from_pkcs8_pem(KeyRole::Admin, pem)?)
    }
}

/// Associated data binding a sealed key to its slot.
fn aad(lock_id: u32, workspace_id: &str) -> Vec<u8> {
    format!("{lock_id}:{workspace_id}").into_bytes()
}

#[cfg(test)]
mod tests {
    use keyway_core::SystemEnv;

    use super::*;
    use crate::storage::MemoryStorage;

    fn custodian() -> KeyCustodian {
        KeyCustodian::new(MasterKey::from_bytes(&[7; 32]).unwrap())
    }

    #[test]
    fn create_then_reuse() {
        let storage = MemoryStorage::new();
        let custodian = custodian();
        assert!(custodian.get_active(&storage, 1, "ws").unwrap().is_none());

        let created = custodian.get_or_create(&storage, &SystemEnv, 1, "ws").unwrap();
        let again = custodian.get_or_create(&storage, &SystemEnv, 1, "ws").unwrap();
        assert_eq!(created.public_key(), again.public_key());
        assert_eq!(created.role(), KeyRole::Admin);
        assert_eq!(
            custodian.public_key(&storage, 1, "ws").unwrap(),
            Some(created.public_key())
        );
    }

    #[test]
    fn slots_are_independent() {
        let storage = MemoryStorage::new();
        let custodian = custodian();
        let a = custodian.get_or_create(&storage, &SystemEnv, 1, "ws").unwrap();
        let b = custodian.get_or_create(&storage, &SystemEnv, 2, "ws").unwrap();
        let c = custodian.get_or_create(&storage, &SystemEnv, 1, "other").unwrap();
        assert_ne!(a.public_key(), b.public_key());
        assert_ne!(a.public_key(), c.public_key());
    }

    #[test]
    fn stored_record_holds_no_plaintext() {
        let storage = MemoryStorage::new();
        let key = custodian().get_or_create(&storage, &SystemEnv, 1, "ws").unwrap();
        let record = storage.admin_key(1, "ws").unwrap().unwrap();
        let pem = key.to_pkcs8_pem().unwrap();
        assert!(!record.sealed.ciphertext.contains("PRIVATE KEY"));
        assert!(!record.sealed.ciphertext.contains(pem.as_str()));
        assert_eq!(record.sealed.alg, "aes-256-gcm");
    }

    #[test]
    fn wrong_master_key_cannot_open() {
        let storage = MemoryStorage::new();
        custodian().get_or_create(&storage, &SystemEnv, 1, "ws").unwrap();
        let other = KeyCustodian::new(MasterKey::from_bytes(&[8; 32]).unwrap());
        assert!(other.get_active(&storage, 1, "ws").is_err());
    }

    #[test]
    fn sealed_key_bound_to_its_slot() {
        let storage = MemoryStorage::new();
        let custodian = custodian();
        custodian.get_or_create(&storage, &SystemEnv, 1, "ws").unwrap();

        // Copy lock 1's sealed key into lock 2's slot
        let mut moved = storage.admin_key(1, "ws").unwrap().unwrap();
        moved.lock_id = 2;
        storage.insert_admin_key_if_absent(moved).unwrap();
        assert!(custodian.get_active(&storage, 2, "ws").is_err());
    }
}
