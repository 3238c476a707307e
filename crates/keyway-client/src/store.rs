//! Secure storage boundary.
//!
//! The platform keystore (Keychain, Keystore, a TPM-backed file) sits behind
//! [`SecureStore`]. Secrets come back wrapped in [`Zeroizing`] so callers
//! cannot leave copies behind by accident.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use zeroize::Zeroizing;

use crate::error::{ClientError, Result};

/// Label-addressed secret storage.
pub trait SecureStore: Send + Sync {
    /// Secret stored under `label`.
    fn get(&self, label: &str) -> Result<Option<Zeroizing<Vec<u8>>>>;

    /// Store `secret` under `label`, replacing any previous value.
    fn put(&self, label: &str, secret: &[u8]) -> Result<()>;

    /// Remove the secret. Returns whether one existed.
    fn delete(&self, label: &str) -> Result<bool>;
}

/// Process-memory store for tests and simulations.
///
/// Clones share the same contents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    secrets: Arc<Mutex<HashMap<String, Zeroizing<Vec<u8>>>>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn secrets(&self) -> Result<MutexGuard<'_, HashMap<String, Zeroizing<Vec<u8>>>>> {
        self.secrets.lock().map_err(|_| ClientError::SecureStore("store lock poisoned".into()))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels = self.secrets.lock().map(|s| s.len()).unwrap_or_default();
        f.debug_struct("MemoryStore").field("labels", &labels).finish()
    }
}

impl SecureStore for MemoryStore {
    fn get(&self, label: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        Ok(self.secrets()?.get(label).cloned())
    }

    fn put(&self, label: &str, secret: &[u8]) -> Result<()> {
        self.secrets()?.insert(label.to_owned(), Zeroizing::new(secret.to_vec()));
        Ok(())
    }

    fn delete(&self, label: &str) -> Result<bool> {
        Ok(self.secrets()?.remove(label).is_some())
    }
}
