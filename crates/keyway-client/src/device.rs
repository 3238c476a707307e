//! Per-installation device key.
//!
//! One P-256 scalar per label, generated on first use and kept only in the
//! [`SecureStore`]. The public half and its `kid` are what the backend
//! registers; the private half only ever signs 20-byte lock challenges.

use std::sync::Mutex;

use base64::{Engine, engine::general_purpose::STANDARD};
use keyway_core::Environment;
use keyway_crypto::{KeyPair, KeyRole};
use keyway_proto::{Challenge, SIGNATURE_LEN};
use tracing::info;

use crate::{
    error::{ClientError, Result},
    store::SecureStore,
};

/// Public identity of a device key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceKeyInfo {
    /// Base64 uncompressed public key
    pub public_key_b64: String,
    /// Key identifier derived from the public key
    pub key_id: String,
}

/// Device keys over a secure store.
pub struct DeviceKeyStore<S> {
    store: S,
    create: Mutex<()>,
}

impl<S: SecureStore> DeviceKeyStore<S> {
    /// Keys kept in `store`.
    pub fn new(store: S) -> Self {
        Self { store, create: Mutex::new(()) }
    }

    /// Existing key under `label`, or a fresh one persisted there.
    pub fn get_or_create<E: Environment>(&self, env: &E, label: &str) -> Result<DeviceKeyInfo> {
        let _guard = self.create.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(keypair) = self.load(label)? {
            return Ok(info_of(&keypair));
        }

        let keypair = KeyPair::generate_with(KeyRole::User, |buf| env.random_bytes(buf))?;
        self.store.put(label, keypair.scalar_bytes().as_slice())?;
        let info = info_of(&keypair);
        info!(label, kid = %info.key_id, "device key created");
        Ok(info)
    }

    /// Public identity of the key under `label`, if any.
    pub fn key_info(&self, label: &str) -> Result<Option<DeviceKeyInfo>> {
        Ok(self.load(label)?.as_ref().map(info_of))
    }

    /// Sign a raw 20-byte challenge, returning base64 of the 64-byte
    /// signature.
    ///
    /// # Errors
    ///
    /// `NoPrivateKey` when nothing is stored under `label`; `Protocol` when
    /// `challenge` is not exactly 20 bytes.
    pub fn sign_challenge(&self, label: &str, challenge: &[u8]) -> Result<String> {
        let challenge = Challenge::from_bytes(challenge)?;
        let (_, signature) = self.answer(label, &challenge)?;
        Ok(STANDARD.encode(signature))
    }

    /// Sign a parsed challenge, returning the key id alongside.
    pub fn answer(
        &self,
        label: &str,
        challenge: &Challenge,
    ) -> Result<(String, [u8; SIGNATURE_LEN])> {
        let keypair = self.require(label)?;
        let signature = keypair.sign_challenge(challenge)?;
        Ok((keypair.public_key().key_id(), signature))
    }

    /// Remove the key under `label`. Returns whether one existed.
    pub fn reset(&self, label: &str) -> Result<bool> {
        let _guard = self.create.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let removed = self.store.delete(label)?;
        if removed {
            info!(label, "device key reset");
        }
        Ok(removed)
    }

    fn require(&self, label: &str) -> Result<KeyPair> {
        self.load(label)?.ok_or_else(|| ClientError::NoPrivateKey { label: label.to_owned() })
    }

    fn load(&self, label: &str) -> Result<Option<KeyPair>> {
        self.store
            .get(label)?
            .map(|scalar| KeyPair::from_scalar(KeyRole::User, &scalar))
            .transpose()
            .map_err(ClientError::from)
    }
}

fn info_of(keypair: &KeyPair) -> DeviceKeyInfo {
    let public = keypair.public_key();
    DeviceKeyInfo { public_key_b64: public.to_base64(), key_id: public.key_id() }
}
