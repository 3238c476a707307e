//! Admin private keys at rest.
//!
//! Keys are stored as PKCS#8 PEM sealed with AES-256-GCM under a single
//! process-wide [`MasterKey`]. Each seal uses a fresh 12-byte nonce. The
//! associated data binds the ciphertext to its `(lock, workspace)` slot so a
//! sealed key copied to another row does not open.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, Payload},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Algorithm label stored alongside sealed secrets.
pub const ALGORITHM: &str = "aes-256-gcm";

/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;

const MASTER_KEY_LEN: usize = 32;

/// 32-byte key-encryption key loaded from configuration.
#[derive(Clone)]
pub struct MasterKey(Zeroizing<[u8; MASTER_KEY_LEN]>);

impl MasterKey {
    /// Use raw key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; MASTER_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidMasterKey)?;
        Ok(Self(Zeroizing::new(raw)))
    }

    /// Decode the base64 form used in configuration.
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(text.trim()).map_err(|_| CryptoError::InvalidMasterKey)?;
        let bytes = Zeroizing::new(bytes);
        Self::from_bytes(&bytes)
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(self.0.as_slice()).map_err(|_| CryptoError::InvalidMasterKey)
    }

    /// Encrypt `plaintext` bound to `aad`.
    ///
    /// `fill` supplies the nonce bytes.
    #[allow(deprecated)] // generic-array 0.14 `from_slice`, pinned by aes-gcm 0.10
    pub fn seal(
        &self,
        plaintext: &[u8],
        aad: &[u8],
        mut fill: impl FnMut(&mut [u8]),
    ) -> Result<SealedSecret, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        fill(nonce.as_mut_slice());
        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::Seal)?;
        Ok(SealedSecret {
            alg: ALGORITHM.to_owned(),
            iv: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        })
    }

    /// Decrypt a sealed secret.
    ///
    /// # Errors
    ///
    /// `Seal` on a wrong key, wrong `aad`, tampering, unknown algorithm or
    /// malformed encoding. The cases are not distinguished.
    #[allow(deprecated)] // generic-array 0.14 `from_slice`, pinned by aes-gcm 0.10
    pub fn open(
        &self,
        sealed: &SealedSecret,
        aad: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if sealed.alg != ALGORITHM {
            return Err(CryptoError::Seal);
        }
        let nonce = STANDARD.decode(&sealed.iv).map_err(|_| CryptoError::Seal)?;
        if nonce.len() != NONCE_LEN {
            return Err(CryptoError::Seal);
        }
        let ciphertext = STANDARD.decode(&sealed.ciphertext).map_err(|_| CryptoError::Seal)?;
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(&nonce), Payload { msg: &ciphertext, aad })
            .map_err(|_| CryptoError::Seal)?;
        Ok(Zeroizing::new(plaintext))
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Ciphertext with its nonce, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    /// Always [`ALGORITHM`]
    pub alg: String,
    /// Base64 nonce
    pub iv: String,
    /// Base64 ciphertext with appended tag
    pub ciphertext: String,
}
