//! Key rings.
//!
//! Admin keys and device keys are the same curve and the same signing code;
//! what differs is what they may sign. A [`KeyPair`] carries its
//! [`KeyRole`] and enforces it:
//!
//! - [`KeyRole::Admin`]: signs canonical ACL payloads, any length
//! - [`KeyRole::User`]: signs 20-byte challenges only, so a device key can
//!   never be tricked into signing something that parses as an ACL

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use keyway_proto::{Challenge, PUBLIC_KEY_LEN, SIGNATURE_LEN};
use p256::{
    SecretKey,
    ecdsa::{SigningKey, VerifyingKey},
    pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding},
};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::{error::CryptoError, signature};

/// Length of a P-256 secret scalar.
pub const SCALAR_LEN: usize = 32;

/// Bytes of SHA-256 kept in a key id.
const KEY_ID_BYTES: usize = 16;

/// Attempts before giving up on an RNG that keeps yielding invalid scalars.
const MAX_GENERATE_ATTEMPTS: usize = 8;

/// Which key ring a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// Per-lock trust root that signs ACL envelopes
    Admin,
    /// Per-installation device key that answers challenges
    User,
}

/// A P-256 signing key tagged with its role.
pub struct KeyPair {
    role: KeyRole,
    signing: SigningKey,
}

impl KeyPair {
    /// Generate a key from caller-supplied randomness.
    ///
    /// `fill` must write uniformly random bytes; the environment's RNG is
    /// passed in so simulations stay deterministic. Out-of-range scalars are
    /// redrawn.
    pub fn generate_with(
        role: KeyRole,
        mut fill: impl FnMut(&mut [u8]),
    ) -> Result<Self, CryptoError> {
        let mut seed = Zeroizing::new([0u8; SCALAR_LEN]);
        for _ in 0..MAX_GENERATE_ATTEMPTS {
            fill(seed.as_mut_slice());
            if let Ok(signing) = SigningKey::from_slice(seed.as_slice()) {
                return Ok(Self { role, signing });
            }
        }
        Err(CryptoError::KeyGeneration)
    }

    /// Restore from a raw 32-byte scalar.
    pub fn from_scalar(role: KeyRole, scalar: &[u8]) -> Result<Self, CryptoError> {
        let signing = SigningKey::from_slice(scalar).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { role, signing })
    }

    /// Restore from a PKCS#8 PEM document.
    pub fn from_pkcs8_pem(role: KeyRole, pem: &str) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_pkcs8_pem(pem).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let signing =
            SigningKey::from_bytes(&secret.to_bytes()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { role, signing })
    }

    /// Export as a PKCS#8 PEM document.
    pub fn to_pkcs8_pem(&self) -> Result<Zeroizing<String>, CryptoError> {
        let secret = SecretKey::from_bytes(&self.signing.to_bytes())
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        secret.to_pkcs8_pem(LineEnding::LF).map_err(|_| CryptoError::InvalidPrivateKey)
    }

    /// Raw secret scalar, for the device secure store.
    pub fn scalar_bytes(&self) -> Zeroizing<[u8; SCALAR_LEN]> {
        let mut out = Zeroizing::new([0u8; SCALAR_LEN]);
        out.copy_from_slice(&self.signing.to_bytes());
        out
    }

    /// Role of this key.
    pub fn role(&self) -> KeyRole {
        self.role
    }

    /// Public half.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(self.signing.verifying_key())
    }

    /// Sign `message` subject to the role's restrictions.
    ///
    /// # Errors
    ///
    /// `InvalidMessageLength` when a user key is asked to sign anything other
    /// than a 20-byte challenge.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], CryptoError> {
        if self.role == KeyRole::User && message.len() != Challenge::SIZE {
            return Err(CryptoError::InvalidMessageLength {
                expected: Challenge::SIZE,
                actual: message.len(),
            });
        }
        signature::sign(message, &self.signing)
    }

    /// Answer a lock challenge. Only user keys answer challenges.
    pub fn sign_challenge(
        &self,
        challenge: &Challenge,
    ) -> Result<[u8; SIGNATURE_LEN], CryptoError> {
        if self.role != KeyRole::User {
            return Err(CryptoError::WrongRole { role: self.role, operation: "answer challenges" });
        }
        self.sign(&challenge.to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("role", &self.role)
            .field("kid", &self.public_key().key_id())
            .finish_non_exhaustive()
    }
}

/// Uncompressed SEC1 P-256 public key, validated to lie on the curve.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out.copy_from_slice(point.as_bytes());
        Self(out)
    }

    /// Parse and validate 65 uncompressed bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; PUBLIC_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
        if raw[0] != 0x04 {
            return Err(CryptoError::InvalidPublicKey);
        }
        VerifyingKey::from_sec1_bytes(&raw).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(raw))
    }

    /// Parse the base64 form used in envelopes and the backend.
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD.decode(text.trim()).map_err(|_| CryptoError::InvalidPublicKey)?;
        Self::from_bytes(&bytes)
    }

    /// Base64 form.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Deterministic key identifier, see [`key_id`].
    pub fn key_id(&self) -> String {
        key_id(&self.0)
    }

    /// Verify a raw signature made by the matching private key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        signature::verify(message, signature, &self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.key_id())
    }
}

/// Stable identifier for a public key: lowercase hex of the first 16 bytes
/// of SHA-256 over the 65-byte uncompressed encoding.
///
/// Registering the same key twice yields the same id.
pub fn key_id(public_key: &[u8; PUBLIC_KEY_LEN]) -> String {
    let hash = Sha256::digest(public_key);
    hex::encode(&hash[..KEY_ID_BYTES])
}
