//! Cryptographic primitives for the Keyway protocol.
//!
//! Two key rings share one signing type. Per-lock admin keys sign ACL
//! envelopes; per-installation device keys sign 20-byte challenges. Both are
//! P-256 ECDSA keys tagged with a [`KeyRole`] that restricts what they may
//! sign.
//!
//! Every signature is computed over an explicit SHA-256 digest of the message
//! (never a library's implicit pre-hash) and normalized to low-S, so the
//! phone, the backend and the lock firmware agree bit-for-bit on what is
//! signed and what verifies. ACL payloads are signed in a canonical JSON form
//! with recursively sorted keys.
//!
//! # Security
//!
//! Secret scalars are zeroized on drop. Admin private keys are only ever
//! stored sealed with AES-256-GCM under a process-wide [`MasterKey`].

pub mod acl;
pub mod canonical;
pub mod error;
pub mod keys;
pub mod seal;
pub mod signature;

pub use acl::{sign_payload, verify_envelope};
pub use canonical::canonical_serialize;
pub use error::CryptoError;
pub use keys::{KeyPair, KeyRole, PublicKey, key_id};
pub use seal::{MasterKey, SealedSecret};
pub use signature::{sign, verify};
