//! Wire formats for the Keyway lock access-control protocol.
//!
//! Everything that crosses the radio link or the backend boundary is defined
//! here: the legacy 12-byte beacon, the 20-byte challenge, the signed ACL
//! envelope, the ownership bootstrap message, status bytes and the chunk
//! framing used to move JSON text over a small-MTU characteristic.
//!
//! Fixed-width structures use compile-time verified layouts via `zerocopy`
//! and are big-endian so firmware-side parsing stays trivial. Variable-size
//! messages are JSON because the backend stores and serves them as documents.
//!
//! # Security
//!
//! This crate only parses and encodes. Signature checks live in
//! `keyway-crypto`; acceptance rules live in `keyway-core`. Reassembly is
//! capped at [`chunk::MAX_MESSAGE_SIZE`] so a peer cannot exhaust lock memory.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod beacon;
pub mod characteristic;
pub mod chunk;
pub mod claim;
pub mod envelope;
pub mod errors;
pub mod ownership;
pub mod status;

pub use auth::{AuthResponse, AuthResult, Challenge};
pub use beacon::BeaconFrame;
pub use characteristic::Characteristic;
pub use chunk::ChunkAssembler;
pub use claim::ClaimPayload;
pub use envelope::{AclEnvelope, AclPayload, UserEntry};
pub use errors::{ProtocolError, Result};
pub use ownership::OwnershipSet;
pub use status::StatusCode;

/// Length of an uncompressed SEC1 P-256 public key.
pub const PUBLIC_KEY_LEN: usize = 65;

/// Length of a raw `r || s` P-256 ECDSA signature.
pub const SIGNATURE_LEN: usize = 64;
