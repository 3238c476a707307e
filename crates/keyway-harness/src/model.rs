//! Reference model of one lock.
//!
//! The model tracks only what the lock's decisions depend on: who owns it,
//! which ACL version it runs and which users that ACL lists. Model-based
//! tests drive the real [`keyway_core::Lock`] with the same operation
//! sequence and require identical results.
//!
//! Actors are small indices. Admin `i` and user `i` map to fixed keys via
//! [`admin_keypair`] and [`user_keypair`], so the model needs no crypto.

use std::collections::BTreeSet;

use arbitrary::Arbitrary;
use keyway_core::DenyReason;
use keyway_crypto::{CryptoError, KeyPair, KeyRole};
use keyway_proto::StatusCode;

/// Admin identities an operation can pick from.
pub const ADMINS: u8 = 3;

/// User identities an operation can pick from.
pub const USERS: u8 = 4;

/// Listed users beyond this many are ignored by both sides.
pub const USERS_PER_ACL: usize = 8;

/// Deterministic admin key for index `i`.
pub fn admin_keypair(i: u8) -> Result<KeyPair, CryptoError> {
    KeyPair::from_scalar(KeyRole::Admin, &[0xa0 + i % ADMINS; 32])
}

/// Deterministic device key for index `i`.
pub fn user_keypair(i: u8) -> Result<KeyPair, CryptoError> {
    KeyPair::from_scalar(KeyRole::User, &[0x10 + i % USERS; 32])
}

/// One step against a lock.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Admin `admin` presents the claim payload, with the printed code or a
    /// wrong one
    Claim {
        /// Admin index
        admin: u8,
        /// Whether the printed code is used
        correct_code: bool,
    },
    /// Push an ACL listing the first [`USERS_PER_ACL`] of `users` at
    /// `version`, signed by admin `signer`
    PushAcl {
        /// Admin index of the signer
        signer: u8,
        /// Envelope version
        version: u8,
        /// User indices listed
        users: Vec<u8>,
    },
    /// User `user` answers the challenge, or a different one
    Unlock {
        /// User index
        user: u8,
        /// Sign a challenge other than the one issued
        forge: bool,
    },
}

/// Observable result of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Status byte on `acl-status-notify`
    Status(StatusCode),
    /// Unlock granted to this user
    Granted(u8),
    /// Unlock refused
    Denied(DenyReason),
}

/// What the lock should be after any prefix of operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelLock {
    /// Admin index pinned by the first correct claim
    pub owner: Option<u8>,
    /// Highest accepted ACL version
    pub version: u32,
    /// Users in the accepted ACL
    pub users: BTreeSet<u8>,
}

impl ModelLock {
    /// Factory-fresh lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `op`, returning what the lock reports.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::Claim { admin, correct_code } => {
                if self.owner.is_some() || !correct_code {
                    return OperationResult::Status(StatusCode::Unauthorized);
                }
                self.owner = Some(admin % ADMINS);
                OperationResult::Status(StatusCode::OwnershipAccepted)
            },
            Operation::PushAcl { signer, version, users } => {
                let Some(owner) = self.owner else {
                    return OperationResult::Status(StatusCode::NotOwned);
                };
                if signer % ADMINS != owner {
                    return OperationResult::Status(StatusCode::BadSignature);
                }
                if u32::from(*version) <= self.version {
                    return OperationResult::Status(StatusCode::StaleVersion);
                }
                self.version = u32::from(*version);
                self.users = users.iter().take(USERS_PER_ACL).map(|u| u % USERS).collect();
                OperationResult::Status(StatusCode::Accepted)
            },
            Operation::Unlock { user, forge } => {
                let user = user % USERS;
                if !self.users.contains(&user) {
                    OperationResult::Denied(DenyReason::UnknownKey)
                } else if *forge {
                    OperationResult::Denied(DenyReason::BadSignature)
                } else {
                    OperationResult::Granted(user)
                }
            },
        }
    }
}
