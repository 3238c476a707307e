//! Error types for the lock model, client sessions and radio transport.

use keyway_crypto::CryptoError;
use keyway_proto::{ProtocolError, StatusCode};
use thiserror::Error;

use crate::{auth::AuthState, transfer::TransferState};

/// Why the lock refused an ACL envelope.
///
/// Every variant leaves the stored ACL untouched and maps to one status byte.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    /// Reassembly or JSON parsing failed
    #[error("malformed envelope: {0}")]
    Malformed(ProtocolError),

    /// Announced length exceeds the reassembly buffer
    #[error("envelope too large: {size} bytes (max {max})")]
    TooLarge {
        /// Announced size
        size: usize,
        /// Buffer size
        max: usize,
    },

    /// Envelope addressed to another lock
    #[error("envelope for lock {actual}, this is lock {expected}")]
    WrongLock {
        /// This lock
        expected: u32,
        /// Lock named in the payload
        actual: u32,
    },

    /// No trust root pinned yet
    #[error("lock has no admin key")]
    NotOwned,

    /// Signature does not verify against the admin key
    #[error("envelope signature invalid")]
    BadSignature,

    /// Replay or rollback
    #[error("stale version {offered}, current is {current}")]
    StaleVersion {
        /// Version held by the lock
        current: u32,
        /// Version offered
        offered: u32,
    },

    /// Signed list carries a key that is not a P-256 point
    #[error("invalid public key for {kid}")]
    InvalidUserKey {
        /// Offending entry
        kid: String,
    },
}

impl AclError {
    /// Status byte notified to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Malformed(_) | Self::InvalidUserKey { .. } => StatusCode::Malformed,
            Self::TooLarge { .. } => StatusCode::TooLarge,
            Self::WrongLock { .. } => StatusCode::WrongLock,
            Self::NotOwned => StatusCode::NotOwned,
            Self::BadSignature => StatusCode::BadSignature,
            Self::StaleVersion { .. } => StatusCode::StaleVersion,
        }
    }
}

impl From<ProtocolError> for AclError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::PayloadTooLarge { size, max } => Self::TooLarge { size, max },
            other => Self::Malformed(other),
        }
    }
}

/// Why the lock refused an ownership bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnershipError {
    /// Message could not be reassembled or parsed
    #[error("malformed ownership message: {0}")]
    Malformed(ProtocolError),

    /// Admin key is not a valid P-256 point
    #[error("invalid admin key")]
    InvalidAdminKey,

    /// Message addressed to another lock
    #[error("ownership message for lock {actual}, this is lock {expected}")]
    WrongLock {
        /// This lock
        expected: u32,
        /// Lock named in the message
        actual: u32,
    },

    /// Lock already has a trust root
    #[error("lock already owned")]
    AlreadyOwned,

    /// Claim code mismatch
    #[error("claim code rejected")]
    WrongClaimCode,
}

impl OwnershipError {
    /// Status byte notified to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Malformed(ProtocolError::PayloadTooLarge { .. }) => StatusCode::TooLarge,
            Self::Malformed(_) | Self::InvalidAdminKey => StatusCode::Malformed,
            Self::WrongLock { .. } => StatusCode::WrongLock,
            Self::AlreadyOwned | Self::WrongClaimCode => StatusCode::Unauthorized,
        }
    }
}

/// Client-side session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Operation not valid in the current auth state
    #[error("invalid auth state {state:?} for {operation}")]
    InvalidAuthState {
        /// Current state
        state: AuthState,
        /// Attempted operation
        operation: &'static str,
    },

    /// Operation not valid in the current transfer state
    #[error("invalid transfer state {state:?} for {operation}")]
    InvalidTransferState {
        /// Current state
        state: TransferState,
        /// Attempted operation
        operation: &'static str,
    },

    /// Challenge came from a different lock than the one dialed
    #[error("challenge from lock {actual}, expected lock {expected}")]
    WrongLock {
        /// Lock the client connected to
        expected: u32,
        /// Lock named in the challenge
        actual: u32,
    },

    /// Wire format error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Signing or key error
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Radio transport failures.
///
/// All of these are transient: the caller may retry with a new connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Could not establish a link
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Peer or radio dropped the link
    #[error("link disconnected")]
    Disconnected,

    /// Platform radio error
    #[error("radio error: {0}")]
    Io(String),
}
