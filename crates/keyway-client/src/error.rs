//! Client error type.

use keyway_core::{SessionError, TransportError};
use keyway_crypto::CryptoError;
use keyway_proto::{ProtocolError, StatusCode};
use thiserror::Error;

/// Everything a client operation can fail with.
///
/// Radio and backend reachability failures are transient; a fresh
/// connection may succeed. Cryptographic and authorization failures are
/// final and never retried automatically.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No device key stored under this label
    #[error("no private key under {label}")]
    NoPrivateKey {
        /// Secure store label
        label: String,
    },

    /// Platform secure store failed
    #[error("secure store: {0}")]
    SecureStore(String),

    /// A bounded radio wait expired; the link was torn down
    #[error("timed out waiting for {stage}")]
    TransportTimeout {
        /// What was being waited for
        stage: &'static str,
    },

    /// Radio link failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Session state machine refused an event
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Lock refused the unlock attempt
    #[error("access denied")]
    Denied,

    /// Lock refused an ACL or ownership write
    #[error("lock rejected the write: {}", .0.reason())]
    Rejected(StatusCode),

    /// Backend answered with an error or could not be reached
    #[error("backend error{}: {message}", .status.map(|s| format!(" {s}")).unwrap_or_default())]
    Backend {
        /// HTTP status, `None` when no response arrived
        status: Option<u16>,
        /// Server-provided reason
        message: String,
    },

    /// Envelope served for a different lock than requested
    #[error("backend served an envelope for lock {actual}, expected {expected}")]
    EnvelopeMismatch {
        /// Requested lock
        expected: u32,
        /// Lock named in the payload
        actual: u32,
    },

    /// Signing or key decoding failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Wire format error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Caller cancelled the operation
    #[error("cancelled")]
    Cancelled,
}

/// Client result type.
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// True if retrying with a new connection (or request) may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::TransportTimeout { .. } => true,
            Self::Backend { status, .. } => status.is_none_or(|s| s >= 500),
            _ => false,
        }
    }

    /// Short reason safe to show a person. Never carries key material.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoPrivateKey { .. } => "this device has no key yet",
            Self::SecureStore(_) => "could not access secure storage",
            Self::TransportTimeout { .. } => "the lock did not answer in time",
            Self::Transport(_) => "could not reach the lock",
            Self::Denied => "access denied",
            Self::Rejected(code) => code.reason(),
            Self::Backend { status: Some(401 | 403), .. } => "not allowed",
            Self::Backend { status: Some(422), .. } => "some members have no registered device",
            Self::Backend { .. } => "could not reach the server",
            Self::EnvelopeMismatch { .. } => "server sent an update for another lock",
            Self::Protocol(ProtocolError::InvalidClaim) => "not a lock claim code",
            Self::Session(_) | Self::Crypto(_) | Self::Protocol(_) => "unexpected response",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_are_retryable() {
        assert!(ClientError::Transport(TransportError::Disconnected).is_retryable());
        assert!(ClientError::TransportTimeout { stage: "result" }.is_retryable());
        assert!(ClientError::Backend { status: None, message: "refused".into() }.is_retryable());
        assert!(ClientError::Backend { status: Some(503), message: String::new() }.is_retryable());
    }

    #[test]
    fn final_failures_are_not() {
        assert!(!ClientError::Denied.is_retryable());
        assert!(!ClientError::Rejected(StatusCode::BadSignature).is_retryable());
        assert!(!ClientError::Backend { status: Some(403), message: String::new() }.is_retryable());
        assert!(!ClientError::NoPrivateKey { label: "k".into() }.is_retryable());
        assert!(!ClientError::Crypto(CryptoError::Signing).is_retryable());
    }

    #[test]
    fn messages_are_short_and_generic() {
        let err = ClientError::Backend { status: Some(500), message: "db at 10.0.0.3".into() };
        assert_eq!(err.user_message(), "could not reach the server");
        assert_eq!(
            ClientError::Rejected(StatusCode::StaleVersion).user_message(),
            StatusCode::StaleVersion.reason()
        );
        assert_eq!(err.to_string(), "backend error 500: db at 10.0.0.3");
    }
}
