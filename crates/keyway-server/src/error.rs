//! Error types for storage, bearer authentication and the access service.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use keyway_crypto::CryptoError;
use serde_json::json;
use thiserror::Error;

/// Document store failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// redb transaction, table or commit failure
    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    /// Stored record could not be encoded or decoded
    #[error("record encoding error: {0}")]
    Codec(String),

    /// A writer panicked while holding the in-memory store
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Why a bearer credential was refused.
///
/// None of these carry token contents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No `Authorization: Bearer` header
    #[error("missing bearer token")]
    MissingToken,

    /// Token is not a three-part compact JWS with JSON header and claims
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    /// Header names an algorithm other than ES256
    #[error("unsupported token algorithm {0}")]
    UnsupportedAlgorithm(String),

    /// No provider key with this id, even after a refresh
    #[error("unknown signing key {0}")]
    UnknownKeyId(String),

    /// Signature does not verify
    #[error("token signature invalid")]
    BadSignature,

    /// `exp` is in the past
    #[error("token expired")]
    Expired,

    /// `iss` does not match the configured issuer
    #[error("token issuer rejected")]
    WrongIssuer,

    /// Provider key set could not be loaded or parsed
    #[error("key set unavailable: {0}")]
    KeySet(String),
}

/// Access service failures, each mapped to one HTTP status.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Bearer credential missing or invalid (401)
    #[error(transparent)]
    Unauthenticated(#[from] AuthError),

    /// Caller lacks the workspace role (403)
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Request body or parameter invalid (400)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Nothing stored under this name (404)
    #[error("{0} not found")]
    NotFound(String),

    /// Key already registered to another owner (409)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Concurrent writers kept winning the next version slot (409)
    #[error("version conflict on lock {lock_id} after {attempts} attempts")]
    VersionConflict {
        /// Lock being rebuilt
        lock_id: u32,
        /// Attempts made
        attempts: u32,
    },

    /// Group members without an active device key (422)
    #[error("members without an active key: {}", .0.join(", "))]
    MissingUserKeys(Vec<String>),

    /// Signing, sealing or key decoding failed (500)
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Document store failed (500)
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Anything else that is our fault (500)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Service result type.
pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::VersionConflict { .. } => StatusCode::CONFLICT,
            Self::MissingUserKeys(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Crypto(_) | Self::Storage(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Reason shown to the caller.
    ///
    /// Server-side failures collapse to a generic message; the detail goes to
    /// the log instead.
    pub fn public_message(&self) -> String {
        match self {
            Self::Crypto(_) | Self::Storage(_) | Self::Internal(_) => {
                "internal server error".to_owned()
            },
            Self::Unauthenticated(_) => "unauthorized".to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request refused");
        }
        let body = json!({ "error": self.public_message() });
        (status, Json(body)).into_response()
    }
}
