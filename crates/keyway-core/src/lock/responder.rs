//! Per-connection challenge responder.

use std::time::Instant;

use keyway_proto::{AuthResponse, Challenge, ChunkAssembler};

use super::{AuthOutcome, DenyReason, acl_store::AclStore};

/// State of the one radio link a lock serves at a time.
#[derive(Debug, Clone)]
pub(crate) struct Link {
    /// Outstanding challenge, taken by the first response
    pub(crate) challenge: Option<Challenge>,
    pub(crate) last_activity: Instant,
    pub(crate) auth_chunks: ChunkAssembler,
    pub(crate) acl_chunks: ChunkAssembler,
    pub(crate) ownership_chunks: ChunkAssembler,
}

impl Link {
    pub(crate) fn new(challenge: Challenge, now: Instant, max_message: usize) -> Self {
        Self {
            challenge: Some(challenge),
            last_activity: now,
            auth_chunks: ChunkAssembler::new(max_message),
            acl_chunks: ChunkAssembler::new(max_message),
            ownership_chunks: ChunkAssembler::new(max_message),
        }
    }
}

/// Judge a complete response against the challenge it answers.
///
/// `challenge` is `None` when this connection's challenge was already
/// consumed.
pub(crate) fn judge(challenge: Option<Challenge>, message: &[u8], acl: &AclStore) -> AuthOutcome {
    let Some(challenge) = challenge else {
        return AuthOutcome::Denied(DenyReason::NoChallenge);
    };
    let Ok(response) = AuthResponse::from_json(message) else {
        return AuthOutcome::Denied(DenyReason::Malformed);
    };
    let Ok(signature) = response.signature_bytes() else {
        return AuthOutcome::Denied(DenyReason::Malformed);
    };
    let Some(key) = acl.lookup(&response.kid) else {
        return AuthOutcome::Denied(DenyReason::UnknownKey);
    };
    if !key.verify(&challenge.to_bytes(), &signature) {
        return AuthOutcome::Denied(DenyReason::BadSignature);
    }
    AuthOutcome::Granted { kid: response.kid }
}
