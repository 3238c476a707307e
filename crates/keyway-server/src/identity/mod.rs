//! Bearer credential verification.
//!
//! The identity provider authenticates people; this module only checks the
//! token it issued and extracts who the caller is. Production uses
//! [`ProviderContext`], which verifies ES256 compact JWS tokens against the
//! provider's key set. [`StaticTokens`] maps fixed strings to principals for
//! tests and local runs.

mod jwks;
mod provider;

use std::collections::HashMap;

use async_trait::async_trait;

pub use self::{
    jwks::{FileKeySetSource, KeySet, KeySetSource, StaticKeySetSource},
    provider::ProviderContext,
};
use crate::error::AuthError;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Stable user id (`sub`)
    pub user_id: String,
    /// Email claim, informational only
    pub email: Option<String>,
}

/// Turns a bearer token into a principal.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `token` and identify its subject.
    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Extract the token from an `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingToken)?;
    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MissingToken)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

/// Fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, Principal>,
}

impl StaticTokens {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `user_id`.
    #[must_use]
    pub fn with(mut self, token: &str, user_id: &str) -> Self {
        self.tokens
            .insert(token.to_owned(), Principal { user_id: user_id.to_owned(), email: None });
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokens {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens.get(token).cloned().ok_or(AuthError::BadSignature)
    }
}
