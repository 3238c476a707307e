//! ES256 token verification against a cached provider key set.
//!
//! The key set is fetched lazily on first use and trusted for
//! `key_set_ttl`. A token naming an unknown `kid` forces one refresh, at
//! most once per `min_refresh_interval`, which picks up provider key
//! rotation without letting junk tokens hammer the source. If a refresh
//! fails while a previous key set is cached, the stale set stays in use.
//!
//! Lookups read a shared snapshot of the key set; only fetches queue behind
//! one another.

use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Instant,
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use keyway_core::Environment;
use p256::ecdsa::{Signature, VerifyingKey, signature::Verifier};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{KeySet, KeySetSource, Principal, TokenVerifier};
use crate::{config::ProviderConfig, error::AuthError};

#[derive(Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

#[derive(Deserialize)]
struct Claims {
    sub: String,
    exp: u64,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    iss: Option<String>,
}

struct Cached {
    keys: KeySet,
    fetched_at: Instant,
}

impl Cached {
    fn age(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.fetched_at)
    }
}

/// Identity provider state, passed explicitly to whoever verifies tokens.
pub struct ProviderContext<S, E> {
    source: S,
    env: E,
    config: ProviderConfig,
    snapshot: RwLock<Option<Arc<Cached>>>,
    refreshing: Mutex<()>,
}

impl<S: KeySetSource, E: Environment> ProviderContext<S, E> {
    /// Context over `source`. Nothing is fetched until the first token.
    pub fn new(source: S, env: E, config: ProviderConfig) -> Self {
        Self { source, env, config, snapshot: RwLock::new(None), refreshing: Mutex::new(()) }
    }

    /// Verify a compact ES256 JWS and return its subject.
    pub async fn verify_token(&self, token: &str) -> Result<Principal, AuthError> {
        let mut parts = token.split('.');
        let (Some(header), Some(claims), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed("expected three segments"));
        };

        let header: Header = decode_json(header, "header")?;
        if header.alg != "ES256" {
            return Err(AuthError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header.kid.ok_or(AuthError::Malformed("header has no kid"))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .ok()
            .and_then(|raw| Signature::from_slice(&raw).ok())
            .ok_or(AuthError::Malformed("signature is not 64 bytes"))?;

        let key = self.key_for(&kid).await?;
        let signing_input = &token[..token.len() - signature_segment_len(token)];
        key.verify(signing_input.as_bytes(), &signature).map_err(|_| AuthError::BadSignature)?;

        let claims: Claims = decode_json(claims, "claims")?;
        let now = self.env.unix_seconds();
        if claims.exp.saturating_add(self.config.leeway.as_secs()) < now {
            return Err(AuthError::Expired);
        }
        if let Some(expected) = &self.config.issuer
            && claims.iss.as_deref() != Some(expected.as_str())
        {
            return Err(AuthError::WrongIssuer);
        }

        Ok(Principal { user_id: claims.sub, email: claims.email })
    }

    async fn key_for(&self, kid: &str) -> Result<VerifyingKey, AuthError> {
        let fresh = self.current().filter(|c| c.age(self.env.now()) < self.config.key_set_ttl);
        if let Some(key) = lookup(fresh.as_deref(), kid) {
            return Ok(key);
        }

        let _refreshing = self.refreshing.lock().await;
        // Re-read: the task ahead in the queue may have fetched already
        let mut cached = self.current();
        let now = self.env.now();

        if cached.as_ref().is_none_or(|c| c.age(now) >= self.config.key_set_ttl) {
            cached = self.refresh(cached, now).await?;
        }
        if let Some(key) = lookup(cached.as_deref(), kid) {
            return Ok(key);
        }

        if cached.as_ref().is_some_and(|c| c.age(now) >= self.config.min_refresh_interval) {
            debug!(kid, "unknown key id, refreshing key set");
            cached = self.refresh(cached, now).await?;
        }
        lookup(cached.as_deref(), kid).ok_or_else(|| AuthError::UnknownKeyId(kid.to_owned()))
    }

    fn current(&self) -> Option<Arc<Cached>> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn refresh(
        &self,
        previous: Option<Arc<Cached>>,
        now: Instant,
    ) -> Result<Option<Arc<Cached>>, AuthError> {
        match self.source.fetch().await {
            Ok(keys) => {
                debug!(keys = keys.len(), "provider key set loaded");
                let fresh = Arc::new(Cached { keys, fetched_at: now });
                *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::clone(&fresh));
                Ok(Some(fresh))
            },
            Err(err) if previous.is_some() => {
                warn!(%err, "key set refresh failed, keeping cached keys");
                Ok(previous)
            },
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl<S: KeySetSource, E: Environment> TokenVerifier for ProviderContext<S, E> {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        self.verify_token(token).await
    }
}

fn lookup(cached: Option<&Cached>, kid: &str) -> Option<VerifyingKey> {
    cached.and_then(|c| c.keys.get(kid)).copied()
}

/// Length of the `.signature` suffix.
fn signature_segment_len(token: &str) -> usize {
    token.rfind('.').map_or(0, |dot| token.len() - dot)
}

fn decode_json<T: for<'de> Deserialize<'de>>(
    segment: &str,
    what: &'static str,
) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|_| AuthError::Malformed(what))?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::Malformed(what))
}
