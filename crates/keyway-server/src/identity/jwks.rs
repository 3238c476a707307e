//! Provider key sets in JWKS form.

use std::{collections::HashMap, path::PathBuf};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::ecdsa::VerifyingKey;
use serde::Deserialize;

use crate::error::AuthError;

const COORDINATE_LEN: usize = 32;

#[derive(Deserialize)]
struct Document {
    keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct Jwk {
    kty: String,
    #[serde(default)]
    crv: Option<String>,
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
}

/// Verification keys by key id.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, VerifyingKey>,
}

impl KeySet {
    /// Parse a JWKS document.
    ///
    /// Keys other than P-256 EC keys with a `kid` are skipped; providers
    /// routinely publish RSA keys alongside.
    pub fn from_json(bytes: &[u8]) -> Result<Self, AuthError> {
        let document: Document =
            serde_json::from_slice(bytes).map_err(|e| AuthError::KeySet(e.to_string()))?;
        let mut keys = HashMap::new();
        for jwk in document.keys {
            if jwk.kty != "EC" || jwk.crv.as_deref() != Some("P-256") {
                continue;
            }
            let (Some(kid), Some(x), Some(y)) = (jwk.kid, jwk.x, jwk.y) else {
                continue;
            };
            keys.insert(kid.clone(), point(&kid, &x, &y)?);
        }
        Ok(Self { keys })
    }

    /// Add one key.
    #[must_use]
    pub fn with_key(mut self, kid: &str, key: VerifyingKey) -> Self {
        self.keys.insert(kid.to_owned(), key);
        self
    }

    /// Key by id.
    pub fn get(&self, kid: &str) -> Option<&VerifyingKey> {
        self.keys.get(kid)
    }

    /// Number of usable keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no key is usable.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn point(kid: &str, x: &str, y: &str) -> Result<VerifyingKey, AuthError> {
    let bad = || AuthError::KeySet(format!("key {kid} is not a P-256 point"));
    let x = URL_SAFE_NO_PAD.decode(x).map_err(|_| bad())?;
    let y = URL_SAFE_NO_PAD.decode(y).map_err(|_| bad())?;
    if x.len() != COORDINATE_LEN || y.len() != COORDINATE_LEN {
        return Err(bad());
    }
    let mut sec1 = Vec::with_capacity(1 + 2 * COORDINATE_LEN);
    sec1.push(0x04);
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);
    VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| bad())
}

/// Where a provider key set comes from.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Load the current key set.
    async fn fetch(&self) -> Result<KeySet, AuthError>;
}

/// Key set read from a JWKS file, re-read on every fetch.
#[derive(Debug, Clone)]
pub struct FileKeySetSource {
    path: PathBuf,
}

impl FileKeySetSource {
    /// Source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl KeySetSource for FileKeySetSource {
    async fn fetch(&self) -> Result<KeySet, AuthError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| AuthError::KeySet(format!("{}: {e}", self.path.display())))?;
        KeySet::from_json(&bytes)
    }
}

/// Fixed key set.
#[derive(Debug, Clone)]
pub struct StaticKeySetSource(pub KeySet);

#[async_trait]
impl KeySetSource for StaticKeySetSource {
    async fn fetch(&self) -> Result<KeySet, AuthError> {
        Ok(self.0.clone())
    }
}
