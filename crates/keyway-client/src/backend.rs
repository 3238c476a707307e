//! Backend API boundary.
//!
//! The client needs three things from the backend: the latest signed ACL
//! for a lock, the lock's admin public key (for claiming) and registration
//! of its own device key. [`HttpBackend`] talks to the HTTP API; the
//! simulation harness plugs the service in directly.

use std::time::Duration;

use async_trait::async_trait;
use keyway_proto::AclEnvelope;
use reqwest::Url;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// What the client asks of the backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Latest signed ACL for `lock_id` in `workspace_id`.
    async fn latest_acl(&self, workspace_id: &str, lock_id: u32) -> Result<AclEnvelope>;

    /// Base64 admin public key for `lock_id`, created on first request.
    async fn admin_key(&self, workspace_id: &str, lock_id: u32) -> Result<String>;

    /// Register this device's public key. Returns the key id.
    async fn register_key(&self, public_key_b64: &str, label: &str) -> Result<String>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody<'a> {
    public_key: &'a str,
    label: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Registered {
    key_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminKey {
    admin_pub: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Backend over its HTTP API with a bearer token.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpBackend {
    /// Client for the API at `base_url`, authenticating with `token`.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let invalid = |message: String| ClientError::Backend { status: None, message };
        let base_url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid(format!("{base_url} cannot be a base url")));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Self { client, base_url, token: token.to_owned() })
    }

    /// Base url with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn lock_url(&self, workspace_id: &str, lock_id: u32, tail: &str) -> Url {
        let lock_id = lock_id.to_string();
        self.endpoint(&["v1", "workspaces", workspace_id, "locks", &lock_id, tail])
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.bearer_auth(&self.token).send().await.map_err(request_failed)?;
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(request_failed);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("error").to_owned(),
        };
        warn!(status = status.as_u16(), %message, "backend request failed");
        Err(ClientError::Backend { status: Some(status.as_u16()), message })
    }
}

fn request_failed(err: reqwest::Error) -> ClientError {
    ClientError::Backend { status: err.status().map(|s| s.as_u16()), message: err.to_string() }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn latest_acl(&self, workspace_id: &str, lock_id: u32) -> Result<AclEnvelope> {
        debug!(workspace_id, lock_id, "fetching latest acl");
        self.send(self.client.get(self.lock_url(workspace_id, lock_id, "acl"))).await
    }

    async fn admin_key(&self, workspace_id: &str, lock_id: u32) -> Result<String> {
        let url = self.lock_url(workspace_id, lock_id, "admin-key");
        let body: AdminKey = self.send(self.client.get(url)).await?;
        Ok(body.admin_pub)
    }

    async fn register_key(&self, public_key_b64: &str, label: &str) -> Result<String> {
        let url = self.endpoint(&["v1", "keys"]);
        let body = RegisterBody { public_key: public_key_b64, label };
        let registered: Registered = self.send(self.client.post(url).json(&body)).await?;
        Ok(registered.key_id)
    }
}
