//! HTTP API.
//!
//! | Method | Path | Role |
//! |--------|------|------|
//! | POST | `/v1/workspaces/:ws/locks/:lock/acl/rebuild` | workspace admin |
//! | GET | `/v1/workspaces/:ws/locks/:lock/acl` | any workspace role |
//! | GET | `/v1/workspaces/:ws/locks/:lock/admin-key` | workspace admin |
//! | PUT | `/v1/workspaces/:ws/groups/:group` | workspace admin |
//! | PUT | `/v1/workspaces/:ws/roles/:user` | workspace admin |
//! | POST | `/v1/keys` | caller |
//! | GET | `/v1/keys` | caller |
//! | DELETE | `/v1/keys/:kid` | caller, own keys |
//!
//! Every `/v1` route requires `Authorization: Bearer <token>`. Errors are
//! JSON `{"error": reason}`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::{delete, get, post, put},
};
use keyway_core::Environment;
use keyway_proto::AclEnvelope;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::{
    error::{Result, ServiceError},
    identity::{Principal, TokenVerifier, bearer_token},
    service::AccessService,
    storage::{Group, UserKeyRecord, WorkspaceRole},
};

/// Shared handler state.
pub struct AppState<E> {
    service: Arc<AccessService<E>>,
    verifier: Arc<dyn TokenVerifier>,
}

impl<E> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self { service: Arc::clone(&self.service), verifier: Arc::clone(&self.verifier) }
    }
}

/// Body of `POST /v1/keys`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterKeyRequest {
    /// Base64 uncompressed P-256 point
    pub public_key: String,
    /// Device label
    #[serde(default)]
    pub label: String,
}

/// Body of `GET /v1/keys`.
#[derive(Debug, Serialize)]
pub struct KeyList {
    /// The caller's keys
    pub keys: Vec<UserKeyRecord>,
}

/// Body of `PUT .../groups/:group`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequest {
    /// Locks the group may open
    #[serde(default)]
    pub lock_ids: Vec<u32>,
    /// Members, as identity provider subjects
    #[serde(default)]
    pub member_user_ids: Vec<String>,
}

/// Body of `PUT .../roles/:user`.
#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    /// Role to grant
    pub role: WorkspaceRole,
}

/// Body of `GET .../admin-key`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminKeyView {
    /// Lock
    #[serde(rename = "lockId")]
    pub lock_id: u32,
    /// Base64 uncompressed admin public key, as written to the lock at claim
    #[serde(rename = "adminPub")]
    pub admin_pub: String,
}

/// Build the API router.
pub fn build_router<E: Environment>(
    service: Arc<AccessService<E>>,
    verifier: Arc<dyn TokenVerifier>,
) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/workspaces/:ws/locks/:lock/acl/rebuild", post(rebuild_acl::<E>))
        .route("/v1/workspaces/:ws/locks/:lock/acl", get(latest_acl::<E>))
        .route("/v1/workspaces/:ws/locks/:lock/admin-key", get(admin_key::<E>))
        .route("/v1/workspaces/:ws/groups/:group", put(put_group::<E>))
        .route("/v1/workspaces/:ws/roles/:user", put(assign_role::<E>))
        .route("/v1/keys", post(register_key::<E>).get(list_keys::<E>))
        .route("/v1/keys/:kid", delete(revoke_key::<E>))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { service, verifier })
}

async fn healthz() -> &'static str {
    "ok"
}

async fn rebuild_acl<E: Environment>(
    State(state): State<AppState<E>>,
    Path((workspace_id, lock_id)): Path<(String, u32)>,
    headers: HeaderMap,
) -> Result<Json<AclEnvelope>> {
    let caller = authenticate(&state, &headers).await?;
    let envelope =
        blocking(&state, move |svc| svc.rebuild_acl(&caller, &workspace_id, lock_id)).await?;
    Ok(Json(envelope))
}

async fn latest_acl<E: Environment>(
    State(state): State<AppState<E>>,
    Path((workspace_id, lock_id)): Path<(String, u32)>,
    headers: HeaderMap,
) -> Result<Json<AclEnvelope>> {
    let caller = authenticate(&state, &headers).await?;
    let envelope =
        blocking(&state, move |svc| svc.latest_acl(&caller, &workspace_id, lock_id)).await?;
    Ok(Json(envelope))
}

async fn admin_key<E: Environment>(
    State(state): State<AppState<E>>,
    Path((workspace_id, lock_id)): Path<(String, u32)>,
    headers: HeaderMap,
) -> Result<Json<AdminKeyView>> {
    let caller = authenticate(&state, &headers).await?;
    let admin =
        blocking(&state, move |svc| svc.admin_public_key(&caller, &workspace_id, lock_id))
            .await?;
    Ok(Json(AdminKeyView { lock_id, admin_pub: admin.to_base64() }))
}

async fn put_group<E: Environment>(
    State(state): State<AppState<E>>,
    Path((workspace_id, group_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<GroupRequest>,
) -> Result<Json<Group>> {
    let caller = authenticate(&state, &headers).await?;
    let group = blocking(&state, move |svc| {
        svc.put_group(
            &caller,
            &workspace_id,
            &group_id,
            request.lock_ids,
            request.member_user_ids,
        )
    })
    .await?;
    Ok(Json(group))
}

async fn assign_role<E: Environment>(
    State(state): State<AppState<E>>,
    Path((workspace_id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<RoleRequest>,
) -> Result<StatusCode> {
    let caller = authenticate(&state, &headers).await?;
    blocking(&state, move |svc| svc.assign_role(&caller, &workspace_id, &user_id, request.role))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn register_key<E: Environment>(
    State(state): State<AppState<E>>,
    headers: HeaderMap,
    Json(request): Json<RegisterKeyRequest>,
) -> Result<(StatusCode, Json<UserKeyRecord>)> {
    let caller = authenticate(&state, &headers).await?;
    let record = blocking(&state, move |svc| {
        svc.register_key(&caller, &request.public_key, &request.label)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_keys<E: Environment>(
    State(state): State<AppState<E>>,
    headers: HeaderMap,
) -> Result<Json<KeyList>> {
    let caller = authenticate(&state, &headers).await?;
    let keys = blocking(&state, move |svc| svc.list_keys(&caller)).await?;
    Ok(Json(KeyList { keys }))
}

async fn revoke_key<E: Environment>(
    State(state): State<AppState<E>>,
    Path(key_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let caller = authenticate(&state, &headers).await?;
    blocking(&state, move |svc| svc.revoke_key(&caller, &key_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn authenticate<E>(state: &AppState<E>, headers: &HeaderMap) -> Result<Principal> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = bearer_token(header)?;
    Ok(state.verifier.verify(token).await?)
}

/// Run a service call on the blocking pool; storage I/O is synchronous.
async fn blocking<E, T, F>(state: &AppState<E>, call: F) -> Result<T>
where
    E: Environment,
    T: Send + 'static,
    F: FnOnce(&AccessService<E>) -> Result<T> + Send + 'static,
{
    let service = Arc::clone(&state.service);
    tokio::task::spawn_blocking(move || call(&service))
        .await
        .map_err(|e| ServiceError::Internal(format!("service task failed: {e}")))?
}
