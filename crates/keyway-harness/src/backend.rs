//! The access service as a client backend, without HTTP.
//!
//! Errors surface the way the HTTP client reports them: the status code and
//! the public message, so scenario assertions hold for both transports.

use std::sync::Arc;

use async_trait::async_trait;
use keyway_client::{Backend, ClientError, Result};
use keyway_core::Environment;
use keyway_proto::AclEnvelope;
use keyway_server::{AccessService, Principal, ServiceError};

/// One user's view of an in-process [`AccessService`].
pub struct InProcessBackend<E> {
    service: Arc<AccessService<E>>,
    caller: Principal,
}

impl<E: Environment> InProcessBackend<E> {
    /// Calls into `service` as `user_id`.
    pub fn new(service: Arc<AccessService<E>>, user_id: &str) -> Self {
        Self { service, caller: Principal { user_id: user_id.to_owned(), email: None } }
    }

    /// Identity calls are made as
    pub fn caller(&self) -> &Principal {
        &self.caller
    }
}

fn backend_error(err: ServiceError) -> ClientError {
    ClientError::Backend { status: Some(err.status().as_u16()), message: err.public_message() }
}

#[async_trait]
impl<E: Environment> Backend for InProcessBackend<E> {
    async fn latest_acl(&self, workspace_id: &str, lock_id: u32) -> Result<AclEnvelope> {
        self.service.latest_acl(&self.caller, workspace_id, lock_id).map_err(backend_error)
    }

    async fn admin_key(&self, workspace_id: &str, lock_id: u32) -> Result<String> {
        self.service
            .admin_public_key(&self.caller, workspace_id, lock_id)
            .map(|key| key.to_base64())
            .map_err(backend_error)
    }

    async fn register_key(&self, public_key_b64: &str, label: &str) -> Result<String> {
        self.service
            .register_key(&self.caller, public_key_b64, label)
            .map(|record| record.key_id)
            .map_err(backend_error)
    }
}
