//! Access service.
//!
//! Everything the HTTP layer exposes, with workspace-scoped authorization
//! applied. Methods are synchronous and take the already-authenticated
//! [`Principal`]; the router runs them on the blocking pool.

use std::sync::Arc;

use keyway_core::Environment;
use keyway_crypto::{KeyPair, MasterKey, PublicKey};
use keyway_proto::AclEnvelope;
use tracing::info;

use crate::{
    acl_builder::AclBuilder,
    config::{BootstrapAdmin, BuilderConfig},
    custodian::KeyCustodian,
    error::{Result, ServiceError},
    identity::Principal,
    registry::KeyRegistry,
    storage::{Group, Storage, UserKeyRecord, WorkspaceRole},
};

/// Backend operations over one store.
pub struct AccessService<E> {
    storage: Arc<dyn Storage>,
    env: E,
    custodian: KeyCustodian,
    builder: AclBuilder,
    registry: KeyRegistry,
}

impl<E: Environment> AccessService<E> {
    /// Service over `storage`, sealing admin keys under `master`.
    pub fn new(
        storage: Arc<dyn Storage>,
        env: E,
        master: MasterKey,
        builder: BuilderConfig,
    ) -> Self {
        Self {
            storage,
            env,
            custodian: KeyCustodian::new(master),
            builder: AclBuilder::new(builder),
            registry: KeyRegistry::new(),
        }
    }

    /// Build and store the next ACL version. Workspace admins only.
    pub fn rebuild_acl(
        &self,
        caller: &Principal,
        workspace_id: &str,
        lock_id: u32,
    ) -> Result<AclEnvelope> {
        self.require_role(caller, workspace_id, WorkspaceRole::Admin)?;
        info!(lock_id, workspace_id, by = %caller.user_id, "acl rebuild requested");
        self.builder.rebuild(
            self.storage.as_ref(),
            &self.custodian,
            &self.env,
            lock_id,
            workspace_id,
        )
    }

    /// Latest ACL envelope. Any workspace role.
    pub fn latest_acl(
        &self,
        caller: &Principal,
        workspace_id: &str,
        lock_id: u32,
    ) -> Result<AclEnvelope> {
        self.require_role(caller, workspace_id, WorkspaceRole::Member)?;
        self.builder.fetch_latest(self.storage.as_ref(), lock_id, workspace_id)
    }

    /// Admin public key for the ownership bootstrap, created when absent.
    /// Workspace admins only.
    pub fn admin_public_key(
        &self,
        caller: &Principal,
        workspace_id: &str,
        lock_id: u32,
    ) -> Result<PublicKey> {
        self.require_role(caller, workspace_id, WorkspaceRole::Admin)?;
        let admin =
            self.custodian.get_or_create(self.storage.as_ref(), &self.env, lock_id, workspace_id)?;
        Ok(admin.public_key())
    }

    /// Register the caller's device key.
    pub fn register_key(
        &self,
        caller: &Principal,
        public_key_b64: &str,
        label: &str,
    ) -> Result<UserKeyRecord> {
        self.registry.register(
            self.storage.as_ref(),
            &self.env,
            &caller.user_id,
            public_key_b64,
            label,
        )
    }

    /// The caller's device keys.
    pub fn list_keys(&self, caller: &Principal) -> Result<Vec<UserKeyRecord>> {
        self.registry.list(self.storage.as_ref(), &caller.user_id)
    }

    /// Revoke one of the caller's device keys.
    pub fn revoke_key(&self, caller: &Principal, key_id: &str) -> Result<UserKeyRecord> {
        self.registry.revoke(self.storage.as_ref(), &caller.user_id, key_id)
    }

    /// Create or replace a group. Workspace admins only.
    ///
    /// Membership takes effect on the next rebuild of each affected lock.
    pub fn put_group(
        &self,
        caller: &Principal,
        workspace_id: &str,
        group_id: &str,
        lock_ids: Vec<u32>,
        member_user_ids: Vec<String>,
    ) -> Result<Group> {
        self.require_role(caller, workspace_id, WorkspaceRole::Admin)?;
        if group_id.is_empty() {
            return Err(ServiceError::BadRequest("group id is empty".into()));
        }
        let group = Group {
            group_id: group_id.to_owned(),
            workspace_id: workspace_id.to_owned(),
            lock_ids,
            member_user_ids,
        };
        self.storage.put_group(&group)?;
        info!(workspace_id, group_id, by = %caller.user_id, "group updated");
        Ok(group)
    }

    /// Grant `user_id` a role in the workspace. Workspace admins only.
    ///
    /// An admin cannot change their own role, so a workspace never loses
    /// its last admin through this call.
    pub fn assign_role(
        &self,
        caller: &Principal,
        workspace_id: &str,
        user_id: &str,
        role: WorkspaceRole,
    ) -> Result<()> {
        self.require_role(caller, workspace_id, WorkspaceRole::Admin)?;
        if user_id == caller.user_id {
            return Err(ServiceError::BadRequest("admins cannot change their own role".into()));
        }
        self.storage.set_role(workspace_id, user_id, role)?;
        info!(workspace_id, user_id, ?role, by = %caller.user_id, "workspace role assigned");
        Ok(())
    }

    /// Seed an admin from operator configuration.
    pub fn bootstrap_admin(&self, admin: &BootstrapAdmin) -> Result<()> {
        self.storage.set_role(&admin.workspace_id, &admin.user_id, WorkspaceRole::Admin)?;
        info!(%admin, "bootstrap admin seeded");
        Ok(())
    }

    /// Record a group, as synced from workspace administration.
    pub fn upsert_group(&self, group: &Group) -> Result<()> {
        Ok(self.storage.put_group(group)?)
    }

    /// Record a workspace role, as synced from workspace administration.
    pub fn set_role(&self, workspace_id: &str, user_id: &str, role: WorkspaceRole) -> Result<()> {
        Ok(self.storage.set_role(workspace_id, user_id, role)?)
    }

    /// Admin keypair for direct signing, e.g. by an operator tool.
    pub fn admin_keypair(&self, lock_id: u32, workspace_id: &str) -> Result<Option<KeyPair>> {
        self.custodian.get_active(self.storage.as_ref(), lock_id, workspace_id)
    }

    fn require_role(
        &self,
        caller: &Principal,
        workspace_id: &str,
        required: WorkspaceRole,
    ) -> Result<()> {
        match self.storage.role(workspace_id, &caller.user_id)? {
            Some(role) if role >= required => Ok(()),
            Some(_) => Err(ServiceError::Forbidden(format!(
                "workspace {workspace_id} requires {required:?}"
            ))),
            None => {
                Err(ServiceError::Forbidden(format!("not a member of workspace {workspace_id}")))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use keyway_core::SystemEnv;

    use super::*;
    use crate::storage::MemoryStorage;

    fn service() -> AccessService<SystemEnv> {
        AccessService::new(
            Arc::new(MemoryStorage::new()),
            SystemEnv,
            MasterKey::from_bytes(&[1; 32]).unwrap(),
            BuilderConfig::default(),
        )
    }

    fn who(user: &str) -> Principal {
        Principal { user_id: user.into(), email: None }
    }

    #[test]
    fn roles_are_workspace_scoped() {
        let svc = service();
        svc.set_role("ws-a", "alice", WorkspaceRole::Admin).unwrap();
        svc.set_role("ws-b", "alice", WorkspaceRole::Member).unwrap();

        assert!(svc.rebuild_acl(&who("alice"), "ws-a", 1).is_ok());
        assert!(matches!(
            svc.rebuild_acl(&who("alice"), "ws-b", 1),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            svc.latest_acl(&who("alice"), "ws-c", 1),
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[test]
    fn members_read_but_do_not_rebuild() {
        let svc = service();
        svc.set_role("ws", "admin", WorkspaceRole::Admin).unwrap();
        svc.set_role("ws", "bob", WorkspaceRole::Member).unwrap();

        assert!(matches!(svc.latest_acl(&who("bob"), "ws", 1), Err(ServiceError::NotFound(_))));
        let built = svc.rebuild_acl(&who("admin"), "ws", 1).unwrap();
        assert_eq!(svc.latest_acl(&who("bob"), "ws", 1).unwrap(), built);
        assert!(matches!(
            svc.admin_public_key(&who("bob"), "ws", 1),
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[test]
    fn groups_and_roles_need_an_admin() {
        let svc = service();
        svc.bootstrap_admin(&"ws:root".parse().unwrap()).unwrap();

        svc.assign_role(&who("root"), "ws", "bob", WorkspaceRole::Member).unwrap();
        assert!(matches!(
            svc.assign_role(&who("bob"), "ws", "bob", WorkspaceRole::Admin),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            svc.assign_role(&who("root"), "ws", "root", WorkspaceRole::Member),
            Err(ServiceError::BadRequest(_))
        ));
        assert!(matches!(
            svc.put_group(&who("bob"), "ws", "g", vec![1], vec!["bob".into()]),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            svc.put_group(&who("root"), "ws", "", vec![1], vec![]),
            Err(ServiceError::BadRequest(_))
        ));

        let group = svc.put_group(&who("root"), "ws", "g", vec![1], vec![]).unwrap();
        assert_eq!(group.workspace_id, "ws");
        assert_eq!(svc.rebuild_acl(&who("root"), "ws", 1).unwrap().payload.version, 1);
    }

    #[test]
    fn admin_key_matches_acl_signer() {
        let svc = service();
        svc.set_role("ws", "admin", WorkspaceRole::Admin).unwrap();
        let admin = svc.admin_public_key(&who("admin"), "ws", 1).unwrap();
        let envelope = svc.rebuild_acl(&who("admin"), "ws", 1).unwrap();
        assert!(keyway_crypto::verify_envelope(&envelope, &admin));
        assert_eq!(svc.admin_keypair(1, "ws").unwrap().unwrap().public_key(), admin);
    }
}
