//! World state for scenario execution.
//!
//! The World owns every actor of one simulated deployment: the backend
//! service, the locks on the radio and one client per user, each with its
//! own secure store. Scenario steps and oracles reach everything through it.

use std::{collections::BTreeMap, sync::Arc};

use keyway_client::{ClientConfig, ClientError, LockClient, MemoryStore};
use keyway_core::{Environment, LockConfig, LockIdentity};
use keyway_crypto::{KeyPair, MasterKey};
use keyway_proto::{AclEnvelope, ClaimPayload};
use keyway_server::{
    AccessService, BuilderConfig, Group, MemoryStorage, Principal, ServiceError, WorkspaceRole,
};

use crate::{
    backend::InProcessBackend,
    sim_env::SimEnv,
    sim_radio::{SimLock, SimRadio},
};

/// Lock client as wired inside the simulation.
pub type SimClient = LockClient<SimRadio, SimEnv, MemoryStore>;

/// One user: a phone with a client and a session with the backend.
pub struct Actor {
    /// Phone-side client
    pub client: SimClient,
    /// Backend as this user sees it
    pub backend: InProcessBackend<SimEnv>,
    /// Workspace role, if any
    pub role: Option<WorkspaceRole>,
}

struct SimLockEntry {
    lock: Arc<SimLock>,
    claim: ClaimPayload,
}

/// World state containing all actors.
pub struct World {
    env: SimEnv,
    radio: SimRadio,
    service: Arc<AccessService<SimEnv>>,
    workspace_id: String,
    actors: BTreeMap<String, Actor>,
    locks: BTreeMap<u32, SimLockEntry>,
}

impl World {
    /// Empty world for `workspace_id`, replaying `seed`.
    pub fn new(seed: u64, workspace_id: &str) -> Result<Self, String> {
        let env = SimEnv::with_seed(seed);
        let mut master = [0u8; 32];
        env.random_bytes(&mut master);
        let master = MasterKey::from_bytes(&master).map_err(|e| e.to_string())?;

        let service = Arc::new(AccessService::new(
            Arc::new(MemoryStorage::new()),
            env.clone(),
            master,
            BuilderConfig::default(),
        ));

        Ok(Self {
            radio: SimRadio::new(env.clone()),
            env,
            service,
            workspace_id: workspace_id.to_owned(),
            actors: BTreeMap::new(),
            locks: BTreeMap::new(),
        })
    }

    /// Put a factory-fresh lock in radio range.
    pub fn add_lock(
        &mut self,
        lock_id: u32,
        claim_code: &str,
        config: LockConfig,
    ) -> Arc<SimLock> {
        let identity = LockIdentity { lock_id, claim_code: claim_code.to_owned() };
        let lock = self.radio.add_lock(identity, config);
        let claim = ClaimPayload { lock_id, code: claim_code.to_owned() };
        self.locks.insert(lock_id, SimLockEntry { lock: lock.clone(), claim });
        lock
    }

    /// Add a user, recording `role` in the workspace when given.
    pub fn add_user(&mut self, name: &str, role: Option<WorkspaceRole>) -> Result<(), String> {
        self.add_user_with_config(name, role, ClientConfig::default())
    }

    /// Add a user whose client uses `config`.
    pub fn add_user_with_config(
        &mut self,
        name: &str,
        role: Option<WorkspaceRole>,
        config: ClientConfig,
    ) -> Result<(), String> {
        if let Some(role) = role {
            self.service.set_role(&self.workspace_id, name, role).map_err(|e| e.to_string())?;
        }
        let client =
            LockClient::new(self.radio.clone(), self.env.clone(), MemoryStore::new(), config);
        let backend = InProcessBackend::new(self.service.clone(), name);
        self.actors.insert(name.to_owned(), Actor { client, backend, role });
        Ok(())
    }

    /// Put `members` in a group opening `lock_ids`.
    pub fn grant(&self, group_id: &str, lock_ids: &[u32], members: &[&str]) -> Result<(), String> {
        let group = Group {
            group_id: group_id.to_owned(),
            workspace_id: self.workspace_id.clone(),
            lock_ids: lock_ids.to_vec(),
            member_user_ids: members.iter().map(|m| (*m).to_owned()).collect(),
        };
        self.service.upsert_group(&group).map_err(|e| e.to_string())
    }

    /// Build the next ACL for `lock_id` as `admin`.
    pub fn rebuild(&self, admin: &str, lock_id: u32) -> Result<AclEnvelope, ServiceError> {
        let caller = Principal { user_id: admin.to_owned(), email: None };
        self.service.rebuild_acl(&caller, &self.workspace_id, lock_id)
    }

    /// Register `name`'s device key with the backend. Returns the key id.
    pub async fn register(&self, name: &str) -> Result<String, ClientError> {
        let actor = self.require(name)?;
        actor.client.register_device(&actor.backend, name).await
    }

    /// Claim `lock_id` from its printed payload as `admin`.
    pub async fn claim(&self, admin: &str, lock_id: u32) -> Result<u32, ClientError> {
        let actor = self.require(admin)?;
        let text = self.claim_text(lock_id).unwrap_or_default();
        actor.client.claim(&actor.backend, &self.workspace_id, &text).await
    }

    /// Fetch the latest ACL as `name` and push it to the lock.
    pub async fn sync(&self, name: &str, lock_id: u32) -> Result<u32, ClientError> {
        let actor = self.require(name)?;
        actor.client.sync_acl(&actor.backend, &self.workspace_id, lock_id).await
    }

    /// Unlock `lock_id` as `name`.
    pub async fn unlock(&self, name: &str, lock_id: u32) -> Result<(), ClientError> {
        self.require(name)?.client.unlock(lock_id).await
    }

    fn require(&self, name: &str) -> Result<&Actor, ClientError> {
        self.actors.get(name).ok_or_else(|| ClientError::Backend {
            status: None,
            message: format!("no actor named {name}"),
        })
    }

    /// Printed claim payload of `lock_id`.
    pub fn claim_text(&self, lock_id: u32) -> Option<String> {
        self.locks.get(&lock_id).map(|entry| entry.claim.to_string())
    }

    /// Actor by name.
    pub fn actor(&self, name: &str) -> Option<&Actor> {
        self.actors.get(name)
    }

    /// Client of `name`.
    pub fn client(&self, name: &str) -> Option<&SimClient> {
        self.actors.get(name).map(|actor| &actor.client)
    }

    /// Backend session of `name`.
    pub fn backend(&self, name: &str) -> Option<&InProcessBackend<SimEnv>> {
        self.actors.get(name).map(|actor| &actor.backend)
    }

    /// Device key id of `name`, creating the key on first use.
    pub fn key_id(&self, name: &str) -> Option<String> {
        let info = self.client(name)?.device_key().ok()?;
        Some(info.key_id)
    }

    /// Lock by id.
    pub fn lock(&self, lock_id: u32) -> Option<&Arc<SimLock>> {
        self.locks.get(&lock_id).map(|entry| &entry.lock)
    }

    /// Admin keypair the backend holds for `lock_id`.
    pub fn admin_keypair(&self, lock_id: u32) -> Option<KeyPair> {
        self.service.admin_keypair(lock_id, &self.workspace_id).ok().flatten()
    }

    /// Names of every actor, sorted.
    pub fn actor_names(&self) -> Vec<&str> {
        self.actors.keys().map(String::as_str).collect()
    }

    /// Ids of every lock, sorted.
    pub fn lock_ids(&self) -> Vec<u32> {
        self.locks.keys().copied().collect()
    }

    /// Simulation environment
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Radio every client dials
    pub fn radio(&self) -> &SimRadio {
        &self.radio
    }

    /// Backend service
    pub fn service(&self) -> &Arc<AccessService<SimEnv>> {
        &self.service
    }

    /// Workspace every actor belongs to
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }
}
