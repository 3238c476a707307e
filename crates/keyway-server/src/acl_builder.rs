//! ACL builder.
//!
//! Resolves a lock's group membership into a signed, versioned envelope.
//!
//! # Versioning
//!
//! Per `(lock, workspace)` the state runs `NoAcl -> Built(1) -> Built(2) ->
//! ...`. Version assignment and the store are one critical section per slot
//! in this process; `insert_acl_if_absent` guards against writers in other
//! processes, and a lost race moves on to the next version.
//!
//! # Fail-closed membership
//!
//! If any member has no active key the rebuild fails with
//! `MissingUserKeys` and nothing is stored, rather than silently dropping
//! that member from the lock.

use std::collections::{BTreeMap, BTreeSet};

use keyway_core::Environment;
use keyway_crypto::sign_payload;
use keyway_proto::{AclEnvelope, AclPayload, UserEntry};
use tracing::{info, warn};

use crate::{
    config::BuilderConfig,
    custodian::KeyCustodian,
    error::{Result, ServiceError},
    keyed::{KeyedLocks, hold},
    storage::{Storage, StoredAcl},
};

/// Builds and stores ACL versions.
#[derive(Debug)]
pub struct AclBuilder {
    config: BuilderConfig,
    locks: KeyedLocks<(u32, String)>,
}

impl AclBuilder {
    /// Builder with `config`.
    pub fn new(config: BuilderConfig) -> Self {
        Self { config, locks: KeyedLocks::new() }
    }

    /// Build, sign and store the next ACL version for a lock.
    ///
    /// # Errors
    ///
    /// - `MissingUserKeys` listing, sorted, every member without an active key
    /// - `VersionConflict` when other writers took every version tried
    pub fn rebuild<E: Environment>(
        &self,
        storage: &dyn Storage,
        custodian: &KeyCustodian,
        env: &E,
        lock_id: u32,
        workspace_id: &str,
    ) -> Result<AclEnvelope> {
        let users = resolve_users(storage, lock_id, workspace_id)?;
        let admin = custodian.get_or_create(storage, env, lock_id, workspace_id)?;

        let slot = self.locks.slot(&(lock_id, workspace_id.to_owned()));
        let _guard = hold(&slot);

        let mut version = next_version(storage, lock_id, workspace_id)?;
        for _ in 0..self.config.max_attempts {
            let payload = AclPayload { lock_id, version, users: users.clone() };
            let envelope = sign_payload(&payload, &admin)?;
            let stored = StoredAcl {
                lock_id,
                workspace_id: workspace_id.to_owned(),
                version,
                envelope: envelope.clone(),
                created_at: env.unix_seconds(),
            };
            if storage.insert_acl_if_absent(&stored)? {
                info!(lock_id, workspace_id, version, users = users.len(), "acl built");
                return Ok(envelope);
            }
            warn!(lock_id, workspace_id, version, "acl version taken, retrying");
            version = next_version(storage, lock_id, workspace_id)?.max(version.saturating_add(1));
        }

        Err(ServiceError::VersionConflict { lock_id, attempts: self.config.max_attempts })
    }

    /// Latest stored envelope.
    pub fn fetch_latest(
        &self,
        storage: &dyn Storage,
        lock_id: u32,
        workspace_id: &str,
    ) -> Result<AclEnvelope> {
        storage
            .latest_acl(lock_id, workspace_id)?
            .map(|stored| stored.envelope)
            .ok_or_else(|| ServiceError::NotFound(format!("acl for lock {lock_id}")))
    }
}

impl Default for AclBuilder {
    fn default() -> Self {
        Self::new(BuilderConfig::default())
    }
}

fn next_version(storage: &dyn Storage, lock_id: u32, workspace_id: &str) -> Result<u32> {
    let current = storage.latest_acl(lock_id, workspace_id)?.map_or(0, |acl| acl.version);
    current
        .checked_add(1)
        .ok_or_else(|| ServiceError::Internal(format!("acl version exhausted for lock {lock_id}")))
}

/// Every active key of every member of a group containing the lock.
fn resolve_users(
    storage: &dyn Storage,
    lock_id: u32,
    workspace_id: &str,
) -> Result<Vec<UserEntry>> {
    let members: BTreeSet<String> = storage
        .groups_for_lock(lock_id, workspace_id)?
        .into_iter()
        .flat_map(|group| group.member_user_ids)
        .collect();

    let mut entries = BTreeMap::new();
    let mut missing = Vec::new();
    for member in &members {
        let mut active = storage
            .user_keys_for_owner(member)?
            .into_iter()
            .filter(|key| key.active)
            .peekable();
        if active.peek().is_none() {
            missing.push(member.clone());
            continue;
        }
        for key in active {
            entries.insert(
                key.key_id.clone(),
                UserEntry { kid: key.key_id, public_key: key.public_key_b64 },
            );
        }
    }

    if !missing.is_empty() {
        warn!(lock_id, workspace_id, missing = ?missing, "members without active keys");
        return Err(ServiceError::MissingUserKeys(missing));
    }
    Ok(entries.into_values().collect())
}
