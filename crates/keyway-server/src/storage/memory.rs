//! In-memory storage for tests and single-process development.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use super::{Group, LockAdminRecord, Result, Storage, StoredAcl, UserKeyRecord, WorkspaceRole};
use crate::error::StorageError;

type Slot = (u32, String);

#[derive(Debug, Default)]
struct Inner {
    user_keys: BTreeMap<String, UserKeyRecord>,
    admin_keys: HashMap<Slot, LockAdminRecord>,
    acls: HashMap<Slot, BTreeMap<u32, StoredAcl>>,
    groups: BTreeMap<(String, String), Group>,
    roles: HashMap<(String, String), WorkspaceRole>,
}

/// Storage held in a process-local map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| StorageError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| StorageError::Poisoned)
    }
}

impl Storage for MemoryStorage {
    fn put_user_key(&self, record: &UserKeyRecord) -> Result<()> {
        self.write()?.user_keys.insert(record.key_id.clone(), record.clone());
        Ok(())
    }

    fn user_key(&self, key_id: &str) -> Result<Option<UserKeyRecord>> {
        Ok(self.read()?.user_keys.get(key_id).cloned())
    }

    fn user_keys_for_owner(&self, owner: &str) -> Result<Vec<UserKeyRecord>> {
        Ok(self
            .read()?
            .user_keys
            .values()
            .filter(|r| r.owner_user_id == owner)
            .cloned()
            .collect())
    }

    fn admin_key(&self, lock_id: u32, workspace_id: &str) -> Result<Option<LockAdminRecord>> {
        Ok(self
            .read()?
            .admin_keys
            .get(&(lock_id, workspace_id.to_owned()))
            .filter(|r| r.active)
            .cloned())
    }

    fn insert_admin_key_if_absent(&self, record: LockAdminRecord) -> Result<LockAdminRecord> {
        let mut inner = self.write()?;
        let slot = (record.lock_id, record.workspace_id.clone());
        Ok(inner.admin_keys.entry(slot).or_insert(record).clone())
    }

    fn latest_acl(&self, lock_id: u32, workspace_id: &str) -> Result<Option<StoredAcl>> {
        Ok(self
            .read()?
            .acls
            .get(&(lock_id, workspace_id.to_owned()))
            .and_then(|versions| versions.values().next_back())
            .cloned())
    }

    fn insert_acl_if_absent(&self, acl: &StoredAcl) -> Result<bool> {
        let mut inner = self.write()?;
        let versions = inner.acls.entry((acl.lock_id, acl.workspace_id.clone())).or_default();
        if versions.contains_key(&acl.version) {
            return Ok(false);
        }
        versions.insert(acl.version, acl.clone());
        Ok(true)
    }

    fn put_group(&self, group: &Group) -> Result<()> {
        self.write()?
            .groups
            .insert((group.workspace_id.clone(), group.group_id.clone()), group.clone());
        Ok(())
    }

    fn groups_for_lock(&self, lock_id: u32, workspace_id: &str) -> Result<Vec<Group>> {
        Ok(self
            .read()?
            .groups
            .values()
            .filter(|g| g.workspace_id == workspace_id && g.lock_ids.contains(&lock_id))
            .cloned()
            .collect())
    }

    fn set_role(&self, workspace_id: &str, user_id: &str, role: WorkspaceRole) -> Result<()> {
        self.write()?.roles.insert((workspace_id.to_owned(), user_id.to_owned()), role);
        Ok(())
    }

    fn role(&self, workspace_id: &str, user_id: &str) -> Result<Option<WorkspaceRole>> {
        Ok(self.read()?.roles.get(&(workspace_id.to_owned(), user_id.to_owned())).copied())
    }
}
