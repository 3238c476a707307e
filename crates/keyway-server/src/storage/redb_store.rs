//! Persistent storage in a single redb file.
//!
//! Records are CBOR-encoded values under string keys. Composite keys put the
//! workspace first and zero-pad numbers so that a key-range scan returns one
//! lock's ACL versions in order. redb serializes write transactions, which
//! makes the check-then-insert operations atomic across threads.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};

use super::{Group, LockAdminRecord, Result, Storage, StoredAcl, UserKeyRecord, WorkspaceRole};
use crate::error::StorageError;

const USER_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("user_keys");
const ADMIN_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("admin_keys");
const ACLS: TableDefinition<&str, &[u8]> = TableDefinition::new("acls");
const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");
const ROLES: TableDefinition<&str, &[u8]> = TableDefinition::new("roles");

/// Storage backed by a redb database file.
pub struct RedbStorage {
    db: Database,
}

impl RedbStorage {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path).map_err(db_err)?;
        let txn = db.begin_write().map_err(db_err)?;
        for table in [USER_KEYS, ADMIN_KEYS, ACLS, GROUPS, ROLES] {
            txn.open_table(table).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    fn get<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<T>> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = txn.open_table(table).map_err(db_err)?;
        let found = table.get(key).map_err(db_err)?;
        found.map(|guard| decode(guard.value())).transpose()
    }

    fn put<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> Result<()> {
        let bytes = encode(value)?;
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(table).map_err(db_err)?;
            table.insert(key, bytes.as_slice()).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    /// Decode every value whose key falls in `start..end`, in key order.
    fn scan<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        start: &str,
        end: &str,
    ) -> Result<Vec<T>> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = txn.open_table(table).map_err(db_err)?;
        let mut out = Vec::new();
        for entry in table.range(start..end).map_err(db_err)? {
            let (_, value) = entry.map_err(db_err)?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for RedbStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStorage").finish_non_exhaustive()
    }
}

impl Storage for RedbStorage {
    fn put_user_key(&self, record: &UserKeyRecord) -> Result<()> {
        self.put(USER_KEYS, &record.key_id, record)
    }

    fn user_key(&self, key_id: &str) -> Result<Option<UserKeyRecord>> {
        self.get(USER_KEYS, key_id)
    }

    fn user_keys_for_owner(&self, owner: &str) -> Result<Vec<UserKeyRecord>> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = txn.open_table(USER_KEYS).map_err(db_err)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, value) = entry.map_err(db_err)?;
            let record: UserKeyRecord = decode(value.value())?;
            if record.owner_user_id == owner {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn admin_key(&self, lock_id: u32, workspace_id: &str) -> Result<Option<LockAdminRecord>> {
        let record: Option<LockAdminRecord> =
            self.get(ADMIN_KEYS, &slot_key(lock_id, workspace_id))?;
        Ok(record.filter(|r| r.active))
    }

    fn insert_admin_key_if_absent(&self, record: LockAdminRecord) -> Result<LockAdminRecord> {
        let key = slot_key(record.lock_id, &record.workspace_id);
        let txn = self.db.begin_write().map_err(db_err)?;
        let stored = {
            let mut table = txn.open_table(ADMIN_KEYS).map_err(db_err)?;
            let existing = table.get(key.as_str()).map_err(db_err)?.map(|g| g.value().to_vec());
            match existing {
                Some(bytes) => decode(&bytes)?,
                None => {
                    table.insert(key.as_str(), encode(&record)?.as_slice()).map_err(db_err)?;
                    record
                },
            }
        };
        txn.commit().map_err(db_err)?;
        Ok(stored)
    }

    fn latest_acl(&self, lock_id: u32, workspace_id: &str) -> Result<Option<StoredAcl>> {
        let (start, end) = version_range(lock_id, workspace_id);
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = txn.open_table(ACLS).map_err(db_err)?;
        let last = table.range(start.as_str()..end.as_str()).map_err(db_err)?.next_back();
        match last {
            Some(entry) => {
                let (_, value) = entry.map_err(db_err)?;
                Ok(Some(decode(value.value())?))
            },
            None => Ok(None),
        }
    }

    fn insert_acl_if_absent(&self, acl: &StoredAcl) -> Result<bool> {
        let key = format!("{}{:010}", version_range(acl.lock_id, &acl.workspace_id).0, acl.version);
        let bytes = encode(acl)?;
        let txn = self.db.begin_write().map_err(db_err)?;
        let inserted = {
            let mut table = txn.open_table(ACLS).map_err(db_err)?;
            let taken = table.get(key.as_str()).map_err(db_err)?.is_some();
            if !taken {
                table.insert(key.as_str(), bytes.as_slice()).map_err(db_err)?;
            }
            !taken
        };
        txn.commit().map_err(db_err)?;
        Ok(inserted)
    }

    fn put_group(&self, group: &Group) -> Result<()> {
        self.put(GROUPS, &format!("{}\0{}", group.workspace_id, group.group_id), group)
    }

    fn groups_for_lock(&self, lock_id: u32, workspace_id: &str) -> Result<Vec<Group>> {
        let groups: Vec<Group> =
            self.scan(GROUPS, &format!("{workspace_id}\0"), &format!("{workspace_id}\u{1}"))?;
        Ok(groups.into_iter().filter(|g| g.lock_ids.contains(&lock_id)).collect())
    }

    fn set_role(&self, workspace_id: &str, user_id: &str, role: WorkspaceRole) -> Result<()> {
        self.put(ROLES, &format!("{workspace_id}\0{user_id}"), &role)
    }

    fn role(&self, workspace_id: &str, user_id: &str) -> Result<Option<WorkspaceRole>> {
        self.get(ROLES, &format!("{workspace_id}\0{user_id}"))
    }
}

fn slot_key(lock_id: u32, workspace_id: &str) -> String {
    format!("{workspace_id}\0{lock_id:010}")
}

/// Key range holding every ACL version of one lock.
fn version_range(lock_id: u32, workspace_id: &str) -> (String, String) {
    let slot = slot_key(lock_id, workspace_id);
    (format!("{slot}\0"), format!("{slot}\u{1}"))
}

fn db_err(err: impl Into<redb::Error>) -> StorageError {
    StorageError::Database(err.into())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StorageError::Codec(e.to_string()))?;
    Ok(buf)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Codec(e.to_string()))
}
