//! Document store.
//!
//! The backend's durable state is five record kinds: registered device keys,
//! sealed lock admin keys, stored ACL envelopes, groups and workspace roles.
//! [`Storage`] is the boundary; [`MemoryStorage`] backs tests and
//! [`RedbStorage`] persists to a single file.
//!
//! # Invariants
//!
//! - `insert_admin_key_if_absent` and `insert_acl_if_absent` are atomic
//!   check-and-insert operations. They are the cross-process guard for admin
//!   key creation and version assignment.
//! - A stored ACL version is never overwritten.
//!
//! Methods are synchronous; async callers run them on the blocking pool.

mod memory;
mod redb_store;

use keyway_crypto::SealedSecret;
use keyway_proto::AclEnvelope;
use serde::{Deserialize, Serialize};

pub use self::{memory::MemoryStorage, redb_store::RedbStorage};
use crate::error::StorageError;

/// Storage result type.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A registered device public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserKeyRecord {
    /// Hex of the first 16 bytes of SHA-256 over the public key
    pub key_id: String,
    /// User who registered it
    pub owner_user_id: String,
    /// Base64 uncompressed P-256 point
    pub public_key_b64: String,
    /// Free-form device label
    pub label: String,
    /// False once revoked
    pub active: bool,
    /// Unix seconds
    pub created_at: u64,
}

/// A lock's admin keypair, private half sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockAdminRecord {
    /// Lock the key signs for
    pub lock_id: u32,
    /// Owning workspace
    pub workspace_id: String,
    /// Base64 uncompressed P-256 point
    pub public_key_b64: String,
    /// PKCS#8 PEM sealed under the master key
    pub sealed: SealedSecret,
    /// Only active records are used for signing
    pub active: bool,
    /// Unix seconds
    pub created_at: u64,
}

/// One built ACL version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAcl {
    /// Lock
    pub lock_id: u32,
    /// Workspace
    pub workspace_id: String,
    /// Same as `envelope.payload.version`
    pub version: u32,
    /// Signed envelope as served to clients
    pub envelope: AclEnvelope,
    /// Unix seconds
    pub created_at: u64,
}

/// Users granted access to a set of locks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Group identifier, unique within the workspace
    pub group_id: String,
    /// Owning workspace
    pub workspace_id: String,
    /// Locks this group may open
    pub lock_ids: Vec<u32>,
    /// Members
    pub member_user_ids: Vec<String>,
}

/// A user's role in one workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkspaceRole {
    /// Uses locks
    Member,
    /// Also rebuilds ACLs and reads admin keys
    Admin,
}

/// Durable record store.
pub trait Storage: Send + Sync {
    /// Insert or replace a device key record.
    fn put_user_key(&self, record: &UserKeyRecord) -> Result<()>;

    /// Device key by id.
    fn user_key(&self, key_id: &str) -> Result<Option<UserKeyRecord>>;

    /// Every key registered by `owner`, active or not, ordered by key id.
    fn user_keys_for_owner(&self, owner: &str) -> Result<Vec<UserKeyRecord>>;

    /// Active admin key for a lock.
    fn admin_key(&self, lock_id: u32, workspace_id: &str) -> Result<Option<LockAdminRecord>>;

    /// Store `record` unless a record already exists for its slot.
    ///
    /// Returns whichever record is stored afterwards.
    fn insert_admin_key_if_absent(&self, record: LockAdminRecord) -> Result<LockAdminRecord>;

    /// Highest stored ACL version for a lock.
    fn latest_acl(&self, lock_id: u32, workspace_id: &str) -> Result<Option<StoredAcl>>;

    /// Store `acl` unless its version is taken. Returns true when stored.
    fn insert_acl_if_absent(&self, acl: &StoredAcl) -> Result<bool>;

    /// Insert or replace a group.
    fn put_group(&self, group: &Group) -> Result<()>;

    /// Groups in `workspace_id` that include `lock_id`.
    fn groups_for_lock(&self, lock_id: u32, workspace_id: &str) -> Result<Vec<Group>>;

    /// Assign a workspace role.
    fn set_role(&self, workspace_id: &str, user_id: &str, role: WorkspaceRole) -> Result<()>;

    /// A user's workspace role, if any.
    fn role(&self, workspace_id: &str, user_id: &str) -> Result<Option<WorkspaceRole>>;
}
