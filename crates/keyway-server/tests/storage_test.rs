//! Storage tests
//!
//! The same behavioral checks run against the in-memory store and a redb
//! file, plus persistence across a reopen for redb.

use keyway_crypto::{KeyPair, KeyRole, MasterKey, sign_payload};
use keyway_proto::AclPayload;
use keyway_server::{
    Group, LockAdminRecord, MemoryStorage, RedbStorage, Storage, StoredAcl, UserKeyRecord,
    WorkspaceRole,
};

fn user_key(owner: &str, seed: u8, active: bool) -> UserKeyRecord {
    let public = KeyPair::from_scalar(KeyRole::User, &[seed; 32]).unwrap().public_key();
    UserKeyRecord {
        key_id: public.key_id(),
        owner_user_id: owner.into(),
        public_key_b64: public.to_base64(),
        label: format!("device-{seed}"),
        active,
        created_at: 1_700_000_000,
    }
}

fn admin_record(lock_id: u32, workspace: &str, seed: u8) -> LockAdminRecord {
    let key = KeyPair::from_scalar(KeyRole::Admin, &[seed; 32]).unwrap();
    let master = MasterKey::from_bytes(&[9; 32]).unwrap();
    let pem = key.to_pkcs8_pem().unwrap();
    let sealed = master.seal(pem.as_bytes(), b"aad", |b| b.fill(seed)).unwrap();
    LockAdminRecord {
        lock_id,
        workspace_id: workspace.into(),
        public_key_b64: key.public_key().to_base64(),
        sealed,
        active: true,
        created_at: 1_700_000_000,
    }
}

fn acl(lock_id: u32, workspace: &str, version: u32) -> StoredAcl {
    let admin = KeyPair::from_scalar(KeyRole::Admin, &[1; 32]).unwrap();
    let envelope =
        sign_payload(&AclPayload { lock_id, version, users: Vec::new() }, &admin).unwrap();
    StoredAcl { lock_id, workspace_id: workspace.into(), version, envelope, created_at: 0 }
}

fn user_keys(storage: &dyn Storage) {
    let a1 = user_key("alice", 1, true);
    let a2 = user_key("alice", 2, false);
    let b1 = user_key("bob", 3, true);
    for record in [&a1, &a2, &b1] {
        storage.put_user_key(record).unwrap();
    }

    assert_eq!(storage.user_key(&a1.key_id).unwrap(), Some(a1.clone()));
    assert_eq!(storage.user_key("0000").unwrap(), None);

    let mut alice = storage.user_keys_for_owner("alice").unwrap();
    alice.sort_by(|x, y| x.key_id.cmp(&y.key_id));
    let mut expected = vec![a1.clone(), a2];
    expected.sort_by(|x, y| x.key_id.cmp(&y.key_id));
    assert_eq!(alice, expected);
    assert!(storage.user_keys_for_owner("carol").unwrap().is_empty());

    // Replace
    let relabeled = UserKeyRecord { label: "tablet".into(), ..a1.clone() };
    storage.put_user_key(&relabeled).unwrap();
    assert_eq!(storage.user_key(&a1.key_id).unwrap().unwrap().label, "tablet");
}

fn admin_keys(storage: &dyn Storage) {
    assert_eq!(storage.admin_key(1, "ws").unwrap(), None);

    let first = admin_record(1, "ws", 10);
    let winner = storage.insert_admin_key_if_absent(first.clone()).unwrap();
    assert_eq!(winner, first);

    // A second creator gets the first record back
    let second = admin_record(1, "ws", 11);
    assert_eq!(storage.insert_admin_key_if_absent(second).unwrap(), first);
    assert_eq!(storage.admin_key(1, "ws").unwrap(), Some(first));

    assert_eq!(storage.admin_key(1, "other").unwrap(), None);
    assert_eq!(storage.admin_key(2, "ws").unwrap(), None);
}

fn acl_versions(storage: &dyn Storage) {
    assert_eq!(storage.latest_acl(7, "ws").unwrap(), None);

    for version in [1, 2, 9, 10, 3] {
        assert!(storage.insert_acl_if_absent(&acl(7, "ws", version)).unwrap());
    }
    assert_eq!(storage.latest_acl(7, "ws").unwrap().unwrap().version, 10);

    // Stored versions are immutable
    let mut replacement = acl(7, "ws", 2);
    replacement.created_at = 99;
    assert!(!storage.insert_acl_if_absent(&replacement).unwrap());

    // Neighbouring slots stay separate
    assert!(storage.insert_acl_if_absent(&acl(70, "ws", 1)).unwrap());
    assert!(storage.insert_acl_if_absent(&acl(7, "ws2", 50)).unwrap());
    assert_eq!(storage.latest_acl(7, "ws").unwrap().unwrap().version, 10);
    assert_eq!(storage.latest_acl(70, "ws").unwrap().unwrap().version, 1);
    assert_eq!(storage.latest_acl(7, "ws2").unwrap().unwrap().version, 50);
}

fn groups_and_roles(storage: &dyn Storage) {
    let group = |id: &str, ws: &str, locks: &[u32]| Group {
        group_id: id.into(),
        workspace_id: ws.into(),
        lock_ids: locks.to_vec(),
        member_user_ids: vec!["alice".into()],
    };
    storage.put_group(&group("front", "ws", &[1, 2])).unwrap();
    storage.put_group(&group("back", "ws", &[2])).unwrap();
    storage.put_group(&group("front", "ws-other", &[1])).unwrap();

    let mut ids: Vec<_> =
        storage.groups_for_lock(2, "ws").unwrap().into_iter().map(|g| g.group_id).collect();
    ids.sort();
    assert_eq!(ids, ["back", "front"]);
    assert_eq!(storage.groups_for_lock(1, "ws").unwrap().len(), 1);

    // Replacing a group drops the lock
    storage.put_group(&group("front", "ws", &[2])).unwrap();
    assert!(storage.groups_for_lock(1, "ws").unwrap().is_empty());

    assert_eq!(storage.role("ws", "alice").unwrap(), None);
    storage.set_role("ws", "alice", WorkspaceRole::Member).unwrap();
    storage.set_role("ws", "alice", WorkspaceRole::Admin).unwrap();
    assert_eq!(storage.role("ws", "alice").unwrap(), Some(WorkspaceRole::Admin));
    assert_eq!(storage.role("ws-other", "alice").unwrap(), None);
}

fn all(storage: &dyn Storage) {
    user_keys(storage);
    admin_keys(storage);
    acl_versions(storage);
    groups_and_roles(storage);
}

#[test]
fn memory_storage_behaves() {
    all(&MemoryStorage::new());
}

#[test]
fn redb_storage_behaves() {
    let dir = tempfile::tempdir().unwrap();
    all(&RedbStorage::open(dir.path().join("keyway.redb")).unwrap());
}

#[test]
fn redb_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keyway.redb");
    let key = user_key("alice", 1, true);
    {
        let storage = RedbStorage::open(&path).unwrap();
        storage.put_user_key(&key).unwrap();
        storage.insert_acl_if_absent(&acl(3, "ws", 4)).unwrap();
        storage.set_role("ws", "alice", WorkspaceRole::Admin).unwrap();
    }

    let storage = RedbStorage::open(&path).unwrap();
    assert_eq!(storage.user_key(&key.key_id).unwrap(), Some(key));
    assert_eq!(storage.latest_acl(3, "ws").unwrap().unwrap().version, 4);
    assert_eq!(storage.role("ws", "alice").unwrap(), Some(WorkspaceRole::Admin));
}
