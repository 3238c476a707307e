//! End-to-end ACL distribution scenarios.
//!
//! Backend rebuilds, client pushes and lock verification run together on
//! the simulated radio. A lock only ever moves to a newer envelope signed
//! by its pinned admin key.

use keyway_client::{Backend, ClientError};
use keyway_core::{AuthOutcome, DenyReason};
use keyway_crypto::{KeyPair, KeyRole, sign_payload};
use keyway_harness::scenario::{Scenario, World, oracle};
use keyway_proto::{AclPayload, StatusCode};
use keyway_server::WorkspaceRole;

const LOCK: u32 = 31337;
const CODE: &str = "QX-7731";

async fn deployment() -> World {
    Scenario::new("acl distribution")
        .admin("root")
        .member("alice")
        .member("bob")
        .lock(LOCK, CODE)
        .grant(LOCK, &["alice"])
        .oracle(oracle::all_of(vec![
            oracle::all_owned(),
            oracle::acl_version(LOCK, 1),
            oracle::acl_holds(LOCK, &["alice"]),
            oracle::nothing_granted(),
        ]))
        .run()
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn versions_only_move_forward() {
    let world = deployment().await;
    let lock = world.lock(LOCK).unwrap().clone();
    let root = world.client("root").unwrap();

    world.rebuild("root", LOCK).unwrap();
    let current = world.rebuild("root", LOCK).unwrap();
    assert_eq!(world.sync("root", LOCK).await.unwrap(), 3);
    assert_eq!(lock.acl_version(), 3);

    // Same envelope again
    let err = root.push_acl(&current).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected(StatusCode::StaleVersion)), "{err:?}");
    assert!(!err.is_retryable());

    // Next version, signed by a key the lock never pinned
    let rogue = KeyPair::from_scalar(KeyRole::Admin, &[0x55; 32]).unwrap();
    let payload = AclPayload { version: 4, ..current.payload.clone() };
    let forged = sign_payload(&payload, &rogue).unwrap();
    let err = root.push_acl(&forged).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected(StatusCode::BadSignature)), "{err:?}");
    assert_eq!(lock.acl_version(), 3);

    // The real version 4
    let next = world.rebuild("root", LOCK).unwrap();
    assert_eq!(next.payload.version, 4);
    root.push_acl(&next).await.unwrap();
    assert_eq!(lock.acl_version(), 4);
    assert!(!lock.is_connected());
}

#[tokio::test(start_paused = true)]
async fn older_envelope_cannot_roll_back_membership() {
    let world = deployment().await;
    let lock = world.lock(LOCK).unwrap().clone();
    let backend = world.backend("root").unwrap();
    let with_alice = backend.latest_acl(world.workspace_id(), LOCK).await.unwrap();

    world.grant(&format!("lock-{LOCK}"), &[LOCK], &["bob"]).unwrap();
    world.rebuild("root", LOCK).unwrap();
    world.sync("root", LOCK).await.unwrap();
    oracle::acl_holds(LOCK, &["bob"])(&world).unwrap();

    let err = world.client("root").unwrap().push_acl(&with_alice).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected(StatusCode::StaleVersion)));

    assert!(matches!(world.unlock("alice", LOCK).await, Err(ClientError::Denied)));
    assert_eq!(lock.decisions().last(), Some(&AuthOutcome::Denied(DenyReason::UnknownKey)));
    world.unlock("bob", LOCK).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn members_can_sync_but_not_rebuild() {
    let world = deployment().await;

    let err = world.rebuild("alice", LOCK).unwrap_err();
    assert_eq!(err.status().as_u16(), 403);

    world.rebuild("root", LOCK).unwrap();
    assert_eq!(world.sync("alice", LOCK).await.unwrap(), 2);
    oracle::acl_version(LOCK, 2)(&world).unwrap();
}

#[tokio::test(start_paused = true)]
async fn member_without_key_blocks_rebuild() {
    let mut world = deployment().await;
    world.add_user("carol", Some(WorkspaceRole::Member)).unwrap();
    world.grant(&format!("lock-{LOCK}"), &[LOCK], &["alice", "carol"]).unwrap();

    let err = world.rebuild("root", LOCK).unwrap_err();
    assert_eq!(err.status().as_u16(), 422);
    assert!(err.public_message().contains("carol"));

    // Nothing was stored, so the latest envelope is the one the lock runs
    let err = world.sync("root", LOCK).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected(StatusCode::StaleVersion)), "{err:?}");
    assert_eq!(world.lock(LOCK).unwrap().acl_version(), 1);

    world.register("carol").await.unwrap();
    assert_eq!(world.rebuild("root", LOCK).unwrap().payload.version, 2);
    world.sync("root", LOCK).await.unwrap();
    world.unlock("carol", LOCK).await.unwrap();
}
