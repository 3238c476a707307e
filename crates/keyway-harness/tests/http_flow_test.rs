//! Client against the real HTTP API.
//!
//! Serves the backend router on a loopback port and points the client's
//! `HttpBackend` at it, so registration, claim and ACL sync cross the same
//! JSON and bearer-token boundary a phone does. Real time, real sockets.

use std::{sync::Arc, time::Duration};

use keyway_client::{Backend, ClientError, HttpBackend};
use keyway_harness::scenario::{Scenario, World, oracle};
use keyway_server::{StaticTokens, build_router};

const LOCK: u32 = 6060;
const CODE: &str = "HTTP-6060";

async fn serve(world: &World) -> String {
    let tokens = StaticTokens::new()
        .with("t-root", "root")
        .with("t-alice", "alice")
        .with("t-eve", "eve");
    let router = build_router(world.service().clone(), Arc::new(tokens));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn backend(base: &str, token: &str) -> HttpBackend {
    HttpBackend::new(base, token, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn claim_and_sync_over_http() {
    let world = Scenario::new("http flow")
        .admin("root")
        .member("alice")
        .unclaimed_lock(LOCK, CODE)
        .oracle(oracle::nothing_granted())
        .run()
        .await
        .unwrap();
    let base = serve(&world).await;
    let root_http = backend(&base, "t-root");
    let alice_http = backend(&base, "t-alice");
    let root = world.client("root").unwrap();
    let alice = world.client("alice").unwrap();

    // Registering again over HTTP is idempotent
    let kid = alice.register_device(&alice_http, "phone").await.unwrap();
    assert_eq!(Some(kid), world.key_id("alice"));

    let claim = world.claim_text(LOCK).unwrap();
    assert_eq!(root.claim(&root_http, world.workspace_id(), &claim).await.unwrap(), LOCK);

    world.grant("front-door", &[LOCK], &["alice"]).unwrap();
    world.rebuild("root", LOCK).unwrap();
    assert_eq!(alice.sync_acl(&alice_http, world.workspace_id(), LOCK).await.unwrap(), 1);
    alice.unlock(LOCK).await.unwrap();
    oracle::acl_holds(LOCK, &["alice"])(&world).unwrap();
}

#[tokio::test]
async fn http_errors_keep_their_status() {
    let world = Scenario::new("http errors")
        .admin("root")
        .member("alice")
        .lock(LOCK, CODE)
        .oracle(oracle::all_owned())
        .run()
        .await
        .unwrap();
    let base = serve(&world).await;
    let workspace = world.workspace_id();

    // No ACL built yet
    let err = backend(&base, "t-root").latest_acl(workspace, LOCK).await.unwrap_err();
    assert!(matches!(err, ClientError::Backend { status: Some(404), .. }), "{err:?}");
    assert!(!err.is_retryable());

    // Members do not get admin keys
    let err = backend(&base, "t-alice").admin_key(workspace, LOCK).await.unwrap_err();
    assert!(matches!(err, ClientError::Backend { status: Some(403), .. }), "{err:?}");

    // Valid token, no role in the workspace
    let err = backend(&base, "t-eve").latest_acl(workspace, LOCK).await.unwrap_err();
    assert!(matches!(err, ClientError::Backend { status: Some(403), .. }), "{err:?}");

    // Unknown token
    let err = backend(&base, "nope").register_key("AAAA", "x").await.unwrap_err();
    match err {
        ClientError::Backend { status: Some(401), message } => assert_eq!(message, "unauthorized"),
        other => panic!("unexpected {other:?}"),
    }

    // Garbage key material
    let err = backend(&base, "t-alice").register_key("AAAA", "x").await.unwrap_err();
    assert!(matches!(err, ClientError::Backend { status: Some(400), .. }), "{err:?}");

    // The admin key endpoint serves what the lock pinned
    let admin = backend(&base, "t-root").admin_key(workspace, LOCK).await.unwrap();
    let pinned = world.lock(LOCK).unwrap().snapshot().admin_key().unwrap().to_base64();
    assert_eq!(admin, pinned);
}
