//! Lock model tests
//!
//! Drives the lock state machine with chunked writes the way a radio driver
//! would, and checks the notifications and decisions it produces.
//!
//! Challenges come from a fixed-seed ChaCha8 stream per test thread, so every
//! run sees the same nonces.

use std::{
    cell::RefCell,
    time::{Duration, Instant},
};

use keyway_core::{
    AuthOutcome, DenyReason, Environment, Lock, LockAction, LockConfig, LockIdentity,
};
use keyway_crypto::{KeyPair, KeyRole, PublicKey, sign_payload};
use keyway_proto::{
    AclPayload, AuthResponse, Challenge, Characteristic, OwnershipSet, StatusCode, UserEntry,
    chunk,
};
use proptest::{prelude::*, sample::Index};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

const LOCK_ID: u32 = 4242;
const CLAIM: &str = "K7-93QX";
const MTU: usize = 20;

thread_local! {
    static RNG: RefCell<ChaCha8Rng> = RefCell::new(ChaCha8Rng::seed_from_u64(0x4b57_4159));
}

// Seeded randomness, real clock
#[derive(Clone)]
struct TestEnv;

impl Environment for TestEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> std::time::SystemTime {
        std::time::SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async move {
            tokio::time::sleep(duration).await;
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        RNG.with(|rng| rng.borrow_mut().fill_bytes(buffer));
    }
}

fn new_lock() -> Lock {
    Lock::new(LockIdentity { lock_id: LOCK_ID, claim_code: CLAIM.into() }, LockConfig::default())
}

fn admin_key(seed: u8) -> KeyPair {
    KeyPair::from_scalar(KeyRole::Admin, &[seed; 32]).unwrap()
}

fn device_key(seed: u8) -> KeyPair {
    KeyPair::from_scalar(KeyRole::User, &[seed; 32]).unwrap()
}

/// Write a whole message in chunks, returning every action produced.
fn write_message(
    lock: &mut Lock,
    characteristic: Characteristic,
    message: &[u8],
) -> Vec<LockAction> {
    write_message_mtu(lock, characteristic, message, MTU)
}

fn write_message_mtu(
    lock: &mut Lock,
    characteristic: Characteristic,
    message: &[u8],
    mtu: usize,
) -> Vec<LockAction> {
    let now = Instant::now();
    chunk::split(message, mtu)
        .unwrap()
        .iter()
        .flat_map(|c| lock.on_write(characteristic, c, now))
        .collect()
}

fn status_of(actions: &[LockAction]) -> Option<StatusCode> {
    actions.iter().find_map(|a| match a {
        LockAction::Notify { characteristic: Characteristic::AclStatusNotify, value } => {
            StatusCode::try_from(value[0]).ok()
        },
        _ => None,
    })
}

fn challenge_of(actions: &[LockAction]) -> Challenge {
    actions
        .iter()
        .find_map(|a| match a {
            LockAction::Notify { characteristic: Characteristic::ChallengeNotify, value } => {
                Challenge::from_bytes(value).ok()
            },
            _ => None,
        })
        .unwrap()
}

fn decision_of(actions: &[LockAction]) -> Option<AuthOutcome> {
    actions.iter().find_map(|a| match a {
        LockAction::AccessDecision(outcome) => Some(outcome.clone()),
        _ => None,
    })
}

fn ownership_message(admin: &PublicKey, code: &str) -> Vec<u8> {
    OwnershipSet { lock_id: LOCK_ID, admin_public_key: admin.to_base64(), claim_code: code.into() }
        .to_json()
        .unwrap()
}

fn acl_message(admin: &KeyPair, version: u32, users: &[&KeyPair]) -> Vec<u8> {
    let mut users: Vec<UserEntry> = users
        .iter()
        .map(|k| UserEntry { kid: k.public_key().key_id(), public_key: k.public_key().to_base64() })
        .collect();
    users.sort();
    let payload = AclPayload { lock_id: LOCK_ID, version, users };
    sign_payload(&payload, admin).unwrap().to_json().unwrap()
}

fn claimed_lock(admin: &KeyPair) -> Lock {
    let mut lock = new_lock();
    lock.on_connect(&TestEnv);
    let actions = write_message(
        &mut lock,
        Characteristic::OwnershipWrite,
        &ownership_message(&admin.public_key(), CLAIM),
    );
    assert_eq!(status_of(&actions), Some(StatusCode::OwnershipAccepted));
    lock
}

fn respond(lock: &mut Lock, key: &KeyPair, challenge: &Challenge) -> Vec<LockAction> {
    let sig = key.sign_challenge(challenge).unwrap();
    let response = AuthResponse::new(key.public_key().key_id(), &sig).to_json().unwrap();
    write_message(lock, Characteristic::AuthResponseWrite, &response)
}

#[test]
fn connect_issues_fresh_challenge() {
    let mut lock = new_lock();
    let first = challenge_of(&lock.on_connect(&TestEnv));
    let second = challenge_of(&lock.on_connect(&TestEnv));
    assert_eq!(first.lock_id, LOCK_ID);
    assert_ne!(first.nonce, second.nonce);
    assert_eq!(lock.pending_challenge(), Some(second));
}

#[test]
fn ownership_bootstrap_is_one_time() {
    let admin = admin_key(1);
    let mut lock = claimed_lock(&admin);
    assert_eq!(lock.admin_key(), Some(&admin.public_key()));

    // Even with the right code, an owned lock refuses a new trust root
    let other = admin_key(2);
    let actions = write_message(
        &mut lock,
        Characteristic::OwnershipWrite,
        &ownership_message(&other.public_key(), CLAIM),
    );
    assert_eq!(status_of(&actions), Some(StatusCode::Unauthorized));
    assert_eq!(lock.admin_key(), Some(&admin.public_key()));
}

#[test]
fn wrong_claim_code_unauthorized() {
    let mut lock = new_lock();
    lock.on_connect(&TestEnv);
    let actions = write_message(
        &mut lock,
        Characteristic::OwnershipWrite,
        &ownership_message(&admin_key(1).public_key(), "K7-93QY"),
    );
    assert_eq!(status_of(&actions), Some(StatusCode::Unauthorized));
    assert!(!lock.is_owned());
}

#[test]
fn acl_before_ownership_not_owned() {
    let mut lock = new_lock();
    lock.on_connect(&TestEnv);
    let actions =
        write_message(&mut lock, Characteristic::AclWrite, &acl_message(&admin_key(1), 1, &[]));
    assert_eq!(status_of(&actions), Some(StatusCode::NotOwned));
    assert_eq!(lock.acl_version(), 0);
}

#[test]
fn acl_push_replay_and_forgery() {
    let admin = admin_key(1);
    let alice = device_key(10);
    let mut lock = claimed_lock(&admin);

    let v3 = acl_message(&admin, 3, &[&alice]);
    let actions = write_message(&mut lock, Characteristic::AclWrite, &v3);
    assert_eq!(status_of(&actions), Some(StatusCode::Accepted));
    assert_eq!(lock.acl_version(), 3);

    // Replaying the same envelope
    let actions = write_message(&mut lock, Characteristic::AclWrite, &v3);
    assert_eq!(status_of(&actions), Some(StatusCode::StaleVersion));

    // Newer version, wrong signer
    let forged = acl_message(&admin_key(2), 4, &[&alice, &device_key(11)]);
    let actions = write_message(&mut lock, Characteristic::AclWrite, &forged);
    assert_eq!(status_of(&actions), Some(StatusCode::BadSignature));
    assert_eq!(lock.acl_version(), 3);
    assert_eq!(lock.acl().len(), 1);
}

#[test]
fn oversized_announcement_too_large() {
    let mut lock = claimed_lock(&admin_key(1));
    let mut begin = vec![0x01];
    begin.extend_from_slice(&(64 * 1024u32).to_be_bytes());
    let actions = lock.on_write(Characteristic::AclWrite, &begin, Instant::now());
    assert_eq!(status_of(&actions), Some(StatusCode::TooLarge));
}

#[test]
fn authorized_key_is_granted_once() {
    let admin = admin_key(1);
    let alice = device_key(10);
    let mut lock = claimed_lock(&admin);
    write_message(&mut lock, Characteristic::AclWrite, &acl_message(&admin, 1, &[&alice]));

    let challenge = challenge_of(&lock.on_connect(&TestEnv));
    let actions = respond(&mut lock, &alice, &challenge);
    assert_eq!(
        decision_of(&actions),
        Some(AuthOutcome::Granted { kid: alice.public_key().key_id() })
    );
    assert!(actions.contains(&LockAction::Release { window: Duration::from_secs(5) }));
    assert!(actions.contains(&LockAction::Notify {
        characteristic: Characteristic::ResultNotify,
        value: vec![0x01],
    }));

    // The challenge was consumed by the first response
    let actions = respond(&mut lock, &alice, &challenge);
    assert_eq!(decision_of(&actions), Some(AuthOutcome::Denied(DenyReason::NoChallenge)));
}

#[test]
fn unknown_key_and_bad_signature_denied() {
    let admin = admin_key(1);
    let alice = device_key(10);
    let mallory = device_key(66);
    let mut lock = claimed_lock(&admin);
    write_message(&mut lock, Characteristic::AclWrite, &acl_message(&admin, 1, &[&alice]));

    let challenge = challenge_of(&lock.on_connect(&TestEnv));
    let actions = respond(&mut lock, &mallory, &challenge);
    assert_eq!(decision_of(&actions), Some(AuthOutcome::Denied(DenyReason::UnknownKey)));
    assert!(actions.contains(&LockAction::Notify {
        characteristic: Characteristic::ResultNotify,
        value: vec![0x00],
    }));
    assert!(!lock.is_connected());

    // Valid key, signature over a different challenge
    let live = challenge_of(&lock.on_connect(&TestEnv));
    let stale = Challenge { nonce: [0xee; 16], lock_id: LOCK_ID };
    assert_ne!(live, stale);
    let actions = respond(&mut lock, &alice, &stale);
    assert_eq!(decision_of(&actions), Some(AuthOutcome::Denied(DenyReason::BadSignature)));
}

#[test]
fn silent_client_is_disconnected() {
    let mut lock = new_lock();
    let t0 = TestEnv.now();
    lock.on_connect(&TestEnv);

    assert!(lock.tick(t0 + Duration::from_secs(5)).is_empty());
    let actions = lock.tick(t0 + Duration::from_secs(11));
    assert!(matches!(actions.as_slice(), [LockAction::Disconnect { .. }]));
    assert!(!lock.is_connected());
}

#[test]
fn disconnect_discards_partial_message() {
    let admin = admin_key(1);
    let mut lock = claimed_lock(&admin);
    let message = acl_message(&admin, 1, &[&device_key(10)]);
    let chunks = chunk::split(&message, MTU).unwrap();

    let now = Instant::now();
    lock.on_write(Characteristic::AclWrite, &chunks[0], now);
    lock.on_disconnect();
    lock.on_connect(&TestEnv);
    let actions: Vec<_> =
        chunks[1..].iter().flat_map(|c| lock.on_write(Characteristic::AclWrite, c, now)).collect();

    // Continuations without a begin chunk are malformed
    assert_eq!(status_of(&actions), Some(StatusCode::Malformed));
    assert_eq!(lock.acl_version(), 0);
}

#[test]
fn writes_without_link_ignored() {
    let mut lock = new_lock();
    let chunk = [0x01, 0, 0, 0, 1, b'x'];
    let actions = lock.on_write(Characteristic::AclWrite, &chunk, Instant::now());
    assert!(actions.is_empty());
    assert_eq!(lock.acl_version(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn acl_survives_abandoned_pushes_and_tampering(
        mtu in 6usize..512,
        abandoned in any::<Index>(),
        position in any::<Index>(),
        mask in 1u8..=255,
    ) {
        let admin = admin_key(1);
        let alice = device_key(10);
        let mut lock = claimed_lock(&admin);

        // A newer push that the client gave up on partway
        let later = acl_message(&admin, 5, &[&alice]);
        let pieces = chunk::split(&later, mtu).unwrap();
        let sent = abandoned.index(pieces.len());
        for piece in &pieces[..sent] {
            let actions = lock.on_write(Characteristic::AclWrite, piece, Instant::now());
            prop_assert!(actions.is_empty());
        }

        let v2 = acl_message(&admin, 2, &[&alice]);
        let actions = write_message_mtu(&mut lock, Characteristic::AclWrite, &v2, mtu);
        prop_assert_eq!(status_of(&actions), Some(StatusCode::Accepted));
        prop_assert_eq!(lock.acl_version(), 2);

        let mut tampered = acl_message(&admin, 3, &[&alice, &device_key(11)]);
        let at = position.index(tampered.len());
        tampered[at] ^= mask;
        let actions = write_message_mtu(&mut lock, Characteristic::AclWrite, &tampered, mtu);
        prop_assert!(status_of(&actions).is_some_and(|s| s != StatusCode::Accepted));
        prop_assert_eq!(lock.acl_version(), 2);
        prop_assert_eq!(lock.acl().len(), 1);
    }
}
