//! Arbitrary radio traffic against the lock state machine.
//!
//! No sequence of connects, writes and disconnects may panic, grant access
//! on an empty ACL or move a lock that was never claimed out of version 0.

#![no_main]

use std::time::{Duration, Instant};

use arbitrary::Arbitrary;
use keyway_core::{AuthOutcome, Lock, LockAction, LockConfig, LockIdentity, SystemEnv};
use keyway_proto::Characteristic;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Event {
    Connect,
    Disconnect,
    Write { characteristic: u8, chunk: Vec<u8> },
    Wait { millis: u16 },
}

fn characteristic(index: u8) -> Characteristic {
    match index % 6 {
        0 => Characteristic::ChallengeNotify,
        1 => Characteristic::AuthResponseWrite,
        2 => Characteristic::ResultNotify,
        3 => Characteristic::AclWrite,
        4 => Characteristic::AclStatusNotify,
        _ => Characteristic::OwnershipWrite,
    }
}

fuzz_target!(|events: Vec<Event>| {
    let identity = LockIdentity { lock_id: 1, claim_code: "FUZZ-1".into() };
    let mut lock = Lock::new(identity, LockConfig::default());
    let mut now = Instant::now();

    for event in events {
        let actions = match event {
            Event::Connect => lock.on_connect(&SystemEnv),
            Event::Disconnect => {
                lock.on_disconnect();
                Vec::new()
            },
            Event::Write { characteristic: index, chunk } => {
                lock.on_write(characteristic(index), &chunk, now)
            },
            Event::Wait { millis } => {
                now += Duration::from_millis(u64::from(millis));
                lock.tick(now)
            },
        };

        for action in actions {
            if let LockAction::AccessDecision(AuthOutcome::Granted { .. }) = action {
                assert!(!lock.acl().is_empty());
            }
        }
        if !lock.is_owned() {
            assert_eq!(lock.acl_version(), 0);
        }
    }
});
