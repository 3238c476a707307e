//! Untrusted envelope, response and ownership JSON never panics the parsers.

#![no_main]

use keyway_proto::{AclEnvelope, AuthResponse, OwnershipSet};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = AclEnvelope::from_json(data) {
        let _ = envelope.signature_bytes();
        for user in &envelope.payload.users {
            let _ = user.public_key_bytes();
        }
        let again = envelope.to_json().expect("parsed envelope serializes");
        assert!(AclEnvelope::from_json(&again).is_ok());
    }
    if let Ok(response) = AuthResponse::from_json(data) {
        let _ = response.signature_bytes();
    }
    if let Ok(set) = OwnershipSet::from_json(data) {
        let _ = set.admin_key_bytes();
    }
});
