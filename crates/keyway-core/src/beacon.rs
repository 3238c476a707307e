//! Presence beacon.
//!
//! Older lock firmware listens for a 12-byte broadcast to wake up. It is a
//! best-effort hint that a known user is nearby; nothing in the access path
//! trusts it.

use keyway_proto::{BeaconFrame, Result};

use crate::env::Environment;

/// Encode a beacon for `user_id`.
///
/// `timestamp` defaults to the environment's wall clock and may be given in
/// seconds or milliseconds. `nonce` defaults to a random value.
pub fn encode_frame<E: Environment>(
    env: &E,
    user_id: &str,
    timestamp: Option<u64>,
    nonce: Option<u32>,
) -> [u8; BeaconFrame::SIZE] {
    let timestamp = timestamp.unwrap_or_else(|| env.unix_seconds());
    let nonce = nonce.unwrap_or_else(|| env.random_u32());
    BeaconFrame::new(user_id, timestamp, nonce).to_bytes()
}

/// Decode a received beacon.
///
/// # Errors
///
/// `InvalidFrame` unless exactly 12 bytes.
pub fn decode_frame(bytes: &[u8]) -> Result<BeaconFrame> {
    BeaconFrame::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use keyway_proto::{ProtocolError, beacon::user_id_hash};

    use super::*;
    use crate::env::SystemEnv;

    #[test]
    fn explicit_fields_round_trip() {
        let bytes = encode_frame(&SystemEnv, "alice", Some(1_700_000_000_123), Some(7));
        let frame = decode_frame(&bytes).unwrap();
        assert_eq!(frame.user_hash, user_id_hash("alice"));
        assert_eq!(frame.timestamp, 1_700_000_000);
        assert_eq!(frame.nonce, 7);
    }

    #[test]
    fn defaults_come_from_environment() {
        let before = SystemEnv.unix_seconds();
        let frame = decode_frame(&encode_frame(&SystemEnv, "bob", None, None)).unwrap();
        assert!(u64::from(frame.timestamp) >= before);
    }

    #[test]
    fn wrong_length_rejected() {
        assert_eq!(
            decode_frame(&[0u8; 13]),
            Err(ProtocolError::InvalidFrame { expected: 12, actual: 13 })
        );
    }
}
