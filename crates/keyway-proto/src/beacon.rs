//! Legacy broadcast beacon.
//!
//! A connectionless 12-byte advertisement a phone emits so older firmware can
//! notice a known user nearby. It carries no signature and is a presence
//! hint only; nothing on the access path trusts it.
//!
//! # Wire Format
//!
//! ```text
//! 0      4          8       12
//! +------+----------+-------+
//! | hash | unix sec | nonce |   all u32 big-endian
//! +------+----------+-------+
//! ```

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, byteorder::network_endian::U32,
};

use crate::errors::{ProtocolError, Result};

/// Timestamps above this are taken to be milliseconds.
pub const MILLIS_THRESHOLD: u64 = 4_000_000_000;

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawBeacon {
    user_hash: U32,
    timestamp: U32,
    nonce: U32,
}

/// Decoded beacon fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconFrame {
    /// Rolling hash of the user id, see [`user_id_hash`]
    pub user_hash: u32,
    /// Unix seconds
    pub timestamp: u32,
    /// Per-broadcast nonce
    pub nonce: u32,
}

impl BeaconFrame {
    /// Encoded size in bytes.
    pub const SIZE: usize = 12;

    /// Build a beacon for `user_id`.
    ///
    /// `timestamp` may be seconds or milliseconds, see
    /// [`normalize_timestamp`].
    pub fn new(user_id: &str, timestamp: u64, nonce: u32) -> Self {
        Self { user_hash: user_id_hash(user_id), timestamp: normalize_timestamp(timestamp), nonce }
    }

    /// Serialize to the fixed 12-byte layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let raw = RawBeacon {
            user_hash: U32::new(self.user_hash),
            timestamp: U32::new(self.timestamp),
            nonce: U32::new(self.nonce),
        };
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(raw.as_bytes());
        out
    }

    /// Parse a beacon.
    ///
    /// # Errors
    ///
    /// `InvalidFrame` unless `bytes` is exactly [`Self::SIZE`] long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let invalid = || ProtocolError::InvalidFrame { expected: Self::SIZE, actual: bytes.len() };
        if bytes.len() != Self::SIZE {
            return Err(invalid());
        }
        let raw = RawBeacon::read_from_bytes(bytes).map_err(|_| invalid())?;
        Ok(Self {
            user_hash: raw.user_hash.get(),
            timestamp: raw.timestamp.get(),
            nonce: raw.nonce.get(),
        })
    }
}

/// 32-bit polynomial rolling hash (multiplier 31) over UTF-16 code units.
///
/// Accumulates in wrapping signed 32-bit arithmetic and reinterprets the
/// result as unsigned. Firmware parses the hash with the same rule.
pub fn user_id_hash(user_id: &str) -> u32 {
    let hash = user_id
        .encode_utf16()
        .fold(0i32, |acc, unit| acc.wrapping_mul(31).wrapping_add(i32::from(unit)));
    hash.cast_unsigned()
}

/// Resolve a timestamp to unix seconds.
///
/// Values above [`MILLIS_THRESHOLD`] are milliseconds. Seconds past the
/// u32 range wrap modulo 2^32, as the field is written on other platforms.
#[allow(clippy::cast_possible_truncation)]
pub fn normalize_timestamp(timestamp: u64) -> u32 {
    let secs = if timestamp > MILLIS_THRESHOLD { timestamp / 1000 } else { timestamp };
    secs as u32
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn hash_matches_reference_values() {
        assert_eq!(user_id_hash(""), 0);
        assert_eq!(user_id_hash("a"), 97);
        assert_eq!(user_id_hash("abc"), 96354);
        assert_eq!(user_id_hash("hello world"), 1_794_106_052);
        // i32::MIN before the reinterpretation
        assert_eq!(user_id_hash("polygenelubricants"), 0x8000_0000);
    }

    #[test]
    fn encodes_big_endian() {
        let frame =
            BeaconFrame { user_hash: 0x0102_0304, timestamp: 0x0506_0708, nonce: 0x090a_0b0c };
        assert_eq!(frame.to_bytes(), hex!("0102030405060708090a0b0c"));
    }

    #[test]
    fn millisecond_timestamps_are_scaled() {
        assert_eq!(normalize_timestamp(1_700_000_000), 1_700_000_000);
        assert_eq!(normalize_timestamp(1_700_000_000_123), 1_700_000_000);
        assert_eq!(normalize_timestamp(MILLIS_THRESHOLD), 4_000_000_000);
    }

    #[test]
    fn out_of_range_seconds_wrap() {
        // 2^32 + 7 seconds, given in milliseconds
        assert_eq!(normalize_timestamp(4_294_967_303_000), 7);
        assert_eq!(normalize_timestamp(u64::MAX), 1_271_310_319);
        assert_eq!(BeaconFrame::new("a", 4_294_967_303_000, 0).timestamp, 7);
    }

    #[test]
    fn rejects_wrong_lengths() {
        for len in [0, 11, 13, 20] {
            let bytes = vec![0u8; len];
            assert_eq!(
                BeaconFrame::from_bytes(&bytes),
                Err(ProtocolError::InvalidFrame { expected: 12, actual: len })
            );
        }
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            user in "[a-zA-Z0-9@._-]{0,40}",
            timestamp in 0u64..=MILLIS_THRESHOLD,
            nonce in any::<u32>(),
        ) {
            let frame = BeaconFrame::new(&user, timestamp, nonce);
            let decoded = BeaconFrame::from_bytes(&frame.to_bytes()).unwrap();

            prop_assert_eq!(decoded.user_hash, user_id_hash(&user));
            prop_assert_eq!(u64::from(decoded.timestamp), timestamp);
            prop_assert_eq!(decoded.nonce, nonce);
        }
    }
}
