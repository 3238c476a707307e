//! Beacon frames decode only at exactly 12 bytes, and re-encode unchanged.

#![no_main]

use keyway_proto::BeaconFrame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match BeaconFrame::from_bytes(data) {
        Ok(frame) => {
            assert_eq!(data.len(), BeaconFrame::SIZE);
            assert_eq!(&frame.to_bytes()[..], data);
        },
        Err(_) => assert_ne!(data.len(), BeaconFrame::SIZE),
    }
});
