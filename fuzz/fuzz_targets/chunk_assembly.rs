//! Arbitrary chunk sequences never exceed the reassembly limit, and any
//! message that survives split then reassembly comes back intact.

#![no_main]

use keyway_proto::{chunk, ChunkAssembler};
use libfuzzer_sys::fuzz_target;

const MAX: usize = 1024;

fuzz_target!(|input: (Vec<Vec<u8>>, Vec<u8>, u8)| {
    let (chunks, message, mtu) = input;

    let mut assembler = ChunkAssembler::new(MAX);
    for piece in &chunks {
        if let Ok(Some(message)) = assembler.push(piece) {
            assert!(message.len() <= MAX);
        }
    }

    let mtu = usize::from(mtu);
    if let Ok(pieces) = chunk::split(&message, mtu) {
        let mut assembler = ChunkAssembler::new(chunk::MAX_MESSAGE_SIZE);
        let mut out = None;
        for piece in &pieces {
            assert!(piece.len() <= mtu);
            out = assembler.push(piece).expect("own framing reassembles");
        }
        assert_eq!(out.as_deref(), Some(&message[..]));
    }
});
