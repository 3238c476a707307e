//! Chunk framing for messages larger than the link MTU.
//!
//! Writes to `acl-write`, `ownership-write` and `auth-response-write` carry
//! JSON text that rarely fits a single radio packet. The sender splits the
//! text into chunks; the receiver reassembles until the announced length has
//! arrived.
//!
//! # Wire Format
//!
//! ```text
//! first chunk:      0x01 | total_len (u32 BE) | bytes...
//! following chunks: 0x02 | bytes...
//! ```
//!
//! There is no per-chunk integrity code. The signature over the whole message
//! is the integrity check, and a receiver that never sees the last chunk
//! simply discards what it buffered.

use crate::errors::{ProtocolError, Result};

/// Upper bound on a reassembled message.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024;

const BEGIN: u8 = 0x01;
const CONTINUE: u8 = 0x02;
const BEGIN_HEADER_LEN: usize = 5;

/// Split `message` into chunks no larger than `mtu` bytes.
///
/// # Errors
///
/// - `MtuTooSmall` if `mtu` cannot carry the begin header plus one byte
/// - `PayloadTooLarge` if the message exceeds [`MAX_MESSAGE_SIZE`]
pub fn split(message: &[u8], mtu: usize) -> Result<Vec<Vec<u8>>> {
    if mtu <= BEGIN_HEADER_LEN {
        return Err(ProtocolError::MtuTooSmall(mtu));
    }
    if message.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge { size: message.len(), max: MAX_MESSAGE_SIZE });
    }
    let too_large = ProtocolError::PayloadTooLarge { size: message.len(), max: MAX_MESSAGE_SIZE };
    let total = u32::try_from(message.len()).map_err(|_| too_large)?;

    let first_len = message.len().min(mtu - BEGIN_HEADER_LEN);
    let (head, tail) = message.split_at(first_len);

    let mut first = Vec::with_capacity(BEGIN_HEADER_LEN + head.len());
    first.push(BEGIN);
    first.extend_from_slice(&total.to_be_bytes());
    first.extend_from_slice(head);

    let mut chunks = vec![first];
    for part in tail.chunks(mtu - 1) {
        let mut chunk = Vec::with_capacity(1 + part.len());
        chunk.push(CONTINUE);
        chunk.extend_from_slice(part);
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Receiver-side reassembly buffer.
///
/// A begin chunk always restarts reassembly, so a client that abandoned a
/// transfer halfway can start over on the same connection. Any framing error
/// drops the buffered bytes.
#[derive(Debug, Clone)]
pub struct ChunkAssembler {
    max: usize,
    expected: Option<usize>,
    buf: Vec<u8>,
}

impl ChunkAssembler {
    /// Create an assembler accepting messages up to `max` bytes.
    pub fn new(max: usize) -> Self {
        Self { max: max.min(MAX_MESSAGE_SIZE), expected: None, buf: Vec::new() }
    }

    /// True when no transfer is in progress.
    pub fn is_idle(&self) -> bool {
        self.expected.is_none()
    }

    /// Drop any partially received message.
    pub fn reset(&mut self) {
        self.expected = None;
        self.buf.clear();
    }

    /// Feed one chunk.
    ///
    /// Returns the complete message once the announced length has arrived.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>> {
        let result = self.push_inner(chunk);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn push_inner(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>> {
        match chunk.split_first() {
            None => Err(ProtocolError::InvalidChunk("empty chunk")),
            Some((&BEGIN, rest)) => {
                self.reset();
                if rest.len() < 4 {
                    return Err(ProtocolError::InvalidChunk("truncated begin header"));
                }
                let (len_bytes, data) = rest.split_at(4);
                let mut raw = [0u8; 4];
                raw.copy_from_slice(len_bytes);
                let total = u32::from_be_bytes(raw) as usize;
                if total > self.max {
                    return Err(ProtocolError::PayloadTooLarge { size: total, max: self.max });
                }
                self.expected = Some(total);
                self.buf.reserve(total);
                self.append(data)
            },
            Some((&CONTINUE, data)) => {
                if self.expected.is_none() {
                    return Err(ProtocolError::InvalidChunk("continuation without begin"));
                }
                self.append(data)
            },
            Some(_) => Err(ProtocolError::InvalidChunk("unknown chunk kind")),
        }
    }

    fn append(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(expected) = self.expected else {
            return Err(ProtocolError::InvalidChunk("no transfer in progress"));
        };
        if self.buf.len() + data.len() > expected {
            return Err(ProtocolError::InvalidChunk("chunk overruns announced length"));
        }
        self.buf.extend_from_slice(data);
        if self.buf.len() == expected {
            self.expected = None;
            return Ok(Some(std::mem::take(&mut self.buf)));
        }
        Ok(None)
    }
}

impl Default for ChunkAssembler {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}
