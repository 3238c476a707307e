//! QR / manual-entry claim payload.
//!
//! Printed on the lock at manufacture time as `lock:<digits>;code:<code>`.
//! The code is the proof-of-possession secret used by ownership bootstrap.

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;

use crate::errors::{ProtocolError, Result};

#[allow(clippy::unwrap_used)]
static CLAIM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^lock:(\d+);code:([A-Za-z0-9-]+)$").unwrap());

/// Parsed claim payload.
#[derive(Clone, PartialEq, Eq)]
pub struct ClaimPayload {
    /// Lock identifier
    pub lock_id: u32,
    /// Manufacture-time claim code
    pub code: String,
}

impl ClaimPayload {
    /// Parse scanned or typed text. Surrounding whitespace is ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let caps = CLAIM_RE.captures(text.trim()).ok_or(ProtocolError::InvalidClaim)?;
        let lock_id = caps[1].parse::<u32>().map_err(|_| ProtocolError::InvalidClaim)?;
        Ok(Self { lock_id, code: caps[2].to_string() })
    }
}

impl FromStr for ClaimPayload {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ClaimPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock:{};code:{}", self.lock_id, self.code)
    }
}

// The code is a secret; keep it out of logs.
impl fmt::Debug for ClaimPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimPayload").field("lock_id", &self.lock_id).finish_non_exhaustive()
    }
}
