//! Client-side chunked push to a write characteristic.
//!
//! Used for ACL envelopes on `acl-write` and ownership bootstraps on
//! `ownership-write`. The lock answers each complete message with one status
//! byte on `acl-status-notify`.
//!
//! ```text
//! Sending ──(last chunk)──> AwaitingStatus ──(status)──> Completed(code)
//!    │                            │
//!    └────────(timeout/drop)──────┴──> Failed
//! ```
//!
//! The lock commits nothing until the whole message has arrived and
//! verified, so abandoning a transfer at any point is safe.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use keyway_proto::{Characteristic, ProtocolError, StatusCode, chunk};

use crate::error::SessionError;

/// Transfer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Chunks remain to be written
    Sending,
    /// All chunks written, waiting for the status byte
    AwaitingStatus,
    /// Lock answered
    Completed(StatusCode),
    /// Link dropped or the status never came
    Failed,
}

/// Transfer configuration
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Pause between chunk writes so slow firmware keeps up
    pub inter_chunk_delay: Duration,
    /// Time allowed between the last chunk and the status byte
    pub status_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            inter_chunk_delay: Duration::from_millis(20),
            status_timeout: Duration::from_secs(10),
        }
    }
}

/// One message being pushed to the lock.
#[derive(Debug, Clone)]
pub struct Transfer {
    characteristic: Characteristic,
    pending: VecDeque<Vec<u8>>,
    state: TransferState,
    config: TransferConfig,
    last_activity: Instant,
}

impl Transfer {
    /// Frame `message` for a link with the given `mtu`.
    ///
    /// # Errors
    ///
    /// `Protocol` if the message is too large or the MTU too small.
    pub fn new(
        characteristic: Characteristic,
        message: &[u8],
        mtu: usize,
        now: Instant,
        config: TransferConfig,
    ) -> Result<Self, SessionError> {
        let pending = chunk::split(message, mtu)?.into();
        Ok(Self {
            characteristic,
            pending,
            state: TransferState::Sending,
            config,
            last_activity: now,
        })
    }

    /// Target characteristic
    pub fn characteristic(&self) -> Characteristic {
        self.characteristic
    }

    /// Current state
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Configured pause between chunks
    pub fn inter_chunk_delay(&self) -> Duration {
        self.config.inter_chunk_delay
    }

    /// Chunks not yet handed out
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Next chunk to write, `None` once all have been handed out.
    pub fn next_chunk(&mut self, now: Instant) -> Option<Vec<u8>> {
        if self.state != TransferState::Sending {
            return None;
        }
        let chunk = self.pending.pop_front();
        self.last_activity = now;
        if self.pending.is_empty() {
            self.state = TransferState::AwaitingStatus;
        }
        chunk
    }

    /// Handle the status notification.
    ///
    /// # Errors
    ///
    /// `InvalidTransferState` unless all chunks were written; `Protocol` on
    /// an unknown status byte.
    pub fn on_status(&mut self, bytes: &[u8]) -> Result<StatusCode, SessionError> {
        if self.state != TransferState::AwaitingStatus {
            return Err(SessionError::InvalidTransferState {
                state: self.state,
                operation: "on_status",
            });
        }
        let [byte] = bytes else {
            return Err(ProtocolError::InvalidFrame { expected: 1, actual: bytes.len() }.into());
        };
        let code = StatusCode::try_from(*byte)?;
        self.state = TransferState::Completed(code);
        Ok(code)
    }

    /// Link dropped.
    pub fn on_disconnect(&mut self) {
        if !matches!(self.state, TransferState::Completed(_)) {
            self.pending.clear();
            self.state = TransferState::Failed;
        }
    }

    /// Check whether the status wait has expired.
    pub fn check_timeout(&self, now: Instant) -> Option<Duration> {
        if self.state != TransferState::AwaitingStatus {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.last_activity);
        if elapsed > self.config.status_timeout { Some(elapsed) } else { None }
    }

    /// Deadline for the status byte, once all chunks are out.
    pub fn deadline(&self) -> Option<Instant> {
        (self.state == TransferState::AwaitingStatus)
            .then(|| self.last_activity + self.config.status_timeout)
    }

    /// Tick - marks the transfer failed when the status wait expired.
    pub fn tick(&mut self, now: Instant) -> Option<Duration> {
        let elapsed = self.check_timeout(now)?;
        self.on_disconnect();
        Some(elapsed)
    }
}
