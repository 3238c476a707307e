//! Client-side challenge-response session.
//!
//! # Architecture: Action-Based State Machine
//!
//! - Methods accept time as a parameter (no stored Environment)
//! - Signing happens outside: the session hands out the challenge and takes
//!   back a signature, so device keys never enter this module
//! - The driver executes returned [`AuthAction`]s against a radio link
//!
//! # State Machine
//!
//! ```text
//! ┌───────────┐ challenge ┌─────────────────┐ respond ┌─────────────────┐
//! │ Connected │──────────>│ ChallengeIssued │────────>│ ResponseAwaited │
//! └───────────┘           └─────────────────┘         └─────────────────┘
//!       │                          │                     │          │
//!       │ timeout/drop             │ timeout/drop        │ 0x01     │ 0x00
//!       ↓                          ↓                     ↓          ↓
//! ┌──────────────┐<─────────────────────────────── ┌─────────┐ ┌────────┐
//! │ Disconnected │                                 │ Granted │ │ Denied │
//! └──────────────┘                                 └─────────┘ └────────┘
//! ```
//!
//! # Timeouts
//!
//! - **Challenge timeout**: 5 seconds from connect to the challenge
//! - **Result timeout**: 5 seconds from response write to the result byte
//!
//! A timed-out session disconnects and is never resumed; retrying means a
//! new connection and a new challenge.

use std::time::{Duration, Instant};

use keyway_proto::{AuthResponse, AuthResult, Challenge, Characteristic, SIGNATURE_LEN, chunk};
use tracing::debug;

use crate::error::SessionError;

/// Actions returned by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAction {
    /// Write these chunks, in order, to `characteristic`
    Write {
        /// Target characteristic
        characteristic: Characteristic,
        /// Chunk-framed message
        chunks: Vec<Vec<u8>>,
    },

    /// Drop the link
    Disconnect {
        /// Reason for closing the link
        reason: String,
    },
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Link up, waiting for the lock's challenge
    Connected,
    /// Challenge received, waiting for the caller's signature
    ChallengeIssued,
    /// Response written, waiting for the result byte
    ResponseAwaited,
    /// Lock granted access
    Granted,
    /// Lock refused access
    Denied,
    /// Link closed (timeout, drop, or after completion)
    Disconnected,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Time allowed between connect and challenge
    pub challenge_timeout: Duration,
    /// Time allowed between response and result
    pub result_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { challenge_timeout: Duration::from_secs(5), result_timeout: Duration::from_secs(5) }
    }
}

/// One unlock attempt over one connection.
#[derive(Debug, Clone)]
pub struct AuthSession {
    state: AuthState,
    config: AuthConfig,
    lock_id: u32,
    challenge: Option<Challenge>,
    /// Start of the currently bounded wait
    waiting_since: Instant,
    timed_out: bool,
}

impl AuthSession {
    /// Start a session on a freshly connected link to `lock_id`.
    pub fn new(lock_id: u32, now: Instant, config: AuthConfig) -> Self {
        Self {
            state: AuthState::Connected,
            config,
            lock_id,
            challenge: None,
            waiting_since: now,
            timed_out: false,
        }
    }

    /// Current state
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Challenge awaiting a response, if any.
    pub fn challenge(&self) -> Option<&Challenge> {
        self.challenge.as_ref()
    }

    /// True once the session ended because a wait expired.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Handle the challenge notification.
    ///
    /// Returns the challenge the caller must sign with its device key.
    ///
    /// # Errors
    ///
    /// - `InvalidAuthState` unless `Connected`
    /// - `Protocol` if the notification is not a 20-byte challenge
    /// - `WrongLock` if the challenge names another lock
    pub fn on_challenge(&mut self, bytes: &[u8], now: Instant) -> Result<Challenge, SessionError> {
        self.expect(AuthState::Connected, "on_challenge")?;
        let challenge = Challenge::from_bytes(bytes)?;
        if challenge.lock_id != self.lock_id {
            return Err(SessionError::WrongLock {
                expected: self.lock_id,
                actual: challenge.lock_id,
            });
        }

        self.challenge = Some(challenge);
        self.state = AuthState::ChallengeIssued;
        self.waiting_since = now;
        Ok(challenge)
    }

    /// Submit the signed challenge.
    ///
    /// # Errors
    ///
    /// `InvalidAuthState` unless `ChallengeIssued`; `Protocol` if the
    /// response cannot be framed for `mtu`.
    pub fn respond(
        &mut self,
        kid: &str,
        signature: &[u8; SIGNATURE_LEN],
        mtu: usize,
        now: Instant,
    ) -> Result<Vec<AuthAction>, SessionError> {
        self.expect(AuthState::ChallengeIssued, "respond")?;
        let message = AuthResponse::new(kid, signature).to_json()?;
        let chunks = chunk::split(&message, mtu)?;

        self.state = AuthState::ResponseAwaited;
        self.waiting_since = now;
        Ok(vec![AuthAction::Write { characteristic: Characteristic::AuthResponseWrite, chunks }])
    }

    /// Handle the result notification.
    ///
    /// # Errors
    ///
    /// `InvalidAuthState` unless `ResponseAwaited`; `Protocol` on an unknown
    /// result byte.
    pub fn on_result(&mut self, bytes: &[u8]) -> Result<AuthResult, SessionError> {
        self.expect(AuthState::ResponseAwaited, "on_result")?;
        let result = AuthResult::from_bytes(bytes)?;
        self.state = match result {
            AuthResult::Granted => AuthState::Granted,
            AuthResult::Denied => AuthState::Denied,
        };
        self.challenge = None;
        debug!(lock_id = self.lock_id, ?result, "auth result");
        Ok(result)
    }

    /// Link dropped or closed by the driver.
    pub fn on_disconnect(&mut self) {
        self.challenge = None;
        self.state = AuthState::Disconnected;
    }

    /// Check whether the current wait has expired.
    ///
    /// # Returns
    /// `Some(elapsed)` if timed out, `None` otherwise
    pub fn check_timeout(&self, now: Instant) -> Option<Duration> {
        let limit = match self.state {
            AuthState::Connected => self.config.challenge_timeout,
            AuthState::ResponseAwaited => self.config.result_timeout,
            _ => return None,
        };
        let elapsed = now.saturating_duration_since(self.waiting_since);
        if elapsed > limit { Some(elapsed) } else { None }
    }

    /// Deadline of the current wait, if any.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            AuthState::Connected => Some(self.waiting_since + self.config.challenge_timeout),
            AuthState::ResponseAwaited => Some(self.waiting_since + self.config.result_timeout),
            _ => None,
        }
    }

    /// Tick the state machine - close the link on timeout.
    pub fn tick(&mut self, now: Instant) -> Vec<AuthAction> {
        let Some(elapsed) = self.check_timeout(now) else {
            return Vec::new();
        };
        let reason = match self.state {
            AuthState::Connected => format!("no challenge after {elapsed:?}"),
            _ => format!("no result after {elapsed:?}"),
        };
        self.timed_out = true;
        self.on_disconnect();
        vec![AuthAction::Disconnect { reason }]
    }

    fn expect(&self, state: AuthState, operation: &'static str) -> Result<(), SessionError> {
        if self.state == state {
            Ok(())
        } else {
            Err(SessionError::InvalidAuthState { state: self.state, operation })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCK: u32 = 0x42;

    fn challenge_bytes(lock_id: u32) -> [u8; Challenge::SIZE] {
        Challenge { nonce: [7; 16], lock_id }.to_bytes()
    }

    #[test]
    fn granted_lifecycle() {
        let t0 = Instant::now();
        let mut session = AuthSession::new(LOCK, t0, AuthConfig::default());
        assert_eq!(session.state(), AuthState::Connected);

        let challenge = session.on_challenge(&challenge_bytes(LOCK), t0).unwrap();
        assert_eq!(challenge.lock_id, LOCK);
        assert_eq!(session.state(), AuthState::ChallengeIssued);

        let actions = session.respond("kid", &[1; 64], 20, t0).unwrap();
        assert_eq!(session.state(), AuthState::ResponseAwaited);
        let [AuthAction::Write { characteristic, chunks }] = actions.as_slice() else {
            panic!("expected one write, got {actions:?}");
        };
        assert_eq!(*characteristic, Characteristic::AuthResponseWrite);
        assert!(chunks.iter().all(|c| c.len() <= 20));

        assert_eq!(session.on_result(&[0x01]).unwrap(), AuthResult::Granted);
        assert_eq!(session.state(), AuthState::Granted);
    }

    #[test]
    fn denied_is_terminal() {
        let t0 = Instant::now();
        let mut session = AuthSession::new(LOCK, t0, AuthConfig::default());
        session.on_challenge(&challenge_bytes(LOCK), t0).unwrap();
        session.respond("kid", &[1; 64], 185, t0).unwrap();
        assert_eq!(session.on_result(&[0x00]).unwrap(), AuthResult::Denied);

        let err = session.on_result(&[0x01]).unwrap_err();
        assert!(matches!(err, SessionError::InvalidAuthState { state: AuthState::Denied, .. }));
    }

    #[test]
    fn challenge_from_other_lock_rejected() {
        let t0 = Instant::now();
        let mut session = AuthSession::new(LOCK, t0, AuthConfig::default());
        let err = session.on_challenge(&challenge_bytes(LOCK + 1), t0).unwrap_err();
        assert_eq!(err, SessionError::WrongLock { expected: LOCK, actual: LOCK + 1 });
        assert_eq!(session.state(), AuthState::Connected);
    }

    #[test]
    fn result_timeout_disconnects() {
        let t0 = Instant::now();
        let config = AuthConfig { result_timeout: Duration::from_secs(3), ..Default::default() };
        let mut session = AuthSession::new(LOCK, t0, config);
        session.on_challenge(&challenge_bytes(LOCK), t0).unwrap();
        session.respond("kid", &[1; 64], 185, t0).unwrap();

        assert!(session.tick(t0 + Duration::from_secs(2)).is_empty());
        assert_eq!(session.deadline(), Some(t0 + Duration::from_secs(3)));

        let actions = session.tick(t0 + Duration::from_secs(4));
        assert!(matches!(actions.as_slice(), [AuthAction::Disconnect { .. }]));
        assert_eq!(session.state(), AuthState::Disconnected);
        assert!(session.timed_out());

        // No retry on the same connection
        assert!(session.on_result(&[0x01]).is_err());
    }

    #[test]
    fn challenge_timeout_disconnects() {
        let t0 = Instant::now();
        let mut session = AuthSession::new(LOCK, t0, AuthConfig::default());
        let actions = session.tick(t0 + Duration::from_secs(6));
        assert_eq!(actions.len(), 1);
        assert!(session.timed_out());
    }

    #[test]
    fn no_timeout_while_caller_signs() {
        let t0 = Instant::now();
        let mut session = AuthSession::new(LOCK, t0, AuthConfig::default());
        session.on_challenge(&challenge_bytes(LOCK), t0).unwrap();
        assert!(session.check_timeout(t0 + Duration::from_secs(60)).is_none());
    }
}
