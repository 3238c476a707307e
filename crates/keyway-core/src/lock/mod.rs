//! Lock-side protocol model.
//!
//! The firmware's view of the link, as a pure state machine: it owns the
//! pinned admin key, the verified ACL and the per-connection challenge, and
//! turns radio events into [`LockAction`]s. Firmware and the simulation
//! harness both drive this same type.
//!
//! # Lifecycle
//!
//! 1. **Unowned**: fresh from the factory, only `ownership-write` does
//!    anything useful
//! 2. **Owned**: admin key pinned; ACL envelopes signed by it are accepted
//!    when their version is newer
//!
//! Per connection:
//!
//! 1. `on_connect` issues a fresh challenge on `challenge-notify`
//! 2. The first complete message on `auth-response-write` consumes it
//! 3. The result byte goes out on `result-notify`; a denial also drops the
//!    link
//!
//! # Timeouts
//!
//! - **Response window**: 10 seconds of silence while a challenge is
//!   outstanding
//! - **Idle timeout**: 30 seconds of silence after the challenge was answered
//!
//! Every write counts as activity, so a long ACL push keeps the link alive.

mod acl_store;
mod ownership;
mod responder;

use std::{
    fmt,
    time::{Duration, Instant},
};

use keyway_crypto::PublicKey;
use keyway_proto::{
    AuthResult, Challenge, Characteristic, StatusCode, auth::NONCE_LEN, chunk::MAX_MESSAGE_SIZE,
};
use tracing::{debug, info, warn};

pub use self::acl_store::AclStore;
use self::responder::Link;
use crate::{
    env::Environment,
    error::{AclError, OwnershipError},
};

/// Why an unlock attempt was refused.
///
/// Stays on the lock; the radio only carries granted or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// `kid` not in the current ACL
    UnknownKey,
    /// Signature does not verify over this connection's challenge
    BadSignature,
    /// Challenge already consumed on this connection
    NoChallenge,
    /// Response could not be reassembled or parsed
    Malformed,
}

/// Access decision for one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Key is authorized and proved possession
    Granted {
        /// Key that unlocked
        kid: String,
    },
    /// Refused
    Denied(DenyReason),
}

/// Actions returned by the lock.
///
/// The driver (firmware runtime or simulated radio) executes these:
/// - `Notify`: push the bytes on the characteristic
/// - `Release`: drive the actuator for the window
/// - `Disconnect`: drop the link
/// - `AccessDecision`: record for audit; nothing goes over the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAction {
    /// Send a notification
    Notify {
        /// Notify characteristic
        characteristic: Characteristic,
        /// Notification payload
        value: Vec<u8>,
    },

    /// Release the latch
    Release {
        /// How long to hold it open
        window: Duration,
    },

    /// Close the link
    Disconnect {
        /// Reason for closing the link
        reason: String,
    },

    /// Outcome of an unlock attempt
    AccessDecision(AuthOutcome),
}

/// Manufacture-time identity.
#[derive(Clone)]
pub struct LockIdentity {
    /// Lock identifier, also printed in the claim payload
    pub lock_id: u32,
    /// Claim code printed on the lock
    pub claim_code: String,
}

impl fmt::Debug for LockIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockIdentity").field("lock_id", &self.lock_id).finish_non_exhaustive()
    }
}

/// Lock configuration
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Silence allowed while a challenge is outstanding
    pub response_window: Duration,
    /// Silence allowed after the challenge was answered
    pub idle_timeout: Duration,
    /// Latch release duration on grant
    pub release_window: Duration,
    /// Reassembly buffer size per characteristic
    pub max_message_size: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            response_window: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            release_window: Duration::from_secs(5),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// Lock state machine
///
/// No I/O, no stored Environment. Time is passed in; randomness is drawn
/// from the environment passed to [`Lock::on_connect`].
#[derive(Debug, Clone)]
pub struct Lock {
    identity: LockIdentity,
    config: LockConfig,
    admin_key: Option<PublicKey>,
    acl: AclStore,
    link: Option<Link>,
}

impl Lock {
    /// Factory-fresh lock: unowned, empty ACL.
    pub fn new(identity: LockIdentity, config: LockConfig) -> Self {
        Self { identity, config, admin_key: None, acl: AclStore::new(), link: None }
    }

    /// Lock identifier
    pub fn lock_id(&self) -> u32 {
        self.identity.lock_id
    }

    /// Pinned trust root, if claimed
    pub fn admin_key(&self) -> Option<&PublicKey> {
        self.admin_key.as_ref()
    }

    /// True once ownership has been bootstrapped
    pub fn is_owned(&self) -> bool {
        self.admin_key.is_some()
    }

    /// Current ACL
    pub fn acl(&self) -> &AclStore {
        &self.acl
    }

    /// Current ACL version, 0 when none
    pub fn acl_version(&self) -> u32 {
        self.acl.version()
    }

    /// True while a link is up
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Challenge outstanding on the current link
    pub fn pending_challenge(&self) -> Option<Challenge> {
        self.link.as_ref().and_then(|link| link.challenge)
    }

    /// A client connected. Replaces any previous link.
    ///
    /// Returns the challenge notification.
    pub fn on_connect<E: Environment>(&mut self, env: &E) -> Vec<LockAction> {
        let mut nonce = [0u8; NONCE_LEN];
        env.random_bytes(&mut nonce);
        let challenge = Challenge { nonce, lock_id: self.identity.lock_id };

        self.link = Some(Link::new(challenge, env.now(), self.config.max_message_size));
        debug!(lock_id = self.identity.lock_id, "challenge issued");

        vec![LockAction::Notify {
            characteristic: Characteristic::ChallengeNotify,
            value: challenge.to_bytes().to_vec(),
        }]
    }

    /// The link dropped. Partial messages and the challenge are discarded.
    pub fn on_disconnect(&mut self) {
        self.link = None;
    }

    /// Handle one chunk written by the client.
    pub fn on_write(
        &mut self,
        characteristic: Characteristic,
        chunk: &[u8],
        now: Instant,
    ) -> Vec<LockAction> {
        let Some(link) = self.link.as_mut() else {
            warn!(lock_id = self.identity.lock_id, ?characteristic, "write without link");
            return Vec::new();
        };
        link.last_activity = now;

        match characteristic {
            Characteristic::AuthResponseWrite => self.on_auth_chunk(chunk),
            Characteristic::AclWrite => self.on_acl_chunk(chunk),
            Characteristic::OwnershipWrite => self.on_ownership_chunk(chunk),
            Characteristic::ChallengeNotify
            | Characteristic::ResultNotify
            | Characteristic::AclStatusNotify => {
                debug!(?characteristic, "ignoring write to notify characteristic");
                Vec::new()
            },
        }
    }

    /// Check if the link has timed out
    ///
    /// # Returns
    /// `Some(elapsed)` if timed out, `None` otherwise
    pub fn check_timeout(&self, now: Instant) -> Option<Duration> {
        let link = self.link.as_ref()?;
        let limit = if link.challenge.is_some() {
            self.config.response_window
        } else {
            self.config.idle_timeout
        };
        let elapsed = now.saturating_duration_since(link.last_activity);
        if elapsed > limit { Some(elapsed) } else { None }
    }

    /// Tick the state machine - drop the link on timeout.
    pub fn tick(&mut self, now: Instant) -> Vec<LockAction> {
        let Some(elapsed) = self.check_timeout(now) else {
            return Vec::new();
        };
        let reason = if self.pending_challenge().is_some() {
            format!("no response after {elapsed:?}")
        } else {
            format!("idle for {elapsed:?}")
        };
        debug!(lock_id = self.identity.lock_id, %reason, "dropping link");
        self.link = None;
        vec![LockAction::Disconnect { reason }]
    }

    fn on_auth_chunk(&mut self, chunk: &[u8]) -> Vec<LockAction> {
        let Some(link) = self.link.as_mut() else {
            return Vec::new();
        };
        let outcome = match link.auth_chunks.push(chunk) {
            Ok(None) => return Vec::new(),
            Ok(Some(message)) => responder::judge(link.challenge.take(), &message, &self.acl),
            Err(_) => {
                link.challenge = None;
                AuthOutcome::Denied(DenyReason::Malformed)
            },
        };

        match &outcome {
            AuthOutcome::Granted { kid } => {
                info!(lock_id = self.identity.lock_id, kid = %kid, "access granted");
                vec![
                    LockAction::AccessDecision(outcome.clone()),
                    LockAction::Release { window: self.config.release_window },
                    result_notify(AuthResult::Granted),
                ]
            },
            AuthOutcome::Denied(reason) => {
                warn!(lock_id = self.identity.lock_id, ?reason, "access denied");
                self.link = None;
                vec![
                    LockAction::AccessDecision(outcome.clone()),
                    result_notify(AuthResult::Denied),
                    LockAction::Disconnect { reason: "access denied".to_owned() },
                ]
            },
        }
    }

    fn on_acl_chunk(&mut self, chunk: &[u8]) -> Vec<LockAction> {
        let Some(link) = self.link.as_mut() else {
            return Vec::new();
        };
        let result = match link.acl_chunks.push(chunk) {
            Ok(None) => return Vec::new(),
            Ok(Some(message)) => {
                self.acl.apply(&message, self.identity.lock_id, self.admin_key.as_ref())
            },
            Err(err) => Err(AclError::from(err)),
        };

        let status = match result {
            Ok(version) => {
                info!(lock_id = self.identity.lock_id, version, "acl accepted");
                StatusCode::Accepted
            },
            Err(err) => {
                warn!(lock_id = self.identity.lock_id, %err, "acl rejected");
                err.status()
            },
        };
        vec![status_notify(status)]
    }

    fn on_ownership_chunk(&mut self, chunk: &[u8]) -> Vec<LockAction> {
        let Some(link) = self.link.as_mut() else {
            return Vec::new();
        };
        let result = match link.ownership_chunks.push(chunk) {
            Ok(None) => return Vec::new(),
            Ok(Some(message)) => ownership::verify_claim(
                &message,
                self.identity.lock_id,
                &self.identity.claim_code,
                self.admin_key.is_some(),
            ),
            Err(err) => Err(OwnershipError::Malformed(err)),
        };

        let status = match result {
            Ok(admin) => {
                info!(lock_id = self.identity.lock_id, admin = ?admin, "ownership claimed");
                self.admin_key = Some(admin);
                StatusCode::OwnershipAccepted
            },
            Err(err) => {
                warn!(lock_id = self.identity.lock_id, %err, "ownership rejected");
                err.status()
            },
        };
        vec![status_notify(status)]
    }
}

fn result_notify(result: AuthResult) -> LockAction {
    LockAction::Notify {
        characteristic: Characteristic::ResultNotify,
        value: vec![result.to_byte()],
    }
}

fn status_notify(status: StatusCode) -> LockAction {
    LockAction::Notify {
        characteristic: Characteristic::AclStatusNotify,
        value: vec![status.to_byte()],
    }
}
