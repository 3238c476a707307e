//! Keyway protocol core logic
//!
//! Pure state machine logic for both ends of the radio link, decoupled from
//! I/O. The lock firmware model and the mobile client's session machines live
//! here; runtimes and the simulation harness drive them.
//!
//! # Architecture
//!
//! State machines take the current time (and, where they need fresh
//! randomness, an [`env::Environment`]) as parameters and return declarative
//! actions: notify these bytes, release the latch, drop the link. The caller
//! executes the actions. No state machine sleeps, reads a clock or touches a
//! radio on its own.
//!
//! # Components
//!
//! - [`lock`]: Lock-side model (ownership, ACL store, challenge responder)
//! - [`auth`]: Client-side challenge-response session
//! - [`transfer`]: Client-side chunked push of ACLs and ownership messages
//! - [`beacon`]: Legacy presence beacon encoding
//! - [`mod@env`]: Environment abstraction (time, RNG)
//! - [`transport`]: Radio abstraction (characteristics, notifications)
//! - [`error`]: Error types

pub mod auth;
pub mod beacon;
pub mod env;
pub mod error;
pub mod lock;
pub mod transfer;
pub mod transport;

pub use auth::{AuthAction, AuthConfig, AuthSession, AuthState};
pub use env::{Environment, SystemEnv};
pub use error::{AclError, OwnershipError, SessionError, TransportError};
pub use lock::{AuthOutcome, DenyReason, Lock, LockAction, LockConfig, LockIdentity};
pub use transfer::{Transfer, TransferConfig, TransferState};
pub use transport::{Radio, RadioLink};
