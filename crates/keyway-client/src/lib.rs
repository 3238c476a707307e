//! Keyway mobile client.
//!
//! Everything the phone side of the protocol does, independent of the UI
//! shell and the platform radio stack:
//!
//! - [`DeviceKeyStore`]: the per-installation P-256 key in a [`SecureStore`]
//! - [`LockClient`]: unlock, ACL push, ownership bootstrap and backend sync
//!   over any [`keyway_core::Radio`], with every radio wait bounded
//! - [`Backend`]: the backend API, over HTTP with [`HttpBackend`]
//!
//! Failures surface as [`ClientError`], which says whether a retry on a new
//! connection may help and carries a short [`ClientError::user_message`]
//! for display.

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod lock_client;
pub mod store;

pub use backend::{Backend, HttpBackend};
pub use config::{ClientConfig, DEFAULT_KEY_LABEL};
pub use device::{DeviceKeyInfo, DeviceKeyStore};
pub use error::{ClientError, Result};
pub use lock_client::LockClient;
pub use store::{MemoryStore, SecureStore};
