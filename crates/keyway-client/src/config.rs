//! Client configuration.

use std::time::Duration;

use keyway_core::{AuthConfig, TransferConfig};

/// Secure store label of the device key unless configured otherwise.
pub const DEFAULT_KEY_LABEL: &str = "keyway.device";

/// Lock client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Time allowed to bring a link up
    pub connect_timeout: Duration,
    /// Challenge and result waits
    pub auth: AuthConfig,
    /// Chunk pacing and status wait for ACL and ownership pushes
    pub transfer: TransferConfig,
    /// Secure store label of the device key
    pub key_label: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            auth: AuthConfig::default(),
            transfer: TransferConfig::default(),
            key_label: DEFAULT_KEY_LABEL.to_owned(),
        }
    }
}
