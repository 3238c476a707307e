//! Backend configuration.

use std::{fmt, str::FromStr, time::Duration};

/// ACL builder configuration
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Versions tried before giving up with `VersionConflict`
    pub max_attempts: u32,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// Identity provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// How long a fetched key set is trusted
    pub key_set_ttl: Duration,
    /// Minimum gap between forced refreshes for unknown key ids
    pub min_refresh_interval: Duration,
    /// Required `iss` claim, if any
    pub issuer: Option<String>,
    /// Clock skew tolerated on `exp`
    pub leeway: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            key_set_ttl: Duration::from_secs(300),
            min_refresh_interval: Duration::from_secs(30),
            issuer: None,
            leeway: Duration::from_secs(60),
        }
    }
}

/// A workspace admin seeded at startup, written `workspace:user`.
///
/// Role and group endpoints require an existing admin, so a fresh store
/// needs at least one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    /// Workspace the admin manages
    pub workspace_id: String,
    /// Identity provider subject
    pub user_id: String,
}

impl FromStr for BootstrapAdmin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((workspace, user)) if !workspace.is_empty() && !user.is_empty() => {
                Ok(Self { workspace_id: workspace.to_owned(), user_id: user.to_owned() })
            },
            _ => Err(format!("expected workspace:user, got {s:?}")),
        }
    }
}

impl fmt::Display for BootstrapAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workspace_id, self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_admin_parses_workspace_and_user() {
        let admin: BootstrapAdmin = "acme:auth0|42".parse().unwrap();
        assert_eq!(admin.workspace_id, "acme");
        assert_eq!(admin.user_id, "auth0|42");
        assert_eq!(admin.to_string(), "acme:auth0|42");

        for bad in ["", "acme", ":root", "acme:"] {
            assert!(bad.parse::<BootstrapAdmin>().is_err(), "{bad}");
        }
    }
}
