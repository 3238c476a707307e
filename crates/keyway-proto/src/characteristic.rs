//! Radio characteristic roles.
//!
//! Roles are what the protocol cares about; UUIDs are a deployment detail.
//! The defaults below are stable and used unless a deployment overrides them
//! in its GATT table.

/// Logical characteristic on the lock's access service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Characteristic {
    /// Lock → client: 20-byte challenge
    ChallengeNotify,
    /// Client → lock: chunked [`crate::AuthResponse`]
    AuthResponseWrite,
    /// Lock → client: one [`crate::AuthResult`] byte
    ResultNotify,
    /// Client → lock: chunked [`crate::AclEnvelope`]
    AclWrite,
    /// Lock → client: one [`crate::StatusCode`] byte
    AclStatusNotify,
    /// Client → lock: chunked [`crate::OwnershipSet`]
    OwnershipWrite,
}

impl Characteristic {
    /// Primary service UUID.
    pub const SERVICE_UUID: &'static str = "4b455957-0000-4c4f-434b-000000000000";

    /// Default characteristic UUID.
    pub fn uuid(self) -> &'static str {
        match self {
            Self::ChallengeNotify => "4b455957-0001-4c4f-434b-000000000000",
            Self::AuthResponseWrite => "4b455957-0002-4c4f-434b-000000000000",
            Self::ResultNotify => "4b455957-0003-4c4f-434b-000000000000",
            Self::AclWrite => "4b455957-0004-4c4f-434b-000000000000",
            Self::AclStatusNotify => "4b455957-0005-4c4f-434b-000000000000",
            Self::OwnershipWrite => "4b455957-0006-4c4f-434b-000000000000",
        }
    }

    /// True for lock → client characteristics.
    pub fn is_notify(self) -> bool {
        matches!(self, Self::ChallengeNotify | Self::ResultNotify | Self::AclStatusNotify)
    }
}
