//! Status bytes notified on `acl-status-notify`.

use crate::errors::ProtocolError;

/// Outcome of an ACL or ownership write, as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    /// New ACL verified and stored
    Accepted = 0x00,
    /// Message could not be reassembled or parsed
    Malformed = 0x01,
    /// Announced message exceeds the lock's buffer
    TooLarge = 0x02,
    /// Signature did not verify against the trusted admin key
    BadSignature = 0x03,
    /// Version not newer than the stored ACL
    StaleVersion = 0x04,
    /// Payload addressed to a different lock
    WrongLock = 0x05,
    /// Lock has no admin key yet
    NotOwned = 0x06,
    /// Ownership bootstrap succeeded
    OwnershipAccepted = 0x10,
    /// Claim code mismatch or lock already owned
    Unauthorized = 0x11,
}

impl StatusCode {
    /// Wire byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// True for the two success codes.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Accepted | Self::OwnershipAccepted)
    }

    /// Short human-readable reason, safe to show in a UI.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Accepted => "access list updated",
            Self::Malformed => "lock could not read the update",
            Self::TooLarge => "update too large for the lock",
            Self::BadSignature => "update not signed by the lock's administrator",
            Self::StaleVersion => "lock already has this or a newer access list",
            Self::WrongLock => "update belongs to a different lock",
            Self::NotOwned => "lock has not been claimed yet",
            Self::OwnershipAccepted => "lock claimed",
            Self::Unauthorized => "claim rejected",
        }
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Ok(match byte {
            0x00 => Self::Accepted,
            0x01 => Self::Malformed,
            0x02 => Self::TooLarge,
            0x03 => Self::BadSignature,
            0x04 => Self::StaleVersion,
            0x05 => Self::WrongLock,
            0x06 => Self::NotOwned,
            0x10 => Self::OwnershipAccepted,
            0x11 => Self::Unauthorized,
            other => return Err(ProtocolError::UnknownStatus(other)),
        })
    }
}
