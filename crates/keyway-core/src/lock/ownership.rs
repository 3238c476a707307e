//! One-time trust bootstrap.

use keyway_crypto::PublicKey;
use keyway_proto::OwnershipSet;
use subtle::ConstantTimeEq;

use crate::error::OwnershipError;

/// Check an ownership message against the lock's identity.
///
/// Returns the admin key to pin. The claim code comparison does not leak
/// how many leading bytes matched.
pub(crate) fn verify_claim(
    message: &[u8],
    lock_id: u32,
    claim_code: &str,
    already_owned: bool,
) -> Result<PublicKey, OwnershipError> {
    let set = OwnershipSet::from_json(message).map_err(OwnershipError::Malformed)?;
    if already_owned {
        return Err(OwnershipError::AlreadyOwned);
    }
    if set.lock_id != lock_id {
        return Err(OwnershipError::WrongLock { expected: lock_id, actual: set.lock_id });
    }
    if !bool::from(set.claim_code.as_bytes().ct_eq(claim_code.as_bytes())) {
        return Err(OwnershipError::WrongClaimCode);
    }
    let raw = set.admin_key_bytes().map_err(|_| OwnershipError::InvalidAdminKey)?;
    PublicKey::from_bytes(&raw).map_err(|_| OwnershipError::InvalidAdminKey)
}

#[cfg(test)]
mod tests {
    use keyway_crypto::{KeyPair, KeyRole};

    use super::*;

    fn message(lock_id: u32, admin: &PublicKey, code: &str) -> Vec<u8> {
        OwnershipSet { lock_id, admin_public_key: admin.to_base64(), claim_code: code.into() }
            .to_json()
            .unwrap()
    }

    fn admin() -> PublicKey {
        KeyPair::from_scalar(KeyRole::Admin, &[5; 32]).unwrap().public_key()
    }

    #[test]
    fn correct_claim_pins_key() {
        let admin = admin();
        assert_eq!(verify_claim(&message(9, &admin, "AB-12"), 9, "AB-12", false), Ok(admin));
    }

    #[test]
    fn rejections() {
        let admin = admin();
        assert_eq!(
            verify_claim(&message(9, &admin, "AB-13"), 9, "AB-12", false),
            Err(OwnershipError::WrongClaimCode)
        );
        assert_eq!(
            verify_claim(&message(9, &admin, "AB-1"), 9, "AB-12", false),
            Err(OwnershipError::WrongClaimCode)
        );
        assert_eq!(
            verify_claim(&message(8, &admin, "AB-12"), 9, "AB-12", false),
            Err(OwnershipError::WrongLock { expected: 9, actual: 8 })
        );
        assert_eq!(
            verify_claim(&message(9, &admin, "AB-12"), 9, "AB-12", true),
            Err(OwnershipError::AlreadyOwned)
        );
        assert!(matches!(
            verify_claim(b"[]", 9, "AB-12", false),
            Err(OwnershipError::Malformed(_))
        ));
    }

    #[test]
    fn off_curve_admin_key_rejected() {
        let body = format!(
            r#"{{"lockId":9,"adminPub":"{}","claimCode":"AB-12"}}"#,
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, [4u8; 65])
        );
        assert_eq!(
            verify_claim(body.as_bytes(), 9, "AB-12", false),
            Err(OwnershipError::InvalidAdminKey)
        );
    }
}
