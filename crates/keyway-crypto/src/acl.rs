//! Signing and verifying ACL envelopes.

use keyway_proto::{AclEnvelope, AclPayload};

use crate::{
    canonical::canonical_serialize,
    error::CryptoError,
    keys::{KeyPair, KeyRole, PublicKey},
};

/// Sign the canonical form of `payload` with a lock's admin key.
///
/// # Errors
///
/// `WrongRole` for a device key, `Serialization` if the payload cannot be
/// encoded.
pub fn sign_payload(payload: &AclPayload, admin: &KeyPair) -> Result<AclEnvelope, CryptoError> {
    if admin.role() != KeyRole::Admin {
        return Err(CryptoError::WrongRole { role: admin.role(), operation: "sign ACL payloads" });
    }
    let message = canonical_serialize(payload)?;
    let signature = admin.sign(&message)?;
    Ok(AclEnvelope::new(payload.clone(), &signature))
}

/// Check the envelope signature against the lock's admin key.
///
/// The payload is re-canonicalized, so it does not matter how the stored
/// JSON ordered its fields.
pub fn verify_envelope(envelope: &AclEnvelope, admin: &PublicKey) -> bool {
    let Ok(signature) = envelope.signature_bytes() else {
        return false;
    };
    let Ok(message) = canonical_serialize(&envelope.payload) else {
        return false;
    };
    admin.verify(&message, &signature)
}

#[cfg(test)]
mod tests {
    use keyway_proto::UserEntry;

    use super::*;

    fn admin() -> KeyPair {
        KeyPair::from_scalar(KeyRole::Admin, &[0x21; 32]).unwrap()
    }

    fn payload(version: u32) -> AclPayload {
        AclPayload {
            lock_id: 42,
            version,
            users: vec![UserEntry { kid: "00ff".into(), public_key: "BA==".into() }],
        }
    }

    #[test]
    fn signed_envelope_verifies() {
        let admin = admin();
        let envelope = sign_payload(&payload(1), &admin).unwrap();
        assert!(verify_envelope(&envelope, &admin.public_key()));
    }

    #[test]
    fn reordered_json_still_verifies() {
        let admin = admin();
        let envelope = sign_payload(&payload(2), &admin).unwrap();
        let reordered = format!(
            r#"{{"payload":{{"version":2,"users":[{{"pub":"BA==","kid":"00ff"}}],"lockId":42}},"sig":"{}"}}"#,
            envelope.sig
        );
        let parsed = AclEnvelope::from_json(reordered.as_bytes()).unwrap();
        assert!(verify_envelope(&parsed, &admin.public_key()));
    }

    #[test]
    fn tampered_payload_fails() {
        let admin = admin();
        let mut envelope = sign_payload(&payload(3), &admin).unwrap();
        envelope.payload.version = 4;
        assert!(!verify_envelope(&envelope, &admin.public_key()));
    }

    #[test]
    fn other_admin_key_fails() {
        let envelope = sign_payload(&payload(1), &admin()).unwrap();
        let other = KeyPair::from_scalar(KeyRole::Admin, &[0x22; 32]).unwrap();
        assert!(!verify_envelope(&envelope, &other.public_key()));
    }

    #[test]
    fn device_key_cannot_sign_acl() {
        let device = KeyPair::from_scalar(KeyRole::User, &[0x23; 32]).unwrap();
        assert!(matches!(sign_payload(&payload(1), &device), Err(CryptoError::WrongRole { .. })));
    }

    #[test]
    fn garbage_signature_is_rejected() {
        let admin = admin();
        let mut envelope = sign_payload(&payload(1), &admin).unwrap();
        envelope.sig = "not base64!".into();
        assert!(!verify_envelope(&envelope, &admin.public_key()));
    }
}
