//! Deterministic-message ECDSA over P-256.
//!
//! The message is always hashed here with SHA-256 and the digest is signed
//! as a prehash. Signatures are raw 64-byte `r || s` (no DER) with `s`
//! normalized to the lower half of the curve order; verification rejects
//! high-S signatures so each message has exactly one accepted encoding per
//! nonce.

use keyway_proto::{PUBLIC_KEY_LEN, SIGNATURE_LEN};
use p256::ecdsa::{
    Signature, SigningKey, VerifyingKey,
    signature::hazmat::{PrehashSigner, PrehashVerifier},
};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

/// SHA-256 of `message`.
pub fn digest(message: &[u8]) -> [u8; 32] {
    Sha256::digest(message).into()
}

/// Sign `message` with `key`.
///
/// # Errors
///
/// `Signing` if the underlying signer fails, which for a valid key does not
/// happen in practice.
pub fn sign(message: &[u8], key: &SigningKey) -> Result<[u8; SIGNATURE_LEN], CryptoError> {
    let hash = digest(message);
    let signature: Signature = key.sign_prehash(&hash).map_err(|_| CryptoError::Signing)?;
    let signature = signature.normalize_s().unwrap_or(signature);

    let mut out = [0u8; SIGNATURE_LEN];
    out.copy_from_slice(&signature.to_bytes());
    Ok(out)
}

/// Verify a raw signature against an uncompressed SEC1 public key.
///
/// Never errors: malformed keys, malformed signatures, high-S signatures and
/// mismatches all return `false`.
pub fn verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    if public_key.len() != PUBLIC_KEY_LEN {
        return false;
    }
    match VerifyingKey::from_sec1_bytes(public_key) {
        Ok(key) => verify_with(message, signature, &key),
        Err(_) => false,
    }
}

/// Verify against an already parsed key.
pub fn verify_with(message: &[u8], signature: &[u8], key: &VerifyingKey) -> bool {
    if signature.len() != SIGNATURE_LEN {
        return false;
    }
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    if signature.normalize_s().is_some() {
        return false;
    }
    key.verify_prehash(&digest(message), &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed.max(1); 32]).unwrap()
    }

    fn encoded(key: &SigningKey) -> Vec<u8> {
        key.verifying_key().to_encoded_point(false).as_bytes().to_vec()
    }

    #[test]
    fn signs_and_verifies() {
        let key = key(7);
        let sig = sign(b"open sesame", &key).unwrap();
        assert!(verify(b"open sesame", &sig, &encoded(&key)));
        assert!(!verify(b"open sesame!", &sig, &encoded(&key)));
    }

    #[test]
    fn signatures_are_deterministic() {
        let key = key(3);
        assert_eq!(sign(b"m", &key).unwrap(), sign(b"m", &key).unwrap());
    }

    #[test]
    fn signatures_are_low_s() {
        let key = key(11);
        for msg in [&b"a"[..], b"b", b"c", b"d", b"e"] {
            let sig = sign(msg, &key).unwrap();
            let parsed = Signature::from_slice(&sig).unwrap();
            assert!(parsed.normalize_s().is_none());
        }
    }

    #[test]
    fn high_s_rejected() {
        let key = key(5);
        let sig = sign(b"msg", &key).unwrap();
        let parsed = Signature::from_slice(&sig).unwrap();
        // Negate s: (r, n - s) is mathematically valid but must not verify
        let (r, s) = parsed.split_scalars();
        let high = Signature::from_scalars(r, -*s).unwrap();
        assert!(!verify(b"msg", &high.to_bytes(), &encoded(&key)));
    }

    #[test]
    fn malformed_inputs_are_false_not_errors() {
        let key = key(9);
        let sig = sign(b"x", &key).unwrap();
        assert!(!verify(b"x", &sig[..63], &encoded(&key)));
        assert!(!verify(b"x", &[0u8; 64], &encoded(&key)));
        assert!(!verify(b"x", &sig, &[4u8; 65]));
        assert!(!verify(b"x", &sig, &encoded(&key)[..33]));
    }

    proptest! {
        #[test]
        fn any_single_byte_flip_fails(
            message in prop::collection::vec(any::<u8>(), 1..128),
            index in any::<prop::sample::Index>(),
            flip in 1u8..=255,
            in_signature in any::<bool>(),
        ) {
            let key = key(42);
            let public = encoded(&key);
            let mut sig = sign(&message, &key).unwrap();
            let mut message = message;

            if in_signature {
                let i = index.index(sig.len());
                sig[i] ^= flip;
            } else {
                let i = index.index(message.len());
                message[i] ^= flip;
            }
            prop_assert!(!verify(&message, &sig, &public));
        }
    }
}
