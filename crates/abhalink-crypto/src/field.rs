//! RSA-OAEP field encryption for outbound PII.
//!
//! Aadhaar numbers, OTP values, and document fields are encrypted with the
//! gateway's published RSA public key before transmission. The gateway
//! mandates OAEP padding with SHA-1 as the digest; this must be preserved
//! exactly for wire compatibility.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;

use crate::{CryptoError, CryptoResult};

/// SHA-1 digest length in bytes, fixed by the OAEP profile the gateway uses.
const OAEP_SHA1_DIGEST_LEN: usize = 20;

/// Encrypts a plaintext field with the gateway's RSA public key.
///
/// Accepts both SPKI (`BEGIN PUBLIC KEY`) and PKCS#1 (`BEGIN RSA PUBLIC
/// KEY`) PEM encodings, since the gateway has served both historically.
/// Returns the ciphertext as standard base64.
///
/// # Errors
///
/// - [`CryptoError::InvalidPublicKey`] if the PEM cannot be parsed
/// - [`CryptoError::PlaintextTooLarge`] if the plaintext exceeds the
///   modulus/padding bound (it is never truncated)
/// - [`CryptoError::Encryption`] if the RSA operation itself fails
pub fn encrypt_field(public_key_pem: &str, plaintext: &str) -> CryptoResult<String> {
    let key = parse_public_key(public_key_pem)?;

    let max = key.size() - 2 * OAEP_SHA1_DIGEST_LEN - 2;
    if plaintext.len() > max {
        return Err(CryptoError::PlaintextTooLarge {
            len: plaintext.len(),
            max,
        });
    }

    let ciphertext = key
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), plaintext.as_bytes())
        .map_err(|e| CryptoError::encryption(e.to_string()))?;

    Ok(BASE64.encode(ciphertext))
}

/// Normalizes key material returned by the gateway into PEM form.
///
/// The public-key endpoint sometimes returns a full PEM document and
/// sometimes a bare base64 SPKI body; the latter is wrapped here.
#[must_use]
pub fn ensure_pem(key_material: &str) -> String {
    let trimmed = key_material.trim();
    if trimmed.contains("-----BEGIN") {
        return trimmed.to_string();
    }

    let body: String = trimmed
        .split_whitespace()
        .collect::<Vec<_>>()
        .concat()
        .as_bytes()
        .chunks(64)
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect::<Vec<_>>()
        .join("\n");

    format!("-----BEGIN PUBLIC KEY-----\n{body}\n-----END PUBLIC KEY-----")
}

fn parse_public_key(pem: &str) -> CryptoResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::invalid_public_key(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::EncodePublicKey;

    fn test_key_pair() -> (RsaPrivateKey, String) {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .unwrap();
        (private_key, public_pem)
    }

    #[test]
    fn test_encrypt_round_trips_through_private_key() {
        let (private_key, public_pem) = test_key_pair();

        let ciphertext_b64 = encrypt_field(&public_pem, "123456").unwrap();
        let ciphertext = BASE64.decode(ciphertext_b64).unwrap();

        let plaintext = private_key
            .decrypt(Oaep::new::<Sha1>(), &ciphertext)
            .unwrap();
        assert_eq!(plaintext, b"123456");
    }

    #[test]
    fn test_ciphertext_differs_per_call() {
        let (_, public_pem) = test_key_pair();

        // OAEP is randomized; identical plaintexts must not collide.
        let a = encrypt_field(&public_pem, "999911112222").unwrap();
        let b = encrypt_field(&public_pem, "999911112222").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_oversized_plaintext_rejected() {
        let (_, public_pem) = test_key_pair();

        // 2048-bit modulus with OAEP-SHA1 bounds plaintext at 214 bytes.
        let oversized = "x".repeat(215);
        let err = encrypt_field(&public_pem, &oversized).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::PlaintextTooLarge { len: 215, max: 214 }
        ));
    }

    #[test]
    fn test_invalid_pem_rejected() {
        let err = encrypt_field("not a key", "123456").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPublicKey { .. }));
    }

    #[test]
    fn test_ensure_pem_wraps_bare_base64() {
        let (_, public_pem) = test_key_pair();

        // Strip the armor down to the bare base64 body.
        let body: String = public_pem
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .collect();

        let wrapped = ensure_pem(&body);
        assert!(wrapped.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(wrapped.ends_with("-----END PUBLIC KEY-----"));

        // The wrapped form must parse and encrypt.
        encrypt_field(&wrapped, "123456").unwrap();
    }

    #[test]
    fn test_ensure_pem_passes_through_existing_pem() {
        let (_, public_pem) = test_key_pair();
        assert_eq!(ensure_pem(&public_pem), public_pem.trim());
    }
}
