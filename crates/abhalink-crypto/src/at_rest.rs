//! AES-256-GCM encryption for at-rest refresh token storage.
//!
//! Stored values are packed as three colon-separated hex segments:
//! `iv:tag:ciphertext`, with a random 16-byte IV per call. Decryption
//! verifies the GCM tag and fails closed on any tamper or malformed
//! packing.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use rand::RngCore;

use crate::{CryptoError, CryptoResult};

/// Key size for AES-256 (256 bits).
const KEY_SIZE: usize = 32;

/// IV size used by the stored-data format (128 bits).
const IV_SIZE: usize = 16;

/// GCM authentication tag size (128 bits).
const TAG_SIZE: usize = 16;

/// AES-256-GCM with the 16-byte nonce the stored-data format uses.
type Cipher = AesGcm<Aes256, U16>;

/// Symmetric cipher for at-rest refresh token storage.
///
/// Construction fails on anything but an exact 32-byte key. There is no
/// fallback to a generated key: a process that silently rotated its at-rest
/// key on restart would leave every previously stored ciphertext
/// permanently unreadable.
pub struct AtRestCipher {
    cipher: Cipher,
}

impl AtRestCipher {
    /// Creates a cipher from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] unless the key is exactly 32
    /// bytes.
    pub fn new(key: &[u8]) -> CryptoResult<Self> {
        if key.len() != KEY_SIZE {
            return Err(CryptoError::invalid_key(format!(
                "at-rest key must be {KEY_SIZE} bytes, got {}",
                key.len()
            )));
        }

        let cipher = Cipher::new_from_slice(key)
            .map_err(|e| CryptoError::invalid_key(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Creates a cipher from a 64-character hex key string.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if the string is not valid hex
    /// or decodes to the wrong length.
    pub fn from_hex(key_hex: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|e| CryptoError::invalid_key(format!("invalid hex key: {e}")))?;
        Self::new(&bytes)
    }

    /// Generates a random 32-byte key, for provisioning.
    #[must_use]
    pub fn generate_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    /// Encrypts a plaintext into the packed `iv:tag:ciphertext` hex form.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        let nonce = Nonce::<U16>::from_slice(&iv);

        // The aead API appends the tag to the ciphertext; the packed format
        // carries it as its own segment.
        let mut sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::encryption(e.to_string()))?;
        let tag = sealed.split_off(sealed.len() - TAG_SIZE);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(sealed)
        ))
    }

    /// Decrypts a packed `iv:tag:ciphertext` value.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Integrity`] on malformed packing, a bad hex
    /// segment, or a failed tag check. Partial plaintext is never returned.
    pub fn decrypt(&self, packed: &str) -> CryptoResult<String> {
        let mut segments = packed.split(':');
        let (Some(iv_hex), Some(tag_hex), Some(ct_hex), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(CryptoError::integrity(
                "expected iv:tag:ciphertext packing",
            ));
        };

        let iv = decode_segment(iv_hex, "iv")?;
        let tag = decode_segment(tag_hex, "tag")?;
        let ciphertext = decode_segment(ct_hex, "ciphertext")?;

        if iv.len() != IV_SIZE {
            return Err(CryptoError::integrity("iv must be 16 bytes"));
        }
        if tag.len() != TAG_SIZE {
            return Err(CryptoError::integrity("tag must be 16 bytes"));
        }

        let nonce = Nonce::<U16>::from_slice(&iv);
        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(nonce, sealed.as_slice())
            .map_err(|_| CryptoError::integrity("authentication tag mismatch"))?;

        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::integrity("decrypted value is not UTF-8"))
    }
}

impl std::fmt::Debug for AtRestCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtRestCipher")
            .field("key", &"<redacted>")
            .finish()
    }
}

fn decode_segment(segment: &str, name: &str) -> CryptoResult<Vec<u8>> {
    hex::decode(segment).map_err(|e| CryptoError::integrity(format!("invalid {name} hex: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> AtRestCipher {
        AtRestCipher::new(&AtRestCipher::generate_key()).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let cipher = cipher();
        let packed = cipher.encrypt("refresh-token-value").unwrap();
        assert_eq!(cipher.decrypt(&packed).unwrap(), "refresh-token-value");
    }

    #[test]
    fn test_packed_format() {
        let cipher = cipher();
        let packed = cipher.encrypt("secret").unwrap();

        let segments: Vec<&str> = packed.split(':').collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].len(), IV_SIZE * 2);
        assert_eq!(segments[1].len(), TAG_SIZE * 2);
        assert!(segments.iter().all(|s| hex::decode(s).is_ok()));
    }

    #[test]
    fn test_unique_iv_per_call() {
        let cipher = cipher();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let packed = cipher().encrypt("secret").unwrap();
        let other = cipher();
        assert!(matches!(
            other.decrypt(&packed).unwrap_err(),
            CryptoError::Integrity { .. }
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails_closed() {
        let cipher = cipher();
        let packed = cipher.encrypt("secret").unwrap();

        // Flip the last nibble of the ciphertext segment.
        let mut tampered = packed.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });

        assert!(matches!(
            cipher.decrypt(&tampered).unwrap_err(),
            CryptoError::Integrity { .. }
        ));
    }

    #[test]
    fn test_malformed_packing_rejected() {
        let cipher = cipher();
        for bad in ["", "onesegment", "a:b", "a:b:c:d", "zz:zz:zz"] {
            assert!(matches!(
                cipher.decrypt(bad).unwrap_err(),
                CryptoError::Integrity { .. }
            ));
        }
    }

    #[test]
    fn test_key_length_enforced() {
        assert!(matches!(
            AtRestCipher::new(&[0u8; 16]).unwrap_err(),
            CryptoError::InvalidKey { .. }
        ));
        assert!(AtRestCipher::new(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_from_hex() {
        let key = AtRestCipher::generate_key();
        let cipher = AtRestCipher::from_hex(&hex::encode(key)).unwrap();
        let packed = cipher.encrypt("value").unwrap();
        assert_eq!(cipher.decrypt(&packed).unwrap(), "value");

        assert!(AtRestCipher::from_hex("not-hex").is_err());
        assert!(AtRestCipher::from_hex("abcd").is_err());
    }
}
