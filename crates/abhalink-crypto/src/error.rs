//! Crypto error types.

/// Errors that can occur during encryption and decryption.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The at-rest encryption key is missing or has the wrong length.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },

    /// The RSA public key PEM could not be parsed.
    #[error("Invalid public key: {message}")]
    InvalidPublicKey {
        /// Description of why the key is invalid.
        message: String,
    },

    /// The plaintext exceeds the RSA modulus/padding bound.
    #[error("Plaintext of {len} bytes exceeds the {max} byte OAEP bound")]
    PlaintextTooLarge {
        /// Length of the rejected plaintext.
        len: usize,
        /// Maximum plaintext length for the key.
        max: usize,
    },

    /// Encryption failed.
    #[error("Encryption failed: {message}")]
    Encryption {
        /// Description of the encryption failure.
        message: String,
    },

    /// Decryption failed: the ciphertext is tampered, truncated, or
    /// malformed. No plaintext is ever returned in this case.
    #[error("Integrity check failed: {message}")]
    Integrity {
        /// Description of the integrity failure.
        message: String,
    },
}

impl CryptoError {
    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidPublicKey` error.
    #[must_use]
    pub fn invalid_public_key(message: impl Into<String>) -> Self {
        Self::InvalidPublicKey {
            message: message.into(),
        }
    }

    /// Creates a new `Encryption` error.
    #[must_use]
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Creates a new `Integrity` error.
    #[must_use]
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Returns `true` if this error indicates bad key material.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey { .. } | Self::InvalidPublicKey { .. }
        )
    }
}
