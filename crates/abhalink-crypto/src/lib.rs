//! # abhalink-crypto
//!
//! Encryption primitives for the AbhaLink ABDM integration.
//!
//! Two concerns live here:
//!
//! - [`field`] - RSA-OAEP encryption of PII fields before they leave the
//!   process for the ABDM gateway. The gateway mandates OAEP with SHA-1;
//!   that choice is wire compatibility, not ours to change.
//! - [`at_rest`] - AES-256-GCM encryption of refresh tokens before they are
//!   written to the token store, packed as `iv:tag:ciphertext` hex.
//!
//! Both fail with a typed [`CryptoError`] on bad key material, oversized
//! plaintext, or tampered ciphertext. Decryption never returns partial
//! plaintext.

pub mod at_rest;
pub mod error;
pub mod field;

pub use at_rest::AtRestCipher;
pub use error::CryptoError;
pub use field::{encrypt_field, ensure_pem};

/// Type alias for crypto operation results.
pub type CryptoResult<T> = Result<T, CryptoError>;
