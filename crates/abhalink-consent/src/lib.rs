//! # abhalink-consent
//!
//! Signed, time-boxed, purpose-scoped access grants from a patient to an
//! organization over a specific set of clinical resource types.
//!
//! A consent token is an RS256 JWT whose audience is the organization it
//! was granted to. Every issued token is also recorded durably, so
//! revocation and introspection work without re-parsing the token. A token
//! is honored only while it simultaneously (a) verifies cryptographically,
//! (b) is unexpired by its own claims, (c) is unrevoked in the durable
//! store, and (d) is inside its validity window by wall clock - the last
//! check is deliberate defense in depth against clock skew or a broken
//! verifier.
//!
//! State machine per token: `Issued -> Active -> {Expired | Revoked}`,
//! both terminal. There is no reactivation path.
//!
//! ## Modules
//!
//! - [`purpose`] - The closed set of purposes a consent can be granted for
//! - [`record`] - The durable consent record
//! - [`storage`] - Storage trait and in-memory implementation
//! - [`service`] - Issuance, validation, and revocation

pub mod error;
pub mod purpose;
pub mod record;
pub mod service;
pub mod storage;

pub use error::ConsentError;
pub use purpose::PurposeOfUse;
pub use record::ConsentTokenRecord;
pub use service::{
    ConsentClaims, ConsentStatus, ConsentTokenService, ConsentValidation, IssueConsentRequest,
    IssuedConsent, generate_signing_keys,
};
pub use storage::{ConsentStorage, InMemoryConsentStorage};

/// Type alias for consent operation results.
pub type ConsentResult<T> = Result<T, ConsentError>;
