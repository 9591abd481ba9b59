//! Durable consent record.
//!
//! Every issued token is recorded alongside its signed string so later
//! revocation and introspection work without re-parsing the token. The
//! record is immutable except for the revocation fields, and revocation is
//! monotonic: a revoked record is never un-revoked.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::PurposeOfUse;

/// The durable row recorded for every issued consent token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentTokenRecord {
    /// Consent identifier (primary key).
    pub consent_id: String,

    /// Internal patient identifier.
    pub patient_id: String,

    /// The patient's ABHA address/number.
    pub patient_abha: String,

    /// The organization the grant was issued to.
    pub organization_id: String,

    /// Declared purpose of use.
    pub purpose_of_use: PurposeOfUse,

    /// FHIR resource types the grant covers.
    pub allowed_resources: Vec<String>,

    /// The signed token string, kept for the (consent id, token) lookup
    /// at validation time.
    pub token: String,

    /// When the token was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// When the grant expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Whether the grant has been revoked. Monotonic.
    pub revoked: bool,

    /// When the grant was revoked.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub revoked_at: Option<OffsetDateTime>,

    /// Why the grant was revoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_reason: Option<String>,
}

impl ConsentTokenRecord {
    /// Returns `true` if the grant's window has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }

    /// Returns `true` if the grant is neither expired nor revoked.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_expired() && !self.revoked
    }
}
