//! Consent token issuance, validation, and revocation.

use std::sync::Arc;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::storage::ConsentStorage;
use crate::{ConsentError, ConsentResult, ConsentTokenRecord, PurposeOfUse};

// ============================================================================
// Claims
// ============================================================================

/// Claims carried by a consent token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsentClaims {
    /// Issuer: the fixed consent service name.
    pub iss: String,

    /// Audience: the organization the grant was issued to.
    pub aud: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration (Unix timestamp); always equals `valid_until`.
    pub exp: i64,

    /// Consent identifier.
    pub consent_id: String,

    /// The patient's ABHA address/number.
    pub patient_abha: String,

    /// Internal patient identifier.
    pub patient_id: String,

    /// The organization the grant was issued to.
    pub organization_id: String,

    /// Declared purpose of use.
    pub purpose_of_use: PurposeOfUse,

    /// FHIR resource types the grant covers.
    pub allowed_resources: Vec<String>,

    /// Window start (Unix timestamp).
    pub valid_from: i64,

    /// Window end (Unix timestamp).
    pub valid_until: i64,
}

// ============================================================================
// Requests and Results
// ============================================================================

/// Input for issuing a consent token.
#[derive(Debug, Clone)]
pub struct IssueConsentRequest {
    /// Consent identifier; becomes the durable record's key.
    pub consent_id: String,
    /// Internal patient identifier.
    pub patient_id: String,
    /// The patient's ABHA address/number.
    pub patient_abha: String,
    /// The organization being granted access.
    pub organization_id: String,
    /// Declared purpose of use. Validated against the closed set.
    pub purpose: String,
    /// FHIR resource types the grant covers.
    pub allowed_resources: Vec<String>,
    /// Window start.
    pub valid_from: OffsetDateTime,
    /// Window end. Must be strictly in the future.
    pub valid_until: OffsetDateTime,
}

/// A freshly issued consent token and its durable record.
#[derive(Debug, Clone)]
pub struct IssuedConsent {
    /// The signed token string handed to the organization.
    pub token: String,
    /// The durable record written alongside.
    pub record: ConsentTokenRecord,
}

/// Why a consent token was or was not honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentStatus {
    /// The token is valid for use.
    Valid,
    /// The token's validity window has passed.
    Expired,
    /// The consent was revoked in the durable store.
    Revoked,
    /// The token is malformed, unsigned by us, or unknown.
    Invalid,
    /// The token is valid but does not cover the requested resource type.
    OutOfScope,
}

impl ConsentStatus {
    /// Returns the status as a string, for logging and API responses.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Invalid => "invalid",
            Self::OutOfScope => "out_of_scope",
        }
    }
}

/// Outcome of validating a consent token.
///
/// The status tells the requesting organization what to do next:
/// re-request consent (`Expired`/`Revoked`), fix its own resource-type
/// request (`OutOfScope`), or treat the token as garbage (`Invalid`).
#[derive(Debug, Clone)]
pub struct ConsentValidation {
    /// Why the token was or was not honored.
    pub status: ConsentStatus,
    /// The verified claims, where the signature checked out.
    pub claims: Option<ConsentClaims>,
    /// Failure detail, absent on success.
    pub error: Option<String>,
}

impl ConsentValidation {
    /// Returns `true` if the token should be honored.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status == ConsentStatus::Valid
    }

    fn valid(claims: ConsentClaims) -> Self {
        Self {
            status: ConsentStatus::Valid,
            claims: Some(claims),
            error: None,
        }
    }

    fn expired(message: impl Into<String>, claims: Option<ConsentClaims>) -> Self {
        Self {
            status: ConsentStatus::Expired,
            claims,
            error: Some(message.into()),
        }
    }

    fn revoked(message: impl Into<String>, claims: ConsentClaims) -> Self {
        Self {
            status: ConsentStatus::Revoked,
            claims: Some(claims),
            error: Some(message.into()),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self {
            status: ConsentStatus::Invalid,
            claims: None,
            error: Some(message.into()),
        }
    }

    fn out_of_scope(message: impl Into<String>, claims: ConsentClaims) -> Self {
        Self {
            status: ConsentStatus::OutOfScope,
            claims: Some(claims),
            error: Some(message.into()),
        }
    }
}

// ============================================================================
// Service
// ============================================================================

/// Issues, validates, and revokes consent tokens.
pub struct ConsentTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    storage: Arc<dyn ConsentStorage>,
}

impl ConsentTokenService {
    /// Creates a service from PEM key material.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::Signing`] if either PEM cannot be parsed.
    /// Key misconfiguration is a startup-time fatal for callers; this
    /// constructor is the gate.
    pub fn new(
        signing_key_pem: &str,
        public_key_pem: &str,
        issuer: impl Into<String>,
        storage: Arc<dyn ConsentStorage>,
    ) -> ConsentResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(signing_key_pem.as_bytes())
            .map_err(|e| ConsentError::signing(format!("invalid signing key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| ConsentError::signing(format!("invalid public key: {e}")))?;

        Ok(Self {
            encoding_key,
            decoding_key,
            issuer: issuer.into(),
            storage,
        })
    }

    /// Issues a signed consent token and records it durably.
    ///
    /// # Errors
    ///
    /// - [`ConsentError::InvalidPurpose`] if the purpose is outside the
    ///   closed set (nothing is written in that case)
    /// - [`ConsentError::InvalidWindow`] if `valid_until` is not strictly
    ///   in the future (nothing is written in that case)
    /// - [`ConsentError::Signing`] / [`ConsentError::Storage`] on
    ///   infrastructure failure
    pub async fn issue(&self, request: IssueConsentRequest) -> ConsentResult<IssuedConsent> {
        let purpose = PurposeOfUse::parse(&request.purpose)
            .ok_or_else(|| ConsentError::invalid_purpose(&request.purpose))?;

        let now = OffsetDateTime::now_utc();
        if request.valid_until <= now {
            return Err(ConsentError::invalid_window(
                "valid_until must be strictly in the future",
            ));
        }
        if request.valid_until <= request.valid_from {
            return Err(ConsentError::invalid_window(
                "valid_until must be after valid_from",
            ));
        }

        let claims = ConsentClaims {
            iss: self.issuer.clone(),
            aud: request.organization_id.clone(),
            iat: now.unix_timestamp(),
            exp: request.valid_until.unix_timestamp(),
            consent_id: request.consent_id.clone(),
            patient_abha: request.patient_abha.clone(),
            patient_id: request.patient_id.clone(),
            organization_id: request.organization_id.clone(),
            purpose_of_use: purpose,
            allowed_resources: request.allowed_resources.clone(),
            valid_from: request.valid_from.unix_timestamp(),
            valid_until: request.valid_until.unix_timestamp(),
        };

        let token = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| ConsentError::signing(e.to_string()))?;

        let record = ConsentTokenRecord {
            consent_id: request.consent_id,
            patient_id: request.patient_id,
            patient_abha: request.patient_abha,
            organization_id: request.organization_id,
            purpose_of_use: purpose,
            allowed_resources: request.allowed_resources,
            token: token.clone(),
            issued_at: now,
            expires_at: request.valid_until,
            revoked: false,
            revoked_at: None,
            revoked_reason: None,
        };
        self.storage.insert(record.clone()).await?;

        tracing::info!(
            consent_id = %record.consent_id,
            organization_id = %record.organization_id,
            purpose = %purpose,
            "consent token issued"
        );
        Ok(IssuedConsent { token, record })
    }

    /// Validates a consent token.
    ///
    /// A token is honored only if the signature verifies, the issuer
    /// matches, the durable record exists for this exact token and is not
    /// revoked, and the wall clock is inside the validity window. The last
    /// check runs independently of the signature-level expiry.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::Storage`] only if the durable store is
    /// unreachable; every verdict about the token itself is carried in the
    /// returned [`ConsentValidation`].
    pub async fn validate(&self, token: &str) -> ConsentResult<ConsentValidation> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = true;
        validation.validate_aud = false; // Audience is checked by the resource layer.
        validation.leeway = 0;

        let claims = match decode::<ConsentClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                return Ok(match e.kind() {
                    ErrorKind::ExpiredSignature => {
                        ConsentValidation::expired("token expired", None)
                    }
                    ErrorKind::InvalidSignature => {
                        ConsentValidation::invalid("invalid signature")
                    }
                    _ => ConsentValidation::invalid(e.to_string()),
                });
            }
        };

        let Some(record) = self.storage.find(&claims.consent_id).await? else {
            return Ok(ConsentValidation::invalid(
                "no consent record for this token",
            ));
        };
        if record.token != token {
            return Ok(ConsentValidation::invalid(
                "token does not match the issued consent",
            ));
        }
        if record.revoked {
            let reason = record
                .revoked_reason
                .unwrap_or_else(|| "consent revoked".to_string());
            return Ok(ConsentValidation::revoked(reason, claims));
        }

        // Wall-clock check, independent of the signature-level expiry.
        if OffsetDateTime::now_utc().unix_timestamp() >= claims.valid_until {
            return Ok(ConsentValidation::expired(
                "validity window has passed",
                Some(claims),
            ));
        }

        Ok(ConsentValidation::valid(claims))
    }

    /// Validates a consent token for access to one resource type.
    ///
    /// Layers the scope check on top of [`validate`](Self::validate); a
    /// scope failure names both the requested type and the allowed list.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::Storage`] only if the durable store is
    /// unreachable.
    pub async fn validate_for_resource(
        &self,
        token: &str,
        resource_type: &str,
    ) -> ConsentResult<ConsentValidation> {
        let validation = self.validate(token).await?;
        if !validation.is_valid() {
            return Ok(validation);
        }

        let Some(claims) = validation.claims else {
            return Ok(ConsentValidation::invalid("claims missing after validation"));
        };

        if !claims.allowed_resources.iter().any(|r| r == resource_type) {
            let message =
                ConsentError::scope(resource_type, claims.allowed_resources.clone()).to_string();
            return Ok(ConsentValidation::out_of_scope(message, claims));
        }

        Ok(ConsentValidation::valid(claims))
    }

    /// Revokes a consent. Idempotent: revoking an absent or already
    /// revoked consent matches zero rows and returns `false`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::Storage`] if the durable store fails.
    pub async fn revoke(
        &self,
        consent_id: &str,
        reason: Option<String>,
    ) -> ConsentResult<bool> {
        let flipped = self.storage.revoke(consent_id, reason).await?;
        if flipped {
            tracing::info!(consent_id = %consent_id, "consent revoked");
        }
        Ok(flipped)
    }

    /// Revokes every active grant from a patient to an organization.
    ///
    /// Returns the number of grants revoked.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::Storage`] if the durable store fails.
    pub async fn revoke_all_for_organization(
        &self,
        patient_id: &str,
        organization_id: &str,
        reason: Option<String>,
    ) -> ConsentResult<u64> {
        let count = self
            .storage
            .revoke_all_for_organization(patient_id, organization_id, reason)
            .await?;
        tracing::info!(
            patient_id = %patient_id,
            organization_id = %organization_id,
            count,
            "bulk consent revocation"
        );
        Ok(count)
    }

    /// Returns the issuer name stamped into tokens.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

impl std::fmt::Debug for ConsentTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentTokenService")
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Generates an RSA key pair as (private PEM, public PEM), for
/// provisioning and tests.
///
/// # Errors
///
/// Returns [`ConsentError::Signing`] if key generation fails.
pub fn generate_signing_keys() -> ConsentResult<(String, String)> {
    let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
        .map_err(|e| ConsentError::signing(e.to_string()))?;

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| ConsentError::signing(e.to_string()))?
        .to_string();
    let public_pem = private_key
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| ConsentError::signing(e.to_string()))?;

    Ok((private_pem, public_pem))
}

// ============================================================================
// Tests
// ============================================================================
