//! ABDM gateway operations.
//!
//! Each business operation (OTP request, Aadhaar enrollment, generic auth,
//! document enrollment, QR/card generation, benefit linking, token refresh)
//! is encoded into the exact header/payload shape the gateway expects.
//! Which fields are encrypted and which pass through in the clear is
//! protocol-mandated and preserved field-by-field: OTP values, identifying
//! numbers, and document fields (name, DOB, address) are RSA-encrypted;
//! transaction ids, consent metadata, and base64 binary attachments are
//! not.

use std::sync::Arc;
use std::time::Duration;

use abhalink_config::GatewaySettings;
use abhalink_core::Environment;
use abhalink_crypto::encrypt_field;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::public_key::PublicKeyCache;
use crate::session::SessionTokenManager;
use crate::{GatewayError, GatewayResult, headers};

const ENROLLMENT_OTP_PATH: &str = "/v3/enrollment/request/otp";
const ENROL_BY_AADHAAR_PATH: &str = "/v3/enrollment/enrol/byAadhaar";
const ENROL_BY_DOCUMENT_PATH: &str = "/v3/enrollment/enrol/byDocument";
const AUTH_OTP_PATH: &str = "/v3/profile/login/request/otp";
const AUTH_VERIFY_PATH: &str = "/v3/profile/login/verify";
const QR_CODE_PATH: &str = "/v3/profile/account/qrCode";
const ABHA_CARD_PATH: &str = "/v3/profile/account/abha-card";
const BENEFIT_LINK_PATH: &str = "/v3/benefit/link";
const TOKEN_REFRESH_PATH: &str = "/v3/profile/login/refresh";

// ============================================================================
// Request Types
// ============================================================================

/// Which identifier an OTP flow is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoginHint {
    /// Aadhaar number; OTP is dispatched by UIDAI.
    Aadhaar,
    /// Registered mobile number; OTP is dispatched by ABDM.
    Mobile,
    /// Existing ABHA number (recovery/login).
    AbhaNumber,
}

impl LoginHint {
    /// Returns the hint as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aadhaar => "aadhaar",
            Self::Mobile => "mobile",
            Self::AbhaNumber => "abha-number",
        }
    }

    /// Returns the OTP system that dispatches for this hint.
    #[must_use]
    pub fn otp_system(&self) -> &'static str {
        match self {
            Self::Aadhaar => "aadhaar",
            Self::Mobile | Self::AbhaNumber => "abdm",
        }
    }
}

/// Input for an OTP request (enrollment or auth).
#[derive(Debug, Clone)]
pub struct OtpRequest {
    /// Transaction id from a previous step, if this re-requests within a
    /// flow.
    pub txn_id: Option<String>,
    /// Requested scopes (e.g. `abha-enrol`, `abha-login`).
    pub scope: Vec<String>,
    /// Which identifier the OTP is keyed on.
    pub login_hint: LoginHint,
    /// The identifier value. Encrypted before transmission.
    pub value: String,
}

/// Input for completing an Aadhaar enrollment.
#[derive(Debug, Clone)]
pub struct EnrollByAadhaarRequest {
    /// Transaction id returned by the OTP request.
    pub txn_id: String,
    /// The OTP the patient received. Encrypted before transmission.
    pub otp: String,
    /// Mobile number to register on the new account, if any.
    pub mobile: Option<String>,
    /// Consent artefact code (e.g. `abha-enrollment`).
    pub consent_code: String,
    /// Consent artefact version (e.g. `1.4`).
    pub consent_version: String,
}

/// Input for completing an OTP-based auth (login/recovery).
#[derive(Debug, Clone)]
pub struct VerifyOtpRequest {
    /// Transaction id returned by the OTP request.
    pub txn_id: String,
    /// The OTP the patient received. Encrypted before transmission.
    pub otp: String,
    /// Requested scopes.
    pub scope: Vec<String>,
}

/// Input for a document-based (e.g. driving licence) enrollment.
#[derive(Debug, Clone)]
pub struct DocumentEnrollmentRequest {
    /// Document type discriminator (e.g. `DRIVING_LICENCE`).
    pub document_type: String,
    /// Document number. Encrypted before transmission.
    pub document_number: String,
    /// Name as printed on the document. Encrypted before transmission.
    pub name: String,
    /// Date of birth (`YYYY-MM-DD`). Encrypted before transmission.
    pub dob: String,
    /// Gender code. Passes through in the clear.
    pub gender: String,
    /// Address as printed on the document. Encrypted before transmission.
    pub address: String,
    /// PIN code. Passes through in the clear.
    pub pin_code: Option<String>,
    /// Base64 scan of the document front. Already-encoded binary, passes
    /// through untouched.
    pub front_side_photo: String,
    /// Base64 scan of the document back. Passes through untouched.
    pub back_side_photo: String,
    /// Consent artefact code.
    pub consent_code: String,
    /// Consent artefact version.
    pub consent_version: String,
}

/// Input for linking a benefit program to an ABHA account.
#[derive(Debug, Clone)]
pub struct BenefitLinkRequest {
    /// The patient's ABHA number.
    pub abha_number: String,
    /// Benefit program name.
    pub benefit_name: String,
    /// Consent artefact code.
    pub consent_code: String,
    /// Consent artefact version.
    pub consent_version: String,
}

// ============================================================================
// Response Types
// ============================================================================

/// Response to an OTP request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpResponse {
    /// Transaction id to carry into the verification step.
    pub txn_id: String,
    /// Human-readable dispatch message, when present.
    #[serde(default)]
    pub message: Option<String>,
}

/// Profile object nested in auth-completing responses.
///
/// Field names have drifted across gateway versions; the aliases normalize
/// the variants at the boundary instead of letting them leak inward.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbhaProfile {
    /// The unique external identifier (14-digit ABHA number).
    #[serde(alias = "ABHANumber", alias = "healthIdNumber")]
    pub abha_number: String,
    /// Human-readable ABHA address/handle.
    #[serde(default, alias = "phrAddress", alias = "healthId")]
    pub abha_address: Option<String>,
    /// Patient name on the account.
    #[serde(default)]
    pub name: Option<String>,
    /// Gender code.
    #[serde(default)]
    pub gender: Option<String>,
    /// Date of birth.
    #[serde(default)]
    pub dob: Option<String>,
    /// Registered mobile number.
    #[serde(default)]
    pub mobile: Option<String>,
}

/// Token material returned by auth-completing operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMaterial {
    /// The patient-scoped access token.
    #[serde(alias = "accessToken")]
    pub token: String,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Refresh token, when issued or rotated.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Refresh token lifetime in seconds.
    #[serde(default)]
    pub refresh_expires_in: Option<u64>,
}

/// Response to an auth-completing operation (enrollment, login, document
/// enrollment).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Transaction id, when the flow continues.
    #[serde(default)]
    pub txn_id: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
    /// The account profile, on success.
    #[serde(default, alias = "ABHAProfile")]
    pub profile: Option<AbhaProfile>,
    /// Patient token material, on success.
    #[serde(default)]
    pub tokens: Option<TokenMaterial>,
    /// Whether the account was newly created.
    #[serde(default)]
    pub is_new: Option<bool>,
}

// ============================================================================
// Client
// ============================================================================

/// Client for the ABDM gateway's enrollment and profile operations.
///
/// Construction wires up the shared [`SessionTokenManager`] and
/// [`PublicKeyCache`]; every operation resolves the public key for its own
/// environment before encrypting, so key and request environment can never
/// mismatch.
pub struct GatewayClient {
    http: reqwest::Client,
    settings: GatewaySettings,
    session: Arc<SessionTokenManager>,
    public_keys: PublicKeyCache,
}

impl GatewayClient {
    /// Creates a client for the configured gateway.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(settings: GatewaySettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        let session = Arc::new(SessionTokenManager::new(settings.clone()));
        let public_keys = PublicKeyCache::new(settings.clone(), Arc::clone(&session));

        Self {
            http,
            settings,
            session,
            public_keys,
        }
    }

    /// Returns the environment this client addresses.
    #[must_use]
    pub fn environment(&self) -> Environment {
        self.settings.environment
    }

    /// Returns the shared session token manager.
    #[must_use]
    pub fn session(&self) -> &Arc<SessionTokenManager> {
        &self.session
    }

    /// Requests an enrollment OTP (Aadhaar or mobile).
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on encryption, transport, or upstream
    /// failure. Never retried here: every call dispatches a new OTP.
    pub async fn request_enrollment_otp(&self, request: &OtpRequest) -> GatewayResult<OtpResponse> {
        let payload = self.otp_payload(request).await?;
        self.post_json(ENROLLMENT_OTP_PATH, &payload).await
    }

    /// Requests an auth OTP (login/recovery).
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on encryption, transport, or upstream
    /// failure.
    pub async fn request_auth_otp(&self, request: &OtpRequest) -> GatewayResult<OtpResponse> {
        let payload = self.otp_payload(request).await?;
        self.post_json(AUTH_OTP_PATH, &payload).await
    }

    /// Completes an Aadhaar enrollment with the OTP the patient received.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on encryption, transport, or upstream
    /// failure.
    pub async fn enroll_by_aadhaar(
        &self,
        request: &EnrollByAadhaarRequest,
    ) -> GatewayResult<AuthResponse> {
        let encrypted_otp = self.encrypt(&request.otp).await?;

        let mut otp = serde_json::json!({
            "txnId": request.txn_id,
            "otpValue": encrypted_otp,
        });
        if let Some(mobile) = &request.mobile {
            otp["mobile"] = serde_json::json!(mobile);
        }

        let payload = serde_json::json!({
            "authData": {
                "authMethods": ["otp"],
                "otp": otp,
            },
            "consent": {
                "code": request.consent_code,
                "version": request.consent_version,
            },
        });

        self.post_json(ENROL_BY_AADHAAR_PATH, &payload).await
    }

    /// Verifies an auth OTP, completing a login or recovery.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on encryption, transport, or upstream
    /// failure.
    pub async fn verify_auth_otp(&self, request: &VerifyOtpRequest) -> GatewayResult<AuthResponse> {
        let encrypted_otp = self.encrypt(&request.otp).await?;

        let payload = serde_json::json!({
            "scope": request.scope,
            "authData": {
                "authMethods": ["otp"],
                "otp": {
                    "txnId": request.txn_id,
                    "otpValue": encrypted_otp,
                },
            },
        });

        self.post_json(AUTH_VERIFY_PATH, &payload).await
    }

    /// Enrolls an ABHA account from an identity document.
    ///
    /// Document number, name, DOB, and address are encrypted; the base64
    /// photo attachments pass through untouched.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on encryption, transport, or upstream
    /// failure.
    pub async fn enroll_by_document(
        &self,
        request: &DocumentEnrollmentRequest,
    ) -> GatewayResult<AuthResponse> {
        let payload = serde_json::json!({
            "documentType": request.document_type,
            "documentId": self.encrypt(&request.document_number).await?,
            "name": self.encrypt(&request.name).await?,
            "dob": self.encrypt(&request.dob).await?,
            "gender": request.gender,
            "address": self.encrypt(&request.address).await?,
            "pinCode": request.pin_code,
            "frontSidePhoto": request.front_side_photo,
            "backSidePhoto": request.back_side_photo,
            "consent": {
                "code": request.consent_code,
                "version": request.consent_version,
            },
        });

        self.post_json(ENROL_BY_DOCUMENT_PATH, &payload).await
    }

    /// Links a benefit program to an ABHA account. All fields pass through
    /// in the clear (consent metadata is not PII).
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on transport or upstream failure.
    pub async fn link_benefit(&self, request: &BenefitLinkRequest) -> GatewayResult<AuthResponse> {
        let payload = serde_json::json!({
            "abhaNumber": request.abha_number,
            "benefitName": request.benefit_name,
            "consent": {
                "code": request.consent_code,
                "version": request.consent_version,
            },
        });

        self.post_json(BENEFIT_LINK_PATH, &payload).await
    }

    /// Fetches the patient's ABHA QR code as raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on transport or upstream failure.
    pub async fn abha_qr_code(&self, patient_token: &str) -> GatewayResult<Vec<u8>> {
        self.get_bytes(QR_CODE_PATH, patient_token).await
    }

    /// Fetches the patient's ABHA card as raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on transport or upstream failure.
    pub async fn abha_card(&self, patient_token: &str) -> GatewayResult<Vec<u8>> {
        self.get_bytes(ABHA_CARD_PATH, patient_token).await
    }

    /// Exchanges a patient refresh token for fresh token material.
    ///
    /// The upstream may rotate the refresh token; callers must inspect
    /// [`TokenMaterial::refresh_token`] and re-store it when it differs.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on transport or upstream failure.
    pub async fn refresh_patient_token(&self, refresh_token: &str) -> GatewayResult<TokenMaterial> {
        let payload = serde_json::json!({ "refreshToken": refresh_token });
        self.post_json(TOKEN_REFRESH_PATH, &payload).await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn otp_payload(&self, request: &OtpRequest) -> GatewayResult<serde_json::Value> {
        let encrypted_value = self.encrypt(&request.value).await?;

        let mut payload = serde_json::json!({
            "scope": request.scope,
            "loginHint": request.login_hint.as_str(),
            "loginId": encrypted_value,
            "otpSystem": request.login_hint.otp_system(),
        });
        if let Some(txn_id) = &request.txn_id {
            payload["txnId"] = serde_json::json!(txn_id);
        }
        Ok(payload)
    }

    /// Encrypts a field with the public key for this client's environment.
    async fn encrypt(&self, plaintext: &str) -> GatewayResult<String> {
        let pem = self.public_keys.get(self.settings.environment).await?;
        Ok(encrypt_field(&pem, plaintext)?)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> GatewayResult<T> {
        let url = format!("{}{}", self.settings.base_url(), path);
        let bearer = self.session.valid_token().await?;

        let response = self
            .http
            .post(&url)
            .header(headers::REQUEST_ID, headers::new_request_id())
            .header(headers::TIMESTAMP, headers::rfc3339_now()?)
            .header(headers::ENVIRONMENT, self.settings.environment.as_str())
            .bearer_auth(bearer)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%path, status = %status, "gateway call rejected");
            return Err(GatewayError::upstream(status.as_u16(), body));
        }

        Ok(response.json().await?)
    }

    async fn get_bytes(&self, path: &str, patient_token: &str) -> GatewayResult<Vec<u8>> {
        let url = format!("{}{}", self.settings.base_url(), path);
        let bearer = self.session.valid_token().await?;

        let response = self
            .http
            .get(&url)
            .header(headers::REQUEST_ID, headers::new_request_id())
            .header(headers::TIMESTAMP, headers::rfc3339_now()?)
            .header(headers::ENVIRONMENT, self.settings.environment.as_str())
            .header("X-Token", format!("Bearer {patient_token}"))
            .bearer_auth(bearer)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::upstream(status.as_u16(), body));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("environment", &self.settings.environment)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
