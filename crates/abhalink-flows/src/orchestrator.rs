//! Multi-step flow orchestration.

use std::sync::Arc;
use std::time::Duration;

use abhalink_core::{FlowOutcome, IdentityLinkStorage, PatientIdentityLink};
use abhalink_gateway::{
    AuthResponse, DocumentEnrollmentRequest, GatewayClient, GatewayError, LoginHint, OtpRequest,
    VerifyOtpRequest,
};
use abhalink_tokens::PatientTokenStore;

/// TTL applied to stored refresh tokens when the upstream omits a
/// lifetime (ABDM refresh tokens run 15 days).
const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(15 * 24 * 60 * 60);

const ENROLLMENT_SCOPE: &str = "abha-enrol";
const LOGIN_SCOPE: &str = "abha-login";
const MOBILE_VERIFY_SCOPE: &str = "mobile-verify";

/// Sequences gateway calls into single conceptual operations.
///
/// Stateless between steps: the `txn_id` returned by a `begin_*` step is
/// carried by the caller into the matching `complete_*` step.
pub struct AbhaOrchestrator {
    gateway: Arc<GatewayClient>,
    tokens: Arc<PatientTokenStore>,
    identity: Arc<dyn IdentityLinkStorage>,
}

impl AbhaOrchestrator {
    /// Creates an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(
        gateway: Arc<GatewayClient>,
        tokens: Arc<PatientTokenStore>,
        identity: Arc<dyn IdentityLinkStorage>,
    ) -> Self {
        Self {
            gateway,
            tokens,
            identity,
        }
    }

    /// Requests an Aadhaar OTP to begin enrollment.
    pub async fn begin_aadhaar_enrollment(&self, aadhaar_number: &str) -> FlowOutcome {
        let request = OtpRequest {
            txn_id: None,
            scope: vec![ENROLLMENT_SCOPE.to_string()],
            login_hint: LoginHint::Aadhaar,
            value: aadhaar_number.to_string(),
        };

        match self.gateway.request_enrollment_otp(&request).await {
            Ok(response) => FlowOutcome::ok("otp_sent", "OTP sent to the Aadhaar-linked mobile")
                .with_txn_id(response.txn_id),
            Err(e) => gateway_failure("Aadhaar OTP request failed", &e),
        }
    }

    /// Completes an Aadhaar enrollment with the OTP the patient received.
    ///
    /// On success the patient's refresh token is stored and the identity
    /// link is upserted.
    pub async fn complete_aadhaar_enrollment(
        &self,
        patient_id: &str,
        txn_id: &str,
        otp: &str,
        mobile: Option<String>,
    ) -> FlowOutcome {
        let request = abhalink_gateway::EnrollByAadhaarRequest {
            txn_id: txn_id.to_string(),
            otp: otp.to_string(),
            mobile,
            consent_code: "abha-enrollment".to_string(),
            consent_version: "1.4".to_string(),
        };

        match self.gateway.enroll_by_aadhaar(&request).await {
            Ok(response) => {
                self.finish_auth("enrolled", "ABHA account linked", patient_id, response)
                    .await
            }
            Err(e) => gateway_failure("Aadhaar enrollment failed", &e),
        }
    }

    /// Requests an OTP on the patient's registered mobile number.
    pub async fn begin_mobile_verification(&self, mobile: &str) -> FlowOutcome {
        let request = OtpRequest {
            txn_id: None,
            scope: vec![LOGIN_SCOPE.to_string(), MOBILE_VERIFY_SCOPE.to_string()],
            login_hint: LoginHint::Mobile,
            value: mobile.to_string(),
        };

        match self.gateway.request_auth_otp(&request).await {
            Ok(response) => FlowOutcome::ok("otp_sent", "OTP sent to the registered mobile")
                .with_txn_id(response.txn_id),
            Err(e) => gateway_failure("Mobile OTP request failed", &e),
        }
    }

    /// Completes a mobile verification with the OTP the patient received.
    pub async fn complete_mobile_verification(
        &self,
        patient_id: &str,
        txn_id: &str,
        otp: &str,
    ) -> FlowOutcome {
        let request = VerifyOtpRequest {
            txn_id: txn_id.to_string(),
            otp: otp.to_string(),
            scope: vec![LOGIN_SCOPE.to_string(), MOBILE_VERIFY_SCOPE.to_string()],
        };

        match self.gateway.verify_auth_otp(&request).await {
            Ok(response) => {
                self.finish_auth("verified", "Mobile number verified", patient_id, response)
                    .await
            }
            Err(e) => gateway_failure("Mobile verification failed", &e),
        }
    }

    /// Enrolls an ABHA account from a driving licence. Single step: the
    /// document itself is the proof of identity.
    pub async fn enroll_by_driving_licence(
        &self,
        patient_id: &str,
        request: DocumentEnrollmentRequest,
    ) -> FlowOutcome {
        match self.gateway.enroll_by_document(&request).await {
            Ok(response) => {
                self.finish_auth(
                    "enrolled",
                    "ABHA account created from driving licence",
                    patient_id,
                    response,
                )
                .await
            }
            Err(e) => gateway_failure("Driving licence enrollment failed", &e),
        }
    }

    /// Requests an OTP against an existing ABHA number to begin recovery.
    pub async fn begin_abha_recovery(&self, abha_number: &str) -> FlowOutcome {
        let request = OtpRequest {
            txn_id: None,
            scope: vec![LOGIN_SCOPE.to_string()],
            login_hint: LoginHint::AbhaNumber,
            value: abha_number.to_string(),
        };

        match self.gateway.request_auth_otp(&request).await {
            Ok(response) => {
                FlowOutcome::ok("otp_sent", "OTP sent for ABHA recovery").with_txn_id(response.txn_id)
            }
            Err(e) => gateway_failure("ABHA recovery OTP request failed", &e),
        }
    }

    /// Completes an ABHA recovery, re-linking the account to the patient.
    pub async fn complete_abha_recovery(
        &self,
        patient_id: &str,
        txn_id: &str,
        otp: &str,
    ) -> FlowOutcome {
        let request = VerifyOtpRequest {
            txn_id: txn_id.to_string(),
            otp: otp.to_string(),
            scope: vec![LOGIN_SCOPE.to_string()],
        };

        match self.gateway.verify_auth_otp(&request).await {
            Ok(response) => {
                self.finish_auth("recovered", "ABHA account recovered", patient_id, response)
                    .await
            }
            Err(e) => gateway_failure("ABHA recovery failed", &e),
        }
    }

    /// Delinks the patient's ABHA identity: revokes stored tokens and
    /// clears (not deletes) the identity link.
    pub async fn delink(&self, patient_id: &str) -> FlowOutcome {
        self.tokens.revoke(patient_id).await;

        match self.identity.clear(patient_id).await {
            Ok(()) => FlowOutcome::ok("delinked", "ABHA identity delinked"),
            Err(e) => {
                tracing::warn!(patient_id = %patient_id, error = %e, "identity clear failed");
                FlowOutcome::fail("storage_error", "Could not update the identity link")
            }
        }
    }

    /// Returns the patient's current ABHA link details.
    pub async fn abha_details(&self, patient_id: &str) -> FlowOutcome {
        match self.identity.find(patient_id).await {
            Ok(Some(link)) if link.is_linked() => match serde_json::to_value(&link) {
                Ok(data) => FlowOutcome::ok("linked", "ABHA details found").with_data(data),
                Err(e) => {
                    tracing::warn!(patient_id = %patient_id, error = %e, "link serialization failed");
                    FlowOutcome::fail("internal_error", "Could not read the identity link")
                }
            },
            Ok(_) => FlowOutcome::fail("not_linked", "No ABHA identity linked for this patient"),
            Err(e) => {
                tracing::warn!(patient_id = %patient_id, error = %e, "identity lookup failed");
                FlowOutcome::fail("storage_error", "Could not read the identity link")
            }
        }
    }

    /// Persists token material and the identity link after a successful
    /// auth-completing gateway call, then builds the outcome envelope.
    async fn finish_auth(
        &self,
        code: &str,
        message: &str,
        patient_id: &str,
        response: AuthResponse,
    ) -> FlowOutcome {
        if let Some(tokens) = &response.tokens
            && let Some(refresh_token) = &tokens.refresh_token
        {
            let ttl = tokens
                .refresh_expires_in
                .map_or(DEFAULT_REFRESH_TTL, Duration::from_secs);
            self.tokens.store(patient_id, refresh_token, ttl).await;
        }

        let Some(profile) = &response.profile else {
            // The gateway accepted the step but returned no profile; the
            // flow is incomplete from the caller's perspective.
            return FlowOutcome::fail(
                "incomplete_response",
                response
                    .message
                    .unwrap_or_else(|| "Gateway returned no profile".to_string()),
            );
        };

        let link = PatientIdentityLink::new(
            patient_id,
            profile.abha_number.clone(),
            profile.abha_address.clone().unwrap_or_default(),
        );

        if let Err(e) = self.identity.upsert(link).await {
            tracing::warn!(patient_id = %patient_id, error = %e, "identity upsert failed");
            return FlowOutcome::fail("storage_error", "Could not persist the identity link");
        }

        FlowOutcome::ok(code, message).with_data(serde_json::json!({
            "abhaNumber": profile.abha_number,
            "abhaAddress": profile.abha_address,
            "isNew": response.is_new,
        }))
    }
}

impl std::fmt::Debug for AbhaOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbhaOrchestrator").finish()
    }
}

/// Maps a gateway error to a failure outcome with a machine code.
fn gateway_failure(context: &str, error: &GatewayError) -> FlowOutcome {
    tracing::warn!(error = %error, "{context}");
    let (code, message) = match error {
        GatewayError::UpstreamAuth { .. } => (
            "upstream_auth_failed",
            "Could not establish a gateway session".to_string(),
        ),
        GatewayError::Upstream { status, .. } => (
            "upstream_rejected",
            format!("{context} (gateway status {status})"),
        ),
        GatewayError::Network { .. } => (
            "network_error",
            format!("{context} (gateway unreachable)"),
        ),
        GatewayError::InvalidResponse { .. } => (
            "invalid_gateway_response",
            format!("{context} (unexpected gateway response)"),
        ),
        GatewayError::Crypto(_) => (
            "encryption_failed",
            format!("{context} (could not protect request fields)"),
        ),
    };
    FlowOutcome::fail(code, message)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use abhalink_config::GatewaySettings;
    use abhalink_core::InMemoryIdentityLinkStorage;
    use abhalink_crypto::AtRestCipher;
    use abhalink_tokens::TokenStoreBackend;
    use rand::rngs::OsRng;
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::EncodePublicKey;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        server: MockServer,
        orchestrator: AbhaOrchestrator,
        tokens: Arc<PatientTokenStore>,
        identity: Arc<InMemoryIdentityLinkStorage>,
    }

    async fn harness() -> Harness {
        let server = MockServer::start().await;

        let public_pem = RsaPrivateKey::new(&mut OsRng, 2048)
            .unwrap()
            .to_public_key()
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .unwrap();

        Mock::given(method("POST"))
            .and(path("/gateway/v3/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "sess",
                "expiresIn": 1200,
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v3/profile/public/certificate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "publicKey": public_pem })),
            )
            .mount(&server)
            .await;

        let gateway = Arc::new(GatewayClient::new(GatewaySettings {
            sandbox_base_url: server.uri(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            request_timeout_secs: 5,
            ..GatewaySettings::default()
        }));
        let tokens = Arc::new(PatientTokenStore::new(
            TokenStoreBackend::new_memory(),
            AtRestCipher::new(&AtRestCipher::generate_key()).unwrap(),
            Arc::clone(&gateway),
            DEFAULT_REFRESH_TTL,
        ));
        let identity = Arc::new(InMemoryIdentityLinkStorage::new());

        let orchestrator = AbhaOrchestrator::new(
            gateway,
            Arc::clone(&tokens),
            Arc::clone(&identity) as Arc<dyn IdentityLinkStorage>,
        );

        Harness {
            server,
            orchestrator,
            tokens,
            identity,
        }
    }

    #[tokio::test]
    async fn test_aadhaar_enrollment_end_to_end() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/v3/enrollment/request/otp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "txnId": "T1",
                "message": "OTP sent",
            })))
            .mount(&h.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/enrollment/enrol/byAadhaar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "txnId": "T1",
                "ABHAProfile": {
                    "ABHANumber": "12-3456-7890-1234",
                    "phrAddress": "patient@abdm",
                    "name": "Test Patient",
                },
                "tokens": {
                    "token": "patient-access",
                    "expiresIn": 1800,
                    "refreshToken": "patient-refresh",
                    "refreshExpiresIn": 1296000,
                },
                "isNew": true,
            })))
            .mount(&h.server)
            .await;

        let begun = h
            .orchestrator
            .begin_aadhaar_enrollment("999911112222")
            .await;
        assert!(begun.success);
        assert_eq!(begun.txn_id.as_deref(), Some("T1"));

        let completed = h
            .orchestrator
            .complete_aadhaar_enrollment("patient-1", "T1", "123456", None)
            .await;
        assert!(completed.success, "enrollment failed: {completed:?}");
        assert_eq!(completed.code, "enrolled");

        // The identity link now carries the external id.
        let link = h.identity.find("patient-1").await.unwrap().unwrap();
        assert_eq!(link.abha_number.as_deref(), Some("12-3456-7890-1234"));

        // The refresh token was stored (encrypted) for later sessions.
        assert_eq!(
            h.tokens.get("patient-1").await.as_deref(),
            Some("patient-refresh")
        );

        // And details read back unchanged.
        let details = h.orchestrator.abha_details("patient-1").await;
        assert!(details.success);
        assert_eq!(
            details.data.unwrap()["abhaNumber"],
            "12-3456-7890-1234"
        );
    }

    #[tokio::test]
    async fn test_gateway_rejection_maps_to_failure_outcome() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/v3/enrollment/request/otp"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid aadhaar"))
            .mount(&h.server)
            .await;

        let outcome = h
            .orchestrator
            .begin_aadhaar_enrollment("000000000000")
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.code, "upstream_rejected");
        assert!(outcome.message.contains("422"));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_never_panics() {
        let h = harness().await;
        // No OTP mock mounted: wiremock answers 404.
        let outcome = h.orchestrator.begin_mobile_verification("9999999999").await;
        assert!(!outcome.success);
        assert_eq!(outcome.code, "upstream_rejected");
    }

    #[tokio::test]
    async fn test_recovery_flow_links_and_stores_tokens() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/v3/profile/login/request/otp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "txnId": "T2" })),
            )
            .mount(&h.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/profile/login/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "profile": {
                    "abhaNumber": "12-3456-7890-1234",
                    "abhaAddress": "patient@abdm",
                },
                "tokens": {
                    "token": "patient-access",
                    "refreshToken": "recovered-refresh",
                },
            })))
            .mount(&h.server)
            .await;

        let begun = h.orchestrator.begin_abha_recovery("12-3456-7890-1234").await;
        assert_eq!(begun.txn_id.as_deref(), Some("T2"));

        let completed = h
            .orchestrator
            .complete_abha_recovery("patient-2", "T2", "654321")
            .await;
        assert!(completed.success, "recovery failed: {completed:?}");

        assert_eq!(
            h.tokens.get("patient-2").await.as_deref(),
            Some("recovered-refresh")
        );
        let link = h.identity.find("patient-2").await.unwrap().unwrap();
        assert!(link.is_linked());
    }

    #[tokio::test]
    async fn test_delink_revokes_and_clears_but_keeps_record() {
        let h = harness().await;
        h.identity
            .upsert(PatientIdentityLink::new(
                "patient-3",
                "12-3456-7890-1234",
                "patient@abdm",
            ))
            .await
            .unwrap();
        h.tokens
            .store("patient-3", "refresh-x", Duration::from_secs(3600))
            .await;

        let outcome = h.orchestrator.delink("patient-3").await;
        assert!(outcome.success);

        assert_eq!(h.tokens.get("patient-3").await, None);
        let link = h.identity.find("patient-3").await.unwrap().unwrap();
        assert!(!link.is_linked());

        // Details now report the patient as not linked.
        let details = h.orchestrator.abha_details("patient-3").await;
        assert!(!details.success);
        assert_eq!(details.code, "not_linked");
    }

    #[tokio::test]
    async fn test_missing_profile_is_an_incomplete_response() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/v3/profile/login/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "additional verification required",
            })))
            .mount(&h.server)
            .await;

        let outcome = h
            .orchestrator
            .complete_mobile_verification("patient-4", "T3", "111111")
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.code, "incomplete_response");
        assert_eq!(outcome.message, "additional verification required");
    }
}
