//! Service-level session token acquisition and caching.
//!
//! One shared bearer token authorizes administrative and enrollment calls to
//! the ABDM gateway. It is obtained through a client-credentials exchange,
//! cached until shortly before its upstream expiry, and refreshed on demand.
//!
//! Refreshes are single-flighted: the expired path takes the write lock,
//! re-checks the cache, and performs at most one in-flight exchange however
//! many callers raced past expiry together. Callers that find a valid
//! cached token return without touching the write lock.

use std::time::{Duration, Instant};

use abhalink_config::GatewaySettings;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{GatewayError, GatewayResult, headers};

/// Endpoint for the client-credentials session exchange.
const SESSION_PATH: &str = "/gateway/v3/sessions";

/// Safety margin subtracted from the upstream-reported lifetime, so a
/// consumer never observes a token expiring mid-request.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// A cached service-level session token.
#[derive(Debug, Clone)]
pub struct SessionToken {
    /// The bearer token value.
    pub access_token: String,

    /// When the cached token stops being served (upstream expiry minus the
    /// safety margin).
    pub expires_at: Instant,

    /// Refresh token, when the gateway issues one alongside.
    pub refresh_token: Option<String>,
}

impl SessionToken {
    /// Returns `true` if the token is still within its safety-margined
    /// lifetime.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Wire shape of the session exchange request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
}

/// Wire shape of the session exchange response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_token: String,
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Acquires and caches the service-level ABDM session token.
pub struct SessionTokenManager {
    http: reqwest::Client,
    settings: GatewaySettings,
    cached: RwLock<Option<SessionToken>>,
}

impl SessionTokenManager {
    /// Creates a manager for the configured gateway.
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

        Self {
            http,
            settings,
            cached: RwLock::new(None),
        }
    }

    /// Returns a currently valid bearer token, refreshing if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UpstreamAuth`] if a refresh was needed and
    /// the exchange failed. A stale token is never returned.
    pub async fn valid_token(&self) -> GatewayResult<String> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref()
                && token.is_valid()
            {
                return Ok(token.access_token.clone());
            }
        }

        let mut cached = self.cached.write().await;

        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref()
            && token.is_valid()
        {
            return Ok(token.access_token.clone());
        }

        let fresh = self.exchange().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    /// Unconditionally performs the exchange and replaces the cache.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UpstreamAuth`] on a failed exchange; the
    /// previous cached token (if any) is left in place in that case.
    pub async fn refresh(&self) -> GatewayResult<SessionToken> {
        let fresh = self.exchange().await?;
        let mut cached = self.cached.write().await;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    /// Performs one client-credentials exchange.
    async fn exchange(&self) -> GatewayResult<SessionToken> {
        let url = format!("{}{}", self.settings.base_url(), SESSION_PATH);
        let body = SessionRequest {
            client_id: &self.settings.client_id,
            client_secret: &self.settings.client_secret,
            grant_type: "client_credentials",
        };

        let response = self
            .http
            .post(&url)
            .header(headers::REQUEST_ID, headers::new_request_id())
            .header(headers::TIMESTAMP, headers::rfc3339_now()?)
            .header(headers::ENVIRONMENT, self.settings.environment.as_str())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "session exchange rejected");
            return Err(GatewayError::upstream_auth(status.as_u16(), body));
        }

        let parsed: SessionResponse = response.json().await?;
        let lifetime = Duration::from_secs(parsed.expires_in).saturating_sub(EXPIRY_MARGIN);
        tracing::debug!(expires_in = parsed.expires_in, "session token refreshed");

        Ok(SessionToken {
            access_token: parsed.access_token,
            expires_at: Instant::now() + lifetime,
            refresh_token: parsed.refresh_token,
        })
    }

    /// Seeds the cache directly, bypassing the exchange.
    #[cfg(test)]
    pub(crate) async fn seed(&self, token: SessionToken) {
        *self.cached.write().await = Some(token);
    }
}

impl std::fmt::Debug for SessionTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokenManager")
            .field("environment", &self.settings.environment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer) -> GatewaySettings {
        GatewaySettings {
            sandbox_base_url: server.uri(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            request_timeout_secs: 5,
            ..GatewaySettings::default()
        }
    }

    fn session_body(token: &str, expires_in: u64) -> serde_json::Value {
        serde_json::json!({
            "accessToken": token,
            "expiresIn": expires_in,
            "refreshToken": "session-refresh",
        })
    }

    #[tokio::test]
    async fn test_valid_cached_token_is_reused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SESSION_PATH))
            .and(header_exists("REQUEST-ID"))
            .and(header_exists("TIMESTAMP"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body("tok-1", 1200)))
            .expect(1)
            .mount(&server)
            .await;

        let manager = SessionTokenManager::new(settings_for(&server));
        assert_eq!(manager.valid_token().await.unwrap(), "tok-1");
        assert_eq!(manager.valid_token().await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn test_expired_token_triggers_one_fresh_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SESSION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body("tok-2", 1200)))
            .expect(1)
            .mount(&server)
            .await;

        let manager = SessionTokenManager::new(settings_for(&server));
        manager
            .seed(SessionToken {
                access_token: "stale".to_string(),
                expires_at: Instant::now() - Duration::from_millis(1),
                refresh_token: None,
            })
            .await;

        // The stale token must never be served.
        assert_eq!(manager.valid_token().await.unwrap(), "tok-2");
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_coalesce() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SESSION_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(session_body("tok-3", 1200))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let manager = Arc::new(SessionTokenManager::new(settings_for(&server)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.valid_token().await.unwrap() })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "tok-3");
        }
    }

    #[tokio::test]
    async fn test_failed_exchange_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SESSION_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid client"))
            .mount(&server)
            .await;

        let manager = SessionTokenManager::new(settings_for(&server));
        let err = manager.valid_token().await.unwrap_err();
        match err {
            GatewayError::UpstreamAuth { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid client");
            }
            other => panic!("expected UpstreamAuth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_forced_refresh_replaces_cache() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SESSION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body("tok-4", 1200)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(SESSION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body("tok-5", 1200)))
            .mount(&server)
            .await;

        let manager = SessionTokenManager::new(settings_for(&server));
        assert_eq!(manager.valid_token().await.unwrap(), "tok-4");

        let refreshed = manager.refresh().await.unwrap();
        assert_eq!(refreshed.access_token, "tok-5");
        assert_eq!(manager.valid_token().await.unwrap(), "tok-5");
    }

    #[test]
    fn test_expiry_margin_applied() {
        let token = SessionToken {
            access_token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(1),
            refresh_token: None,
        };
        assert!(token.is_valid());

        let expired = SessionToken {
            access_token: "t".to_string(),
            expires_at: Instant::now() - Duration::from_millis(1),
            refresh_token: None,
        };
        assert!(!expired.is_valid());
    }
}
