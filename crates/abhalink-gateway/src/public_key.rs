//! Gateway public-key fetch and cache.
//!
//! PII fields are encrypted with the gateway's published RSA public key.
//! The key is fetched lazily, cached per environment, and refreshed every
//! five minutes regardless of use. The cache key *is* the environment, so
//! the key used for a request can never come from the other deployment.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use abhalink_config::GatewaySettings;
use abhalink_core::Environment;
use abhalink_crypto::ensure_pem;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::session::SessionTokenManager;
use crate::{GatewayError, GatewayResult, headers};

/// Endpoint serving the gateway's encryption certificate.
const PUBLIC_KEY_PATH: &str = "/v3/profile/public/certificate";

/// Fixed refresh interval for cached keys.
const KEY_TTL: Duration = Duration::from_secs(300);

/// Cached key entry.
struct CachedKey {
    pem: String,
    fetched_at: Instant,
}

impl CachedKey {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < KEY_TTL
    }
}

/// JSON body some gateway versions wrap the key in.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyBody {
    public_key: String,
}

/// Per-environment cache of the gateway's RSA public key.
pub struct PublicKeyCache {
    http: reqwest::Client,
    session: Arc<SessionTokenManager>,
    settings: GatewaySettings,
    cache: RwLock<HashMap<Environment, CachedKey>>,
}

impl PublicKeyCache {
    /// Creates a cache backed by the given session manager.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(settings: GatewaySettings, session: Arc<SessionTokenManager>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            session,
            settings,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the PEM public key for an environment, fetching if the
    /// cached copy is absent or older than five minutes.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] if the key must be fetched and the fetch
    /// fails.
    pub async fn get(&self, environment: Environment) -> GatewayResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&environment)
                && entry.is_fresh()
            {
                tracing::trace!(%environment, "public key cache hit");
                return Ok(entry.pem.clone());
            }
        }

        let mut cache = self.cache.write().await;
        if let Some(entry) = cache.get(&environment)
            && entry.is_fresh()
        {
            return Ok(entry.pem.clone());
        }

        tracing::debug!(%environment, "fetching gateway public key");
        let pem = self.fetch(environment).await?;
        cache.insert(
            environment,
            CachedKey {
                pem: pem.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(pem)
    }

    /// Fetches the key for an environment, normalizing bare base64 bodies
    /// into PEM.
    async fn fetch(&self, environment: Environment) -> GatewayResult<String> {
        let url = format!("{}{}", self.settings.base_url_for(environment), PUBLIC_KEY_PATH);
        let bearer = self.session.valid_token().await?;

        let response = self
            .http
            .get(&url)
            .header(headers::REQUEST_ID, headers::new_request_id())
            .header(headers::TIMESTAMP, headers::rfc3339_now()?)
            .header(headers::ENVIRONMENT, environment.as_str())
            .bearer_auth(bearer)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::upstream(status.as_u16(), body));
        }

        let body = response.text().await?;
        let key_material = match serde_json::from_str::<PublicKeyBody>(&body) {
            Ok(parsed) => parsed.public_key,
            Err(_) => body,
        };

        if key_material.trim().is_empty() {
            return Err(GatewayError::invalid_response(
                "public key endpoint returned an empty body",
            ));
        }

        Ok(ensure_pem(&key_material))
    }
}

impl std::fmt::Debug for PublicKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKeyCache")
            .field("environment", &self.settings.environment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_PEM: &str = "-----BEGIN PUBLIC KEY-----\nMIIBIjANBg\n-----END PUBLIC KEY-----";

    async fn mount_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/gateway/v3/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "sess",
                "expiresIn": 1200,
            })))
            .mount(server)
            .await;
    }

    fn cache_for(server: &MockServer) -> PublicKeyCache {
        let settings = GatewaySettings {
            sandbox_base_url: server.uri(),
            production_base_url: server.uri(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            request_timeout_secs: 5,
            ..GatewaySettings::default()
        };
        let session = Arc::new(SessionTokenManager::new(settings.clone()));
        PublicKeyCache::new(settings, session)
    }

    #[tokio::test]
    async fn test_key_is_fetched_once_within_ttl() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("GET"))
            .and(path(PUBLIC_KEY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(TEST_PEM))
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache_for(&server);
        let first = cache.get(Environment::Sandbox).await.unwrap();
        let second = cache.get(Environment::Sandbox).await.unwrap();
        assert_eq!(first, TEST_PEM);
        assert_eq!(second, TEST_PEM);
    }

    #[tokio::test]
    async fn test_bare_base64_body_is_pem_wrapped() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("GET"))
            .and(path(PUBLIC_KEY_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "publicKey": "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8A",
                })),
            )
            .mount(&server)
            .await;

        let cache = cache_for(&server);
        let pem = cache.get(Environment::Sandbox).await.unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(pem.ends_with("-----END PUBLIC KEY-----"));
    }

    #[tokio::test]
    async fn test_environments_are_cached_separately() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("GET"))
            .and(path(PUBLIC_KEY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(TEST_PEM))
            .expect(2)
            .mount(&server)
            .await;

        let cache = cache_for(&server);
        cache.get(Environment::Sandbox).await.unwrap();
        // A different environment must trigger its own fetch.
        cache.get(Environment::Production).await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("GET"))
            .and(path(PUBLIC_KEY_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let cache = cache_for(&server);
        let err = cache.get(Environment::Sandbox).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }
}
