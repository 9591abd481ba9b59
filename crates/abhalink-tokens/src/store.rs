//! Per-patient refresh/access token storage with rotation.
//!
//! State machine per patient:
//!
//! ```text
//! NoToken -> HasRefreshToken -> HasRefreshToken+CachedAccessToken
//!         -> (cache expiry) -> HasRefreshToken -> ...
//!         -> Revoked (terminal, re-enterable only via new enrollment)
//! ```
//!
//! Every failure inside this component logs and returns `None`. Callers
//! above (login/profile flows) treat `None` as "no valid session"; a lost
//! token is never confused with a hard error.

use std::sync::Arc;
use std::time::Duration;

use abhalink_crypto::AtRestCipher;
use abhalink_gateway::GatewayClient;

use crate::backend::TokenStoreBackend;

const REFRESH_KEY_PREFIX: &str = "abha:refresh:";
const ACCESS_KEY_PREFIX: &str = "abha:access:";

/// Safety margin subtracted from the upstream-reported access token
/// lifetime.
const ACCESS_TTL_MARGIN: u64 = 60;

/// Floor for the cached access token TTL.
const ACCESS_TTL_FLOOR: u64 = 60;

/// Assumed lifetime when the upstream omits `expiresIn`.
const DEFAULT_ACCESS_LIFETIME: u64 = 1800;

/// Stores each patient's encrypted refresh token and caches their access
/// token.
pub struct PatientTokenStore {
    backend: TokenStoreBackend,
    cipher: AtRestCipher,
    gateway: Arc<GatewayClient>,
    refresh_ttl: Duration,
}

impl PatientTokenStore {
    /// Creates a store over the given backend.
    ///
    /// `refresh_ttl` bounds how long a stored refresh token is served.
    #[must_use]
    pub fn new(
        backend: TokenStoreBackend,
        cipher: AtRestCipher,
        gateway: Arc<GatewayClient>,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            backend,
            cipher,
            gateway,
            refresh_ttl,
        }
    }

    /// Encrypts and stores a patient's refresh token with the given TTL.
    ///
    /// Failures are logged; the caller observes them as a later `get`
    /// returning `None`.
    pub async fn store(&self, patient_id: &str, refresh_token: &str, ttl: Duration) {
        let packed = match self.cipher.encrypt(refresh_token) {
            Ok(packed) => packed,
            Err(e) => {
                tracing::warn!(patient_id = %patient_id, error = %e, "refresh token encryption failed");
                return;
            }
        };
        self.backend
            .set(&refresh_key(patient_id), packed, ttl)
            .await;
    }

    /// Returns the patient's refresh token, or `None` if absent, expired,
    /// or undecryptable.
    pub async fn get(&self, patient_id: &str) -> Option<String> {
        let key = refresh_key(patient_id);
        let packed = self.backend.get(&key).await?;

        match self.cipher.decrypt(&packed) {
            Ok(token) => Some(token),
            Err(e) => {
                // An unreadable record is useless; drop it so the patient
                // re-enrolls instead of hitting the same failure forever.
                tracing::warn!(patient_id = %patient_id, error = %e, "stored refresh token unreadable, deleting");
                self.backend.delete(&key).await;
                None
            }
        }
    }

    /// Returns a valid access token for the patient, refreshing through
    /// the gateway on cache miss.
    ///
    /// On a successful refresh the new access token is cached with
    /// TTL = reported lifetime minus 60 s (floored at 60 s), and a rotated
    /// refresh token is re-stored when the upstream returns one.
    pub async fn access_token(&self, patient_id: &str) -> Option<String> {
        let access_key = access_key(patient_id);
        if let Some(token) = self.backend.get(&access_key).await {
            return Some(token);
        }

        let refresh_token = self.get(patient_id).await?;

        let material = match self.gateway.refresh_patient_token(&refresh_token).await {
            Ok(material) => material,
            Err(e) => {
                tracing::warn!(patient_id = %patient_id, error = %e, "patient token refresh failed");
                return None;
            }
        };

        let ttl = access_ttl(material.expires_in);
        self.backend
            .set(&access_key, material.token.clone(), ttl)
            .await;

        if let Some(rotated) = &material.refresh_token
            && rotated != &refresh_token
        {
            tracing::debug!(patient_id = %patient_id, "upstream rotated refresh token");
            self.store(patient_id, rotated, self.refresh_ttl).await;
        }

        Some(material.token)
    }

    /// Deletes both token entries for a patient. Idempotent.
    pub async fn revoke(&self, patient_id: &str) {
        self.backend.delete(&refresh_key(patient_id)).await;
        self.backend.delete(&access_key(patient_id)).await;
    }
}

impl std::fmt::Debug for PatientTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatientTokenStore")
            .field("backend", &self.backend)
            .finish()
    }
}

fn refresh_key(patient_id: &str) -> String {
    format!("{REFRESH_KEY_PREFIX}{patient_id}")
}

fn access_key(patient_id: &str) -> String {
    format!("{ACCESS_KEY_PREFIX}{patient_id}")
}

/// Cached access token TTL: upstream lifetime minus the margin, floored.
fn access_ttl(reported: Option<u64>) -> Duration {
    let lifetime = reported.unwrap_or(DEFAULT_ACCESS_LIFETIME);
    Duration::from_secs(lifetime.saturating_sub(ACCESS_TTL_MARGIN).max(ACCESS_TTL_FLOOR))
}
