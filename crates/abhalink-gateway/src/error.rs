//! Gateway error types.
//!
//! Callers see a single taxonomy regardless of how an outbound call failed:
//! non-2xx responses, transport failures, and timeouts all land in
//! [`GatewayError`].

use abhalink_crypto::CryptoError;

/// Errors that can occur while talking to the ABDM gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The session (client-credentials) exchange failed.
    #[error("Session exchange failed with status {status}: {body}")]
    UpstreamAuth {
        /// HTTP status returned by the session endpoint.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// A gateway operation returned a non-2xx response.
    #[error("Gateway returned status {status}: {body}")]
    Upstream {
        /// HTTP status returned by the gateway.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The request never completed: connection failure or timeout.
    #[error("Network error: {message}")]
    Network {
        /// Description of the transport failure.
        message: String,
    },

    /// A 2xx response body did not match the expected shape.
    #[error("Unexpected gateway response: {message}")]
    InvalidResponse {
        /// Description of the parse failure.
        message: String,
    },

    /// Field encryption failed before the request was sent.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl GatewayError {
    /// Creates a new `UpstreamAuth` error.
    #[must_use]
    pub fn upstream_auth(status: u16, body: impl Into<String>) -> Self {
        Self::UpstreamAuth {
            status,
            body: body.into(),
        }
    }

    /// Creates a new `Upstream` error.
    #[must_use]
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    /// Creates a new `Network` error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidResponse` error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Returns the upstream HTTP status, if the gateway answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UpstreamAuth { status, .. } | Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if this failure came from the session exchange.
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::UpstreamAuth { .. })
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network(format!("request timed out: {err}"))
        } else if err.is_decode() {
            Self::invalid_response(err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}
