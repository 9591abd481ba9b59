//! Consent service error types.

/// Errors that can occur during consent issuance, validation, and
/// revocation.
#[derive(Debug, thiserror::Error)]
pub enum ConsentError {
    /// The declared purpose is outside the closed set.
    #[error("Invalid purpose of use: {purpose}")]
    InvalidPurpose {
        /// The rejected purpose value.
        purpose: String,
    },

    /// The validity window is empty or ends in the past.
    #[error("Invalid validity window: {message}")]
    InvalidWindow {
        /// Description of why the window is invalid.
        message: String,
    },

    /// The requested resource type is not covered by the consent.
    #[error("Resource type {requested} is not covered; allowed: [{}]", allowed.join(", "))]
    Scope {
        /// The resource type the organization asked for.
        requested: String,
        /// The resource types the consent actually covers.
        allowed: Vec<String>,
    },

    /// Signing or key material failure.
    #[error("Signing error: {message}")]
    Signing {
        /// Description of the signing failure.
        message: String,
    },

    /// The durable consent store failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },
}

impl ConsentError {
    /// Creates a new `InvalidPurpose` error.
    #[must_use]
    pub fn invalid_purpose(purpose: impl Into<String>) -> Self {
        Self::InvalidPurpose {
            purpose: purpose.into(),
        }
    }

    /// Creates a new `InvalidWindow` error.
    #[must_use]
    pub fn invalid_window(message: impl Into<String>) -> Self {
        Self::InvalidWindow {
            message: message.into(),
        }
    }

    /// Creates a new `Scope` error.
    #[must_use]
    pub fn scope(requested: impl Into<String>, allowed: Vec<String>) -> Self {
        Self::Scope {
            requested: requested.into(),
            allowed,
        }
    }

    /// Creates a new `Signing` error.
    #[must_use]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller's request was at fault (as opposed to
    /// an infrastructure failure).
    #[must_use]
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPurpose { .. } | Self::InvalidWindow { .. } | Self::Scope { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConsentError::invalid_purpose("VACATION");
        assert_eq!(err.to_string(), "Invalid purpose of use: VACATION");

        let err = ConsentError::scope(
            "DocumentReference",
            vec!["Observation".to_string(), "Condition".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "Resource type DocumentReference is not covered; allowed: [Observation, Condition]"
        );
    }

    #[test]
    fn test_is_request_error() {
        assert!(ConsentError::invalid_purpose("X").is_request_error());
        assert!(ConsentError::invalid_window("x").is_request_error());
        assert!(ConsentError::scope("X", vec![]).is_request_error());
        assert!(!ConsentError::storage("down").is_request_error());
    }
}
