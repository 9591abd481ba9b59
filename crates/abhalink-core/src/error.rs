//! Core error types.

/// Errors raised by core storage and validation operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An error occurred while reading or writing a backing store.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// A patient or ABHA identifier was malformed.
    #[error("Invalid identifier: {message}")]
    InvalidIdentifier {
        /// Description of why the identifier is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidIdentifier` error.
    #[must_use]
    pub fn invalid_identifier(message: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::storage("connection refused");
        assert_eq!(err.to_string(), "Storage error: connection refused");

        let err = CoreError::invalid_identifier("empty patient id");
        assert_eq!(err.to_string(), "Invalid identifier: empty patient id");
    }
}
