//! Gateway environment selection.
//!
//! The ABDM gateway exposes a sandbox and a production deployment. Every
//! request carries an environment discriminator header, and cached material
//! (session tokens, encryption public keys) is scoped to the environment it
//! was fetched under so the two can never mix.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The ABDM gateway environment a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// The ABDM sandbox deployment, used for integration testing.
    Sandbox,
    /// The ABDM production deployment.
    Production,
}

impl Environment {
    /// Returns the environment name as sent in the discriminator header.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }

    /// Returns `true` if this is the production environment.
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Parses an environment from its string form.
    ///
    /// Accepts `"sandbox"` and `"production"` (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "sandbox" => Some(Self::Sandbox),
            "production" => Some(Self::Production),
            _ => None,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str() {
        assert_eq!(Environment::Sandbox.as_str(), "sandbox");
        assert_eq!(Environment::Production.as_str(), "production");
    }

    #[test]
    fn test_parse() {
        assert_eq!(Environment::parse("sandbox"), Some(Environment::Sandbox));
        assert_eq!(Environment::parse("PRODUCTION"), Some(Environment::Production));
        assert_eq!(Environment::parse("staging"), None);
    }

    #[test]
    fn test_serde_roundtrip() {
        let json = serde_json::to_string(&Environment::Sandbox).unwrap();
        assert_eq!(json, "\"sandbox\"");
        let env: Environment = serde_json::from_str("\"production\"").unwrap();
        assert_eq!(env, Environment::Production);
    }
}
