//! The closed set of purposes a consent can be granted for.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Purpose of use declared when a consent is granted.
///
/// The set is closed: any other value is rejected at issuance with
/// [`ConsentError::InvalidPurpose`](crate::ConsentError::InvalidPurpose)
/// before anything is written durably.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PurposeOfUse {
    /// Access for direct patient treatment.
    Treatment,
    /// Access under emergency care provisions.
    Emergency,
    /// Access for insurance claim processing.
    Insurance,
    /// Access for approved research.
    Research,
}

impl PurposeOfUse {
    /// Returns the purpose as carried in token claims.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Treatment => "TREATMENT",
            Self::Emergency => "EMERGENCY",
            Self::Insurance => "INSURANCE",
            Self::Research => "RESEARCH",
        }
    }

    /// Parses a purpose from its string form (case-sensitive, upper case).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "TREATMENT" => Some(Self::Treatment),
            "EMERGENCY" => Some(Self::Emergency),
            "INSURANCE" => Some(Self::Insurance),
            "RESEARCH" => Some(Self::Research),
            _ => None,
        }
    }
}

impl fmt::Display for PurposeOfUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_closed_set_only() {
        assert_eq!(PurposeOfUse::parse("TREATMENT"), Some(PurposeOfUse::Treatment));
        assert_eq!(PurposeOfUse::parse("EMERGENCY"), Some(PurposeOfUse::Emergency));
        assert_eq!(PurposeOfUse::parse("INSURANCE"), Some(PurposeOfUse::Insurance));
        assert_eq!(PurposeOfUse::parse("RESEARCH"), Some(PurposeOfUse::Research));
        assert_eq!(PurposeOfUse::parse("VACATION"), None);
        assert_eq!(PurposeOfUse::parse("treatment"), None);
    }

    #[test]
    fn test_serde_uses_uppercase() {
        let json = serde_json::to_string(&PurposeOfUse::Treatment).unwrap();
        assert_eq!(json, "\"TREATMENT\"");
        let parsed: PurposeOfUse = serde_json::from_str("\"RESEARCH\"").unwrap();
        assert_eq!(parsed, PurposeOfUse::Research);
    }
}
