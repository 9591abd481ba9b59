//! Uniform success/failure envelope for orchestrated flows.
//!
//! Flows never surface raw gateway or network errors to their callers.
//! Every step returns a [`FlowOutcome`]: a machine-readable code, a short
//! human-readable message, and optionally the transaction id the caller must
//! carry into the next step.

use serde::{Deserialize, Serialize};

/// Result envelope returned by every orchestrated flow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowOutcome {
    /// Whether the step succeeded.
    pub success: bool,

    /// Machine-readable outcome code (e.g. `otp_sent`, `upstream_error`).
    pub code: String,

    /// Short human-readable message.
    pub message: String,

    /// Transaction id to carry into the next step of the flow, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txn_id: Option<String>,

    /// Step-specific payload, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl FlowOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn ok(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: code.into(),
            message: message.into(),
            txn_id: None,
            data: None,
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn fail(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.into(),
            message: message.into(),
            txn_id: None,
            data: None,
        }
    }

    /// Attaches the transaction id for the next step.
    #[must_use]
    pub fn with_txn_id(mut self, txn_id: impl Into<String>) -> Self {
        self.txn_id = Some(txn_id.into());
        self
    }

    /// Attaches a step-specific payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_outcome() {
        let outcome = FlowOutcome::ok("otp_sent", "OTP sent to registered mobile")
            .with_txn_id("txn-123");
        assert!(outcome.success);
        assert_eq!(outcome.code, "otp_sent");
        assert_eq!(outcome.txn_id.as_deref(), Some("txn-123"));
    }

    #[test]
    fn test_fail_outcome_serialization() {
        let outcome = FlowOutcome::fail("upstream_error", "Gateway unavailable");
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(!json.contains("txnId"));
        assert!(!json.contains("data"));
    }

    #[test]
    fn test_data_payload() {
        let outcome = FlowOutcome::ok("enrolled", "ABHA created")
            .with_data(serde_json::json!({"abhaNumber": "12-3456-7890-1234"}));
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("12-3456-7890-1234"));
    }
}
