//! Mandatory ABDM request headers.
//!
//! Every gateway request carries a fresh correlation id, an RFC 3339
//! timestamp, and the environment discriminator. The correlation id must be
//! new per request (anti-replay); none of these values are cacheable.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::{GatewayError, GatewayResult};

/// Per-request correlation id header.
pub(crate) const REQUEST_ID: &str = "REQUEST-ID";

/// Request timestamp header (RFC 3339).
pub(crate) const TIMESTAMP: &str = "TIMESTAMP";

/// Environment discriminator header (`sandbox` / `production`).
pub(crate) const ENVIRONMENT: &str = "ENVIRONMENT";

/// Returns a fresh correlation id.
pub(crate) fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Returns the current wall-clock time as an RFC 3339 string.
pub(crate) fn rfc3339_now() -> GatewayResult<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| GatewayError::network(format!("timestamp formatting failed: {e}")))
}
