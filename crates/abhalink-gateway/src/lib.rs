//! # abhalink-gateway
//!
//! Client for the ABDM gateway.
//!
//! This crate provides:
//! - [`SessionTokenManager`] - acquires and caches the service-level bearer
//!   token (client-credentials grant) that authorizes gateway calls
//! - [`PublicKeyCache`] - fetch-or-cache of the gateway's RSA public key,
//!   scoped per environment with a fixed refresh interval
//! - [`GatewayClient`] - the enrollment/auth/document/QR/card/benefit
//!   operations, each encrypting its protocol-mandated fields before
//!   transmission
//!
//! No operation here retries; retry policy belongs to callers that know
//! which operations are idempotent upstream. Every outbound call is bounded
//! by the configured client timeout, and timeouts surface in the same
//! [`GatewayError`] family as non-2xx responses.

pub mod client;
pub mod error;
mod headers;
pub mod public_key;
pub mod session;

pub use client::{
    AbhaProfile, AuthResponse, BenefitLinkRequest, DocumentEnrollmentRequest,
    EnrollByAadhaarRequest, GatewayClient, LoginHint, OtpRequest, OtpResponse, TokenMaterial,
    VerifyOtpRequest,
};
pub use error::GatewayError;
pub use public_key::PublicKeyCache;
pub use session::{SessionToken, SessionTokenManager};

/// Type alias for gateway operation results.
pub type GatewayResult<T> = Result<T, GatewayError>;
