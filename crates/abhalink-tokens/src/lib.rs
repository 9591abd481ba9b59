//! # abhalink-tokens
//!
//! Durable, rotation-aware storage for each patient's ABDM tokens.
//!
//! The refresh token is the long-lived credential; it is AES-256-GCM
//! encrypted before it is written anywhere. The access token is a
//! short-lived cache entry refreshed on demand through the gateway's
//! refresh grant, honoring upstream rotation.
//!
//! The backing store is Redis when configured, with a transparent
//! in-process fallback when Redis is absent or unreachable. Fallback mode
//! is an explicitly degraded, non-production state: tokens survive only as
//! long as the process.
//!
//! Nothing in this crate throws past its boundary. A lost token degrades
//! the caller to "no valid session"; it never crashes an unrelated
//! request.

pub mod backend;
pub mod store;

pub use backend::TokenStoreBackend;
pub use store::PatientTokenStore;
