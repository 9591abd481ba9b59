//! # abhalink-flows
//!
//! Orchestrated patient-facing flows over the ABDM gateway: Aadhaar
//! enrollment, mobile verification, driving-licence enrollment, and ABHA
//! recovery.
//!
//! Every flow step returns a [`FlowOutcome`] and never an `Err`: gateway,
//! crypto, and storage failures are caught here and mapped to a uniform
//! `{success: false, code, message}` envelope so that callers above never
//! see a raw network exception.
//!
//! The orchestrator holds no per-flow state. The transaction id returned
//! by a `begin_*` step must be carried by the caller into the matching
//! `complete_*` step. Nothing here retries: OTP dispatch and enrollment
//! are not idempotent upstream, so a retry layer would have to opt in per
//! operation.

mod orchestrator;

pub use abhalink_core::FlowOutcome;
pub use orchestrator::AbhaOrchestrator;
