//! Patient/ABHA identity link and storage.
//!
//! Each patient holds at most one association with a national health ID.
//! The link is created on first successful enrollment, replaced idempotently
//! on subsequent links, and *cleared* (not deleted) on delink so the record
//! keeps its audit trail.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::CoreResult;

/// Status of a patient's ABHA link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// The patient has an active ABHA link.
    Linked,
    /// The link was removed at the patient's request.
    Delinked,
}

impl LinkStatus {
    /// Returns the status as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linked => "linked",
            Self::Delinked => "delinked",
        }
    }
}

/// The association between an internal patient and their ABHA identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientIdentityLink {
    /// Internal patient identifier.
    pub patient_id: String,

    /// The 14-digit ABHA number (formatted `XX-XXXX-XXXX-XXXX`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abha_number: Option<String>,

    /// The human-readable ABHA address (e.g. `name@abdm`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abha_address: Option<String>,

    /// Current link status.
    pub status: LinkStatus,

    /// Provider metadata reported by the gateway, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// When the link was created or last replaced.
    #[serde(with = "time::serde::rfc3339")]
    pub linked_at: OffsetDateTime,
}

impl PatientIdentityLink {
    /// Creates a new active link.
    #[must_use]
    pub fn new(
        patient_id: impl Into<String>,
        abha_number: impl Into<String>,
        abha_address: impl Into<String>,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            abha_number: Some(abha_number.into()),
            abha_address: Some(abha_address.into()),
            status: LinkStatus::Linked,
            provider: None,
            linked_at: OffsetDateTime::now_utc(),
        }
    }

    /// Sets the provider metadata.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Returns `true` if the link is currently active.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.status == LinkStatus::Linked
    }

    /// Clears the link in place, keeping the record for audit.
    pub fn clear(&mut self) {
        self.abha_number = None;
        self.abha_address = None;
        self.provider = None;
        self.status = LinkStatus::Delinked;
    }
}

/// Storage trait for patient identity links.
///
/// The durable engine behind this trait is an external collaborator; the
/// operations here are the contract the orchestrator relies on.
///
/// # Implementations
///
/// [`InMemoryIdentityLinkStorage`] is provided for development and tests.
#[async_trait]
pub trait IdentityLinkStorage: Send + Sync {
    /// Inserts or replaces the link for a patient.
    ///
    /// An existing link for the same patient is overwritten, never
    /// duplicated.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn upsert(&self, link: PatientIdentityLink) -> CoreResult<()>;

    /// Finds the link for a patient.
    ///
    /// Returns `None` if the patient has never linked an ABHA identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, patient_id: &str) -> CoreResult<Option<PatientIdentityLink>>;

    /// Clears the link for a patient (delink).
    ///
    /// The record is kept with [`LinkStatus::Delinked`] and blank
    /// identifiers. Clearing an absent link is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn clear(&self, patient_id: &str) -> CoreResult<()>;
}

/// In-memory identity link storage for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryIdentityLinkStorage {
    links: DashMap<String, PatientIdentityLink>,
}

impl InMemoryIdentityLinkStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityLinkStorage for InMemoryIdentityLinkStorage {
    async fn upsert(&self, link: PatientIdentityLink) -> CoreResult<()> {
        self.links.insert(link.patient_id.clone(), link);
        Ok(())
    }

    async fn find(&self, patient_id: &str) -> CoreResult<Option<PatientIdentityLink>> {
        Ok(self.links.get(patient_id).map(|l| l.clone()))
    }

    async fn clear(&self, patient_id: &str) -> CoreResult<()> {
        if let Some(mut entry) = self.links.get_mut(patient_id) {
            entry.clear();
        }
        Ok(())
    }
}
