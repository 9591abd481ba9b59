//! Consent record storage.
//!
//! The durable engine is an external collaborator; this trait names the
//! operations the service relies on: insert, lookup by consent id,
//! conditional revocation, and count-on-update bulk revocation.

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use crate::{ConsentResult, ConsentTokenRecord};

/// Storage trait for consent token records.
#[async_trait]
pub trait ConsentStorage: Send + Sync {
    /// Inserts a new consent record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    async fn insert(&self, record: ConsentTokenRecord) -> ConsentResult<()>;

    /// Finds a record by consent id.
    ///
    /// Returns records regardless of expiry/revocation status; callers
    /// check the flags themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, consent_id: &str) -> ConsentResult<Option<ConsentTokenRecord>>;

    /// Flips a record's `revoked` flag and stamps it.
    ///
    /// Returns `true` if a non-revoked record was flipped, `false` if the
    /// record was absent or already revoked (both are fine: the write
    /// simply matched zero rows).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke(&self, consent_id: &str, reason: Option<String>) -> ConsentResult<bool>;

    /// Flips every non-revoked record matching the patient/organization
    /// pair.
    ///
    /// Returns the number of records flipped, so callers can report
    /// "N access grants revoked".
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_all_for_organization(
        &self,
        patient_id: &str,
        organization_id: &str,
        reason: Option<String>,
    ) -> ConsentResult<u64>;
}

/// In-memory consent storage for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryConsentStorage {
    records: DashMap<String, ConsentTokenRecord>,
}

impl InMemoryConsentStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn revoke_in_place(record: &mut ConsentTokenRecord, reason: Option<String>) {
    record.revoked = true;
    record.revoked_at = Some(OffsetDateTime::now_utc());
    record.revoked_reason = reason;
}

#[async_trait]
impl ConsentStorage for InMemoryConsentStorage {
    async fn insert(&self, record: ConsentTokenRecord) -> ConsentResult<()> {
        self.records.insert(record.consent_id.clone(), record);
        Ok(())
    }

    async fn find(&self, consent_id: &str) -> ConsentResult<Option<ConsentTokenRecord>> {
        Ok(self.records.get(consent_id).map(|r| r.clone()))
    }

    async fn revoke(&self, consent_id: &str, reason: Option<String>) -> ConsentResult<bool> {
        match self.records.get_mut(consent_id) {
            Some(mut record) if !record.revoked => {
                revoke_in_place(&mut record, reason);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_organization(
        &self,
        patient_id: &str,
        organization_id: &str,
        reason: Option<String>,
    ) -> ConsentResult<u64> {
        let mut count = 0;
        for mut entry in self.records.iter_mut() {
            if entry.patient_id == patient_id
                && entry.organization_id == organization_id
                && !entry.revoked
            {
                revoke_in_place(&mut entry, reason.clone());
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PurposeOfUse;
    use time::Duration;

    fn record(consent_id: &str, patient_id: &str, organization_id: &str) -> ConsentTokenRecord {
        ConsentTokenRecord {
            consent_id: consent_id.to_string(),
            patient_id: patient_id.to_string(),
            patient_abha: "patient@abdm".to_string(),
            organization_id: organization_id.to_string(),
            purpose_of_use: PurposeOfUse::Treatment,
            allowed_resources: vec!["Observation".to_string()],
            token: format!("jwt-{consent_id}"),
            issued_at: OffsetDateTime::now_utc(),
            expires_at: OffsetDateTime::now_utc() + Duration::hours(1),
            revoked: false,
            revoked_at: None,
            revoked_reason: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryConsentStorage::new();
        store.insert(record("c1", "p1", "org1")).await.unwrap();

        let found = store.find("c1").await.unwrap().unwrap();
        assert_eq!(found.consent_id, "c1");
        assert!(store.find("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_flips_once() {
        let store = InMemoryConsentStorage::new();
        store.insert(record("c1", "p1", "org1")).await.unwrap();

        assert!(store.revoke("c1", Some("test".to_string())).await.unwrap());
        // Already revoked: matches zero rows.
        assert!(!store.revoke("c1", None).await.unwrap());
        // Absent: matches zero rows, still not an error.
        assert!(!store.revoke("ghost", None).await.unwrap());

        let found = store.find("c1").await.unwrap().unwrap();
        assert!(found.revoked);
        assert!(found.revoked_at.is_some());
        assert_eq!(found.revoked_reason.as_deref(), Some("test"));
    }

    #[tokio::test]
    async fn test_bulk_revoke_counts_matching_rows() {
        let store = InMemoryConsentStorage::new();
        store.insert(record("c1", "p1", "org1")).await.unwrap();
        store.insert(record("c2", "p1", "org1")).await.unwrap();
        store.insert(record("c3", "p1", "org2")).await.unwrap();
        store.insert(record("c4", "p2", "org1")).await.unwrap();
        store.revoke("c2", None).await.unwrap();

        // c2 is already revoked, so only c1 matches.
        let count = store
            .revoke_all_for_organization("p1", "org1", None)
            .await
            .unwrap();
        assert_eq!(count, 1);

        assert!(store.find("c1").await.unwrap().unwrap().revoked);
        assert!(!store.find("c3").await.unwrap().unwrap().revoked);
        assert!(!store.find("c4").await.unwrap().unwrap().revoked);
    }
}
