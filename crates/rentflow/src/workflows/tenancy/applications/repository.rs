use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{ApplicationStage, RentalApplication};
use crate::workflows::tenancy::domain::{ActorId, ApplicationId, PropertyId};
use crate::workflows::tenancy::store::{RepositoryError, Versioned};

/// Storage abstraction so the service module can be exercised in isolation.
pub trait ApplicationRepository: Send + Sync {
    /// Fails with [`RepositoryError::Conflict`] when the id is taken.
    fn insert(
        &self,
        record: RentalApplication,
    ) -> Result<Versioned<RentalApplication>, RepositoryError>;

    /// Commits `record` only if the stored revision still equals `expected_revision`.
    fn update(
        &self,
        expected_revision: u64,
        record: RentalApplication,
    ) -> Result<Versioned<RentalApplication>, RepositoryError>;

    fn fetch(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Versioned<RentalApplication>>, RepositoryError>;

    /// Applications in a post-submission, non-terminal state; the expiry sweep input.
    fn in_flight(&self) -> Result<Vec<Versioned<RentalApplication>>, RepositoryError>;

    fn for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<Versioned<RentalApplication>>, RepositoryError>;
}

/// Sanitized representation of an application's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub property_id: PropertyId,
    pub tenant_id: ActorId,
    pub status: &'static str,
    pub stage: ApplicationStage,
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_comments: Option<String>,
    pub decisions_recorded: usize,
}

impl From<&Versioned<RentalApplication>> for ApplicationStatusView {
    fn from(value: &Versioned<RentalApplication>) -> Self {
        let record = &value.record;
        Self {
            application_id: record.id.clone(),
            property_id: record.property_id.clone(),
            tenant_id: record.tenant_id.clone(),
            status: record.status.label(),
            stage: record.stage,
            revision: value.revision,
            submitted_at: record.submitted_at,
            reviewed_at: record.reviewed_at,
            reviewed_by: record.reviewed_by.clone(),
            review_comments: record.review_comments.clone(),
            decisions_recorded: record.review_history.len(),
        }
    }
}
