use serde::Serialize;

use super::domain::Lease;
use crate::workflows::tenancy::domain::{LeaseId, PropertyId};
use crate::workflows::tenancy::money::Money;
use crate::workflows::tenancy::store::{RepositoryError, Versioned};

/// One row change inside an atomic lease batch.
#[derive(Debug, Clone)]
pub enum LeaseWrite {
    Insert(Lease),
    Update { expected_revision: u64, lease: Lease },
}

impl LeaseWrite {
    pub fn lease(&self) -> &Lease {
        match self {
            LeaseWrite::Insert(lease) => lease,
            LeaseWrite::Update { lease, .. } => lease,
        }
    }
}

/// Lease storage. Implementations must enforce the property-scoped uniqueness of active
/// leases at commit time, the way a partial unique index would, and reject the whole batch
/// with [`RepositoryError::ActivePropertyLease`] when it would be violated.
pub trait LeaseRepository: Send + Sync {
    /// Applies every write or none of them.
    fn commit(&self, writes: Vec<LeaseWrite>) -> Result<Vec<Versioned<Lease>>, RepositoryError>;

    fn fetch(&self, id: &LeaseId) -> Result<Option<Versioned<Lease>>, RepositoryError>;

    fn active_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Option<Versioned<Lease>>, RepositoryError>;

    /// Every active lease; the expiry sweep input.
    fn active(&self) -> Result<Vec<Versioned<Lease>>, RepositoryError>;

    fn insert(&self, lease: Lease) -> Result<Versioned<Lease>, RepositoryError> {
        single(self.commit(vec![LeaseWrite::Insert(lease)])?)
    }

    fn update(
        &self,
        expected_revision: u64,
        lease: Lease,
    ) -> Result<Versioned<Lease>, RepositoryError> {
        single(self.commit(vec![LeaseWrite::Update {
            expected_revision,
            lease,
        }])?)
    }
}

fn single(mut written: Vec<Versioned<Lease>>) -> Result<Versioned<Lease>, RepositoryError> {
    written
        .pop()
        .ok_or_else(|| RepositoryError::Unavailable("commit returned no rows".to_string()))
}

/// Sanitized representation of a lease for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct LeaseStatusView {
    pub lease_id: LeaseId,
    pub property_id: PropertyId,
    pub status: &'static str,
    pub revision: u64,
    pub monthly_rent: Money,
    pub currency: String,
    pub tenant_signed: bool,
    pub landlord_signed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_of: Option<LeaseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
}

impl From<&Versioned<Lease>> for LeaseStatusView {
    fn from(value: &Versioned<Lease>) -> Self {
        let lease = &value.record;
        Self {
            lease_id: lease.id.clone(),
            property_id: lease.property_id.clone(),
            status: lease.status.label(),
            revision: value.revision,
            monthly_rent: lease.monthly_rent,
            currency: lease.currency.code().to_string(),
            tenant_signed: lease.tenant_signature.is_some(),
            landlord_signed: lease.landlord_signature.is_some(),
            renewal_of: lease.renewal_of.clone(),
            termination_reason: lease.termination_reason().map(str::to_string),
        }
    }
}
