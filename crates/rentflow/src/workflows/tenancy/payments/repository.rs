use super::domain::{PaymentSchedule, PaymentScheduleEntry};
use crate::workflows::tenancy::domain::{EntryId, LeaseId};
use crate::workflows::tenancy::store::{RepositoryError, Versioned};

/// Schedule headers and their entries.
pub trait PaymentRepository: Send + Sync {
    /// Stores the header and every entry in one step. Fails with
    /// [`RepositoryError::Conflict`] when the lease already has a schedule, which is what
    /// makes generation idempotent under races.
    fn insert_schedule(
        &self,
        schedule: PaymentSchedule,
        entries: Vec<PaymentScheduleEntry>,
    ) -> Result<Vec<Versioned<PaymentScheduleEntry>>, RepositoryError>;

    fn schedule(
        &self,
        lease_id: &LeaseId,
    ) -> Result<Option<Versioned<PaymentSchedule>>, RepositoryError>;

    fn update_schedule(
        &self,
        expected_revision: u64,
        schedule: PaymentSchedule,
    ) -> Result<Versioned<PaymentSchedule>, RepositoryError>;

    /// Appends one entry to an existing schedule; `Conflict` when the id is taken.
    fn insert_entry(
        &self,
        entry: PaymentScheduleEntry,
    ) -> Result<Versioned<PaymentScheduleEntry>, RepositoryError>;

    fn update_entry(
        &self,
        expected_revision: u64,
        entry: PaymentScheduleEntry,
    ) -> Result<Versioned<PaymentScheduleEntry>, RepositoryError>;

    fn fetch_entry(
        &self,
        id: &EntryId,
    ) -> Result<Option<Versioned<PaymentScheduleEntry>>, RepositoryError>;

    /// Entries of one lease ordered by due date, then id.
    fn entries_for_lease(
        &self,
        lease_id: &LeaseId,
    ) -> Result<Vec<Versioned<PaymentScheduleEntry>>, RepositoryError>;

    /// Entries with no manual resolution; the overdue sweep input.
    fn open_entries(&self) -> Result<Vec<Versioned<PaymentScheduleEntry>>, RepositoryError>;
}
