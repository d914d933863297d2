use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::domain::{
    PaymentReceipt, PaymentSchedule, PaymentScheduleEntry, PaymentType, ScheduleSummary,
};
use super::repository::PaymentRepository;
use super::schedule::{build_entries, late_fee_for, summarize};
use crate::config::LifecycleConfig;
use crate::workflows::tenancy::clock::Clock;
use crate::workflows::tenancy::domain::{
    Actor, ActorRole, EntityKind, EntryId, LeaseId, LifecycleError,
};
use crate::workflows::tenancy::events::{DomainEvent, EventError, EventPublisher, EventSubscriber};
use crate::workflows::tenancy::leases::{Lease, LeaseStatus};
use crate::workflows::tenancy::store::{retry_on_conflict, RepositoryError, StaleWrite, Versioned};
use crate::workflows::tenancy::sweep::SweepReport;

/// Generates schedules on lease activation and settles their entries.
pub struct PaymentScheduleService<P> {
    repository: Arc<P>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    max_write_attempts: u8,
}

/// Who may act on a lease's entries beyond its landlord and admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Audience {
    Parties,
    LandlordOnly,
}

impl<P> PaymentScheduleService<P>
where
    P: PaymentRepository + 'static,
{
    pub fn new(
        repository: Arc<P>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        config: &LifecycleConfig,
    ) -> Self {
        Self {
            repository,
            events,
            clock,
            max_write_attempts: config.max_write_attempts,
        }
    }

    /// Creates the lease's obligations once. Later calls return the stored entries.
    pub fn generate_schedule(
        &self,
        lease: &Lease,
    ) -> Result<Vec<Versioned<PaymentScheduleEntry>>, PaymentServiceError> {
        if lease.status != LeaseStatus::Active {
            return Err(LifecycleError::invalid_transition(
                EntityKind::Lease,
                "generate a payment schedule for",
                lease.status.label(),
            )
            .into());
        }
        if self.repository.schedule(&lease.id)?.is_some() {
            debug!(lease_id = %lease.id, "payment schedule already generated");
            return Ok(self.repository.entries_for_lease(&lease.id)?);
        }

        let header = PaymentSchedule {
            lease_id: lease.id.clone(),
            property_id: lease.property_id.clone(),
            tenant_id: lease.tenant_id.clone(),
            landlord_id: lease.landlord_id.clone(),
            currency: lease.currency.clone(),
            late_fee_amount: lease.late_fee_amount,
            late_fee_grace_days: lease.late_fee_grace_days,
            generated_at: self.clock.now(),
            frozen_on: None,
        };

        match self.repository.insert_schedule(header, build_entries(lease)) {
            Ok(stored) => {
                info!(lease_id = %lease.id, entries = stored.len(), "payment schedule generated");
                self.events.publish(DomainEvent::ScheduleGenerated {
                    lease_id: lease.id.clone(),
                    entries: stored.len(),
                })?;
                Ok(stored)
            }
            Err(RepositoryError::Conflict) => {
                debug!(lease_id = %lease.id, "payment schedule generated concurrently");
                Ok(self.repository.entries_for_lease(&lease.id)?)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn record_payment(
        &self,
        actor: &Actor,
        entry_id: &EntryId,
        receipt: PaymentReceipt,
    ) -> Result<Versioned<PaymentScheduleEntry>, PaymentServiceError> {
        let (stored, status) = retry_on_conflict(
            self.max_write_attempts,
            EntityKind::PaymentEntry,
            entry_id.as_str(),
            || -> Result<_, PaymentServiceError> {
                let current = self.fetch_entry(entry_id)?;
                let schedule = self.schedule_for(&current.record.lease_id)?;
                authorize(actor, &schedule.record, Audience::Parties, "record payments")?;

                let mut entry = current.record;
                let status = entry.record_payment(receipt.clone(), &actor.id, self.clock.now())?;
                let stored = self.repository.update_entry(current.revision, entry)?;
                Ok((stored, status))
            },
        )?;

        info!(
            entry_id = %entry_id,
            amount = %receipt.amount,
            status = status.label(),
            "payment recorded"
        );
        self.events.publish(DomainEvent::PaymentRecorded {
            entry_id: entry_id.clone(),
            lease_id: stored.record.lease_id.clone(),
            amount: receipt.amount,
            status,
        })?;
        Ok(stored)
    }

    pub fn waive_payment(
        &self,
        actor: &Actor,
        entry_id: &EntryId,
        reason: String,
    ) -> Result<Versioned<PaymentScheduleEntry>, PaymentServiceError> {
        let stored = retry_on_conflict(
            self.max_write_attempts,
            EntityKind::PaymentEntry,
            entry_id.as_str(),
            || -> Result<_, PaymentServiceError> {
                let current = self.fetch_entry(entry_id)?;
                let schedule = self.schedule_for(&current.record.lease_id)?;
                authorize(actor, &schedule.record, Audience::LandlordOnly, "waive payments")?;

                let mut entry = current.record;
                entry.waive(reason.clone())?;
                Ok(self.repository.update_entry(current.revision, entry)?)
            },
        )?;

        info!(entry_id = %entry_id, "payment waived");
        self.events.publish(DomainEvent::PaymentWaived {
            entry_id: entry_id.clone(),
            lease_id: stored.record.lease_id.clone(),
            reason,
        })?;
        Ok(stored)
    }

    pub fn refund_payment(
        &self,
        actor: &Actor,
        entry_id: &EntryId,
        receipt: PaymentReceipt,
    ) -> Result<Versioned<PaymentScheduleEntry>, PaymentServiceError> {
        let stored = retry_on_conflict(
            self.max_write_attempts,
            EntityKind::PaymentEntry,
            entry_id.as_str(),
            || -> Result<_, PaymentServiceError> {
                let current = self.fetch_entry(entry_id)?;
                let schedule = self.schedule_for(&current.record.lease_id)?;
                authorize(actor, &schedule.record, Audience::LandlordOnly, "refund payments")?;

                let mut entry = current.record;
                entry.refund(receipt.clone(), &actor.id, self.clock.now())?;
                Ok(self.repository.update_entry(current.revision, entry)?)
            },
        )?;

        info!(entry_id = %entry_id, amount = %receipt.amount, "payment refunded");
        self.events.publish(DomainEvent::PaymentRefunded {
            entry_id: entry_id.clone(),
            lease_id: stored.record.lease_id.clone(),
            amount: receipt.amount,
        })?;
        Ok(stored)
    }

    /// Flags entries whose grace window closed before `as_of` and assesses late fees on
    /// rent. Safe to run at any cadence; a second run for the same date changes nothing.
    pub fn sweep_overdue(&self, as_of: NaiveDate) -> Result<SweepReport, PaymentServiceError> {
        let mut report = SweepReport::new(as_of);

        for candidate in self.repository.open_entries()? {
            report.examined += 1;
            let entry_id = candidate.record.id;
            let (stored, schedule) = match self.flag_entry(&entry_id, as_of) {
                Ok(Some(flagged)) => flagged,
                Ok(None) => continue,
                Err(error) => {
                    warn!(entry_id = %entry_id, %error, "overdue sweep skipped entry");
                    report.record_failure(entry_id.as_str(), error);
                    continue;
                }
            };

            report.transitioned.push(entry_id.to_string());
            info!(entry_id = %entry_id, due_date = %stored.record.due_date, "payment overdue");
            if let Err(error) = self.events.publish(DomainEvent::PaymentOverdue {
                entry_id: entry_id.clone(),
                lease_id: stored.record.lease_id.clone(),
                due_date: stored.record.due_date,
                outstanding: stored.record.outstanding(),
            }) {
                report.record_failure(entry_id.as_str(), error);
            }

            if let Some(fee_id) =
                self.assess_late_fee(&stored.record, &schedule, as_of, &mut report)
            {
                report.late_fees.push(fee_id.to_string());
            }
        }

        info!(
            as_of = %as_of,
            examined = report.examined,
            flagged = report.transitioned.len(),
            late_fees = report.late_fees.len(),
            failures = report.failures.len(),
            "overdue sweep finished"
        );
        Ok(report)
    }

    /// Generates the schedule of every active lease that has none. An activation committed
    /// while the payment engine was unreachable is picked up here on the next run.
    pub fn backfill_schedules(&self, leases: Vec<Lease>, as_of: NaiveDate) -> SweepReport {
        let mut report = SweepReport::new(as_of);

        for lease in leases {
            report.examined += 1;
            match self.repository.schedule(&lease.id) {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(error) => {
                    warn!(lease_id = %lease.id, %error, "schedule backfill skipped lease");
                    report.record_failure(lease.id.as_str(), error);
                    continue;
                }
            }
            match self.generate_schedule(&lease) {
                Ok(entries) => {
                    warn!(
                        lease_id = %lease.id,
                        entries = entries.len(),
                        "active lease had no payment schedule"
                    );
                    report.transitioned.push(lease.id.to_string());
                }
                Err(error) => {
                    warn!(lease_id = %lease.id, %error, "schedule backfill skipped lease");
                    report.record_failure(lease.id.as_str(), error);
                }
            }
        }

        info!(
            as_of = %as_of,
            examined = report.examined,
            generated = report.transitioned.len(),
            failures = report.failures.len(),
            "schedule backfill finished"
        );
        report
    }

    /// Cancels open entries due after `date` and freezes the schedule.
    pub fn cancel_after(
        &self,
        lease_id: &LeaseId,
        date: NaiveDate,
        reason: &str,
    ) -> Result<Vec<EntryId>, PaymentServiceError> {
        if self.repository.schedule(lease_id)?.is_none() {
            warn!(lease_id = %lease_id, "no payment schedule to cancel");
            return Ok(Vec::new());
        }

        let mut cancelled = Vec::new();
        for candidate in self.repository.entries_for_lease(lease_id)? {
            if candidate.record.due_date <= date {
                continue;
            }
            let entry_id = candidate.record.id;
            let changed = retry_on_conflict(
                self.max_write_attempts,
                EntityKind::PaymentEntry,
                entry_id.as_str(),
                || -> Result<_, PaymentServiceError> {
                    let current = self.fetch_entry(&entry_id)?;
                    let mut entry = current.record;
                    if !entry.cancel(reason) {
                        return Ok(false);
                    }
                    self.repository.update_entry(current.revision, entry)?;
                    Ok(true)
                },
            )?;
            if changed {
                cancelled.push(entry_id);
            }
        }

        self.freeze(lease_id, date)?;
        info!(
            lease_id = %lease_id,
            cancelled = cancelled.len(),
            after = %date,
            "entries cancelled"
        );
        if !cancelled.is_empty() {
            self.events.publish(DomainEvent::EntriesCancelled {
                lease_id: lease_id.clone(),
                entries: cancelled.clone(),
            })?;
        }
        Ok(cancelled)
    }

    /// Stops new obligations (late fees) being added to the lease's schedule.
    pub fn freeze(&self, lease_id: &LeaseId, on: NaiveDate) -> Result<(), PaymentServiceError> {
        retry_on_conflict(
            self.max_write_attempts,
            EntityKind::Lease,
            lease_id.as_str(),
            || -> Result<_, PaymentServiceError> {
                let Some(current) = self.repository.schedule(lease_id)? else {
                    return Ok(());
                };
                if current.record.frozen_on.is_some() {
                    return Ok(());
                }
                let mut schedule = current.record;
                schedule.frozen_on = Some(on);
                self.repository.update_schedule(current.revision, schedule)?;
                debug!(lease_id = %lease_id, frozen_on = %on, "payment schedule frozen");
                Ok(())
            },
        )
    }

    pub fn entries(
        &self,
        actor: &Actor,
        lease_id: &LeaseId,
    ) -> Result<Vec<Versioned<PaymentScheduleEntry>>, PaymentServiceError> {
        let schedule = self.schedule_for(lease_id)?;
        authorize(actor, &schedule.record, Audience::Parties, "view payments")?;
        Ok(self.repository.entries_for_lease(lease_id)?)
    }

    pub fn entry(
        &self,
        actor: &Actor,
        entry_id: &EntryId,
    ) -> Result<Versioned<PaymentScheduleEntry>, PaymentServiceError> {
        let entry = self.fetch_entry(entry_id)?;
        let schedule = self.schedule_for(&entry.record.lease_id)?;
        authorize(actor, &schedule.record, Audience::Parties, "view payments")?;
        Ok(entry)
    }

    pub fn summary(
        &self,
        actor: &Actor,
        lease_id: &LeaseId,
    ) -> Result<ScheduleSummary, PaymentServiceError> {
        let schedule = self.schedule_for(lease_id)?;
        authorize(actor, &schedule.record, Audience::Parties, "view payments")?;
        let entries = self.repository.entries_for_lease(lease_id)?;
        Ok(summarize(
            &schedule.record,
            entries.iter().map(|entry| &entry.record),
        )?)
    }

    fn flag_entry(
        &self,
        entry_id: &EntryId,
        as_of: NaiveDate,
    ) -> Result<Option<(Versioned<PaymentScheduleEntry>, PaymentSchedule)>, PaymentServiceError>
    {
        retry_on_conflict(
            self.max_write_attempts,
            EntityKind::PaymentEntry,
            entry_id.as_str(),
            || -> Result<_, PaymentServiceError> {
                let current = self.fetch_entry(entry_id)?;
                let schedule = self.schedule_for(&current.record.lease_id)?;
                let mut entry = current.record;
                if !entry.flag_overdue(schedule.record.late_fee_grace_days, as_of) {
                    return Ok(None);
                }
                let stored = self.repository.update_entry(current.revision, entry)?;
                Ok(Some((stored, schedule.record)))
            },
        )
    }

    fn assess_late_fee(
        &self,
        overdue: &PaymentScheduleEntry,
        schedule: &PaymentSchedule,
        as_of: NaiveDate,
        report: &mut SweepReport,
    ) -> Option<EntryId> {
        if overdue.payment_type != PaymentType::Rent
            || !schedule.late_fee_amount.is_positive()
            || schedule.frozen_on.is_some()
        {
            return None;
        }

        let fee = late_fee_for(overdue, schedule.late_fee_amount, as_of);
        match self.repository.insert_entry(fee) {
            Ok(stored) => {
                info!(
                    entry_id = %stored.record.id,
                    assessed_for = %overdue.id,
                    amount = %stored.record.amount,
                    "late fee assessed"
                );
                if let Err(error) = self.events.publish(DomainEvent::LateFeeAssessed {
                    entry_id: stored.record.id.clone(),
                    lease_id: stored.record.lease_id.clone(),
                    assessed_for: overdue.id.clone(),
                    amount: stored.record.amount,
                }) {
                    report.record_failure(stored.record.id.as_str(), error);
                }
                Some(stored.record.id)
            }
            Err(RepositoryError::Conflict) => None,
            Err(error) => {
                report.record_failure(overdue.id.as_str(), error);
                None
            }
        }
    }

    fn fetch_entry(
        &self,
        entry_id: &EntryId,
    ) -> Result<Versioned<PaymentScheduleEntry>, PaymentServiceError> {
        self.repository
            .fetch_entry(entry_id)?
            .ok_or_else(|| LifecycleError::not_found(EntityKind::PaymentEntry, entry_id).into())
    }

    fn schedule_for(
        &self,
        lease_id: &LeaseId,
    ) -> Result<Versioned<PaymentSchedule>, PaymentServiceError> {
        self.repository.schedule(lease_id)?.ok_or_else(|| {
            LifecycleError::not_found(EntityKind::Lease, format!("{lease_id} payment schedule"))
                .into()
        })
    }
}

fn authorize(
    actor: &Actor,
    schedule: &PaymentSchedule,
    audience: Audience,
    operation: &'static str,
) -> Result<(), LifecycleError> {
    let allowed = actor.is_admin()
        || actor.acts_as(ActorRole::Landlord, &schedule.landlord_id)
        || (audience == Audience::Parties
            && actor.acts_as(ActorRole::Tenant, &schedule.tenant_id));
    if allowed {
        Ok(())
    } else {
        Err(actor.deny(operation))
    }
}

impl<P> EventSubscriber for PaymentScheduleService<P>
where
    P: PaymentRepository + 'static,
{
    fn name(&self) -> &'static str {
        "payment_schedule"
    }

    fn handle(&self, event: &DomainEvent) -> Result<(), EventError> {
        let outcome = match event {
            DomainEvent::LeaseActivated { lease } => self.generate_schedule(lease).map(|_| ()),
            DomainEvent::LeaseTerminated {
                lease_id,
                termination_date,
                reason,
                ..
            } => self
                .cancel_after(
                    lease_id,
                    *termination_date,
                    &format!("lease terminated: {reason}"),
                )
                .map(|_| ()),
            DomainEvent::LeaseExpired { lease_id, as_of, .. } => self.freeze(lease_id, *as_of),
            DomainEvent::LeaseRenewed { predecessor, .. } => {
                self.freeze(predecessor, self.clock.today())
            }
            _ => Ok(()),
        };

        outcome.map_err(|error| EventError::Subscriber {
            subscriber: self.name(),
            message: error.to_string(),
        })
    }
}

/// Error raised by the payment schedule service.
#[derive(Debug, thiserror::Error)]
pub enum PaymentServiceError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Events(#[from] EventError),
}

impl StaleWrite for PaymentServiceError {
    fn is_stale_write(&self) -> bool {
        matches!(self, PaymentServiceError::Repository(err) if err.is_stale_write())
    }
}

