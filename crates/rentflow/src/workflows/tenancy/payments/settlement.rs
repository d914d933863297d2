//! Transitions on a single schedule entry. Status is never stored; each operation edits
//! the amounts or the settlement and lets [`derive_status`](super::domain::derive_status)
//! report the result.

use chrono::{DateTime, NaiveDate, Utc};

use super::domain::{
    EntryStatus, LineKind, PaymentLine, PaymentReceipt, PaymentScheduleEntry, Resolution,
    Settlement,
};
use super::schedule::is_past_grace;
use crate::workflows::tenancy::domain::{ActorId, EntityKind, LifecycleError};
use crate::workflows::tenancy::money::Money;

impl PaymentScheduleEntry {
    /// Applies a payment. Overpayment is accepted and settles the entry.
    pub fn record_payment(
        &mut self,
        receipt: PaymentReceipt,
        recorded_by: &ActorId,
        now: DateTime<Utc>,
    ) -> Result<EntryStatus, LifecycleError> {
        match self.status() {
            EntryStatus::Pending | EntryStatus::PartiallyPaid | EntryStatus::Overdue => {}
            _ => return Err(self.reject("record a payment against")),
        }
        let amount = Money::positive(receipt.amount.amount(), "amount")?;
        let amount_paid = self.amount_paid.checked_add(amount, "amount")?;

        self.paid_history.push(PaymentLine {
            kind: LineKind::Payment,
            amount,
            method: receipt.method,
            reference: receipt.reference,
            recorded_at: now,
            recorded_by: recorded_by.clone(),
        });
        self.amount_paid = amount_paid;
        // A payment clears the overdue flag; the next sweep re-flags what is still short.
        self.settlement = Settlement::open();
        Ok(self.status())
    }

    pub fn waive(&mut self, reason: String) -> Result<(), LifecycleError> {
        match self.status() {
            EntryStatus::Pending | EntryStatus::PartiallyPaid | EntryStatus::Overdue => {}
            _ => return Err(self.reject("waive")),
        }
        if reason.trim().is_empty() {
            return Err(LifecycleError::validation("reason", "must not be empty"));
        }
        self.settlement = Settlement::Resolved(Resolution::Waived { reason });
        Ok(())
    }

    /// Returns money already collected. The entry ends Refunded whatever the amount.
    pub fn refund(
        &mut self,
        receipt: PaymentReceipt,
        recorded_by: &ActorId,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        match self.status() {
            EntryStatus::Paid | EntryStatus::PartiallyPaid | EntryStatus::Overdue => {}
            _ => return Err(self.reject("refund")),
        }
        if !self.amount_paid.is_positive() {
            return Err(LifecycleError::validation(
                "amount",
                "nothing has been paid against this entry",
            ));
        }
        let amount = Money::positive(receipt.amount.amount(), "amount")?;
        if amount > self.amount_paid {
            return Err(LifecycleError::validation(
                "amount",
                format!("refund {amount} exceeds the {} paid", self.amount_paid),
            ));
        }

        self.paid_history.push(PaymentLine {
            kind: LineKind::Refund,
            amount,
            method: receipt.method,
            reference: receipt.reference.clone(),
            recorded_at: now,
            recorded_by: recorded_by.clone(),
        });
        self.amount_paid = self.amount_paid.checked_sub(amount, "amount")?;
        self.settlement = Settlement::Resolved(Resolution::Refunded {
            reference: receipt.reference,
        });
        Ok(())
    }

    /// Flags a still-open entry whose grace window closed before `as_of`. Returns `false`
    /// when nothing changed, so repeated sweeps are idempotent.
    pub fn flag_overdue(&mut self, grace_days: u16, as_of: NaiveDate) -> bool {
        if !matches!(
            self.status(),
            EntryStatus::Pending | EntryStatus::PartiallyPaid
        ) {
            return false;
        }
        if !is_past_grace(self.due_date, grace_days, as_of) {
            return false;
        }
        self.settlement = Settlement::Open {
            overdue_since: Some(as_of),
        };
        true
    }

    /// Cancels an unsettled obligation. Returns `false` for entries already closed.
    pub fn cancel(&mut self, reason: &str) -> bool {
        match self.status() {
            EntryStatus::Pending | EntryStatus::PartiallyPaid | EntryStatus::Overdue => {
                self.settlement = Settlement::Resolved(Resolution::Cancelled {
                    reason: reason.to_string(),
                });
                true
            }
            _ => false,
        }
    }

    fn reject(&self, operation: &'static str) -> LifecycleError {
        LifecycleError::invalid_transition(
            EntityKind::PaymentEntry,
            operation,
            self.status().label(),
        )
    }
}
