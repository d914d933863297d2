use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::tenancy::domain::{ActorId, EntryId, LeaseId, PropertyId};
use crate::workflows::tenancy::money::{Currency, Money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Rent,
    Deposit,
    LateFee,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Overdue,
    Waived,
    Cancelled,
    Refunded,
}

impl EntryStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::PartiallyPaid => "partially_paid",
            EntryStatus::Paid => "paid",
            EntryStatus::Overdue => "overdue",
            EntryStatus::Waived => "waived",
            EntryStatus::Cancelled => "cancelled",
            EntryStatus::Refunded => "refunded",
        }
    }

    /// Manually imposed states that override the derived ones.
    pub const fn is_manual(self) -> bool {
        matches!(
            self,
            EntryStatus::Waived | EntryStatus::Cancelled | EntryStatus::Refunded
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Check,
    BankTransfer,
    Card,
    Other,
}

/// Manual resolutions. Once present they short-circuit status derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    Waived { reason: String },
    Cancelled { reason: String },
    Refunded { reference: String },
}

impl Resolution {
    pub const fn status(&self) -> EntryStatus {
        match self {
            Resolution::Waived { .. } => EntryStatus::Waived,
            Resolution::Cancelled { .. } => EntryStatus::Cancelled,
            Resolution::Refunded { .. } => EntryStatus::Refunded,
        }
    }
}

/// Where an entry stands: still open to settlement (possibly flagged overdue by a sweep),
/// or closed by a manual resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Settlement {
    Open {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        overdue_since: Option<NaiveDate>,
    },
    Resolved(Resolution),
}

impl Settlement {
    pub const fn open() -> Self {
        Settlement::Open {
            overdue_since: None,
        }
    }
}

/// Status as a pure function of the settlement and the amounts.
pub fn derive_status(amount: Money, amount_paid: Money, settlement: &Settlement) -> EntryStatus {
    match settlement {
        Settlement::Resolved(resolution) => resolution.status(),
        Settlement::Open { .. } if amount_paid >= amount => EntryStatus::Paid,
        Settlement::Open {
            overdue_since: Some(_),
        } => EntryStatus::Overdue,
        Settlement::Open { .. } if amount_paid.is_positive() => EntryStatus::PartiallyPaid,
        Settlement::Open { .. } => EntryStatus::Pending,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Payment,
    Refund,
}

/// One settlement line in an entry's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLine {
    pub kind: LineKind,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: String,
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: ActorId,
}

/// One obligation due under a lease. Entries are never deleted, only transitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentScheduleEntry {
    pub id: EntryId,
    pub lease_id: LeaseId,
    pub payment_type: PaymentType,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub amount_paid: Money,
    pub settlement: Settlement,
    #[serde(default)]
    pub paid_history: Vec<PaymentLine>,
    /// For late fees, the entry whose lateness triggered them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessed_for: Option<EntryId>,
}

impl PaymentScheduleEntry {
    pub fn new(
        id: EntryId,
        lease_id: LeaseId,
        payment_type: PaymentType,
        due_date: NaiveDate,
        amount: Money,
    ) -> Self {
        Self {
            id,
            lease_id,
            payment_type,
            due_date,
            amount,
            amount_paid: Money::ZERO,
            settlement: Settlement::open(),
            paid_history: Vec::new(),
            assessed_for: None,
        }
    }

    pub fn status(&self) -> EntryStatus {
        derive_status(self.amount, self.amount_paid, &self.settlement)
    }

    pub fn waiver_reason(&self) -> Option<&str> {
        match &self.settlement {
            Settlement::Resolved(Resolution::Waived { reason }) => Some(reason),
            _ => None,
        }
    }

    pub fn outstanding(&self) -> Money {
        match self.status() {
            EntryStatus::Pending | EntryStatus::PartiallyPaid | EntryStatus::Overdue => {
                self.amount.saturating_sub(self.amount_paid)
            }
            _ => Money::ZERO,
        }
    }
}

/// Per-lease schedule header. Its existence marks the schedule as generated; it also
/// snapshots the lease terms the sweep and authorization checks need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSchedule {
    pub lease_id: LeaseId,
    pub property_id: PropertyId,
    pub tenant_id: ActorId,
    pub landlord_id: ActorId,
    pub currency: Currency,
    pub late_fee_amount: Money,
    pub late_fee_grace_days: u16,
    pub generated_at: DateTime<Utc>,
    /// Set when the lease ends; no new obligations are added afterwards.
    pub frozen_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub amount: Money,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: String,
}

/// Entry plus its derived status, for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub entry_id: EntryId,
    pub lease_id: LeaseId,
    pub payment_type: PaymentType,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub amount_paid: Money,
    pub status: EntryStatus,
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiver_reason: Option<String>,
    pub payments_recorded: usize,
}

impl EntryView {
    pub fn new(entry: &PaymentScheduleEntry, revision: u64) -> Self {
        Self {
            entry_id: entry.id.clone(),
            lease_id: entry.lease_id.clone(),
            payment_type: entry.payment_type,
            due_date: entry.due_date,
            amount: entry.amount,
            amount_paid: entry.amount_paid,
            status: entry.status(),
            revision,
            waiver_reason: entry.waiver_reason().map(str::to_string),
            payments_recorded: entry.paid_history.len(),
        }
    }
}

/// Per-lease totals for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    pub lease_id: LeaseId,
    pub currency: Currency,
    pub entries: usize,
    pub total_due: Money,
    pub total_paid: Money,
    pub outstanding: Money,
    pub overdue: usize,
    pub frozen_on: Option<NaiveDate>,
}
