//! Schedule generation and the overdue rule.

use chrono::{Datelike, Days, NaiveDate};

use super::domain::{
    EntryStatus, PaymentSchedule, PaymentScheduleEntry, PaymentType, ScheduleSummary,
};
use crate::workflows::tenancy::domain::{EntryId, LifecycleError};
use crate::workflows::tenancy::leases::Lease;
use crate::workflows::tenancy::money::Money;

/// Obligations for a lease term: the deposit (when non-zero) due on the start date, then
/// one rent entry for every `payment_due_day` falling in `[start_date, end_date)`.
/// Entry ids are derived from the lease id and position, so the output is deterministic.
pub fn build_entries(lease: &Lease) -> Vec<PaymentScheduleEntry> {
    let mut due_dates: Vec<(PaymentType, NaiveDate, Money)> = Vec::new();
    if lease.security_deposit.is_positive() {
        due_dates.push((
            PaymentType::Deposit,
            lease.start_date,
            lease.security_deposit,
        ));
    }
    for due in rent_due_dates(lease.start_date, lease.end_date, lease.payment_due_day) {
        due_dates.push((PaymentType::Rent, due, lease.monthly_rent));
    }

    due_dates
        .into_iter()
        .enumerate()
        .map(|(position, (payment_type, due_date, amount))| {
            PaymentScheduleEntry::new(
                EntryId(format!("{}-{:03}", lease.id, position + 1)),
                lease.id.clone(),
                payment_type,
                due_date,
                amount,
            )
        })
        .collect()
}

/// The due day in every calendar month of the term, clamped to short months.
pub fn rent_due_dates(start: NaiveDate, end: NaiveDate, due_day: u8) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let (mut year, mut month) = (start.year(), start.month());

    loop {
        let Some(due) = due_date_in_month(year, month, due_day) else {
            break;
        };
        if due >= end {
            break;
        }
        if due >= start {
            dates.push(due);
        }
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }

    dates
}

/// `day` of the given month, or the month's last day when it is shorter.
pub fn due_date_in_month(year: i32, month: u32, day: u8) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_month = first.checked_add_months(chrono::Months::new(1))?;
    let last_day = next_month.pred_opt()?.day();
    NaiveDate::from_ymd_opt(year, month, u32::from(day).clamp(1, last_day))
}

/// Last sweep date at which an entry is still inside its grace window: the due date, the
/// grace days, and one more day for the sweep that closes them. An entry due 2024-02-01
/// with five grace days stays pending on a 2024-02-07 sweep and turns overdue on the
/// 2024-02-08 sweep.
pub fn grace_deadline(due_date: NaiveDate, grace_days: u16) -> Option<NaiveDate> {
    due_date.checked_add_days(Days::new(u64::from(grace_days) + 1))
}

pub fn is_past_grace(due_date: NaiveDate, grace_days: u16, as_of: NaiveDate) -> bool {
    grace_deadline(due_date, grace_days).is_some_and(|deadline| deadline < as_of)
}

/// Late fee raised against `entry` on the sweep date; its id is derived from the entry so
/// assessment stays idempotent.
pub fn late_fee_for(
    entry: &PaymentScheduleEntry,
    amount: Money,
    as_of: NaiveDate,
) -> PaymentScheduleEntry {
    let mut fee = PaymentScheduleEntry::new(
        EntryId(format!("{}-late-fee", entry.id)),
        entry.lease_id.clone(),
        PaymentType::LateFee,
        as_of,
        amount,
    );
    fee.assessed_for = Some(entry.id.clone());
    fee
}

/// Totals across a schedule. Waived and cancelled entries are no longer due; refunds
/// already reduced `amount_paid`.
pub fn summarize<'a>(
    schedule: &PaymentSchedule,
    entries: impl IntoIterator<Item = &'a PaymentScheduleEntry>,
) -> Result<ScheduleSummary, LifecycleError> {
    let mut summary = ScheduleSummary {
        lease_id: schedule.lease_id.clone(),
        currency: schedule.currency.clone(),
        entries: 0,
        total_due: Money::ZERO,
        total_paid: Money::ZERO,
        outstanding: Money::ZERO,
        overdue: 0,
        frozen_on: schedule.frozen_on,
    };

    for entry in entries {
        let status = entry.status();
        summary.entries += 1;
        if !matches!(status, EntryStatus::Waived | EntryStatus::Cancelled) {
            summary.total_due = summary.total_due.checked_add(entry.amount, "total_due")?;
        }
        summary.total_paid = summary.total_paid.checked_add(entry.amount_paid, "total_paid")?;
        summary.outstanding = summary
            .outstanding
            .checked_add(entry.outstanding(), "outstanding")?;
        if status == EntryStatus::Overdue {
            summary.overdue += 1;
        }
    }

    Ok(summary)
}
