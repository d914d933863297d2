//! End-to-end scenarios across the application, lease, and payment schedule engines.
//!
//! Everything runs through the public services on an [`InMemoryLifecycle`], so the event
//! wiring between engines is exercised exactly as the API binary wires it.

mod common {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use rentflow::config::LifecycleConfig;
    use rentflow::workflows::tenancy::applications::{ApplicationDraft, RentalApplication};
    use rentflow::workflows::tenancy::leases::{CreateLease, Lease, LeaseTerms};
    use rentflow::workflows::tenancy::{
        Actor, ActorId, FixedClock, InMemoryLifecycle, Money, PropertyId, Versioned,
    };

    pub(super) const PROPERTY: &str = "prop-harbor-21";
    pub(super) const LANDLORD: &str = "landlord-ines";
    pub(super) const TENANT: &str = "tenant-omar";

    pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    pub(super) fn tenant() -> Actor {
        Actor::tenant(TENANT)
    }

    pub(super) fn landlord() -> Actor {
        Actor::landlord(LANDLORD)
    }

    pub(super) fn lifecycle_on(today: NaiveDate) -> (InMemoryLifecycle, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::on(today));
        let lifecycle = InMemoryLifecycle::new(clock.clone(), &LifecycleConfig::default());
        lifecycle
            .catalog
            .register(PropertyId::new(PROPERTY), ActorId::new(LANDLORD));
        (lifecycle, clock)
    }

    pub(super) fn terms(start: NaiveDate, end: NaiveDate) -> LeaseTerms {
        LeaseTerms {
            start_date: Some(start),
            end_date: Some(end),
            monthly_rent: Money::from_units(5_000),
            security_deposit: Money::from_units(10_000),
            payment_due_day: 1,
            late_fee_amount: Money::from_units(100),
            late_fee_grace_days: 5,
        }
    }

    pub(super) fn direct_lease(tenant_id: &str, terms: LeaseTerms) -> CreateLease {
        CreateLease {
            application_id: None,
            property_id: Some(PropertyId::new(PROPERTY)),
            tenant_id: Some(ActorId::new(tenant_id)),
            terms,
            tenant_signature: None,
            landlord_signature: None,
        }
    }

    pub(super) fn application_under_review(
        lifecycle: &InMemoryLifecycle,
        move_in: NaiveDate,
    ) -> Versioned<RentalApplication> {
        let drafted = lifecycle
            .applications
            .create_draft(
                &tenant(),
                ApplicationDraft {
                    property_id: PropertyId::new(PROPERTY),
                    desired_move_in: move_in,
                    lease_term_months: 3,
                    number_of_occupants: 1,
                    monthly_income: Money::from_units(16_000),
                    emergency_contact: None,
                    stage: None,
                },
            )
            .expect("draft opens");
        let submitted = lifecycle
            .applications
            .submit(&tenant(), &drafted.record.id)
            .expect("submitted");
        lifecycle
            .applications
            .begin_review(&landlord(), &submitted.record.id)
            .expect("review started")
    }

    pub(super) fn activate(
        lifecycle: &InMemoryLifecycle,
        request: CreateLease,
    ) -> Versioned<Lease> {
        let tenant_id = request
            .tenant_id
            .clone()
            .expect("direct leases name a tenant");
        let draft = lifecycle
            .leases
            .create(&landlord(), request)
            .expect("lease drafted");
        lifecycle
            .leases
            .sign(
                &Actor::tenant(tenant_id.as_str()),
                &draft.record.id,
                "sig://tenant".to_string(),
            )
            .expect("tenant signs");
        lifecycle
            .leases
            .sign(&landlord(), &draft.record.id, "sig://landlord".to_string())
            .expect("landlord signs")
    }
}

use std::sync::Barrier;

use rust_decimal_macros::dec;

use common::*;
use rentflow::workflows::tenancy::applications::{ApplicationStatus, ReviewDecision};
use rentflow::workflows::tenancy::leases::{
    CreateLease, LeaseServiceError, LeaseStatus, TerminateLease,
};
use rentflow::workflows::tenancy::payments::{
    EntryStatus, PaymentMethod, PaymentReceipt, PaymentType,
};
use rentflow::workflows::tenancy::{Actor, EntryId, LifecycleError, Money};

#[test]
fn activation_generates_deposit_and_monthly_rent() {
    let (lifecycle, _) = lifecycle_on(date(2024, 1, 2));
    let lease = activate(
        &lifecycle,
        direct_lease(TENANT, terms(date(2024, 1, 15), date(2024, 4, 15))),
    );
    assert_eq!(lease.record.status, LeaseStatus::Active);

    let entries = lifecycle
        .payments
        .entries(&tenant(), &lease.record.id)
        .expect("schedule readable");
    let shape: Vec<_> = entries
        .iter()
        .map(|entry| {
            (
                entry.record.payment_type,
                entry.record.due_date,
                entry.record.amount,
                entry.record.status(),
            )
        })
        .collect();

    assert_eq!(
        shape,
        vec![
            (
                PaymentType::Deposit,
                date(2024, 1, 15),
                Money::from_units(10_000),
                EntryStatus::Pending
            ),
            (
                PaymentType::Rent,
                date(2024, 2, 1),
                Money::from_units(5_000),
                EntryStatus::Pending
            ),
            (
                PaymentType::Rent,
                date(2024, 3, 1),
                Money::from_units(5_000),
                EntryStatus::Pending
            ),
            (
                PaymentType::Rent,
                date(2024, 4, 1),
                Money::from_units(5_000),
                EntryStatus::Pending
            ),
        ]
    );
}

#[test]
fn overdue_flag_waits_for_the_grace_window() {
    let (lifecycle, _) = lifecycle_on(date(2024, 1, 2));
    let lease = activate(
        &lifecycle,
        direct_lease(TENANT, terms(date(2024, 1, 15), date(2024, 4, 15))),
    );
    let february = EntryId::new(format!("{}-002", lease.record.id));
    lifecycle
        .payments
        .record_payment(
            &tenant(),
            &EntryId::new(format!("{}-001", lease.record.id)),
            PaymentReceipt {
                amount: Money::from_units(10_000),
                method: PaymentMethod::Check,
                reference: "chk-1001".to_string(),
            },
        )
        .expect("deposit paid");

    lifecycle.run_sweeps(date(2024, 2, 7));
    let before = lifecycle
        .payments
        .entry(&tenant(), &february)
        .expect("entry readable");
    assert_eq!(before.record.status(), EntryStatus::Pending);

    let summary = lifecycle.run_sweeps(date(2024, 2, 8));
    assert_eq!(summary.payments.transitioned, vec![february.to_string()]);
    let after = lifecycle
        .payments
        .entry(&tenant(), &february)
        .expect("entry readable");
    assert_eq!(after.record.status(), EntryStatus::Overdue);
}

#[test]
fn partial_then_final_payment_settles_rent() {
    let (lifecycle, _) = lifecycle_on(date(2024, 1, 2));
    let lease = activate(
        &lifecycle,
        direct_lease(TENANT, terms(date(2024, 1, 15), date(2024, 4, 15))),
    );
    let february = EntryId::new(format!("{}-002", lease.record.id));
    let pay = |amount| PaymentReceipt {
        amount: Money::new(amount),
        method: PaymentMethod::BankTransfer,
        reference: "ach".to_string(),
    };

    let partial = lifecycle
        .payments
        .record_payment(&tenant(), &february, pay(dec!(3000)))
        .expect("partial payment");
    assert_eq!(partial.record.status(), EntryStatus::PartiallyPaid);
    assert_eq!(partial.record.amount_paid, Money::from_units(3_000));

    let settled = lifecycle
        .payments
        .record_payment(&tenant(), &february, pay(dec!(2000)))
        .expect("final payment");
    assert_eq!(settled.record.status(), EntryStatus::Paid);
    assert_eq!(settled.record.amount_paid, Money::from_units(5_000));
}

#[test]
fn decided_applications_cannot_be_resubmitted() {
    let (lifecycle, _) = lifecycle_on(date(2024, 1, 2));
    let reviewing = application_under_review(&lifecycle, date(2024, 1, 15));

    let approved = lifecycle
        .applications
        .decide(
            &landlord(),
            &reviewing.record.id,
            ReviewDecision::Approved,
            Some("ok".to_string()),
        )
        .expect("approved");
    assert_eq!(approved.record.status, ApplicationStatus::Approved);
    assert!(approved.record.reviewed_at.is_some());

    let resubmitted = lifecycle.applications.submit(&tenant(), &reviewing.record.id);
    assert!(matches!(
        resubmitted,
        Err(rentflow::workflows::tenancy::applications::ApplicationServiceError::Lifecycle(
            LifecycleError::InvalidTransition { .. }
        ))
    ));
}

#[test]
fn racing_activations_leave_one_active_lease() {
    let (lifecycle, _) = lifecycle_on(date(2024, 1, 2));
    let term = terms(date(2024, 2, 1), date(2025, 2, 1));
    let first = lifecycle
        .leases
        .create(&landlord(), direct_lease("tenant-first", term.clone()))
        .expect("first draft");
    let second = lifecycle
        .leases
        .create(&landlord(), direct_lease("tenant-second", term))
        .expect("second draft");
    for (tenant_id, lease) in [("tenant-first", &first), ("tenant-second", &second)] {
        lifecycle
            .leases
            .sign(
                &Actor::tenant(tenant_id),
                &lease.record.id,
                "sig://tenant".to_string(),
            )
            .expect("tenant signs");
    }

    let barrier = Barrier::new(2);
    let outcomes: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = [&first, &second]
            .into_iter()
            .map(|lease| {
                let lifecycle = lifecycle.clone();
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    lifecycle.leases.sign(
                        &landlord(),
                        &lease.record.id,
                        "sig://landlord".to_string(),
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("signer thread"))
            .collect()
    });

    let activated = outcomes
        .iter()
        .filter(|outcome| {
            matches!(outcome, Ok(lease) if lease.record.status == LeaseStatus::Active)
        })
        .count();
    let conflicts = outcomes
        .iter()
        .filter(|outcome| {
            matches!(
                outcome,
                Err(LeaseServiceError::Lifecycle(
                    LifecycleError::ConflictingActiveLease { .. }
                ))
            )
        })
        .count();
    assert_eq!((activated, conflicts), (1, 1));

    let schedules = lifecycle
        .event_log
        .names()
        .into_iter()
        .filter(|name| *name == "schedule_generated")
        .count();
    assert_eq!(schedules, 1);
}

#[test]
fn approved_application_runs_through_to_termination() {
    let (lifecycle, clock) = lifecycle_on(date(2024, 1, 2));
    let reviewing = application_under_review(&lifecycle, date(2024, 2, 1));
    lifecycle
        .applications
        .decide(&landlord(), &reviewing.record.id, ReviewDecision::Approved, None)
        .expect("approved");

    let mut seeded_terms = terms(date(2024, 2, 1), date(2024, 5, 1));
    seeded_terms.start_date = None;
    seeded_terms.end_date = None;
    let lease = activate(
        &lifecycle,
        CreateLease {
            application_id: Some(reviewing.record.id.clone()),
            ..direct_lease(TENANT, seeded_terms)
        },
    );
    assert_eq!(lease.record.start_date, date(2024, 2, 1));
    assert_eq!(lease.record.end_date, date(2024, 5, 1));
    assert_eq!(
        lease.record.application_id.as_ref(),
        Some(&reviewing.record.id)
    );

    clock.set_date(date(2024, 3, 10));
    let sweep = lifecycle.run_sweeps(date(2024, 3, 10));
    assert_eq!(sweep.payments.late_fees.len(), 2);
    assert!(sweep.applications.is_clean());

    lifecycle
        .leases
        .terminate(
            &landlord(),
            &lease.record.id,
            TerminateLease {
                reason: "tenant relocated".to_string(),
                date: date(2024, 3, 15),
                notes: None,
            },
        )
        .expect("terminated");

    let summary = lifecycle
        .payments
        .summary(&tenant(), &lease.record.id)
        .expect("summary");
    assert_eq!(summary.frozen_on, Some(date(2024, 3, 15)));

    let entries = lifecycle
        .payments
        .entries(&tenant(), &lease.record.id)
        .expect("entries");
    let april = entries
        .iter()
        .find(|entry| entry.record.due_date == date(2024, 4, 1))
        .expect("april rent");
    assert_eq!(april.record.status(), EntryStatus::Cancelled);

    let templates: Vec<_> = lifecycle
        .outbox
        .notifications()
        .into_iter()
        .map(|notification| notification.template)
        .collect();
    for expected in [
        "application_approved",
        "lease_activated",
        "payment_overdue",
        "lease_terminated",
    ] {
        assert!(
            templates.iter().any(|template| template == expected),
            "missing {expected} notification in {templates:?}"
        );
    }
}
