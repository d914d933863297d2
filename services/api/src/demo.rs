use chrono::{Days, Local, NaiveDate};
use clap::Args;
use rentflow::config::LifecycleConfig;
use rentflow::error::AppError;
use rentflow::workflows::tenancy::applications::{
    ApplicationDraft, EmergencyContact, RentalApplication, ReviewDecision,
};
use rentflow::workflows::tenancy::leases::{CreateLease, Lease, LeaseTerms};
use rentflow::workflows::tenancy::payments::{
    EntryStatus, PaymentMethod, PaymentReceipt, PaymentScheduleEntry, PaymentType,
};
use rentflow::workflows::tenancy::{
    Actor, ActorId, FixedClock, InMemoryLifecycle, Money, PropertyId, SweepReport, Versioned,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io;
use std::sync::Arc;

const DEMO_PROPERTY: &str = "prop-maple-court-4b";
const DEMO_LANDLORD: &str = "landlord-demo";
const DEMO_TENANT: &str = "tenant-demo";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the demo starts on (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Print the payment schedule as CSV instead of a table.
    #[arg(long)]
    pub(crate) csv: bool,
}

#[derive(Args, Debug)]
pub(crate) struct SweepArgs {
    /// Date the sweeps run for (YYYY-MM-DD).
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: NaiveDate,
    /// Date the demo dataset is built on. Defaults to 60 days before --as-of.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

/// One approved application and the active lease formed from it.
pub(crate) struct DemoDataset {
    pub(crate) lifecycle: InMemoryLifecycle,
    pub(crate) clock: Arc<FixedClock>,
    pub(crate) application: Versioned<RentalApplication>,
    pub(crate) lease: Versioned<Lease>,
}

pub(crate) fn seed_demo(today: NaiveDate) -> Result<DemoDataset, AppError> {
    let clock = Arc::new(FixedClock::on(today));
    let lifecycle = InMemoryLifecycle::new(clock.clone(), &LifecycleConfig::default());
    lifecycle
        .catalog
        .register(PropertyId::new(DEMO_PROPERTY), ActorId::new(DEMO_LANDLORD));
    let tenant = Actor::tenant(DEMO_TENANT);
    let landlord = Actor::landlord(DEMO_LANDLORD);

    let move_in = today
        .checked_add_days(Days::new(14))
        .ok_or_else(|| AppError::Lifecycle(format!("no move-in date after {today}")))?;
    let draft = lifecycle.applications.create_draft(
        &tenant,
        ApplicationDraft {
            property_id: PropertyId::new(DEMO_PROPERTY),
            desired_move_in: move_in,
            lease_term_months: 12,
            number_of_occupants: 2,
            monthly_income: Money::from_units(6_200),
            emergency_contact: Some(EmergencyContact {
                name: "Jordan Demo".to_string(),
                phone: "+1-555-0142".to_string(),
                relationship: None,
            }),
            stage: None,
        },
    )?;
    let application_id = draft.record.id.clone();
    lifecycle.applications.submit(&tenant, &application_id)?;
    lifecycle
        .applications
        .begin_review(&landlord, &application_id)?;
    let application = lifecycle.applications.decide(
        &landlord,
        &application_id,
        ReviewDecision::Approved,
        Some("income and references verified".to_string()),
    )?;

    let drafted = lifecycle.leases.create(
        &landlord,
        CreateLease {
            application_id: Some(application_id),
            property_id: None,
            tenant_id: None,
            terms: LeaseTerms {
                start_date: None,
                end_date: None,
                monthly_rent: Money::from_units(1_850),
                security_deposit: Money::from_units(1_850),
                payment_due_day: 1,
                late_fee_amount: Money::from_units(75),
                late_fee_grace_days: 5,
            },
            tenant_signature: None,
            landlord_signature: None,
        },
    )?;
    lifecycle
        .leases
        .sign(&tenant, &drafted.record.id, "sig://demo/tenant".to_string())?;
    let lease = lifecycle.leases.sign(
        &landlord,
        &drafted.record.id,
        "sig://demo/landlord".to_string(),
    )?;

    Ok(DemoDataset {
        lifecycle,
        clock,
        application,
        lease,
    })
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let DemoDataset {
        lifecycle,
        clock,
        application,
        lease,
    } = seed_demo(today)?;
    let tenant = Actor::tenant(DEMO_TENANT);
    let landlord = Actor::landlord(DEMO_LANDLORD);

    println!("Rental lifecycle demo (starting {today})");
    println!(
        "- Application {} for {} -> {}",
        application.record.id,
        application.record.property_id,
        application.record.status.label()
    );
    println!(
        "- Lease {} {} -> {} at {}/month -> {}",
        lease.record.id,
        lease.record.start_date,
        lease.record.end_date,
        lease.record.monthly_rent,
        lease.record.status.label()
    );

    let entries = lifecycle.payments.entries(&tenant, &lease.record.id)?;
    let deposit = entries
        .iter()
        .find(|entry| entry.record.payment_type == PaymentType::Deposit);
    let first_rent = entries
        .iter()
        .find(|entry| entry.record.payment_type == PaymentType::Rent)
        .ok_or_else(|| AppError::Lifecycle(format!("lease {} has no rent due", lease.record.id)))?;

    if let Some(deposit) = deposit {
        lifecycle.payments.record_payment(
            &tenant,
            &deposit.record.id,
            PaymentReceipt {
                amount: deposit.record.amount,
                method: PaymentMethod::BankTransfer,
                reference: "demo-deposit".to_string(),
            },
        )?;
        println!("- Deposit of {} paid in full", deposit.record.amount);
    }
    let half = Money::new(first_rent.record.amount.amount() / Decimal::TWO);
    lifecycle.payments.record_payment(
        &tenant,
        &first_rent.record.id,
        PaymentReceipt {
            amount: half,
            method: PaymentMethod::Card,
            reference: "demo-rent-1".to_string(),
        },
    )?;
    println!(
        "- First rent due {}: {} of {} paid",
        first_rent.record.due_date, half, first_rent.record.amount
    );

    let grace = u64::from(lease.record.late_fee_grace_days) + 1;
    let as_of = first_rent
        .record
        .due_date
        .checked_add_days(Days::new(grace))
        .ok_or_else(|| AppError::Lifecycle("sweep date out of range".to_string()))?;
    clock.set_date(as_of);
    let sweep = lifecycle.run_sweeps(as_of);
    println!("\nSweep as of {as_of}");
    render_report("applications expired", &sweep.applications);
    render_report("leases expired", &sweep.leases);
    render_report("entries overdue", &sweep.payments);
    if !sweep.payments.late_fees.is_empty() {
        println!("  late fees: {}", sweep.payments.late_fees.join(", "));
    }

    let entries = lifecycle.payments.entries(&landlord, &lease.record.id)?;
    println!("\nPayment schedule");
    if args.csv {
        write_schedule_csv(io::stdout().lock(), &entries)?;
    } else {
        render_schedule(&entries);
    }

    let summary = lifecycle.payments.summary(&landlord, &lease.record.id)?;
    println!(
        "\nTotals ({}): due {} | paid {} | outstanding {} | {} overdue",
        summary.currency.code(),
        summary.total_due,
        summary.total_paid,
        summary.outstanding,
        summary.overdue
    );

    let notifications = lifecycle.outbox.notifications();
    if notifications.is_empty() {
        println!("Notifications: none queued");
    } else {
        println!("Notifications queued");
        for notification in notifications {
            println!("- {} -> {}", notification.template, notification.subject_id);
        }
    }

    Ok(())
}

pub(crate) fn run_sweep(args: SweepArgs) -> Result<(), AppError> {
    let today = match args.today {
        Some(today) => today,
        None => args
            .as_of
            .checked_sub_days(Days::new(60))
            .ok_or_else(|| AppError::Lifecycle("dataset date out of range".to_string()))?,
    };
    let dataset = seed_demo(today)?;
    dataset.clock.set_date(args.as_of);
    let summary = dataset.lifecycle.run_sweeps(args.as_of);
    crate::infra::log_sweep(&summary);

    let rendered = serde_json::to_string_pretty(&summary).map_err(io::Error::from)?;
    println!("{rendered}");
    Ok(())
}

fn render_report(label: &str, report: &SweepReport) {
    println!(
        "- {label}: {} of {} examined{}",
        report.transitioned.len(),
        report.examined,
        if report.is_clean() { "" } else { " (with failures)" }
    );
    for failure in &report.failures {
        println!("  ! {}: {}", failure.id, failure.error);
    }
}

fn render_schedule(entries: &[Versioned<PaymentScheduleEntry>]) {
    for entry in entries {
        let entry = &entry.record;
        println!(
            "- {} | {:?} | due {} | {} | paid {} | {}",
            entry.id,
            entry.payment_type,
            entry.due_date,
            entry.amount,
            entry.amount_paid,
            entry.status().label()
        );
    }
}

#[derive(Debug, Serialize)]
struct ScheduleRow<'a> {
    entry_id: &'a str,
    payment_type: PaymentType,
    due_date: NaiveDate,
    amount: Money,
    amount_paid: Money,
    outstanding: Money,
    status: EntryStatus,
}

pub(crate) fn write_schedule_csv<W: io::Write>(
    writer: W,
    entries: &[Versioned<PaymentScheduleEntry>],
) -> Result<(), AppError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for entry in entries {
        let entry = &entry.record;
        csv_writer
            .serialize(ScheduleRow {
                entry_id: entry.id.as_str(),
                payment_type: entry.payment_type,
                due_date: entry.due_date,
                amount: entry.amount,
                amount_paid: entry.amount_paid,
                outstanding: entry.outstanding(),
                status: entry.status(),
            })
            .map_err(io::Error::from)?;
    }
    csv_writer.flush()?;
    Ok(())
}
