use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::LifecycleConfig;
use crate::workflows::tenancy::clock::FixedClock;
use crate::workflows::tenancy::domain::{Actor, ActorId, EntryId, LeaseId, PropertyId};
use crate::workflows::tenancy::events::{EventBus, EventPublisher};
use crate::workflows::tenancy::leases::{CreateLease, Lease, LeaseService, LeaseTerms};
use crate::workflows::tenancy::memory::{
    InMemoryApplicationRepository, InMemoryEventLog, InMemoryLeaseRepository, InMemoryLifecycle,
    InMemoryPaymentRepository, InMemoryPropertyCatalog,
};
use crate::workflows::tenancy::money::Money;
use crate::workflows::tenancy::payments::{
    PaymentMethod, PaymentReceipt, PaymentRepository, PaymentSchedule, PaymentScheduleEntry,
    PaymentScheduleService,
};
use crate::workflows::tenancy::store::{RepositoryError, Versioned};

pub(super) const PROPERTY: &str = "prop-birch-7";
pub(super) const LANDLORD: &str = "landlord-noor";
pub(super) const TENANT: &str = "tenant-eli";

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn tenant() -> Actor {
    Actor::tenant(TENANT)
}

pub(super) fn landlord() -> Actor {
    Actor::landlord(LANDLORD)
}

pub(super) fn lifecycle() -> (InMemoryLifecycle, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::on(date(2024, 1, 20)));
    let lifecycle = InMemoryLifecycle::new(clock.clone(), &LifecycleConfig::default());
    lifecycle
        .catalog
        .register(PropertyId::new(PROPERTY), ActorId::new(LANDLORD));
    (lifecycle, clock)
}

/// Six months of 1,200 rent from 2024-02-01 plus a 600 deposit, 50 late fee after five
/// grace days. Unsigned.
pub(super) fn lease_request() -> CreateLease {
    CreateLease {
        application_id: None,
        property_id: Some(PropertyId::new(PROPERTY)),
        tenant_id: Some(ActorId::new(TENANT)),
        terms: LeaseTerms {
            start_date: Some(date(2024, 2, 1)),
            end_date: Some(date(2024, 8, 1)),
            monthly_rent: Money::from_units(1_200),
            security_deposit: Money::from_units(600),
            payment_due_day: 1,
            late_fee_amount: Money::from_units(50),
            late_fee_grace_days: 5,
        },
        tenant_signature: None,
        landlord_signature: None,
    }
}

/// [`lease_request`] with both signatures supplied up front, so the schedule exists on
/// return.
pub(super) fn active_lease(lifecycle: &InMemoryLifecycle) -> Versioned<Lease> {
    lifecycle
        .leases
        .create(
            &landlord(),
            CreateLease {
                tenant_signature: Some("sig://tenant".to_string()),
                landlord_signature: Some("sig://landlord".to_string()),
                ..lease_request()
            },
        )
        .expect("pre-signed lease created")
}

pub(super) fn entries(
    lifecycle: &InMemoryLifecycle,
    lease: &Lease,
) -> Vec<Versioned<PaymentScheduleEntry>> {
    lifecycle
        .payments
        .entries(&landlord(), &lease.id)
        .expect("schedule readable")
}

/// The first rent entry; position 1 is the deposit.
pub(super) fn february_rent(lease: &Lease) -> EntryId {
    EntryId(format!("{}-002", lease.id))
}

pub(super) fn receipt(amount: Decimal) -> PaymentReceipt {
    PaymentReceipt {
        amount: Money::new(amount),
        method: PaymentMethod::BankTransfer,
        reference: "txn-1".to_string(),
    }
}

/// Refuses the first schedule insert as if storage were briefly unreachable.
#[derive(Default)]
pub(super) struct FlakyPaymentRepository {
    pub(super) inner: InMemoryPaymentRepository,
    pub(super) tripped: AtomicBool,
}

impl PaymentRepository for FlakyPaymentRepository {
    fn insert_schedule(
        &self,
        schedule: PaymentSchedule,
        entries: Vec<PaymentScheduleEntry>,
    ) -> Result<Vec<Versioned<PaymentScheduleEntry>>, RepositoryError> {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("connection reset".to_string()));
        }
        self.inner.insert_schedule(schedule, entries)
    }

    fn schedule(
        &self,
        lease_id: &LeaseId,
    ) -> Result<Option<Versioned<PaymentSchedule>>, RepositoryError> {
        self.inner.schedule(lease_id)
    }

    fn update_schedule(
        &self,
        expected_revision: u64,
        schedule: PaymentSchedule,
    ) -> Result<Versioned<PaymentSchedule>, RepositoryError> {
        self.inner.update_schedule(expected_revision, schedule)
    }

    fn insert_entry(
        &self,
        entry: PaymentScheduleEntry,
    ) -> Result<Versioned<PaymentScheduleEntry>, RepositoryError> {
        self.inner.insert_entry(entry)
    }

    fn update_entry(
        &self,
        expected_revision: u64,
        entry: PaymentScheduleEntry,
    ) -> Result<Versioned<PaymentScheduleEntry>, RepositoryError> {
        self.inner.update_entry(expected_revision, entry)
    }

    fn fetch_entry(
        &self,
        id: &EntryId,
    ) -> Result<Option<Versioned<PaymentScheduleEntry>>, RepositoryError> {
        self.inner.fetch_entry(id)
    }

    fn entries_for_lease(
        &self,
        lease_id: &LeaseId,
    ) -> Result<Vec<Versioned<PaymentScheduleEntry>>, RepositoryError> {
        self.inner.entries_for_lease(lease_id)
    }

    fn open_entries(&self) -> Result<Vec<Versioned<PaymentScheduleEntry>>, RepositoryError> {
        self.inner.open_entries()
    }
}

pub(super) type FlakyPayments = PaymentScheduleService<FlakyPaymentRepository>;
pub(super) type DirectLeases = LeaseService<InMemoryLeaseRepository, InMemoryApplicationRepository>;

/// Lease and payment engines wired by hand over a payment store that drops the first
/// schedule write.
pub(super) fn flaky_engines(
    clock: Arc<FixedClock>,
) -> (DirectLeases, Arc<FlakyPayments>, Arc<InMemoryEventLog>) {
    let config = LifecycleConfig::default();
    let event_log = Arc::new(InMemoryEventLog::default());
    let payments = Arc::new(PaymentScheduleService::new(
        Arc::new(FlakyPaymentRepository::default()),
        event_log.clone(),
        clock.clone(),
        &config,
    ));
    let events: Arc<dyn EventPublisher> = Arc::new(
        EventBus::new()
            .with_subscriber(event_log.clone())
            .with_subscriber(payments.clone()),
    );
    let leases = LeaseService::new(
        Arc::new(InMemoryLeaseRepository::default()),
        Arc::new(InMemoryApplicationRepository::default()),
        Arc::new(InMemoryPropertyCatalog::default().with_property(PROPERTY, LANDLORD)),
        events,
        clock,
        &config,
    );
    (leases, payments, event_log)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
