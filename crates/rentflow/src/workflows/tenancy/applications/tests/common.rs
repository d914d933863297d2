use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::config::LifecycleConfig;
use crate::workflows::tenancy::applications::{
    ApplicationDraft, ApplicationRepository, ApplicationService, EmergencyContact,
    RentalApplication,
};
use crate::workflows::tenancy::clock::FixedClock;
use crate::workflows::tenancy::domain::{Actor, ActorId, ApplicationId, PropertyId};
use crate::workflows::tenancy::memory::{InMemoryApplicationRepository, InMemoryLifecycle};
use crate::workflows::tenancy::money::Money;
use crate::workflows::tenancy::store::{RepositoryError, Versioned};

pub(super) const PROPERTY: &str = "prop-elm-12";
pub(super) const LANDLORD: &str = "landlord-ada";
pub(super) const TENANT: &str = "tenant-bo";

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn today() -> NaiveDate {
    date(2024, 1, 10)
}

pub(super) fn tenant() -> Actor {
    Actor::tenant(TENANT)
}

pub(super) fn landlord() -> Actor {
    Actor::landlord(LANDLORD)
}

pub(super) fn lifecycle() -> (InMemoryLifecycle, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::on(today()));
    let lifecycle = InMemoryLifecycle::new(clock.clone(), &LifecycleConfig::default());
    lifecycle
        .catalog
        .register(PropertyId::new(PROPERTY), ActorId::new(LANDLORD));
    (lifecycle, clock)
}

pub(super) fn draft() -> ApplicationDraft {
    ApplicationDraft {
        property_id: PropertyId::new(PROPERTY),
        desired_move_in: date(2024, 2, 1),
        lease_term_months: 12,
        number_of_occupants: 2,
        monthly_income: Money::from_units(5_400),
        emergency_contact: Some(EmergencyContact {
            name: "Cleo Park".to_string(),
            phone: "+1-555-0100".to_string(),
            relationship: Some("sister".to_string()),
        }),
        stage: None,
    }
}

pub(super) fn submitted(lifecycle: &InMemoryLifecycle) -> Versioned<RentalApplication> {
    let drafted = lifecycle
        .applications
        .create_draft(&tenant(), draft())
        .expect("draft opens");
    lifecycle
        .applications
        .submit(&tenant(), &drafted.record.id)
        .expect("submission succeeds")
}

pub(super) fn under_review(lifecycle: &InMemoryLifecycle) -> Versioned<RentalApplication> {
    let submitted = submitted(lifecycle);
    lifecycle
        .applications
        .begin_review(&landlord(), &submitted.record.id)
        .expect("review starts")
}

/// Loses the first `stale_updates` optimistic writes to a simulated concurrent writer.
pub(super) struct ContendedRepository {
    pub(super) inner: InMemoryApplicationRepository,
    pub(super) stale_updates: AtomicU8,
}

impl ContendedRepository {
    pub(super) fn losing(updates: u8) -> Self {
        Self {
            inner: InMemoryApplicationRepository::default(),
            stale_updates: AtomicU8::new(updates),
        }
    }
}

impl ApplicationRepository for ContendedRepository {
    fn insert(
        &self,
        record: RentalApplication,
    ) -> Result<Versioned<RentalApplication>, RepositoryError> {
        self.inner.insert(record)
    }

    fn update(
        &self,
        expected_revision: u64,
        record: RentalApplication,
    ) -> Result<Versioned<RentalApplication>, RepositoryError> {
        let remaining = self.stale_updates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.stale_updates.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::StaleRevision {
                expected: expected_revision,
                found: expected_revision + 1,
            });
        }
        self.inner.update(expected_revision, record)
    }

    fn fetch(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Versioned<RentalApplication>>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn in_flight(&self) -> Result<Vec<Versioned<RentalApplication>>, RepositoryError> {
        self.inner.in_flight()
    }

    fn for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<Versioned<RentalApplication>>, RepositoryError> {
        self.inner.for_property(property_id)
    }
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(
        &self,
        _record: RentalApplication,
    ) -> Result<Versioned<RentalApplication>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(
        &self,
        _expected_revision: u64,
        _record: RentalApplication,
    ) -> Result<Versioned<RentalApplication>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(
        &self,
        _id: &ApplicationId,
    ) -> Result<Option<Versioned<RentalApplication>>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn in_flight(&self) -> Result<Vec<Versioned<RentalApplication>>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn for_property(
        &self,
        _property_id: &PropertyId,
    ) -> Result<Vec<Versioned<RentalApplication>>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// A service over `repository` sharing the lifecycle's catalog, clock, and event log.
pub(super) fn service_over<R>(
    lifecycle: &InMemoryLifecycle,
    repository: Arc<R>,
) -> ApplicationService<R>
where
    R: ApplicationRepository + 'static,
{
    ApplicationService::new(
        repository,
        lifecycle.catalog.clone(),
        lifecycle.event_log.clone(),
        lifecycle.clock.clone(),
        &LifecycleConfig::default(),
    )
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
