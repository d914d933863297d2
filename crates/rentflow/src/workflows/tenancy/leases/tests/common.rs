use std::sync::Arc;

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::config::LifecycleConfig;
use crate::workflows::tenancy::applications::{
    ApplicationDraft, EmergencyContact, RentalApplication, ReviewDecision,
};
use crate::workflows::tenancy::clock::FixedClock;
use crate::workflows::tenancy::domain::{Actor, ActorId, PropertyId};
use crate::workflows::tenancy::leases::{CreateLease, Lease, LeaseTerms};
use crate::workflows::tenancy::memory::InMemoryLifecycle;
use crate::workflows::tenancy::money::Money;
use crate::workflows::tenancy::store::Versioned;

pub(super) const PROPERTY: &str = "prop-oak-3";
pub(super) const LANDLORD: &str = "landlord-kim";
pub(super) const TENANT: &str = "tenant-ravi";

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn tenant() -> Actor {
    Actor::tenant(TENANT)
}

pub(super) fn landlord() -> Actor {
    Actor::landlord(LANDLORD)
}

pub(super) fn admin() -> Actor {
    Actor::admin("ops-desk")
}

pub(super) fn lifecycle() -> (InMemoryLifecycle, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::on(date(2024, 1, 10)));
    let lifecycle = InMemoryLifecycle::new(clock.clone(), &LifecycleConfig::default());
    lifecycle
        .catalog
        .register(PropertyId::new(PROPERTY), ActorId::new(LANDLORD));
    (lifecycle, clock)
}

/// Twelve months from 2024-02-01, rent due on the first.
pub(super) fn terms() -> LeaseTerms {
    LeaseTerms {
        start_date: Some(date(2024, 2, 1)),
        end_date: Some(date(2025, 2, 1)),
        monthly_rent: Money::from_units(1_500),
        security_deposit: Money::from_units(1_500),
        payment_due_day: 1,
        late_fee_amount: Money::from_units(75),
        late_fee_grace_days: 5,
    }
}

pub(super) fn direct_request() -> CreateLease {
    CreateLease {
        application_id: None,
        property_id: Some(PropertyId::new(PROPERTY)),
        tenant_id: Some(ActorId::new(TENANT)),
        terms: terms(),
        tenant_signature: None,
        landlord_signature: None,
    }
}

pub(super) fn approved_application(lifecycle: &InMemoryLifecycle) -> Versioned<RentalApplication> {
    let tenant = tenant();
    let drafted = lifecycle
        .applications
        .create_draft(
            &tenant,
            ApplicationDraft {
                property_id: PropertyId::new(PROPERTY),
                desired_move_in: date(2024, 3, 1),
                lease_term_months: 6,
                number_of_occupants: 1,
                monthly_income: Money::from_units(4_800),
                emergency_contact: Some(EmergencyContact {
                    name: "Mina Rao".to_string(),
                    phone: "+1-555-0142".to_string(),
                    relationship: None,
                }),
                stage: None,
            },
        )
        .expect("draft opens");
    let id = drafted.record.id;
    lifecycle
        .applications
        .submit(&tenant, &id)
        .expect("submission succeeds");
    lifecycle
        .applications
        .begin_review(&landlord(), &id)
        .expect("review starts");
    lifecycle
        .applications
        .decide(&landlord(), &id, ReviewDecision::Approved, None)
        .expect("approved")
}

pub(super) fn draft_lease(lifecycle: &InMemoryLifecycle) -> Versioned<Lease> {
    lifecycle
        .leases
        .create(&landlord(), direct_request())
        .expect("lease drafted")
}

pub(super) fn active_lease(lifecycle: &InMemoryLifecycle) -> Versioned<Lease> {
    let drafted = draft_lease(lifecycle);
    lifecycle
        .leases
        .sign(&tenant(), &drafted.record.id, "sig://tenant".to_string())
        .expect("tenant signs");
    lifecycle
        .leases
        .sign(&landlord(), &drafted.record.id, "sig://landlord".to_string())
        .expect("landlord signs")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
