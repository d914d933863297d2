use super::common::*;
use std::sync::Arc;

use crate::workflows::tenancy::applications::{
    ApplicationChanges, ApplicationServiceError, ApplicationStatus, ReviewDecision,
};
use crate::workflows::tenancy::domain::{
    Actor, ActorRole, ApplicationId, EntityKind, LifecycleError, PropertyId,
};
use crate::workflows::tenancy::events::DomainEvent;
use crate::workflows::tenancy::money::Money;

#[test]
fn only_tenants_open_drafts() {
    let (lifecycle, _) = lifecycle();

    match lifecycle.applications.create_draft(&landlord(), draft()) {
        Err(ApplicationServiceError::Lifecycle(LifecycleError::NotAuthorized {
            role: ActorRole::Landlord,
            ..
        })) => {}
        other => panic!("expected authorization failure, got {other:?}"),
    }
}

#[test]
fn drafts_require_a_catalogued_property() {
    let (lifecycle, _) = lifecycle();
    let mut draft = draft();
    draft.property_id = PropertyId::new("prop-unknown");

    match lifecycle.applications.create_draft(&tenant(), draft) {
        Err(ApplicationServiceError::Lifecycle(LifecycleError::Validation {
            field: "property_id",
            ..
        })) => {}
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn submit_validates_required_content() {
    let (lifecycle, _) = lifecycle();
    let mut incomplete = draft();
    incomplete.emergency_contact = None;
    let drafted = lifecycle
        .applications
        .create_draft(&tenant(), incomplete)
        .expect("incomplete drafts are allowed");

    match lifecycle.applications.submit(&tenant(), &drafted.record.id) {
        Err(ApplicationServiceError::Lifecycle(LifecycleError::Validation {
            field: "emergency_contact",
            ..
        })) => {}
        other => panic!("expected validation failure, got {other:?}"),
    }

    let stored = lifecycle
        .applications
        .get(&tenant(), &drafted.record.id)
        .expect("still readable");
    assert_eq!(stored.record.status, ApplicationStatus::Draft);
    assert!(lifecycle.event_log.names().is_empty());
}

#[test]
fn submit_rejects_a_move_in_that_is_not_in_the_future() {
    let (lifecycle, _) = lifecycle();
    let mut stale = draft();
    stale.desired_move_in = today();
    let drafted = lifecycle
        .applications
        .create_draft(&tenant(), stale)
        .expect("draft opens");

    match lifecycle.applications.submit(&tenant(), &drafted.record.id) {
        Err(ApplicationServiceError::Lifecycle(LifecycleError::Validation {
            field: "desired_move_in",
            ..
        })) => {}
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn approval_records_the_reviewer_and_notifies_the_tenant() {
    let (lifecycle, _) = lifecycle();
    let reviewing = under_review(&lifecycle);

    let decided = lifecycle
        .applications
        .decide(
            &landlord(),
            &reviewing.record.id,
            ReviewDecision::Approved,
            Some("references check out".to_string()),
        )
        .expect("decision recorded");

    assert_eq!(decided.record.status, ApplicationStatus::Approved);
    assert_eq!(decided.record.reviewed_by.as_ref().map(|id| id.as_str()), Some(LANDLORD));
    assert!(decided.record.reviewed_at.is_some());
    assert!(decided.record.closed_at.is_some());
    assert_eq!(
        lifecycle.event_log.names(),
        vec![
            "application_submitted",
            "application_review_started",
            "application_decided"
        ]
    );

    let notifications = lifecycle.outbox.drain();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].template, "application_approved");
    assert_eq!(notifications[0].subject_id, reviewing.record.id.as_str());
}

#[test]
fn approving_one_applicant_leaves_competitors_in_review() {
    let (lifecycle, _) = lifecycle();
    let chosen = under_review(&lifecycle);

    let rival = Actor::tenant("tenant-cass");
    let drafted = lifecycle
        .applications
        .create_draft(&rival, draft())
        .expect("rival draft opens");
    lifecycle
        .applications
        .submit(&rival, &drafted.record.id)
        .expect("rival submits");
    let competing = lifecycle
        .applications
        .begin_review(&landlord(), &drafted.record.id)
        .expect("rival review starts");

    lifecycle
        .applications
        .decide(&landlord(), &chosen.record.id, ReviewDecision::Approved, None)
        .expect("first applicant approved");

    let untouched = lifecycle
        .applications
        .get(&rival, &competing.record.id)
        .expect("rival still readable");
    assert_eq!(untouched.record.status, ApplicationStatus::UnderReview);
    assert_eq!(untouched.revision, competing.revision);
    assert!(untouched.record.reviewed_at.is_none());

    let statuses: Vec<ApplicationStatus> = lifecycle
        .applications
        .for_property(&landlord(), &PropertyId::new(PROPERTY))
        .expect("listing allowed")
        .into_iter()
        .map(|stored| stored.record.status)
        .collect();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.contains(&ApplicationStatus::Approved));
    assert!(statuses.contains(&ApplicationStatus::UnderReview));
}

#[test]
fn begin_review_is_idempotent() {
    let (lifecycle, _) = lifecycle();
    let reviewing = under_review(&lifecycle);

    let again = lifecycle
        .applications
        .begin_review(&Actor::admin("ops-1"), &reviewing.record.id)
        .expect("repeat is a no-op");

    assert_eq!(again.revision, reviewing.revision);
    assert_eq!(again.record.assigned_reviewer, reviewing.record.assigned_reviewer);
    let started = lifecycle
        .event_log
        .names()
        .into_iter()
        .filter(|name| *name == "application_review_started")
        .count();
    assert_eq!(started, 1);
}

#[test]
fn landlords_cannot_review_other_properties() {
    let (lifecycle, _) = lifecycle();
    let submitted = submitted(&lifecycle);

    match lifecycle
        .applications
        .begin_review(&Actor::landlord("landlord-other"), &submitted.record.id)
    {
        Err(ApplicationServiceError::Lifecycle(LifecycleError::NotAuthorized { .. })) => {}
        other => panic!("expected authorization failure, got {other:?}"),
    }
}

#[test]
fn decide_requires_review_to_have_started() {
    let (lifecycle, _) = lifecycle();
    let submitted = submitted(&lifecycle);

    match lifecycle.applications.decide(
        &landlord(),
        &submitted.record.id,
        ReviewDecision::Rejected,
        None,
    ) {
        Err(ApplicationServiceError::Lifecycle(LifecycleError::InvalidTransition {
            entity: EntityKind::Application,
            status: "submitted",
            ..
        })) => {}
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn info_request_round_trip_clears_the_decision_but_keeps_history() {
    let (lifecycle, _) = lifecycle();
    let reviewing = under_review(&lifecycle);
    let id = reviewing.record.id.clone();

    let asked = lifecycle
        .applications
        .decide(
            &landlord(),
            &id,
            ReviewDecision::AdditionalInfoRequested,
            Some("need a pay stub".to_string()),
        )
        .expect("info requested");
    assert_eq!(asked.record.status, ApplicationStatus::AdditionalInfoRequested);
    assert!(asked.record.closed_at.is_none());

    lifecycle
        .applications
        .update_draft(
            &tenant(),
            &id,
            ApplicationChanges {
                monthly_income: Some(Money::from_units(6_100)),
                ..ApplicationChanges::default()
            },
        )
        .expect("tenant can edit while info is requested");

    let resubmitted = lifecycle
        .applications
        .submit(&tenant(), &id)
        .expect("resubmission succeeds");
    assert_eq!(resubmitted.record.status, ApplicationStatus::Submitted);
    assert_eq!(resubmitted.record.monthly_income, Money::from_units(6_100));
    assert!(resubmitted.record.reviewed_by.is_none());
    assert!(resubmitted.record.review_comments.is_none());
    assert_eq!(resubmitted.record.review_history.len(), 1);
    assert_eq!(resubmitted.record.submitted_at, reviewing.record.submitted_at);

    let resubmission = lifecycle.event_log.events().into_iter().rev().find_map(|event| {
        match event {
            DomainEvent::ApplicationSubmitted { resubmission, .. } => Some(resubmission),
            _ => None,
        }
    });
    assert_eq!(resubmission, Some(true));
}

#[test]
fn submitted_applications_are_not_editable() {
    let (lifecycle, _) = lifecycle();
    let submitted = submitted(&lifecycle);

    match lifecycle.applications.update_draft(
        &tenant(),
        &submitted.record.id,
        ApplicationChanges {
            number_of_occupants: Some(3),
            ..ApplicationChanges::default()
        },
    ) {
        Err(ApplicationServiceError::Lifecycle(LifecycleError::InvalidTransition { .. })) => {}
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn withdrawal_is_only_possible_in_flight() {
    let (lifecycle, _) = lifecycle();
    let drafted = lifecycle
        .applications
        .create_draft(&tenant(), draft())
        .expect("draft opens");

    assert!(matches!(
        lifecycle.applications.withdraw(&tenant(), &drafted.record.id),
        Err(ApplicationServiceError::Lifecycle(LifecycleError::InvalidTransition { .. }))
    ));

    lifecycle
        .applications
        .submit(&tenant(), &drafted.record.id)
        .expect("submission succeeds");
    let withdrawn = lifecycle
        .applications
        .withdraw(&tenant(), &drafted.record.id)
        .expect("withdrawal succeeds");
    assert_eq!(withdrawn.record.status, ApplicationStatus::Withdrawn);

    assert!(matches!(
        lifecycle.applications.withdraw(&tenant(), &drafted.record.id),
        Err(ApplicationServiceError::Lifecycle(LifecycleError::InvalidTransition { .. }))
    ));
}

#[test]
fn only_the_applicant_may_withdraw() {
    let (lifecycle, _) = lifecycle();
    let submitted = submitted(&lifecycle);

    assert!(matches!(
        lifecycle
            .applications
            .withdraw(&Actor::tenant("tenant-other"), &submitted.record.id),
        Err(ApplicationServiceError::Lifecycle(LifecycleError::NotAuthorized { .. }))
    ));
    assert!(matches!(
        lifecycle.applications.withdraw(&landlord(), &submitted.record.id),
        Err(ApplicationServiceError::Lifecycle(LifecycleError::NotAuthorized { .. }))
    ));
}

#[test]
fn expiry_waits_until_the_move_in_date_has_passed() {
    let (lifecycle, _) = lifecycle();
    let submitted = submitted(&lifecycle);
    let approved = under_review(&lifecycle);
    lifecycle
        .applications
        .decide(&landlord(), &approved.record.id, ReviewDecision::Approved, None)
        .expect("approved");

    let on_move_in = lifecycle
        .applications
        .sweep_expired(date(2024, 2, 1))
        .expect("sweep runs");
    assert_eq!(on_move_in.examined, 1);
    assert!(on_move_in.transitioned.is_empty());

    let after = lifecycle
        .applications
        .sweep_expired(date(2024, 2, 2))
        .expect("sweep runs");
    assert_eq!(after.transitioned, vec![submitted.record.id.to_string()]);
    assert!(after.is_clean());

    let expired = lifecycle
        .applications
        .get(&tenant(), &submitted.record.id)
        .expect("readable");
    assert_eq!(expired.record.status, ApplicationStatus::Expired);
    let still_approved = lifecycle
        .applications
        .get(&tenant(), &approved.record.id)
        .expect("readable");
    assert_eq!(still_approved.record.status, ApplicationStatus::Approved);

    let rerun = lifecycle
        .applications
        .sweep_expired(date(2024, 2, 2))
        .expect("sweep runs");
    assert_eq!(rerun.examined, 0);
}

#[test]
fn reads_are_scoped_to_parties() {
    let (lifecycle, _) = lifecycle();
    let submitted = submitted(&lifecycle);

    assert!(lifecycle.applications.get(&landlord(), &submitted.record.id).is_ok());
    assert!(lifecycle
        .applications
        .get(&Actor::admin("ops-1"), &submitted.record.id)
        .is_ok());
    assert!(matches!(
        lifecycle
            .applications
            .get(&Actor::tenant("tenant-other"), &submitted.record.id),
        Err(ApplicationServiceError::Lifecycle(LifecycleError::NotAuthorized { .. }))
    ));

    let listed = lifecycle
        .applications
        .for_property(&landlord(), &PropertyId::new(PROPERTY))
        .expect("owner lists applications");
    assert_eq!(listed.len(), 1);
    assert!(lifecycle
        .applications
        .for_property(&tenant(), &PropertyId::new(PROPERTY))
        .is_err());
}

#[test]
fn missing_applications_report_not_found() {
    let (lifecycle, _) = lifecycle();

    match lifecycle
        .applications
        .submit(&tenant(), &ApplicationId::new("app-missing"))
    {
        Err(ApplicationServiceError::Lifecycle(LifecycleError::NotFound {
            entity: EntityKind::Application,
            ..
        })) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn stale_writes_are_retried_against_fresh_state() {
    let (lifecycle, _) = lifecycle();
    let repository = Arc::new(ContendedRepository::losing(2));
    let service = service_over(&lifecycle, repository.clone());

    let drafted = service.create_draft(&tenant(), draft()).expect("draft opens");
    let submitted = service
        .submit(&tenant(), &drafted.record.id)
        .expect("third attempt lands");

    assert_eq!(submitted.record.status, ApplicationStatus::Submitted);
    assert_eq!(submitted.revision, 2);
}

#[test]
fn persistent_contention_surfaces_a_retryable_conflict() {
    let (lifecycle, _) = lifecycle();
    let repository = Arc::new(ContendedRepository::losing(10));
    let service = service_over(&lifecycle, repository);

    let drafted = service.create_draft(&tenant(), draft()).expect("draft opens");
    match service.submit(&tenant(), &drafted.record.id) {
        Err(ApplicationServiceError::Lifecycle(
            err @ LifecycleError::ConcurrencyConflict { .. },
        )) => {
            assert!(err.is_retryable());
        }
        other => panic!("expected concurrency conflict, got {other:?}"),
    }
    assert!(lifecycle.event_log.names().is_empty());
}
