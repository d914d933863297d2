use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::domain::{ApplicationChanges, ApplicationDraft, RentalApplication, ReviewDecision};
use super::repository::ApplicationRepository;
use crate::config::LifecycleConfig;
use crate::workflows::tenancy::catalog::{property_owner, CatalogError, PropertyCatalog};
use crate::workflows::tenancy::clock::Clock;
use crate::workflows::tenancy::domain::{
    Actor, ActorRole, ApplicationId, EntityKind, LifecycleError, PropertyId,
};
use crate::workflows::tenancy::events::{DomainEvent, EventError, EventPublisher};
use crate::workflows::tenancy::store::{retry_on_conflict, RepositoryError, StaleWrite, Versioned};
use crate::workflows::tenancy::sweep::SweepReport;

/// Service driving applications from draft through the reviewer's decision.
pub struct ApplicationService<R> {
    repository: Arc<R>,
    catalog: Arc<dyn PropertyCatalog>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    max_write_attempts: u8,
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

impl<R> ApplicationService<R>
where
    R: ApplicationRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        catalog: Arc<dyn PropertyCatalog>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        config: &LifecycleConfig,
    ) -> Self {
        Self {
            repository,
            catalog,
            events,
            clock,
            max_write_attempts: config.max_write_attempts,
        }
    }

    /// Opens a draft for the calling tenant on a catalogued property.
    pub fn create_draft(
        &self,
        actor: &Actor,
        draft: ApplicationDraft,
    ) -> Result<Versioned<RentalApplication>, ApplicationServiceError> {
        if actor.role != ActorRole::Tenant {
            return Err(actor.deny("open applications").into());
        }
        property_owner::<ApplicationServiceError>(self.catalog.as_ref(), &draft.property_id)?;

        let record = RentalApplication::open_draft(
            next_application_id(),
            actor.id.clone(),
            draft,
            self.clock.now(),
        )?;
        let stored = self.repository.insert(record)?;
        info!(
            application_id = %stored.record.id,
            property_id = %stored.record.property_id,
            "application drafted"
        );
        Ok(stored)
    }

    pub fn update_draft(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        changes: ApplicationChanges,
    ) -> Result<Versioned<RentalApplication>, ApplicationServiceError> {
        retry_on_conflict(
            self.max_write_attempts,
            EntityKind::Application,
            application_id.as_str(),
            || -> Result<_, ApplicationServiceError> {
                let current = self.fetch(application_id)?;
                ensure_applicant(actor, &current.record, "edit this application")?;
                if changes.is_empty() {
                    return Ok(current);
                }

                let mut record = current.record;
                record.apply_changes(changes.clone())?;
                let stored = self.repository.update(current.revision, record)?;
                debug!(
                    application_id = %application_id,
                    revision = stored.revision,
                    "application edited"
                );
                Ok(stored)
            },
        )
    }

    pub fn submit(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<Versioned<RentalApplication>, ApplicationServiceError> {
        let (stored, submission) = retry_on_conflict(
            self.max_write_attempts,
            EntityKind::Application,
            application_id.as_str(),
            || -> Result<_, ApplicationServiceError> {
                let current = self.fetch(application_id)?;
                ensure_applicant(actor, &current.record, "submit this application")?;

                let mut record = current.record;
                let submission = record.submit(self.clock.today(), self.clock.now())?;
                let stored = self.repository.update(current.revision, record)?;
                Ok((stored, submission))
            },
        )?;

        info!(
            application_id = %application_id,
            resubmission = submission.resubmission,
            "application submitted"
        );
        self.events.publish(DomainEvent::ApplicationSubmitted {
            application_id: application_id.clone(),
            property_id: stored.record.property_id.clone(),
            tenant_id: stored.record.tenant_id.clone(),
            resubmission: submission.resubmission,
        })?;
        Ok(stored)
    }

    /// Takes a submitted application into review. Repeating the call is a no-op.
    pub fn begin_review(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<Versioned<RentalApplication>, ApplicationServiceError> {
        let (stored, started) = retry_on_conflict(
            self.max_write_attempts,
            EntityKind::Application,
            application_id.as_str(),
            || -> Result<_, ApplicationServiceError> {
                let current = self.fetch(application_id)?;
                self.ensure_reviewer(actor, &current.record, "review this application")?;

                let mut record = current.record.clone();
                if !record.begin_review(&actor.id)? {
                    return Ok((current, false));
                }
                Ok((self.repository.update(current.revision, record)?, true))
            },
        )?;

        if started {
            info!(application_id = %application_id, reviewer = %actor.id, "review started");
            self.events.publish(DomainEvent::ApplicationReviewStarted {
                application_id: application_id.clone(),
                reviewer: actor.id.clone(),
            })?;
        }
        Ok(stored)
    }

    pub fn decide(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        decision: ReviewDecision,
        comments: Option<String>,
    ) -> Result<Versioned<RentalApplication>, ApplicationServiceError> {
        let stored = retry_on_conflict(
            self.max_write_attempts,
            EntityKind::Application,
            application_id.as_str(),
            || -> Result<_, ApplicationServiceError> {
                let current = self.fetch(application_id)?;
                self.ensure_reviewer(actor, &current.record, "decide this application")?;

                let mut record = current.record;
                record.decide(decision, &actor.id, comments.clone(), self.clock.now())?;
                Ok(self.repository.update(current.revision, record)?)
            },
        )?;

        info!(
            application_id = %application_id,
            decision = decision.label(),
            reviewer = %actor.id,
            "application decided"
        );
        self.events.publish(DomainEvent::ApplicationDecided {
            application_id: application_id.clone(),
            property_id: stored.record.property_id.clone(),
            tenant_id: stored.record.tenant_id.clone(),
            decision,
            reviewer: actor.id.clone(),
            comments,
        })?;
        Ok(stored)
    }

    pub fn withdraw(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<Versioned<RentalApplication>, ApplicationServiceError> {
        let stored = retry_on_conflict(
            self.max_write_attempts,
            EntityKind::Application,
            application_id.as_str(),
            || -> Result<_, ApplicationServiceError> {
                let current = self.fetch(application_id)?;
                ensure_applicant(actor, &current.record, "withdraw this application")?;

                let mut record = current.record;
                record.withdraw(self.clock.now())?;
                Ok(self.repository.update(current.revision, record)?)
            },
        )?;

        info!(application_id = %application_id, "application withdrawn");
        self.events.publish(DomainEvent::ApplicationWithdrawn {
            application_id: application_id.clone(),
        })?;
        Ok(stored)
    }

    /// Closes an in-flight application whose move-in date passed before `as_of`.
    /// Returns `None` while the date is still ahead.
    pub fn expire(
        &self,
        application_id: &ApplicationId,
        as_of: NaiveDate,
    ) -> Result<Option<Versioned<RentalApplication>>, ApplicationServiceError> {
        let expired = retry_on_conflict(
            self.max_write_attempts,
            EntityKind::Application,
            application_id.as_str(),
            || -> Result<_, ApplicationServiceError> {
                let current = self.fetch(application_id)?;
                let mut record = current.record;
                if !record.expire(as_of, self.clock.now())? {
                    return Ok(None);
                }
                Ok(Some(self.repository.update(current.revision, record)?))
            },
        )?;

        if expired.is_some() {
            info!(application_id = %application_id, as_of = %as_of, "application expired");
            self.events.publish(DomainEvent::ApplicationExpired {
                application_id: application_id.clone(),
                as_of,
            })?;
        }
        Ok(expired)
    }

    pub fn sweep_expired(&self, as_of: NaiveDate) -> Result<SweepReport, ApplicationServiceError> {
        let mut report = SweepReport::new(as_of);

        for candidate in self.repository.in_flight()? {
            report.examined += 1;
            let application_id = candidate.record.id;
            match self.expire(&application_id, as_of) {
                Ok(Some(_)) => report.transitioned.push(application_id.to_string()),
                Ok(None) => {}
                Err(ApplicationServiceError::Lifecycle(LifecycleError::InvalidTransition {
                    ..
                })) => {
                    debug!(
                        application_id = %application_id,
                        "application closed before the sweep reached it"
                    );
                }
                Err(error) => {
                    warn!(
                        application_id = %application_id,
                        %error,
                        "application expiry sweep skipped record"
                    );
                    report.record_failure(application_id.as_str(), error);
                }
            }
        }

        info!(
            as_of = %as_of,
            examined = report.examined,
            expired = report.transitioned.len(),
            failures = report.failures.len(),
            "application expiry sweep finished"
        );
        Ok(report)
    }

    /// Readable by the applicant, the property's landlord, and admins.
    pub fn get(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<Versioned<RentalApplication>, ApplicationServiceError> {
        let stored = self.fetch(application_id)?;
        if actor.acts_as(ActorRole::Tenant, &stored.record.tenant_id) {
            return Ok(stored);
        }
        self.ensure_reviewer(actor, &stored.record, "view this application")?;
        Ok(stored)
    }

    /// Every application for a property, for its landlord or an admin.
    pub fn for_property(
        &self,
        actor: &Actor,
        property_id: &PropertyId,
    ) -> Result<Vec<Versioned<RentalApplication>>, ApplicationServiceError> {
        if !actor.is_admin() {
            let owner =
                property_owner::<ApplicationServiceError>(self.catalog.as_ref(), property_id)?;
            if !actor.acts_as(ActorRole::Landlord, &owner) {
                return Err(actor.deny("list applications for this property").into());
            }
        }
        Ok(self.repository.for_property(property_id)?)
    }

    /// Reviewers are admins and the landlord who owns the property.
    fn ensure_reviewer(
        &self,
        actor: &Actor,
        record: &RentalApplication,
        operation: &'static str,
    ) -> Result<(), ApplicationServiceError> {
        if actor.is_admin() {
            return Ok(());
        }
        if actor.role == ActorRole::Landlord {
            let owner = property_owner::<ApplicationServiceError>(
                self.catalog.as_ref(),
                &record.property_id,
            )?;
            if owner == actor.id {
                return Ok(());
            }
        }
        Err(actor.deny(operation).into())
    }

    fn fetch(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Versioned<RentalApplication>, ApplicationServiceError> {
        self.repository.fetch(application_id)?.ok_or_else(|| {
            LifecycleError::not_found(EntityKind::Application, application_id).into()
        })
    }
}

fn ensure_applicant(
    actor: &Actor,
    record: &RentalApplication,
    operation: &'static str,
) -> Result<(), LifecycleError> {
    if actor.acts_as(ActorRole::Tenant, &record.tenant_id) {
        Ok(())
    } else {
        Err(actor.deny(operation))
    }
}

/// Error raised by the application service.
#[derive(Debug, thiserror::Error)]
pub enum ApplicationServiceError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Events(#[from] EventError),
}

impl StaleWrite for ApplicationServiceError {
    fn is_stale_write(&self) -> bool {
        matches!(self, ApplicationServiceError::Repository(err) if err.is_stale_write())
    }
}
