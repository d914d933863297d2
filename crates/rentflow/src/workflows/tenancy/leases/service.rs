use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::{debug, info, warn};

use super::domain::{CreateLease, Lease, LeaseStatus, LeaseTerms, SignerRole, TerminateLease};
use super::lifecycle::{add_months, LeaseParties, SignOutcome};
use super::repository::{LeaseRepository, LeaseWrite};
use crate::config::LifecycleConfig;
use crate::workflows::tenancy::applications::{
    ApplicationRepository, ApplicationStatus, RentalApplication,
};
use crate::workflows::tenancy::catalog::{property_owner, CatalogError, PropertyCatalog};
use crate::workflows::tenancy::clock::Clock;
use crate::workflows::tenancy::domain::{
    Actor, ActorRole, ApplicationId, EntityKind, LeaseId, LifecycleError,
};
use crate::workflows::tenancy::events::{DomainEvent, EventError, EventPublisher};
use crate::workflows::tenancy::money::Currency;
use crate::workflows::tenancy::store::{retry_on_conflict, RepositoryError, StaleWrite, Versioned};
use crate::workflows::tenancy::sweep::SweepReport;

/// Service governing contract formation, termination, expiry, and renewal.
pub struct LeaseService<L, A> {
    leases: Arc<L>,
    applications: Arc<A>,
    catalog: Arc<dyn PropertyCatalog>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    currency: Currency,
    max_write_attempts: u8,
}

static LEASE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_lease_id() -> LeaseId {
    let id = LEASE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    LeaseId(format!("lease-{id:06}"))
}

/// What a committed signature did, for logging and event fan-out.
struct Signed {
    lease: Versioned<Lease>,
    role: SignerRole,
    outcome: SignOutcome,
    renewed: Option<LeaseId>,
}

impl<L, A> LeaseService<L, A>
where
    L: LeaseRepository + 'static,
    A: ApplicationRepository + 'static,
{
    pub fn new(
        leases: Arc<L>,
        applications: Arc<A>,
        catalog: Arc<dyn PropertyCatalog>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        config: &LifecycleConfig,
    ) -> Self {
        Self {
            leases,
            applications,
            catalog,
            events,
            clock,
            currency: config.currency.clone(),
            max_write_attempts: config.max_write_attempts,
        }
    }

    /// Drafts a lease for a property the calling landlord owns, optionally seeded from an
    /// approved application. Pre-supplied signatures set the initial status.
    pub fn create(
        &self,
        actor: &Actor,
        request: CreateLease,
    ) -> Result<Versioned<Lease>, LeaseServiceError> {
        if actor.role != ActorRole::Landlord {
            return Err(actor.deny("create leases").into());
        }

        let seed = match &request.application_id {
            Some(id) => Some(self.approved_application(id)?),
            None => None,
        };

        let property_id = match (&seed, request.property_id) {
            (Some(application), Some(property_id)) if property_id != application.property_id => {
                return Err(LifecycleError::validation(
                    "property_id",
                    format!(
                        "application {} is for property {}",
                        application.id, application.property_id
                    ),
                )
                .into())
            }
            (Some(application), _) => application.property_id.clone(),
            (None, Some(property_id)) => property_id,
            (None, None) => {
                return Err(LifecycleError::validation(
                    "property_id",
                    "required when no application is referenced",
                )
                .into())
            }
        };

        let tenant_id = match (&seed, request.tenant_id) {
            (Some(application), Some(tenant_id)) if tenant_id != application.tenant_id => {
                return Err(LifecycleError::validation(
                    "tenant_id",
                    format!("application {} belongs to another tenant", application.id),
                )
                .into())
            }
            (Some(application), _) => application.tenant_id.clone(),
            (None, Some(tenant_id)) => tenant_id,
            (None, None) => {
                return Err(LifecycleError::validation(
                    "tenant_id",
                    "required when no application is referenced",
                )
                .into())
            }
        };

        let landlord_id = property_owner::<LeaseServiceError>(self.catalog.as_ref(), &property_id)?;
        if landlord_id != actor.id {
            return Err(actor.deny("create leases for this property").into());
        }

        let start_date = request
            .terms
            .start_date
            .or_else(|| seed.as_ref().map(|application| application.desired_move_in))
            .ok_or_else(|| LifecycleError::validation("start_date", "required"))?;
        let end_date = match (request.terms.end_date, &seed) {
            (Some(end_date), _) => end_date,
            (None, Some(application)) => add_months(start_date, application.lease_term_months)?,
            (None, None) => return Err(LifecycleError::validation("end_date", "required").into()),
        };

        if let Some(active) = self.leases.active_for_property(&property_id)? {
            return Err(LifecycleError::ConflictingActiveLease {
                property_id,
                active_lease: active.record.id,
            }
            .into());
        }

        let parties = LeaseParties {
            id: next_lease_id(),
            application_id: request.application_id,
            renewal_of: None,
            property_id,
            tenant_id,
            landlord_id,
            currency: self.currency.clone(),
        };
        let lease = Lease::form(
            parties,
            start_date,
            end_date,
            &request.terms,
            request.tenant_signature,
            request.landlord_signature,
            self.clock.now(),
        )?;

        let stored = first(self.commit(vec![LeaseWrite::Insert(lease)])?)?;
        self.announce_created(&stored.record)?;
        Ok(stored)
    }

    /// Records the caller's signature in the role they hold on the lease. The second
    /// signature activates the lease and, for renewals, retires the predecessor in the same
    /// commit.
    pub fn sign(
        &self,
        actor: &Actor,
        lease_id: &LeaseId,
        signature_ref: String,
    ) -> Result<Versioned<Lease>, LeaseServiceError> {
        let signed = retry_on_conflict(
            self.max_write_attempts,
            EntityKind::Lease,
            lease_id.as_str(),
            || -> Result<_, LeaseServiceError> {
                let current = self.fetch(lease_id)?;
                let role = signer_role(actor, &current.record)
                    .ok_or_else(|| actor.deny("sign this lease"))?;

                let mut lease = current.record;
                let outcome = lease.sign(role, signature_ref.clone(), self.clock.now())?;
                if outcome == SignOutcome::AlreadySigned {
                    return Ok(Signed {
                        lease: Versioned::new(current.revision, lease),
                        role,
                        outcome,
                        renewed: None,
                    });
                }

                let predecessor_id = match (&outcome, &lease.renewal_of) {
                    (SignOutcome::Activated, Some(predecessor)) => Some(predecessor.clone()),
                    _ => None,
                };
                let mut writes = vec![LeaseWrite::Update {
                    expected_revision: current.revision,
                    lease,
                }];
                let mut renewed = None;
                if let Some(predecessor_id) = predecessor_id {
                    let predecessor = self.fetch(&predecessor_id)?;
                    let mut retired = predecessor.record;
                    // A predecessor terminated after the renewal was drafted keeps its
                    // status; the successor then stands alone.
                    if retired.ensure_renewable().is_ok() {
                        retired.mark_renewed()?;
                        writes.push(LeaseWrite::Update {
                            expected_revision: predecessor.revision,
                            lease: retired,
                        });
                        renewed = Some(predecessor_id);
                    } else {
                        debug!(
                            lease_id = %lease_id,
                            predecessor = %predecessor_id,
                            status = retired.status.label(),
                            "predecessor no longer renewable; activating standalone"
                        );
                    }
                }

                Ok(Signed {
                    lease: first(self.commit(writes)?)?,
                    role,
                    outcome,
                    renewed,
                })
            },
        )?;

        let Signed {
            lease,
            role,
            outcome,
            renewed,
        } = signed;
        match outcome {
            SignOutcome::AlreadySigned => {
                debug!(lease_id = %lease_id, signer = role.label(), "signature already on file");
                return Ok(lease);
            }
            SignOutcome::AwaitingCounterparty(status) => {
                info!(
                    lease_id = %lease_id,
                    signer = role.label(),
                    status = status.label(),
                    "lease signed"
                );
            }
            SignOutcome::Activated => {
                info!(lease_id = %lease_id, signer = role.label(), "lease activated");
            }
        }

        self.events.publish(DomainEvent::LeaseSigned {
            lease_id: lease_id.clone(),
            signer: role,
        })?;
        if outcome == SignOutcome::Activated {
            self.events.publish(DomainEvent::LeaseActivated {
                lease: Box::new(lease.record.clone()),
            })?;
        }
        if let Some(predecessor) = renewed {
            info!(predecessor = %predecessor, successor = %lease_id, "lease renewed");
            self.events.publish(DomainEvent::LeaseRenewed {
                predecessor,
                successor: lease_id.clone(),
            })?;
        }
        Ok(lease)
    }

    /// Ends an active lease early. Entries due after the termination date are cancelled
    /// by the payment schedule engine.
    pub fn terminate(
        &self,
        actor: &Actor,
        lease_id: &LeaseId,
        request: TerminateLease,
    ) -> Result<Versioned<Lease>, LeaseServiceError> {
        let stored = retry_on_conflict(
            self.max_write_attempts,
            EntityKind::Lease,
            lease_id.as_str(),
            || -> Result<_, LeaseServiceError> {
                let current = self.fetch(lease_id)?;
                if !(actor.is_admin()
                    || actor.acts_as(ActorRole::Landlord, &current.record.landlord_id))
                {
                    return Err(actor.deny("terminate this lease").into());
                }

                let mut lease = current.record;
                lease.terminate(request.clone(), self.clock.now())?;
                first(self.commit(vec![LeaseWrite::Update {
                    expected_revision: current.revision,
                    lease,
                }])?)
            },
        )?;

        info!(
            lease_id = %lease_id,
            termination_date = %request.date,
            reason = %request.reason,
            "lease terminated"
        );
        self.events.publish(DomainEvent::LeaseTerminated {
            lease_id: lease_id.clone(),
            property_id: stored.record.property_id.clone(),
            tenant_id: stored.record.tenant_id.clone(),
            termination_date: request.date,
            reason: request.reason,
        })?;
        Ok(stored)
    }

    /// Moves an active lease past its end date to Expired. Returns `None` while the term
    /// is still running.
    pub fn expire(
        &self,
        lease_id: &LeaseId,
        as_of: NaiveDate,
    ) -> Result<Option<Versioned<Lease>>, LeaseServiceError> {
        let expired = retry_on_conflict(
            self.max_write_attempts,
            EntityKind::Lease,
            lease_id.as_str(),
            || -> Result<_, LeaseServiceError> {
                let current = self.fetch(lease_id)?;
                let mut lease = current.record;
                if !lease.expire(as_of)? {
                    return Ok(None);
                }
                let stored = first(self.commit(vec![LeaseWrite::Update {
                    expected_revision: current.revision,
                    lease,
                }])?)?;
                Ok(Some(stored))
            },
        )?;

        if let Some(stored) = &expired {
            info!(lease_id = %lease_id, as_of = %as_of, "lease expired");
            self.events.publish(DomainEvent::LeaseExpired {
                lease_id: lease_id.clone(),
                property_id: stored.record.property_id.clone(),
                as_of,
            })?;
        }
        Ok(expired)
    }

    pub fn sweep_expired(&self, as_of: NaiveDate) -> Result<SweepReport, LeaseServiceError> {
        let mut report = SweepReport::new(as_of);

        for candidate in self.leases.active()? {
            report.examined += 1;
            let lease_id = candidate.record.id;
            match self.expire(&lease_id, as_of) {
                Ok(Some(_)) => report.transitioned.push(lease_id.to_string()),
                Ok(None) => {}
                Err(LeaseServiceError::Lifecycle(LifecycleError::InvalidTransition { .. })) => {
                    debug!(lease_id = %lease_id, "lease left Active before the sweep reached it");
                }
                Err(error) => {
                    warn!(lease_id = %lease_id, %error, "lease expiry sweep skipped lease");
                    report.record_failure(lease_id.as_str(), error);
                }
            }
        }

        info!(
            as_of = %as_of,
            examined = report.examined,
            expired = report.transitioned.len(),
            failures = report.failures.len(),
            "lease expiry sweep finished"
        );
        Ok(report)
    }

    /// Every active lease; the schedule backfill input.
    pub fn active_leases(&self) -> Result<Vec<Lease>, LeaseServiceError> {
        Ok(self
            .leases
            .active()?
            .into_iter()
            .map(Versioned::into_record)
            .collect())
    }

    /// Drafts a successor for an active or expired lease. The predecessor becomes Renewed
    /// only when the successor is activated.
    pub fn renew(
        &self,
        actor: &Actor,
        lease_id: &LeaseId,
        terms: LeaseTerms,
    ) -> Result<Versioned<Lease>, LeaseServiceError> {
        let predecessor = self.fetch(lease_id)?.record;
        if !actor.acts_as(ActorRole::Landlord, &predecessor.landlord_id) {
            return Err(actor.deny("renew this lease").into());
        }
        predecessor.ensure_renewable()?;

        let start_date = match terms.start_date {
            Some(start_date) => start_date,
            None => predecessor
                .end_date
                .checked_add_days(Days::new(1))
                .ok_or_else(|| {
                    LifecycleError::validation("start_date", "renewal start overflows the calendar")
                })?,
        };
        let end_date = terms
            .end_date
            .ok_or_else(|| LifecycleError::validation("end_date", "required for a renewal"))?;

        let parties = LeaseParties {
            id: next_lease_id(),
            application_id: predecessor.application_id.clone(),
            renewal_of: Some(predecessor.id.clone()),
            property_id: predecessor.property_id.clone(),
            tenant_id: predecessor.tenant_id.clone(),
            landlord_id: predecessor.landlord_id.clone(),
            currency: predecessor.currency.clone(),
        };
        let successor = Lease::form(
            parties,
            start_date,
            end_date,
            &terms,
            None,
            None,
            self.clock.now(),
        )?;

        let stored = first(self.commit(vec![LeaseWrite::Insert(successor)])?)?;
        info!(predecessor = %lease_id, successor = %stored.record.id, "renewal drafted");
        self.announce_created(&stored.record)?;
        Ok(stored)
    }

    /// Readable by the lease's tenant and landlord, and by admins.
    pub fn get(
        &self,
        actor: &Actor,
        lease_id: &LeaseId,
    ) -> Result<Versioned<Lease>, LeaseServiceError> {
        let stored = self.fetch(lease_id)?;
        let lease = &stored.record;
        if actor.is_admin()
            || actor.acts_as(ActorRole::Tenant, &lease.tenant_id)
            || actor.acts_as(ActorRole::Landlord, &lease.landlord_id)
        {
            Ok(stored)
        } else {
            Err(actor.deny("view this lease").into())
        }
    }

    fn announce_created(&self, lease: &Lease) -> Result<(), LeaseServiceError> {
        info!(
            lease_id = %lease.id,
            property_id = %lease.property_id,
            status = lease.status.label(),
            "lease created"
        );
        self.events.publish(DomainEvent::LeaseCreated {
            lease_id: lease.id.clone(),
            property_id: lease.property_id.clone(),
            status: lease.status,
        })?;
        if lease.status == LeaseStatus::Active {
            self.events.publish(DomainEvent::LeaseActivated {
                lease: Box::new(lease.clone()),
            })?;
        }
        Ok(())
    }

    fn approved_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<RentalApplication, LeaseServiceError> {
        let application = self
            .applications
            .fetch(application_id)?
            .ok_or_else(|| LifecycleError::not_found(EntityKind::Application, application_id))?
            .into_record();
        if application.status != ApplicationStatus::Approved {
            return Err(LifecycleError::invalid_transition(
                EntityKind::Application,
                "seed a lease from",
                application.status.label(),
            )
            .into());
        }
        Ok(application)
    }

    fn fetch(&self, lease_id: &LeaseId) -> Result<Versioned<Lease>, LeaseServiceError> {
        self.leases
            .fetch(lease_id)?
            .ok_or_else(|| LifecycleError::not_found(EntityKind::Lease, lease_id).into())
    }

    /// Commits a batch, translating the active-lease index violation into the domain error.
    fn commit(&self, writes: Vec<LeaseWrite>) -> Result<Vec<Versioned<Lease>>, LeaseServiceError> {
        self.leases.commit(writes).map_err(|err| match err {
            RepositoryError::ActivePropertyLease {
                property_id,
                lease_id,
            } => LifecycleError::ConflictingActiveLease {
                property_id,
                active_lease: lease_id,
            }
            .into(),
            other => other.into(),
        })
    }
}

fn signer_role(actor: &Actor, lease: &Lease) -> Option<SignerRole> {
    if actor.acts_as(ActorRole::Tenant, &lease.tenant_id) {
        Some(SignerRole::Tenant)
    } else if actor.acts_as(ActorRole::Landlord, &lease.landlord_id) {
        Some(SignerRole::Landlord)
    } else {
        None
    }
}

fn first(written: Vec<Versioned<Lease>>) -> Result<Versioned<Lease>, LeaseServiceError> {
    written
        .into_iter()
        .next()
        .ok_or_else(|| RepositoryError::Unavailable("commit returned no rows".to_string()).into())
}

/// Error raised by the lease service.
#[derive(Debug, thiserror::Error)]
pub enum LeaseServiceError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Events(#[from] EventError),
}

impl StaleWrite for LeaseServiceError {
    fn is_stale_write(&self) -> bool {
        matches!(self, LeaseServiceError::Repository(err) if err.is_stale_write())
    }
}
