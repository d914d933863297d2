//! Pure state transitions for leases.

use chrono::{DateTime, Months, NaiveDate, Utc};

use super::domain::{
    Lease, LeaseStatus, LeaseTerms, SignatureCapture, SignerRole, TerminateLease, Termination,
};
use crate::workflows::tenancy::domain::{
    ActorId, ApplicationId, EntityKind, LeaseId, LifecycleError, PropertyId,
};
use crate::workflows::tenancy::money::{Currency, Money};

/// Who and what a new lease binds, resolved by the service before formation.
#[derive(Debug, Clone)]
pub struct LeaseParties {
    pub id: LeaseId,
    pub application_id: Option<ApplicationId>,
    pub renewal_of: Option<LeaseId>,
    pub property_id: PropertyId,
    pub tenant_id: ActorId,
    pub landlord_id: ActorId,
    pub currency: Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutcome {
    /// The role had already signed; nothing changed.
    AlreadySigned,
    /// Recorded; the lease now waits on the other party.
    AwaitingCounterparty(LeaseStatus),
    /// Both signatures are on file and the lease is active.
    Activated,
}

impl Lease {
    /// Builds a lease in the status implied by any pre-supplied signatures.
    pub fn form(
        parties: LeaseParties,
        start_date: NaiveDate,
        end_date: NaiveDate,
        terms: &LeaseTerms,
        tenant_signature: Option<String>,
        landlord_signature: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, LifecycleError> {
        validate_terms(start_date, end_date, terms)?;

        let tenant_signature = tenant_signature
            .map(|reference| capture(reference, now))
            .transpose()?;
        let landlord_signature = landlord_signature
            .map(|reference| capture(reference, now))
            .transpose()?;
        let status =
            LeaseStatus::from_signatures(tenant_signature.is_some(), landlord_signature.is_some());

        Ok(Self {
            id: parties.id,
            application_id: parties.application_id,
            renewal_of: parties.renewal_of,
            property_id: parties.property_id,
            tenant_id: parties.tenant_id,
            landlord_id: parties.landlord_id,
            status,
            currency: parties.currency,
            start_date,
            end_date,
            monthly_rent: terms.monthly_rent,
            security_deposit: terms.security_deposit,
            payment_due_day: terms.payment_due_day,
            late_fee_amount: terms.late_fee_amount,
            late_fee_grace_days: terms.late_fee_grace_days,
            tenant_signature,
            landlord_signature,
            termination: None,
            created_at: now,
            activated_at: (status == LeaseStatus::Active).then_some(now),
        })
    }

    /// Records a signature. Either party may sign first; signing twice is a no-op.
    pub fn sign(
        &mut self,
        role: SignerRole,
        signature_ref: String,
        now: DateTime<Utc>,
    ) -> Result<SignOutcome, LifecycleError> {
        if self.signature(role).is_some() {
            return Ok(SignOutcome::AlreadySigned);
        }
        if !self.status.is_forming() {
            return Err(self.reject("sign"));
        }

        let captured = capture(signature_ref, now)?;
        match role {
            SignerRole::Tenant => self.tenant_signature = Some(captured),
            SignerRole::Landlord => self.landlord_signature = Some(captured),
        }

        self.status = LeaseStatus::from_signatures(
            self.tenant_signature.is_some(),
            self.landlord_signature.is_some(),
        );
        if self.status == LeaseStatus::Active {
            self.activated_at = Some(now);
            Ok(SignOutcome::Activated)
        } else {
            Ok(SignOutcome::AwaitingCounterparty(self.status))
        }
    }

    pub fn terminate(
        &mut self,
        request: TerminateLease,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if self.status != LeaseStatus::Active {
            return Err(self.reject("terminate"));
        }
        if request.reason.trim().is_empty() {
            return Err(LifecycleError::validation("reason", "must not be empty"));
        }
        if request.date < self.start_date {
            return Err(LifecycleError::validation(
                "date",
                format!("termination precedes the lease start {}", self.start_date),
            ));
        }

        self.status = LeaseStatus::Terminated;
        self.termination = Some(Termination {
            reason: request.reason,
            date: request.date,
            notes: request.notes,
            recorded_at: now,
        });
        Ok(())
    }

    /// Returns `false` while the term is still running at `as_of`.
    pub fn expire(&mut self, as_of: NaiveDate) -> Result<bool, LifecycleError> {
        if self.status != LeaseStatus::Active {
            return Err(self.reject("expire"));
        }
        if self.end_date >= as_of {
            return Ok(false);
        }
        self.status = LeaseStatus::Expired;
        Ok(true)
    }

    pub fn ensure_renewable(&self) -> Result<(), LifecycleError> {
        match self.status {
            LeaseStatus::Active | LeaseStatus::Expired => Ok(()),
            _ => Err(self.reject("renew")),
        }
    }

    /// Closes the predecessor once its successor is active.
    pub fn mark_renewed(&mut self) -> Result<(), LifecycleError> {
        self.ensure_renewable()?;
        self.status = LeaseStatus::Renewed;
        Ok(())
    }

    fn reject(&self, operation: &'static str) -> LifecycleError {
        LifecycleError::invalid_transition(EntityKind::Lease, operation, self.status.label())
    }
}

pub fn validate_terms(
    start_date: NaiveDate,
    end_date: NaiveDate,
    terms: &LeaseTerms,
) -> Result<(), LifecycleError> {
    if end_date <= start_date {
        return Err(LifecycleError::validation(
            "end_date",
            format!("{end_date} must be after the start date {start_date}"),
        ));
    }
    Money::positive(terms.monthly_rent.amount(), "monthly_rent")?;
    if !(1..=31).contains(&terms.payment_due_day) {
        return Err(LifecycleError::validation(
            "payment_due_day",
            format!("{} is outside 1..=31", terms.payment_due_day),
        ));
    }
    Money::non_negative(terms.security_deposit.amount(), "security_deposit")?;
    Money::non_negative(terms.late_fee_amount.amount(), "late_fee_amount")?;
    Ok(())
}

/// `start + months`, clamped to the end of shorter months.
pub fn add_months(start: NaiveDate, months: u16) -> Result<NaiveDate, LifecycleError> {
    start
        .checked_add_months(Months::new(u32::from(months)))
        .ok_or_else(|| LifecycleError::validation("end_date", "lease term overflows the calendar"))
}

fn capture(signature_ref: String, now: DateTime<Utc>) -> Result<SignatureCapture, LifecycleError> {
    if signature_ref.trim().is_empty() {
        return Err(LifecycleError::validation(
            "signature",
            "signature reference must not be empty",
        ));
    }
    Ok(SignatureCapture {
        signed_at: now,
        signature_ref,
    })
}
