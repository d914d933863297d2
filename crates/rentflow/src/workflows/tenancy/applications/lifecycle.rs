//! Pure state transitions for rental applications.
//!
//! `Draft → Submitted → UnderReview → {Approved, Rejected, AdditionalInfoRequested}`,
//! `AdditionalInfoRequested → Submitted` (via `submit` only), and
//! `{Submitted, UnderReview, AdditionalInfoRequested} → {Withdrawn, Expired}`.

use chrono::{DateTime, NaiveDate, Utc};

use super::domain::{
    ApplicationChanges, ApplicationDraft, ApplicationStatus, RentalApplication, ReviewDecision,
    ReviewRecord,
};
use crate::workflows::tenancy::domain::{ActorId, ApplicationId, EntityKind, LifecycleError};

/// Result of a successful `submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// True when the application came back from `AdditionalInfoRequested`.
    pub resubmission: bool,
}

impl RentalApplication {
    pub fn open_draft(
        id: ApplicationId,
        tenant_id: ActorId,
        draft: ApplicationDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, LifecycleError> {
        validate_lease_term(draft.lease_term_months)?;
        if draft.monthly_income.amount().is_sign_negative() {
            return Err(LifecycleError::validation(
                "monthly_income",
                "must not be negative",
            ));
        }

        Ok(Self {
            id,
            property_id: draft.property_id,
            tenant_id,
            status: ApplicationStatus::Draft,
            stage: draft.stage.unwrap_or_default(),
            desired_move_in: draft.desired_move_in,
            lease_term_months: draft.lease_term_months,
            number_of_occupants: draft.number_of_occupants,
            monthly_income: draft.monthly_income,
            emergency_contact: draft.emergency_contact,
            created_at: now,
            submitted_at: None,
            assigned_reviewer: None,
            reviewed_at: None,
            reviewed_by: None,
            review_comments: None,
            review_history: Vec::new(),
            closed_at: None,
        })
    }

    /// Content edits; only while the tenant holds the pen.
    pub fn apply_changes(&mut self, changes: ApplicationChanges) -> Result<(), LifecycleError> {
        if !self.status.is_editable() {
            return Err(self.reject("edit"));
        }
        if let Some(months) = changes.lease_term_months {
            validate_lease_term(months)?;
        }
        if let Some(income) = changes.monthly_income {
            if income.amount().is_sign_negative() {
                return Err(LifecycleError::validation(
                    "monthly_income",
                    "must not be negative",
                ));
            }
            self.monthly_income = income;
        }

        if let Some(date) = changes.desired_move_in {
            self.desired_move_in = date;
        }
        if let Some(months) = changes.lease_term_months {
            self.lease_term_months = months;
        }
        if let Some(occupants) = changes.number_of_occupants {
            self.number_of_occupants = occupants;
        }
        if let Some(contact) = changes.emergency_contact {
            self.emergency_contact = Some(contact);
        }
        if let Some(stage) = changes.stage {
            self.stage = stage;
        }
        Ok(())
    }

    pub fn submit(
        &mut self,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Submission, LifecycleError> {
        if !self.status.is_editable() {
            return Err(self.reject("submit"));
        }

        if !self.monthly_income.is_positive() {
            return Err(LifecycleError::validation(
                "monthly_income",
                "must be greater than zero",
            ));
        }
        if self.desired_move_in <= today {
            return Err(LifecycleError::validation(
                "desired_move_in",
                format!("{} is not in the future", self.desired_move_in),
            ));
        }
        validate_lease_term(self.lease_term_months)?;
        if self.number_of_occupants == 0 {
            return Err(LifecycleError::validation(
                "number_of_occupants",
                "at least one occupant is required",
            ));
        }
        match &self.emergency_contact {
            Some(contact)
                if !contact.name.trim().is_empty() && !contact.phone.trim().is_empty() => {}
            _ => {
                return Err(LifecycleError::validation(
                    "emergency_contact",
                    "name and phone are required",
                ))
            }
        }

        let resubmission = self.status == ApplicationStatus::AdditionalInfoRequested;
        self.status = ApplicationStatus::Submitted;
        self.clear_decision();
        if self.submitted_at.is_none() {
            self.submitted_at = Some(now);
        }
        Ok(Submission { resubmission })
    }

    /// Returns `false` when the application is already under review.
    pub fn begin_review(&mut self, reviewer: &ActorId) -> Result<bool, LifecycleError> {
        match self.status {
            ApplicationStatus::UnderReview => Ok(false),
            ApplicationStatus::Submitted => {
                self.status = ApplicationStatus::UnderReview;
                self.assigned_reviewer = Some(reviewer.clone());
                Ok(true)
            }
            _ => Err(self.reject("begin review of")),
        }
    }

    pub fn decide(
        &mut self,
        decision: ReviewDecision,
        reviewer: &ActorId,
        comments: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if self.status != ApplicationStatus::UnderReview {
            return Err(self.reject("decide"));
        }

        self.status = decision.status();
        self.reviewed_at = Some(now);
        self.reviewed_by = Some(reviewer.clone());
        self.review_comments = comments.clone();
        self.review_history.push(ReviewRecord {
            decision,
            reviewer: reviewer.clone(),
            comments,
            decided_at: now,
        });
        if self.status.is_terminal() {
            self.closed_at = Some(now);
        }
        Ok(())
    }

    pub fn withdraw(&mut self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        if !self.status.is_in_flight() {
            return Err(self.reject("withdraw"));
        }
        self.status = ApplicationStatus::Withdrawn;
        self.clear_decision();
        self.closed_at = Some(now);
        Ok(())
    }

    /// Returns `false` when the move-in date has not yet passed `as_of`.
    pub fn expire(&mut self, as_of: NaiveDate, now: DateTime<Utc>) -> Result<bool, LifecycleError> {
        if !self.status.is_in_flight() {
            return Err(self.reject("expire"));
        }
        if self.desired_move_in >= as_of {
            return Ok(false);
        }
        self.status = ApplicationStatus::Expired;
        self.clear_decision();
        self.closed_at = Some(now);
        Ok(true)
    }

    /// Decision fields describe the current status only; history keeps the rest.
    fn clear_decision(&mut self) {
        self.reviewed_at = None;
        self.reviewed_by = None;
        self.review_comments = None;
    }

    fn reject(&self, operation: &'static str) -> LifecycleError {
        LifecycleError::invalid_transition(EntityKind::Application, operation, self.status.label())
    }
}

fn validate_lease_term(months: u16) -> Result<(), LifecycleError> {
    if months == 0 {
        return Err(LifecycleError::validation(
            "lease_term_months",
            "must be at least one month",
        ));
    }
    Ok(())
}
