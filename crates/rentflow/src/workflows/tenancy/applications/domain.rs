use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::tenancy::domain::{ActorId, ApplicationId, PropertyId};
use crate::workflows::tenancy::money::Money;

/// High level status tracked throughout the application workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    AdditionalInfoRequested,
    Withdrawn,
    Expired,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::AdditionalInfoRequested => "additional_info_requested",
            ApplicationStatus::Withdrawn => "withdrawn",
            ApplicationStatus::Expired => "expired",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Approved
                | ApplicationStatus::Rejected
                | ApplicationStatus::Withdrawn
                | ApplicationStatus::Expired
        )
    }

    /// States that carry a reviewer decision (`reviewed_at`/`reviewed_by`).
    pub const fn carries_decision(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Approved
                | ApplicationStatus::Rejected
                | ApplicationStatus::AdditionalInfoRequested
        )
    }

    /// Post-submission states from which withdrawal and expiry are allowed.
    pub const fn is_in_flight(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Submitted
                | ApplicationStatus::UnderReview
                | ApplicationStatus::AdditionalInfoRequested
        )
    }

    /// States in which the tenant may still edit content.
    pub const fn is_editable(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Draft | ApplicationStatus::AdditionalInfoRequested
        )
    }
}

/// Progress through the intake form; purely informational for the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStage {
    #[default]
    PersonalDetails,
    Employment,
    Household,
    References,
    Documents,
    Review,
}

/// Reviewer outcomes accepted by `decide`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
    AdditionalInfoRequested,
}

impl ReviewDecision {
    pub const fn status(self) -> ApplicationStatus {
        match self {
            ReviewDecision::Approved => ApplicationStatus::Approved,
            ReviewDecision::Rejected => ApplicationStatus::Rejected,
            ReviewDecision::AdditionalInfoRequested => ApplicationStatus::AdditionalInfoRequested,
        }
    }

    pub const fn label(self) -> &'static str {
        self.status().label()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
}

/// One reviewer decision, kept after the current decision fields are cleared on
/// resubmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub decision: ReviewDecision,
    pub reviewer: ActorId,
    pub comments: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// A tenant's bid on one property. Never deleted: withdrawal and expiry leave a terminal
/// record behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalApplication {
    pub id: ApplicationId,
    pub property_id: PropertyId,
    pub tenant_id: ActorId,
    pub status: ApplicationStatus,
    pub stage: ApplicationStage,
    pub desired_move_in: NaiveDate,
    pub lease_term_months: u16,
    pub number_of_occupants: u8,
    pub monthly_income: Money,
    pub emergency_contact: Option<EmergencyContact>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub assigned_reviewer: Option<ActorId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<ActorId>,
    pub review_comments: Option<String>,
    #[serde(default)]
    pub review_history: Vec<ReviewRecord>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Tenant-supplied content for a new draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDraft {
    pub property_id: PropertyId,
    pub desired_move_in: NaiveDate,
    pub lease_term_months: u16,
    pub number_of_occupants: u8,
    pub monthly_income: Money,
    #[serde(default)]
    pub emergency_contact: Option<EmergencyContact>,
    #[serde(default)]
    pub stage: Option<ApplicationStage>,
}

/// Partial content edit; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationChanges {
    #[serde(default)]
    pub desired_move_in: Option<NaiveDate>,
    #[serde(default)]
    pub lease_term_months: Option<u16>,
    #[serde(default)]
    pub number_of_occupants: Option<u8>,
    #[serde(default)]
    pub monthly_income: Option<Money>,
    #[serde(default)]
    pub emergency_contact: Option<EmergencyContact>,
    #[serde(default)]
    pub stage: Option<ApplicationStage>,
}

impl ApplicationChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
