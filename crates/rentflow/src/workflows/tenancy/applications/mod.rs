//! Application engine: a tenant's request to rent a property, from draft through the
//! reviewer's decision.

pub mod domain;
pub mod lifecycle;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    ApplicationChanges, ApplicationDraft, ApplicationStage, ApplicationStatus, EmergencyContact,
    RentalApplication, ReviewDecision, ReviewRecord,
};
pub use lifecycle::Submission;
pub use repository::{ApplicationRepository, ApplicationStatusView};
pub use router::application_router;
pub use service::{ApplicationService, ApplicationServiceError};
