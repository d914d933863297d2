//! Lease engine: contract formation by dual signature, termination, expiry, and renewal.

pub mod domain;
pub mod lifecycle;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    CreateLease, Lease, LeaseStatus, LeaseTerms, SignatureCapture, SignerRole, TerminateLease,
    Termination,
};
pub use lifecycle::{add_months, validate_terms, LeaseParties, SignOutcome};
pub use repository::{LeaseRepository, LeaseStatusView, LeaseWrite};
pub use router::lease_router;
pub use service::{LeaseService, LeaseServiceError};
