//! Payment schedule engine: generation on lease activation, settlement, waivers,
//! refunds, and the overdue sweep.

pub mod domain;
pub mod repository;
pub mod router;
pub mod schedule;
pub mod service;
mod settlement;

#[cfg(test)]
mod tests;

pub use domain::{
    derive_status, EntryStatus, EntryView, LineKind, PaymentLine, PaymentMethod, PaymentReceipt,
    PaymentSchedule, PaymentScheduleEntry, PaymentType, Resolution, ScheduleSummary, Settlement,
};
pub use repository::PaymentRepository;
pub use router::payment_router;
pub use service::{PaymentScheduleService, PaymentServiceError};
