//! Application, lease, and payment schedule lifecycle engines.
//!
//! The three engines are evaluated in dependency order: an approved application seeds a
//! lease, and a lease that collects both signatures publishes `LeaseActivated`, which the
//! payment schedule engine consumes to generate the obligations for the term.

pub mod applications;
pub mod catalog;
pub mod clock;
pub mod domain;
pub mod events;
pub mod http;
pub mod leases;
pub mod memory;
pub mod money;
pub mod payments;
pub mod store;
pub mod sweep;

pub use catalog::{CatalogError, PropertyCatalog};
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::{
    Actor, ActorId, ActorRole, ApplicationId, EntityKind, EntryId, LeaseId, LifecycleError,
    PropertyId,
};
pub use events::{
    DomainEvent, EventBus, EventError, EventPublisher, EventSubscriber, Notification,
    NotificationOutbox,
};
pub use memory::InMemoryLifecycle;
pub use money::{Currency, Money};
pub use store::{RepositoryError, Versioned};
pub use sweep::{SweepFailure, SweepReport, SweepSummary};
