use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Identifier wrapper for rental applications.
    ApplicationId
);
identifier!(
    /// Identifier wrapper for leases.
    LeaseId
);
identifier!(
    /// Identifier wrapper for payment schedule entries.
    EntryId
);
identifier!(
    /// Catalog identifier of a rentable property.
    PropertyId
);
identifier!(
    /// Pre-authenticated identity of a tenant, landlord, or admin.
    ActorId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Tenant,
    Landlord,
    Admin,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            ActorRole::Tenant => "tenant",
            ActorRole::Landlord => "landlord",
            ActorRole::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tenant" => Some(Self::Tenant),
            "landlord" => Some(Self::Landlord),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The caller of an engine operation. Credentials are checked upstream; the engines only
/// authorize by role and ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: ActorId::new(id),
            role,
        }
    }

    pub fn tenant(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Tenant)
    }

    pub fn landlord(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Landlord)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    /// True when the actor holds `role` and is the party identified by `party`.
    pub fn acts_as(&self, role: ActorRole, party: &ActorId) -> bool {
        self.role == role && &self.id == party
    }

    pub fn deny(&self, operation: &'static str) -> LifecycleError {
        warn!(actor = %self.id, role = %self.role, operation, "operation denied");
        LifecycleError::NotAuthorized {
            actor: self.id.clone(),
            role: self.role,
            operation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Application,
    Lease,
    PaymentEntry,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Application => "application",
            EntityKind::Lease => "lease",
            EntityKind::PaymentEntry => "payment entry",
        })
    }
}

/// Error taxonomy shared by the three engines. Every variant is scoped to the single
/// entity operation that raised it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("cannot {operation} {entity} while it is {status}")]
    InvalidTransition {
        entity: EntityKind,
        operation: &'static str,
        status: &'static str,
    },
    #[error("property {property_id} already has active lease {active_lease}")]
    ConflictingActiveLease {
        property_id: PropertyId,
        active_lease: LeaseId,
    },
    #[error("{role} {actor} is not authorized to {operation}")]
    NotAuthorized {
        actor: ActorId,
        role: ActorRole,
        operation: &'static str,
    },
    #[error("{entity} {id} changed concurrently; retry against fresh state")]
    ConcurrencyConflict { entity: EntityKind, id: String },
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: String },
}

impl LifecycleError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(
        entity: EntityKind,
        operation: &'static str,
        status: &'static str,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            operation,
            status,
        }
    }

    /// Whether re-reading state and reapplying the operation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LifecycleError::ConcurrencyConflict { .. })
    }
}
