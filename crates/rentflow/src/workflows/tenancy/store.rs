//! Optimistic concurrency primitives shared by the repositories.
//!
//! Every stored record carries a revision. Writers read a record, validate the transition
//! against what they read, and commit with the revision they saw; the commit fails with
//! [`RepositoryError::StaleRevision`] when another writer got there first. The services
//! wrap each transition in [`retry_on_conflict`], which re-runs the whole read-validate-
//! commit cycle a bounded number of times before surfacing
//! [`LifecycleError::ConcurrencyConflict`].

use serde::Serialize;
use tracing::debug;

use super::domain::{EntityKind, LeaseId, LifecycleError, PropertyId};

/// A record plus the revision it was read or written at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Versioned<T> {
    pub revision: u64,
    pub record: T,
}

impl<T> Versioned<T> {
    pub fn new(revision: u64, record: T) -> Self {
        Self { revision, record }
    }

    pub fn into_record(self) -> T {
        self.record
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record moved from revision {expected} to {found}")]
    StaleRevision { expected: u64, found: u64 },
    #[error("record not found")]
    NotFound,
    #[error("property {property_id} already has active lease {lease_id}")]
    ActivePropertyLease {
        property_id: PropertyId,
        lease_id: LeaseId,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Implemented by service errors so the retry loop can tell lost races from real failures.
pub trait StaleWrite {
    fn is_stale_write(&self) -> bool;
}

impl StaleWrite for RepositoryError {
    fn is_stale_write(&self) -> bool {
        matches!(self, RepositoryError::StaleRevision { .. })
    }
}

/// Runs `attempt` until it succeeds, fails with something other than a stale write, or
/// `max_attempts` is exhausted.
pub fn retry_on_conflict<T, E, F>(
    max_attempts: u8,
    entity: EntityKind,
    id: &str,
    mut attempt: F,
) -> Result<T, E>
where
    E: StaleWrite + From<LifecycleError>,
    F: FnMut() -> Result<T, E>,
{
    let max_attempts = max_attempts.max(1);
    for round in 1..=max_attempts {
        match attempt() {
            Err(err) if err.is_stale_write() => {
                debug!(%entity, id, round, "optimistic write lost a race; re-reading");
            }
            other => return other,
        }
    }

    Err(LifecycleError::ConcurrencyConflict {
        entity,
        id: id.to_string(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Repository(RepositoryError),
        Lifecycle(LifecycleError),
    }

    impl StaleWrite for TestError {
        fn is_stale_write(&self) -> bool {
            matches!(self, TestError::Repository(err) if err.is_stale_write())
        }
    }

    impl From<LifecycleError> for TestError {
        fn from(value: LifecycleError) -> Self {
            TestError::Lifecycle(value)
        }
    }

    fn stale() -> TestError {
        TestError::Repository(RepositoryError::StaleRevision {
            expected: 1,
            found: 2,
        })
    }

    #[test]
    fn retries_until_the_write_lands() {
        let calls = Cell::new(0);
        let result: Result<u8, TestError> =
            retry_on_conflict(3, EntityKind::Lease, "lease-1", || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(stale())
                } else {
                    Ok(7)
                }
            });
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn surfaces_concurrency_conflict_after_bound() {
        let calls = Cell::new(0);
        let result: Result<(), TestError> =
            retry_on_conflict(2, EntityKind::PaymentEntry, "e-1", || {
                calls.set(calls.get() + 1);
                Err(stale())
            });
        assert_eq!(calls.get(), 2);
        assert_eq!(
            result,
            Err(TestError::Lifecycle(LifecycleError::ConcurrencyConflict {
                entity: EntityKind::PaymentEntry,
                id: "e-1".to_string(),
            }))
        );
    }

    #[test]
    fn other_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), TestError> =
            retry_on_conflict(5, EntityKind::Application, "app-1", || {
                calls.set(calls.get() + 1);
                Err(TestError::Repository(RepositoryError::NotFound))
            });
        assert_eq!(calls.get(), 1);
        assert_eq!(result, Err(TestError::Repository(RepositoryError::NotFound)));
    }
}
