//! In-memory storage for the engines plus a ready-wired bundle of the three services.
//!
//! Each repository guards its rows with a single mutex, so a commit sees and replaces a
//! consistent snapshot. The lease table checks the one-active-lease-per-property rule
//! against the state a batch would leave behind.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::Router;
use chrono::NaiveDate;

use super::applications::{
    application_router, ApplicationRepository, ApplicationService, RentalApplication,
};
use super::catalog::{CatalogError, PropertyCatalog};
use super::clock::Clock;
use super::domain::{ActorId, ApplicationId, EntryId, LeaseId, PropertyId};
use super::events::{
    DomainEvent, EventBus, EventError, EventPublisher, EventSubscriber, NotificationOutbox,
};
use super::leases::{lease_router, Lease, LeaseRepository, LeaseService, LeaseStatus, LeaseWrite};
use super::payments::{
    payment_router, PaymentRepository, PaymentSchedule, PaymentScheduleEntry,
    PaymentScheduleService, Settlement,
};
use super::store::{RepositoryError, Versioned};
use super::sweep::{SweepReport, SweepSummary};
use crate::config::LifecycleConfig;

struct Table<K, V> {
    rows: HashMap<K, Versioned<V>>,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn get(&self, key: &K) -> Option<Versioned<V>> {
        self.rows.get(key).cloned()
    }

    fn insert(&mut self, key: K, record: V) -> Result<Versioned<V>, RepositoryError> {
        if self.rows.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        let stored = Versioned::new(1, record);
        self.rows.insert(key, stored.clone());
        Ok(stored)
    }

    fn check_revision(&self, key: &K, expected: u64) -> Result<(), RepositoryError> {
        let current = self.rows.get(key).ok_or(RepositoryError::NotFound)?;
        if current.revision != expected {
            return Err(RepositoryError::StaleRevision {
                expected,
                found: current.revision,
            });
        }
        Ok(())
    }

    fn update(
        &mut self,
        key: K,
        expected: u64,
        record: V,
    ) -> Result<Versioned<V>, RepositoryError> {
        self.check_revision(&key, expected)?;
        let stored = Versioned::new(expected + 1, record);
        self.rows.insert(key, stored.clone());
        Ok(stored)
    }

    fn select(&self, mut keep: impl FnMut(&V) -> bool) -> Vec<Versioned<V>> {
        self.rows
            .values()
            .filter(|row| keep(&row.record))
            .cloned()
            .collect()
    }
}

/// A writer that panicked mid-update may have left the rows half-written; callers see the
/// store as unavailable rather than reading them.
fn lock_rows<'a, T>(
    mutex: &'a Mutex<T>,
    table: &str,
) -> Result<MutexGuard<'a, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable(format!("{table} lock poisoned")))
}

#[derive(Default)]
pub struct InMemoryApplicationRepository {
    table: Mutex<Table<ApplicationId, RentalApplication>>,
}

impl InMemoryApplicationRepository {
    fn with_table<T>(
        &self,
        f: impl FnOnce(&mut Table<ApplicationId, RentalApplication>) -> T,
    ) -> Result<T, RepositoryError> {
        let mut guard = lock_rows(&self.table, "application table")?;
        Ok(f(&mut guard))
    }
}

fn by_application_id(rows: &mut [Versioned<RentalApplication>]) {
    rows.sort_by(|a, b| a.record.id.cmp(&b.record.id));
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(
        &self,
        record: RentalApplication,
    ) -> Result<Versioned<RentalApplication>, RepositoryError> {
        self.with_table(|table| table.insert(record.id.clone(), record))?
    }

    fn update(
        &self,
        expected_revision: u64,
        record: RentalApplication,
    ) -> Result<Versioned<RentalApplication>, RepositoryError> {
        self.with_table(|table| table.update(record.id.clone(), expected_revision, record))?
    }

    fn fetch(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Versioned<RentalApplication>>, RepositoryError> {
        self.with_table(|table| table.get(id))
    }

    fn in_flight(&self) -> Result<Vec<Versioned<RentalApplication>>, RepositoryError> {
        let mut rows =
            self.with_table(|table| table.select(|record| record.status.is_in_flight()))?;
        by_application_id(&mut rows);
        Ok(rows)
    }

    fn for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<Versioned<RentalApplication>>, RepositoryError> {
        let mut rows =
            self.with_table(|table| table.select(|record| &record.property_id == property_id))?;
        by_application_id(&mut rows);
        Ok(rows)
    }
}

#[derive(Default)]
pub struct InMemoryLeaseRepository {
    table: Mutex<Table<LeaseId, Lease>>,
}

impl LeaseRepository for InMemoryLeaseRepository {
    fn commit(&self, writes: Vec<LeaseWrite>) -> Result<Vec<Versioned<Lease>>, RepositoryError> {
        let mut table = lock_rows(&self.table, "lease table")?;

        let mut staged: HashSet<LeaseId> = HashSet::new();
        for write in &writes {
            let id = &write.lease().id;
            if !staged.insert(id.clone()) {
                return Err(RepositoryError::Conflict);
            }
            match write {
                LeaseWrite::Insert(_) if table.rows.contains_key(id) => {
                    return Err(RepositoryError::Conflict)
                }
                LeaseWrite::Insert(_) => {}
                LeaseWrite::Update {
                    expected_revision, ..
                } => table.check_revision(id, *expected_revision)?,
            }
        }

        // Partial unique index: evaluate the state the batch would leave behind.
        for write in &writes {
            let lease = write.lease();
            if lease.status != LeaseStatus::Active {
                continue;
            }
            let untouched = table
                .rows
                .values()
                .map(|row| &row.record)
                .filter(|other| !staged.contains(&other.id));
            let batched = writes.iter().map(LeaseWrite::lease);
            if let Some(other) = untouched.chain(batched).find(|other| {
                other.id != lease.id
                    && other.property_id == lease.property_id
                    && other.status == LeaseStatus::Active
            }) {
                return Err(RepositoryError::ActivePropertyLease {
                    property_id: lease.property_id.clone(),
                    lease_id: other.id.clone(),
                });
            }
        }

        let mut written = Vec::with_capacity(writes.len());
        for write in writes {
            let stored = match write {
                LeaseWrite::Insert(lease) => table.insert(lease.id.clone(), lease)?,
                LeaseWrite::Update {
                    expected_revision,
                    lease,
                } => table.update(lease.id.clone(), expected_revision, lease)?,
            };
            written.push(stored);
        }
        Ok(written)
    }

    fn fetch(&self, id: &LeaseId) -> Result<Option<Versioned<Lease>>, RepositoryError> {
        Ok(lock_rows(&self.table, "lease table")?.get(id))
    }

    fn active_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Option<Versioned<Lease>>, RepositoryError> {
        let table = lock_rows(&self.table, "lease table")?;
        Ok(table
            .select(|lease| {
                &lease.property_id == property_id && lease.status == LeaseStatus::Active
            })
            .into_iter()
            .next())
    }

    fn active(&self) -> Result<Vec<Versioned<Lease>>, RepositoryError> {
        let table = lock_rows(&self.table, "lease table")?;
        let mut rows = table.select(|lease| lease.status == LeaseStatus::Active);
        rows.sort_by(|a, b| a.record.id.cmp(&b.record.id));
        Ok(rows)
    }
}

#[derive(Default)]
struct PaymentTables {
    schedules: Table<LeaseId, PaymentSchedule>,
    entries: Table<EntryId, PaymentScheduleEntry>,
}

#[derive(Default)]
pub struct InMemoryPaymentRepository {
    tables: Mutex<PaymentTables>,
}

impl InMemoryPaymentRepository {
    fn lock(&self) -> Result<MutexGuard<'_, PaymentTables>, RepositoryError> {
        lock_rows(&self.tables, "payment tables")
    }
}

fn by_due_date(rows: &mut [Versioned<PaymentScheduleEntry>]) {
    rows.sort_by(|a, b| {
        (a.record.due_date, &a.record.id).cmp(&(b.record.due_date, &b.record.id))
    });
}

impl PaymentRepository for InMemoryPaymentRepository {
    fn insert_schedule(
        &self,
        schedule: PaymentSchedule,
        entries: Vec<PaymentScheduleEntry>,
    ) -> Result<Vec<Versioned<PaymentScheduleEntry>>, RepositoryError> {
        let mut tables = self.lock()?;
        if tables.schedules.rows.contains_key(&schedule.lease_id)
            || entries
                .iter()
                .any(|entry| tables.entries.rows.contains_key(&entry.id))
        {
            return Err(RepositoryError::Conflict);
        }

        tables
            .schedules
            .insert(schedule.lease_id.clone(), schedule)?;
        let mut stored = Vec::with_capacity(entries.len());
        for entry in entries {
            stored.push(tables.entries.insert(entry.id.clone(), entry)?);
        }
        Ok(stored)
    }

    fn schedule(
        &self,
        lease_id: &LeaseId,
    ) -> Result<Option<Versioned<PaymentSchedule>>, RepositoryError> {
        Ok(self.lock()?.schedules.get(lease_id))
    }

    fn update_schedule(
        &self,
        expected_revision: u64,
        schedule: PaymentSchedule,
    ) -> Result<Versioned<PaymentSchedule>, RepositoryError> {
        self.lock()?
            .schedules
            .update(schedule.lease_id.clone(), expected_revision, schedule)
    }

    fn insert_entry(
        &self,
        entry: PaymentScheduleEntry,
    ) -> Result<Versioned<PaymentScheduleEntry>, RepositoryError> {
        let mut tables = self.lock()?;
        if !tables.schedules.rows.contains_key(&entry.lease_id) {
            return Err(RepositoryError::NotFound);
        }
        tables.entries.insert(entry.id.clone(), entry)
    }

    fn update_entry(
        &self,
        expected_revision: u64,
        entry: PaymentScheduleEntry,
    ) -> Result<Versioned<PaymentScheduleEntry>, RepositoryError> {
        self.lock()?
            .entries
            .update(entry.id.clone(), expected_revision, entry)
    }

    fn fetch_entry(
        &self,
        id: &EntryId,
    ) -> Result<Option<Versioned<PaymentScheduleEntry>>, RepositoryError> {
        Ok(self.lock()?.entries.get(id))
    }

    fn entries_for_lease(
        &self,
        lease_id: &LeaseId,
    ) -> Result<Vec<Versioned<PaymentScheduleEntry>>, RepositoryError> {
        let mut rows = self.lock()?.entries.select(|entry| &entry.lease_id == lease_id);
        by_due_date(&mut rows);
        Ok(rows)
    }

    fn open_entries(&self) -> Result<Vec<Versioned<PaymentScheduleEntry>>, RepositoryError> {
        let mut rows = self
            .lock()?
            .entries
            .select(|entry| matches!(entry.settlement, Settlement::Open { .. }));
        by_due_date(&mut rows);
        Ok(rows)
    }
}

/// Property ownership registered up front; stands in for the listing service.
#[derive(Debug, Default)]
pub struct InMemoryPropertyCatalog {
    owners: Mutex<HashMap<PropertyId, ActorId>>,
}

impl InMemoryPropertyCatalog {
    /// A single map insert cannot leave the table torn, so a poisoned lock is recovered.
    pub fn register(&self, property_id: PropertyId, landlord_id: ActorId) {
        self.owners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(property_id, landlord_id);
    }

    pub fn with_property(self, property_id: &str, landlord_id: &str) -> Self {
        self.register(PropertyId::new(property_id), ActorId::new(landlord_id));
        self
    }
}

impl PropertyCatalog for InMemoryPropertyCatalog {
    fn owner_of(&self, property_id: &PropertyId) -> Result<Option<ActorId>, CatalogError> {
        let owners = self
            .owners
            .lock()
            .map_err(|_| CatalogError::Unavailable("catalog lock poisoned".to_string()))?;
        Ok(owners.get(property_id).cloned())
    }
}

/// Records every published event in order.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    events: Mutex<Vec<DomainEvent>>,
}

impl InMemoryEventLog {
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(DomainEvent::name)
            .collect()
    }
}

impl EventSubscriber for InMemoryEventLog {
    fn name(&self) -> &'static str {
        "event_log"
    }

    fn handle(&self, event: &DomainEvent) -> Result<(), EventError> {
        self.events
            .lock()
            .map_err(|_| EventError::Transport("event log lock poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}

impl EventPublisher for InMemoryEventLog {
    fn publish(&self, event: DomainEvent) -> Result<(), EventError> {
        self.handle(&event)
    }
}

pub type InMemoryApplications = ApplicationService<InMemoryApplicationRepository>;
pub type InMemoryLeases = LeaseService<InMemoryLeaseRepository, InMemoryApplicationRepository>;
pub type InMemoryPayments = PaymentScheduleService<InMemoryPaymentRepository>;

/// The three engines wired over in-memory storage. Lease events reach the payment
/// schedule engine first, then the notification outbox.
#[derive(Clone)]
pub struct InMemoryLifecycle {
    pub applications: Arc<InMemoryApplications>,
    pub leases: Arc<InMemoryLeases>,
    pub payments: Arc<InMemoryPayments>,
    pub catalog: Arc<InMemoryPropertyCatalog>,
    pub outbox: Arc<NotificationOutbox>,
    pub event_log: Arc<InMemoryEventLog>,
    pub clock: Arc<dyn Clock>,
}

impl InMemoryLifecycle {
    pub fn new(clock: Arc<dyn Clock>, config: &LifecycleConfig) -> Self {
        let application_store = Arc::new(InMemoryApplicationRepository::default());
        let lease_store = Arc::new(InMemoryLeaseRepository::default());
        let payment_store = Arc::new(InMemoryPaymentRepository::default());
        let catalog = Arc::new(InMemoryPropertyCatalog::default());
        let outbox = Arc::new(NotificationOutbox::default());
        let event_log = Arc::new(InMemoryEventLog::default());

        let payment_events: Arc<dyn EventPublisher> = Arc::new(
            EventBus::new()
                .with_subscriber(event_log.clone())
                .with_subscriber(outbox.clone()),
        );
        let payments = Arc::new(PaymentScheduleService::new(
            payment_store,
            payment_events,
            clock.clone(),
            config,
        ));

        let events: Arc<dyn EventPublisher> = Arc::new(
            EventBus::new()
                .with_subscriber(event_log.clone())
                .with_subscriber(payments.clone())
                .with_subscriber(outbox.clone()),
        );
        let applications = Arc::new(ApplicationService::new(
            application_store.clone(),
            catalog.clone(),
            events.clone(),
            clock.clone(),
            config,
        ));
        let leases = Arc::new(LeaseService::new(
            lease_store,
            application_store,
            catalog.clone(),
            events,
            clock.clone(),
            config,
        ));

        Self {
            applications,
            leases,
            payments,
            catalog,
            outbox,
            event_log,
            clock,
        }
    }

    /// Every engine route, ready to be merged into a service router.
    pub fn router(&self) -> Router {
        application_router(self.applications.clone())
            .merge(lease_router(self.leases.clone()))
            .merge(payment_router(self.payments.clone()))
    }

    /// Runs the sweeps in dependency order: schedules are backfilled before leases expire
    /// and before entries are checked for overdue. A sweep that cannot list its candidates
    /// reports the failure instead of stopping the others.
    pub fn run_sweeps(&self, as_of: NaiveDate) -> SweepSummary {
        let applications = self
            .applications
            .sweep_expired(as_of)
            .unwrap_or_else(|err| SweepReport::failed(as_of, err));
        let schedules = match self.leases.active_leases() {
            Ok(active) => self.payments.backfill_schedules(active, as_of),
            Err(err) => SweepReport::failed(as_of, err),
        };
        let leases = self
            .leases
            .sweep_expired(as_of)
            .unwrap_or_else(|err| SweepReport::failed(as_of, err));
        let payments = self
            .payments
            .sweep_overdue(as_of)
            .unwrap_or_else(|err| SweepReport::failed(as_of, err));

        SweepSummary {
            applications,
            schedules,
            leases,
            payments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn poison<T: Send>(mutex: &Mutex<T>) {
        thread::scope(|scope| {
            let writer = scope.spawn(|| {
                let _guard = mutex.lock();
                panic!("writer died holding the lock");
            });
            assert!(writer.join().is_err());
        });
    }

    #[test]
    fn poisoned_repositories_report_unavailable() {
        let leases = InMemoryLeaseRepository::default();
        poison(&leases.table);
        assert!(matches!(
            leases.fetch(&LeaseId::new("lease-000001")),
            Err(RepositoryError::Unavailable(message)) if message.contains("lease table")
        ));
        assert!(matches!(leases.active(), Err(RepositoryError::Unavailable(_))));

        let payments = InMemoryPaymentRepository::default();
        poison(&payments.tables);
        assert!(matches!(
            payments.open_entries(),
            Err(RepositoryError::Unavailable(_))
        ));

        let applications = InMemoryApplicationRepository::default();
        poison(&applications.table);
        assert!(matches!(
            applications.in_flight(),
            Err(RepositoryError::Unavailable(_))
        ));
    }

    #[test]
    fn poisoned_catalog_and_event_log_surface_errors() {
        let catalog = InMemoryPropertyCatalog::default().with_property("prop-1", "landlord-1");
        poison(&catalog.owners);
        assert!(matches!(
            catalog.owner_of(&PropertyId::new("prop-1")),
            Err(CatalogError::Unavailable(_))
        ));

        let log = InMemoryEventLog::default();
        poison(&log.events);
        let event = DomainEvent::ScheduleGenerated {
            lease_id: LeaseId::new("lease-000001"),
            entries: 3,
        };
        assert!(matches!(log.publish(event), Err(EventError::Transport(_))));
        assert!(log.names().is_empty());
    }
}
