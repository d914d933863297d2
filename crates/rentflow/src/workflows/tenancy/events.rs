//! Domain events and their synchronous fan-out.
//!
//! Events are published after the transition that raised them has been committed. The
//! [`EventBus`] delivers each event to its subscribers in registration order; the payment
//! schedule engine subscribes to lease events, and the [`NotificationOutbox`] turns the
//! notifiable subset into outbound [`Notification`] payloads.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::applications::ReviewDecision;
use super::domain::{ActorId, ApplicationId, EntryId, LeaseId, PropertyId};
use super::leases::{Lease, LeaseStatus, SignerRole};
use super::money::Money;
use super::payments::EntryStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    ApplicationSubmitted {
        application_id: ApplicationId,
        property_id: PropertyId,
        tenant_id: ActorId,
        resubmission: bool,
    },
    ApplicationReviewStarted {
        application_id: ApplicationId,
        reviewer: ActorId,
    },
    ApplicationDecided {
        application_id: ApplicationId,
        property_id: PropertyId,
        tenant_id: ActorId,
        decision: ReviewDecision,
        reviewer: ActorId,
        comments: Option<String>,
    },
    ApplicationWithdrawn {
        application_id: ApplicationId,
    },
    ApplicationExpired {
        application_id: ApplicationId,
        as_of: NaiveDate,
    },
    LeaseCreated {
        lease_id: LeaseId,
        property_id: PropertyId,
        status: LeaseStatus,
    },
    LeaseSigned {
        lease_id: LeaseId,
        signer: SignerRole,
    },
    /// Carries the activated lease so the schedule can be generated without a read-back.
    LeaseActivated {
        lease: Box<Lease>,
    },
    LeaseTerminated {
        lease_id: LeaseId,
        property_id: PropertyId,
        tenant_id: ActorId,
        termination_date: NaiveDate,
        reason: String,
    },
    LeaseExpired {
        lease_id: LeaseId,
        property_id: PropertyId,
        as_of: NaiveDate,
    },
    LeaseRenewed {
        predecessor: LeaseId,
        successor: LeaseId,
    },
    ScheduleGenerated {
        lease_id: LeaseId,
        entries: usize,
    },
    PaymentRecorded {
        entry_id: EntryId,
        lease_id: LeaseId,
        amount: Money,
        status: EntryStatus,
    },
    PaymentWaived {
        entry_id: EntryId,
        lease_id: LeaseId,
        reason: String,
    },
    PaymentRefunded {
        entry_id: EntryId,
        lease_id: LeaseId,
        amount: Money,
    },
    PaymentOverdue {
        entry_id: EntryId,
        lease_id: LeaseId,
        due_date: NaiveDate,
        outstanding: Money,
    },
    LateFeeAssessed {
        entry_id: EntryId,
        lease_id: LeaseId,
        assessed_for: EntryId,
        amount: Money,
    },
    EntriesCancelled {
        lease_id: LeaseId,
        entries: Vec<EntryId>,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::ApplicationSubmitted { .. } => "application_submitted",
            DomainEvent::ApplicationReviewStarted { .. } => "application_review_started",
            DomainEvent::ApplicationDecided { .. } => "application_decided",
            DomainEvent::ApplicationWithdrawn { .. } => "application_withdrawn",
            DomainEvent::ApplicationExpired { .. } => "application_expired",
            DomainEvent::LeaseCreated { .. } => "lease_created",
            DomainEvent::LeaseSigned { .. } => "lease_signed",
            DomainEvent::LeaseActivated { .. } => "lease_activated",
            DomainEvent::LeaseTerminated { .. } => "lease_terminated",
            DomainEvent::LeaseExpired { .. } => "lease_expired",
            DomainEvent::LeaseRenewed { .. } => "lease_renewed",
            DomainEvent::ScheduleGenerated { .. } => "schedule_generated",
            DomainEvent::PaymentRecorded { .. } => "payment_recorded",
            DomainEvent::PaymentWaived { .. } => "payment_waived",
            DomainEvent::PaymentRefunded { .. } => "payment_refunded",
            DomainEvent::PaymentOverdue { .. } => "payment_overdue",
            DomainEvent::LateFeeAssessed { .. } => "late_fee_assessed",
            DomainEvent::EntriesCancelled { .. } => "entries_cancelled",
        }
    }

    /// Outbound notification for the events tenants and landlords are told about.
    pub fn notification(&self) -> Option<Notification> {
        match self {
            DomainEvent::ApplicationDecided {
                application_id,
                property_id,
                tenant_id,
                decision,
                comments,
                ..
            } => {
                let template = match decision {
                    ReviewDecision::Approved => "application_approved",
                    ReviewDecision::Rejected => "application_rejected",
                    ReviewDecision::AdditionalInfoRequested => "application_info_requested",
                };
                let mut details = BTreeMap::new();
                details.insert("property_id".to_string(), property_id.to_string());
                details.insert("tenant_id".to_string(), tenant_id.to_string());
                if let Some(comments) = comments {
                    details.insert("comments".to_string(), comments.clone());
                }
                Some(Notification::new(template, application_id.as_str(), details))
            }
            DomainEvent::LeaseActivated { lease } => {
                let mut details = BTreeMap::new();
                details.insert("property_id".to_string(), lease.property_id.to_string());
                details.insert("tenant_id".to_string(), lease.tenant_id.to_string());
                details.insert("landlord_id".to_string(), lease.landlord_id.to_string());
                details.insert("start_date".to_string(), lease.start_date.to_string());
                Some(Notification::new("lease_activated", lease.id.as_str(), details))
            }
            DomainEvent::LeaseTerminated {
                lease_id,
                property_id,
                tenant_id,
                termination_date,
                reason,
            } => {
                let mut details = BTreeMap::new();
                details.insert("property_id".to_string(), property_id.to_string());
                details.insert("tenant_id".to_string(), tenant_id.to_string());
                details.insert("termination_date".to_string(), termination_date.to_string());
                details.insert("reason".to_string(), reason.clone());
                Some(Notification::new("lease_terminated", lease_id.as_str(), details))
            }
            DomainEvent::PaymentOverdue {
                entry_id,
                lease_id,
                due_date,
                outstanding,
            } => {
                let mut details = BTreeMap::new();
                details.insert("lease_id".to_string(), lease_id.to_string());
                details.insert("due_date".to_string(), due_date.to_string());
                details.insert("outstanding".to_string(), outstanding.to_string());
                Some(Notification::new("payment_overdue", entry_id.as_str(), details))
            }
            _ => None,
        }
    }
}

/// Payload handed to the notification dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub template: String,
    pub subject_id: String,
    pub details: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(
        template: impl Into<String>,
        subject_id: impl Into<String>,
        details: BTreeMap<String, String>,
    ) -> Self {
        Self {
            template: template.into(),
            subject_id: subject_id.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("subscriber {subscriber} failed: {message}")]
    Subscriber {
        subscriber: &'static str,
        message: String,
    },
    #[error("event transport unavailable: {0}")]
    Transport(String),
}

/// Outbound side of the engines.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent) -> Result<(), EventError>;
}

pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(&self, event: &DomainEvent) -> Result<(), EventError>;
}

/// In-process, synchronous fan-out. Delivery stops at the first failing subscriber.
#[derive(Default, Clone)]
pub struct EventBus {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn subscriber_names(&self) -> Vec<&'static str> {
        self.subscribers.iter().map(|s| s.name()).collect()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: DomainEvent) -> Result<(), EventError> {
        for subscriber in &self.subscribers {
            if let Err(error) = subscriber.handle(&event) {
                warn!(
                    event = event.name(),
                    subscriber = subscriber.name(),
                    %error,
                    "event delivery failed"
                );
                return Err(error);
            }
        }
        Ok(())
    }
}

/// Collects notifications until a dispatcher drains them.
#[derive(Debug, Default)]
pub struct NotificationOutbox {
    pending: Mutex<Vec<Notification>>,
}

impl NotificationOutbox {
    pub fn notifications(&self) -> Vec<Notification> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSubscriber for NotificationOutbox {
    fn name(&self) -> &'static str {
        "notification_outbox"
    }

    fn handle(&self, event: &DomainEvent) -> Result<(), EventError> {
        if let Some(notification) = event.notification() {
            info!(
                template = %notification.template,
                subject = %notification.subject_id,
                "notification queued"
            );
            self.pending
                .lock()
                .map_err(|_| EventError::Transport("outbox lock poisoned".to_string()))?
                .push(notification);
        }
        Ok(())
    }
}

impl EventPublisher for NotificationOutbox {
    fn publish(&self, event: DomainEvent) -> Result<(), EventError> {
        self.handle(&event)
    }
}
