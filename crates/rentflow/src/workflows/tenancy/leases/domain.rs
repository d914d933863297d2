use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::tenancy::domain::{ActorId, ApplicationId, LeaseId, PropertyId};
use crate::workflows::tenancy::money::{Currency, Money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Draft,
    PendingTenantSignature,
    PendingLandlordSignature,
    Active,
    Expired,
    Terminated,
    Renewed,
}

impl LeaseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LeaseStatus::Draft => "draft",
            LeaseStatus::PendingTenantSignature => "pending_tenant_signature",
            LeaseStatus::PendingLandlordSignature => "pending_landlord_signature",
            LeaseStatus::Active => "active",
            LeaseStatus::Expired => "expired",
            LeaseStatus::Terminated => "terminated",
            LeaseStatus::Renewed => "renewed",
        }
    }

    /// Contract-formation status implied by which signatures are on file. The pending
    /// states name the *outstanding* signer.
    pub const fn from_signatures(tenant_signed: bool, landlord_signed: bool) -> Self {
        match (tenant_signed, landlord_signed) {
            (false, false) => LeaseStatus::Draft,
            (true, false) => LeaseStatus::PendingLandlordSignature,
            (false, true) => LeaseStatus::PendingTenantSignature,
            (true, true) => LeaseStatus::Active,
        }
    }

    pub const fn is_forming(self) -> bool {
        matches!(
            self,
            LeaseStatus::Draft
                | LeaseStatus::PendingTenantSignature
                | LeaseStatus::PendingLandlordSignature
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            LeaseStatus::Expired | LeaseStatus::Terminated | LeaseStatus::Renewed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerRole {
    Tenant,
    Landlord,
}

impl SignerRole {
    pub const fn label(self) -> &'static str {
        match self {
            SignerRole::Tenant => "tenant",
            SignerRole::Landlord => "landlord",
        }
    }
}

/// Captured signature. The reference points into document storage and is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureCapture {
    pub signed_at: DateTime<Utc>,
    pub signature_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Termination {
    pub reason: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// One binding contract over one property between one landlord and one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub application_id: Option<ApplicationId>,
    /// Predecessor this lease renews, if any.
    pub renewal_of: Option<LeaseId>,
    pub property_id: PropertyId,
    pub tenant_id: ActorId,
    pub landlord_id: ActorId,
    pub status: LeaseStatus,
    pub currency: Currency,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: Money,
    pub security_deposit: Money,
    pub payment_due_day: u8,
    pub late_fee_amount: Money,
    pub late_fee_grace_days: u16,
    pub tenant_signature: Option<SignatureCapture>,
    pub landlord_signature: Option<SignatureCapture>,
    pub termination: Option<Termination>,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
}

impl Lease {
    pub fn tenant_signed_at(&self) -> Option<DateTime<Utc>> {
        self.tenant_signature.as_ref().map(|capture| capture.signed_at)
    }

    pub fn landlord_signed_at(&self) -> Option<DateTime<Utc>> {
        self.landlord_signature
            .as_ref()
            .map(|capture| capture.signed_at)
    }

    pub fn termination_reason(&self) -> Option<&str> {
        self.termination.as_ref().map(|t| t.reason.as_str())
    }

    pub fn termination_date(&self) -> Option<NaiveDate> {
        self.termination.as_ref().map(|t| t.date)
    }

    pub fn signature(&self, role: SignerRole) -> Option<&SignatureCapture> {
        match role {
            SignerRole::Tenant => self.tenant_signature.as_ref(),
            SignerRole::Landlord => self.landlord_signature.as_ref(),
        }
    }

    pub fn party(&self, role: SignerRole) -> &ActorId {
        match role {
            SignerRole::Tenant => &self.tenant_id,
            SignerRole::Landlord => &self.landlord_id,
        }
    }
}

/// Money and calendar terms shared by `create` and `renew`. Dates are optional when they
/// can be derived from an application or a predecessor lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseTerms {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub monthly_rent: Money,
    #[serde(default)]
    pub security_deposit: Money,
    pub payment_due_day: u8,
    #[serde(default)]
    pub late_fee_amount: Money,
    #[serde(default)]
    pub late_fee_grace_days: u16,
}

/// Parameters for `create`. Either `application_id` or the property/tenant pair must be
/// supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLease {
    #[serde(default)]
    pub application_id: Option<ApplicationId>,
    #[serde(default)]
    pub property_id: Option<PropertyId>,
    #[serde(default)]
    pub tenant_id: Option<ActorId>,
    pub terms: LeaseTerms,
    /// Pre-supplied signature references, normally absent.
    #[serde(default)]
    pub tenant_signature: Option<String>,
    #[serde(default)]
    pub landlord_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateLease {
    pub reason: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}
