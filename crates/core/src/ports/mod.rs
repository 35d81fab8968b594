//! Collaborator contracts consumed by the lifecycle services.
//!
//! Storage adapters live in `cookhouse-db`; the in-memory versions in
//! [`memory`] back the unit tests and local dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::complaint::{
    Complaint, ComplaintId, ComplaintStatus, Escalation, OrderId, TenantId, UserId,
};
use crate::errors::ApplicationError;

pub mod memory;

pub use memory::{
    InMemoryComplaintRepository, InMemoryPaymentLookup, InMemoryRecipientDirectory,
    InMemoryTenantStore,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub transaction_id: String,
    pub order_id: OrderId,
    pub amount: Decimal,
}

#[async_trait]
pub trait ComplaintRepository: Send + Sync {
    async fn find_by_id(&self, id: &ComplaintId) -> Result<Option<Complaint>, ApplicationError>;

    /// Intake write. A complaint already stored is left untouched and `false`
    /// is returned; lifecycle transitions go through the guarded writes below.
    async fn save(&self, complaint: Complaint) -> Result<bool, ApplicationError>;

    /// Open, never-escalated complaints created at or before `cutoff`.
    async fn list_escalation_candidates(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Complaint>, ApplicationError>;

    /// Applies the escalation only while the complaint is still open and not
    /// escalated. Returns `false` when another writer got there first.
    async fn mark_escalated(
        &self,
        id: &ComplaintId,
        escalation: &Escalation,
    ) -> Result<bool, ApplicationError>;

    /// Persists a closed complaint only if the stored status still equals
    /// `expected`. Returns `false` when another writer got there first.
    async fn record_closure(
        &self,
        complaint: &Complaint,
        expected: ComplaintStatus,
    ) -> Result<bool, ApplicationError>;

    async fn count_for_cook(&self, cook_id: &UserId) -> Result<u64, ApplicationError>;

    async fn list_suspensions_for_cook(
        &self,
        cook_id: &UserId,
    ) -> Result<Vec<Complaint>, ApplicationError>;

    async fn order_has_refund(
        &self,
        order_id: &OrderId,
        excluding: &ComplaintId,
    ) -> Result<bool, ApplicationError>;
}

#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn admins_and_super_admins(&self) -> Result<Vec<UserId>, ApplicationError>;
}

#[async_trait]
pub trait PaymentLookup: Send + Sync {
    async fn successful_payment_for(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Payment>, ApplicationError>;
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn set_active(&self, tenant_id: &TenantId, active: bool)
        -> Result<(), ApplicationError>;
}
