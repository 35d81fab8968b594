use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::complaint::{
    Complaint, ComplaintId, ComplaintState, ComplaintStatus, Escalation, OrderId, ResolutionType,
    TenantId, UserId,
};
use crate::errors::ApplicationError;

use super::{ComplaintRepository, Payment, PaymentLookup, RecipientDirectory, TenantStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone, Default)]
pub struct InMemoryComplaintRepository {
    complaints: Arc<Mutex<BTreeMap<String, Complaint>>>,
}

impl InMemoryComplaintRepository {
    pub fn with_complaints(complaints: Vec<Complaint>) -> Self {
        let repository = Self::default();
        {
            let mut stored = lock(&repository.complaints);
            for complaint in complaints {
                stored.insert(complaint.id.0.clone(), complaint);
            }
        }
        repository
    }

    pub fn get(&self, id: &ComplaintId) -> Option<Complaint> {
        lock(&self.complaints).get(&id.0).cloned()
    }
}

#[async_trait]
impl ComplaintRepository for InMemoryComplaintRepository {
    async fn find_by_id(&self, id: &ComplaintId) -> Result<Option<Complaint>, ApplicationError> {
        Ok(self.get(id))
    }

    async fn save(&self, complaint: Complaint) -> Result<bool, ApplicationError> {
        let mut complaints = lock(&self.complaints);
        if complaints.contains_key(&complaint.id.0) {
            return Ok(false);
        }
        complaints.insert(complaint.id.0.clone(), complaint);
        Ok(true)
    }

    async fn list_escalation_candidates(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Complaint>, ApplicationError> {
        let mut candidates: Vec<Complaint> = lock(&self.complaints)
            .values()
            .filter(|complaint| {
                complaint.status() == ComplaintStatus::Open
                    && !complaint.is_escalated()
                    && complaint.created_at <= cutoff
            })
            .cloned()
            .collect();
        candidates.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(candidates)
    }

    async fn mark_escalated(
        &self,
        id: &ComplaintId,
        escalation: &Escalation,
    ) -> Result<bool, ApplicationError> {
        let mut complaints = lock(&self.complaints);
        let Some(complaint) = complaints.get_mut(&id.0) else {
            return Ok(false);
        };
        if !matches!(complaint.state, ComplaintState::Open) {
            return Ok(false);
        }

        complaint.escalate(escalation.reason, escalation.at)?;
        Ok(true)
    }

    async fn record_closure(
        &self,
        complaint: &Complaint,
        expected: ComplaintStatus,
    ) -> Result<bool, ApplicationError> {
        let mut complaints = lock(&self.complaints);
        let Some(stored) = complaints.get_mut(&complaint.id.0) else {
            return Ok(false);
        };
        if stored.status() != expected {
            return Ok(false);
        }

        *stored = complaint.clone();
        Ok(true)
    }

    async fn count_for_cook(&self, cook_id: &UserId) -> Result<u64, ApplicationError> {
        let count =
            lock(&self.complaints).values().filter(|complaint| &complaint.cook_id == cook_id).count();
        Ok(count as u64)
    }

    async fn list_suspensions_for_cook(
        &self,
        cook_id: &UserId,
    ) -> Result<Vec<Complaint>, ApplicationError> {
        let mut suspensions: Vec<Complaint> = lock(&self.complaints)
            .values()
            .filter(|complaint| &complaint.cook_id == cook_id)
            .filter(|complaint| complaint.resolution_type() == Some(ResolutionType::Suspend))
            .cloned()
            .collect();
        suspensions.sort_by_key(|complaint| std::cmp::Reverse(complaint.resolved_at()));
        Ok(suspensions)
    }

    async fn order_has_refund(
        &self,
        order_id: &OrderId,
        excluding: &ComplaintId,
    ) -> Result<bool, ApplicationError> {
        Ok(lock(&self.complaints).values().any(|complaint| {
            &complaint.order_id == order_id
                && &complaint.id != excluding
                && complaint.refund_amount().is_some()
        }))
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryRecipientDirectory {
    admins: Vec<UserId>,
}

impl InMemoryRecipientDirectory {
    pub fn with_admins(admins: Vec<UserId>) -> Self {
        Self { admins }
    }
}

#[async_trait]
impl RecipientDirectory for InMemoryRecipientDirectory {
    async fn admins_and_super_admins(&self) -> Result<Vec<UserId>, ApplicationError> {
        Ok(self.admins.clone())
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryPaymentLookup {
    payments: HashMap<String, Payment>,
}

impl InMemoryPaymentLookup {
    pub fn with_payment(mut self, order_id: &OrderId, amount: Decimal) -> Self {
        self.payments.insert(
            order_id.0.clone(),
            Payment {
                transaction_id: format!("txn-{}", order_id.0),
                order_id: order_id.clone(),
                amount,
            },
        );
        self
    }
}

#[async_trait]
impl PaymentLookup for InMemoryPaymentLookup {
    async fn successful_payment_for(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Payment>, ApplicationError> {
        Ok(self.payments.get(&order_id.0).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTenantStore {
    active: Arc<Mutex<HashMap<String, bool>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl InMemoryTenantStore {
    pub fn with_tenants(tenant_ids: &[TenantId]) -> Self {
        let store = Self::default();
        {
            let mut active = lock(&store.active);
            for tenant_id in tenant_ids {
                active.insert(tenant_id.0.clone(), true);
            }
        }
        store
    }

    /// Every `set_active` call fails with `message` until [`Self::recover`].
    pub fn fail_with(self, message: impl Into<String>) -> Self {
        *lock(&self.failure) = Some(message.into());
        self
    }

    pub fn recover(&self) {
        lock(&self.failure).take();
    }

    pub fn is_active(&self, tenant_id: &TenantId) -> Option<bool> {
        lock(&self.active).get(&tenant_id.0).copied()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn set_active(
        &self,
        tenant_id: &TenantId,
        active: bool,
    ) -> Result<(), ApplicationError> {
        if let Some(message) = lock(&self.failure).clone() {
            return Err(ApplicationError::Integration(message));
        }

        lock(&self.active).insert(tenant_id.0.clone(), active);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::complaint::{
        Complaint, ComplaintId, ComplaintState, ComplaintStatus, Escalation, EscalationReason,
        OrderId, TenantId, UserId,
    };
    use crate::ports::{ComplaintRepository, InMemoryComplaintRepository};

    fn open_complaint(id: &str, age: Duration) -> Complaint {
        Complaint {
            id: ComplaintId(id.to_string()),
            client_id: UserId("client-1".to_string()),
            cook_id: UserId("cook-1".to_string()),
            tenant_id: TenantId("tenant-1".to_string()),
            order_id: OrderId(format!("order-{id}")),
            order_number: format!("ORD-{id}"),
            category: "cold_food".to_string(),
            created_at: Utc::now() - age,
            submitted_at: None,
            state: ComplaintState::Open,
        }
    }

    #[tokio::test]
    async fn mark_escalated_only_wins_once() {
        let complaint = open_complaint("C-1", Duration::hours(30));
        let repository = InMemoryComplaintRepository::with_complaints(vec![complaint.clone()]);
        let escalation = Escalation { reason: EscalationReason::Auto24h, at: Utc::now() };

        assert!(repository.mark_escalated(&complaint.id, &escalation).await.expect("first"));
        assert!(!repository.mark_escalated(&complaint.id, &escalation).await.expect("second"));

        let stored = repository.get(&complaint.id).expect("stored");
        assert_eq!(stored.status(), ComplaintStatus::Escalated);
        assert_eq!(stored.escalated_at(), Some(escalation.at));
    }

    #[tokio::test]
    async fn candidates_respect_cutoff() {
        let repository = InMemoryComplaintRepository::with_complaints(vec![
            open_complaint("C-old", Duration::hours(48)),
            open_complaint("C-new", Duration::hours(1)),
        ]);

        let candidates = repository
            .list_escalation_candidates(Utc::now() - Duration::hours(24))
            .await
            .expect("candidates");

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id.0, "C-old");
    }

    #[tokio::test]
    async fn repeated_intake_keeps_lifecycle_facts() {
        let original = open_complaint("C-1", Duration::hours(30));
        let repository = InMemoryComplaintRepository::default();
        let escalation = Escalation { reason: EscalationReason::Auto24h, at: Utc::now() };

        assert!(repository.save(original.clone()).await.expect("intake"));
        assert!(repository.mark_escalated(&original.id, &escalation).await.expect("escalate"));
        assert!(!repository.save(original.clone()).await.expect("repeat intake"));

        let stored = repository.get(&original.id).expect("stored");
        assert_eq!(stored.status(), ComplaintStatus::Escalated);
        assert_eq!(stored.escalated_at(), Some(escalation.at));
    }
}
