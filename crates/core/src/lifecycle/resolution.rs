use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{
    AuditEvent, AuditLog, AuditQuery, AuditSink, AuditSubject, COMPLAINT_RESOLVED,
    COOK_DISCIPLINARY_EVENTS, COOK_SUSPENDED, WARNING_ISSUED,
};
use crate::config::ResolutionConfig;
use crate::domain::complaint::{
    Actor, Complaint, ComplaintId, ComplaintStatus, OrderId, ResolutionType, UserId, Verdict,
};
use crate::errors::ApplicationError;
use crate::ports::{ComplaintRepository, PaymentLookup, TenantStore};

/// Whether a second refund on the same order is blocked or only logged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundGuard {
    #[default]
    Advisory,
    Enforce,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolutionPolicy {
    pub min_notes_len: usize,
    pub require_escalated: bool,
    pub refund_guard: RefundGuard,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self { min_notes_len: 10, require_escalated: true, refund_guard: RefundGuard::Advisory }
    }
}

impl ResolutionPolicy {
    pub fn from_config(config: &ResolutionConfig) -> Self {
        Self {
            min_notes_len: config.min_notes_len,
            require_escalated: config.require_escalated,
            refund_guard: if config.block_duplicate_refunds {
                RefundGuard::Enforce
            } else {
                RefundGuard::Advisory
            },
        }
    }
}

/// An admin decision as submitted, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionInput {
    pub resolution_type: Option<String>,
    pub resolution_notes: String,
    pub refund_amount: Option<Decimal>,
    pub suspension_days: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecisionAction {
    Dismiss,
    PartialRefund { amount: Decimal },
    /// The amount comes from the order's payment, never from the caller.
    FullRefund,
    Warning,
    Suspend { days: u32 },
}

impl DecisionAction {
    pub fn resolution_type(&self) -> ResolutionType {
        match self {
            Self::Dismiss => ResolutionType::Dismiss,
            Self::PartialRefund { .. } => ResolutionType::PartialRefund,
            Self::FullRefund => ResolutionType::FullRefund,
            Self::Warning => ResolutionType::Warning,
            Self::Suspend { .. } => ResolutionType::Suspend,
        }
    }

    fn is_refund(&self) -> bool {
        matches!(self, Self::PartialRefund { .. } | Self::FullRefund)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolutionDecision {
    pub action: DecisionAction,
    pub notes: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecisionValidationError {
    #[error("resolution_type is required")]
    MissingResolutionType,
    #[error("unknown resolution_type `{0}`")]
    UnknownResolutionType(String),
    #[error("resolution_notes must be at least {min} characters, got {actual}")]
    NotesTooShort { min: usize, actual: usize },
    #[error("refund_amount is required for a partial refund")]
    MissingRefundAmount,
    #[error("refund_amount must be positive, got {0}")]
    NonPositiveRefundAmount(Decimal),
    #[error("suspension_days is required for a suspension")]
    MissingSuspensionDays,
    #[error("suspension_days must be a positive whole number of days, got {0}")]
    InvalidSuspensionDays(i64),
    #[error("order `{0}` has no successful payment to refund")]
    NoSuccessfulPayment(OrderId),
    #[error("order `{0}` was already refunded through another complaint")]
    OrderAlreadyRefunded(OrderId),
}

impl ResolutionDecision {
    pub fn parse(
        input: DecisionInput,
        policy: &ResolutionPolicy,
    ) -> Result<Self, DecisionValidationError> {
        let raw_type = input
            .resolution_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(DecisionValidationError::MissingResolutionType)?;
        let resolution_type = ResolutionType::parse(raw_type)
            .ok_or_else(|| DecisionValidationError::UnknownResolutionType(raw_type.to_string()))?;

        let notes_len = input.resolution_notes.trim().chars().count();
        if notes_len < policy.min_notes_len {
            return Err(DecisionValidationError::NotesTooShort {
                min: policy.min_notes_len,
                actual: notes_len,
            });
        }

        let action = match resolution_type {
            ResolutionType::Dismiss => DecisionAction::Dismiss,
            ResolutionType::PartialRefund => {
                let amount =
                    input.refund_amount.ok_or(DecisionValidationError::MissingRefundAmount)?;
                if amount <= Decimal::ZERO {
                    return Err(DecisionValidationError::NonPositiveRefundAmount(amount));
                }
                DecisionAction::PartialRefund { amount }
            }
            ResolutionType::FullRefund => DecisionAction::FullRefund,
            ResolutionType::Warning => DecisionAction::Warning,
            ResolutionType::Suspend => {
                let days =
                    input.suspension_days.ok_or(DecisionValidationError::MissingSuspensionDays)?;
                let days = u32::try_from(days)
                    .ok()
                    .filter(|days| *days > 0)
                    .ok_or(DecisionValidationError::InvalidSuspensionDays(days))?;
                DecisionAction::Suspend { days }
            }
        };

        Ok(Self { action, notes: input.resolution_notes })
    }
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error(transparent)]
    Validation(#[from] DecisionValidationError),
    #[error("complaint `{complaint_id}` is already {}", .status.as_str())]
    IllegalState { complaint_id: ComplaintId, status: ComplaintStatus },
    #[error("complaint `{complaint_id}` must be escalated before resolution (currently {})", .status.as_str())]
    NotEscalated { complaint_id: ComplaintId, status: ComplaintStatus },
    #[error("complaint `{0}` was not found")]
    NotFound(ComplaintId),
    /// The closure write lost to a concurrent update that left the complaint resolvable.
    #[error(
        "complaint `{complaint_id}` changed from {} to {} while being resolved",
        .expected.as_str(),
        .status.as_str()
    )]
    Conflict { complaint_id: ComplaintId, expected: ComplaintStatus, status: ComplaintStatus },
    #[error(transparent)]
    Application(#[from] ApplicationError),
    /// The closure is committed; a follow-up step did not complete.
    #[error("complaint `{}` was closed but follow-up failed: {message}", .complaint.id)]
    SideEffect { complaint: Box<Complaint>, message: String },
}

pub struct ResolutionEngine {
    complaints: Arc<dyn ComplaintRepository>,
    payments: Arc<dyn PaymentLookup>,
    tenants: Arc<dyn TenantStore>,
    audit: Arc<dyn AuditLog>,
    policy: ResolutionPolicy,
}

impl ResolutionEngine {
    pub fn new(
        complaints: Arc<dyn ComplaintRepository>,
        payments: Arc<dyn PaymentLookup>,
        tenants: Arc<dyn TenantStore>,
        audit: Arc<dyn AuditLog>,
        policy: ResolutionPolicy,
    ) -> Self {
        Self { complaints, payments, tenants, audit, policy }
    }

    pub fn policy(&self) -> &ResolutionPolicy {
        &self.policy
    }

    pub async fn resolve(
        &self,
        complaint_id: &ComplaintId,
        input: DecisionInput,
        actor: UserId,
    ) -> Result<Complaint, ResolutionError> {
        self.resolve_at(complaint_id, input, actor, Utc::now()).await
    }

    pub async fn resolve_at(
        &self,
        complaint_id: &ComplaintId,
        input: DecisionInput,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<Complaint, ResolutionError> {
        let complaint = self
            .complaints
            .find_by_id(complaint_id)
            .await?
            .ok_or_else(|| ResolutionError::NotFound(complaint_id.clone()))?;
        check_not_resolved(&complaint)?;

        let decision = ResolutionDecision::parse(input, &self.policy)?;
        self.check_precondition(&complaint)?;

        if decision.action.is_refund() && self.is_order_already_refunded(&complaint).await? {
            match self.policy.refund_guard {
                RefundGuard::Enforce => {
                    return Err(DecisionValidationError::OrderAlreadyRefunded(
                        complaint.order_id.clone(),
                    )
                    .into());
                }
                RefundGuard::Advisory => warn!(
                    event_name = "complaint.resolution.duplicate_refund",
                    complaint_id = %complaint.id,
                    order_id = %complaint.order_id,
                    "order already carries a refund from another complaint"
                ),
            }
        }

        let verdict = self.verdict_for(&decision.action, &complaint).await?;

        let expected = complaint.status();
        let mut closed = complaint;
        closed.close(verdict, decision.notes, actor.clone(), now).map_err(ApplicationError::from)?;

        // A failed deactivation leaves the stored complaint unchanged.
        if closed.resolution_type() == Some(ResolutionType::Suspend) {
            if let Err(error) = self.tenants.set_active(&closed.tenant_id, false).await {
                warn!(
                    event_name = "complaint.resolution.tenant_deactivation_failed",
                    complaint_id = %closed.id,
                    tenant_id = %closed.tenant_id,
                    error = %error,
                    "tenant deactivation failed; complaint left unresolved"
                );
                return Err(error.into());
            }
        }

        if !self.complaints.record_closure(&closed, expected).await? {
            if closed.resolution_type() == Some(ResolutionType::Suspend) {
                warn!(
                    event_name = "complaint.resolution.tenant_deactivated_without_closure",
                    complaint_id = %closed.id,
                    tenant_id = %closed.tenant_id,
                    "tenant deactivated but the closure write lost to a concurrent update"
                );
            }
            return Err(self.closure_conflict(complaint_id, expected).await);
        }

        let failures = self.apply_follow_up(&closed, &actor, now).await;

        if !failures.is_empty() {
            let message = failures.join("; ");
            warn!(
                event_name = "complaint.resolution.follow_up_failed",
                complaint_id = %closed.id,
                error = %message,
                "complaint closed but follow-up steps failed"
            );
            return Err(ResolutionError::SideEffect { complaint: Box::new(closed), message });
        }

        info!(
            event_name = "complaint.resolution.completed",
            complaint_id = %closed.id,
            status = closed.status().as_str(),
            resolution_type = closed.resolution_type().map(|kind| kind.as_str()).unwrap_or_default(),
            resolved_by = %actor,
            "complaint resolved"
        );
        Ok(closed)
    }

    /// Warnings and suspensions recorded against the cook.
    pub async fn count_warnings(&self, cook_id: &UserId) -> Result<u64, ApplicationError> {
        self.audit.count_events(&AuditSubject::Cook(cook_id.clone()), COOK_DISCIPLINARY_EVENTS).await
    }

    pub async fn count_complaints(&self, cook_id: &UserId) -> Result<u64, ApplicationError> {
        self.complaints.count_for_cook(cook_id).await
    }

    pub async fn list_prior_suspensions(
        &self,
        cook_id: &UserId,
    ) -> Result<Vec<Complaint>, ApplicationError> {
        self.complaints.list_suspensions_for_cook(cook_id).await
    }

    pub async fn is_order_already_refunded(
        &self,
        complaint: &Complaint,
    ) -> Result<bool, ApplicationError> {
        self.complaints.order_has_refund(&complaint.order_id, &complaint.id).await
    }

    fn check_precondition(&self, complaint: &Complaint) -> Result<(), ResolutionError> {
        check_not_resolved(complaint)?;
        let status = complaint.status();
        if self.policy.require_escalated && status != ComplaintStatus::Escalated {
            return Err(ResolutionError::NotEscalated { complaint_id: complaint.id.clone(), status });
        }
        Ok(())
    }

    /// Explains a lost closure write from the complaint as it is stored now.
    async fn closure_conflict(
        &self,
        complaint_id: &ComplaintId,
        expected: ComplaintStatus,
    ) -> ResolutionError {
        let current = match self.complaints.find_by_id(complaint_id).await {
            Ok(Some(current)) => current,
            Ok(None) => return ResolutionError::NotFound(complaint_id.clone()),
            Err(error) => return error.into(),
        };
        if let Err(error) = self.check_precondition(&current) {
            return error;
        }
        ResolutionError::Conflict {
            complaint_id: complaint_id.clone(),
            expected,
            status: current.status(),
        }
    }

    async fn verdict_for(
        &self,
        action: &DecisionAction,
        complaint: &Complaint,
    ) -> Result<Verdict, ResolutionError> {
        let verdict = match action {
            DecisionAction::Dismiss => Verdict::Dismiss,
            DecisionAction::PartialRefund { amount } => Verdict::PartialRefund { amount: *amount },
            DecisionAction::FullRefund => {
                let payment = self
                    .payments
                    .successful_payment_for(&complaint.order_id)
                    .await?
                    .ok_or_else(|| {
                        DecisionValidationError::NoSuccessfulPayment(complaint.order_id.clone())
                    })?;
                Verdict::FullRefund { amount: payment.amount }
            }
            DecisionAction::Warning => Verdict::Warning,
            DecisionAction::Suspend { days } => Verdict::Suspend { days: *days },
        };
        Ok(verdict)
    }

    /// Runs every follow-up step even if an earlier one fails, so the
    /// `complaint_resolved` record is attempted regardless.
    async fn apply_follow_up(
        &self,
        closed: &Complaint,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut failures = Vec::new();
        let causer = Actor::User(actor.clone());
        let cook = AuditSubject::Cook(closed.cook_id.clone());

        match closed.resolution_type() {
            Some(ResolutionType::Suspend) => {
                let mut event = AuditEvent::new(causer.clone(), cook, COOK_SUSPENDED, now)
                    .with_property("complaint_id", closed.id.0.clone())
                    .with_property("tenant_id", closed.tenant_id.0.clone());
                if let Some(days) = closed.suspension_days() {
                    event = event.with_property("suspension_days", days.to_string());
                }
                if let Some(ends_at) = closed.suspension_ends_at() {
                    event = event.with_property("suspension_ends_at", ends_at.to_rfc3339());
                }
                if let Err(error) = self.audit.append(event).await {
                    failures.push(format!("cook suspension record: {error}"));
                }
            }
            Some(ResolutionType::Warning) => {
                let event = AuditEvent::new(causer.clone(), cook, WARNING_ISSUED, now)
                    .with_property("complaint_id", closed.id.0.clone())
                    .with_property("order_id", closed.order_id.0.clone());
                if let Err(error) = self.audit.append(event).await {
                    failures.push(format!("cook warning record: {error}"));
                }
            }
            _ => {}
        }

        let mut resolved = AuditEvent::new(
            causer,
            AuditSubject::Complaint(closed.id.clone()),
            COMPLAINT_RESOLVED,
            now,
        )
        .with_property(
            "resolution_type",
            closed.resolution_type().map(|kind| kind.as_str()).unwrap_or_default(),
        )
        .with_property("status", closed.status().as_str());
        if let Some(amount) = closed.refund_amount() {
            resolved = resolved.with_property("refund_amount", amount.to_string());
        }
        if let Err(error) = self.audit.append(resolved).await {
            failures.push(format!("resolution record: {error}"));
        }

        failures
    }
}

fn check_not_resolved(complaint: &Complaint) -> Result<(), ResolutionError> {
    if complaint.is_resolved() {
        return Err(ResolutionError::IllegalState {
            complaint_id: complaint.id.clone(),
            status: complaint.status(),
        });
    }
    Ok(())
}
