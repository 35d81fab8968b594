use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink, AuditSubject, COMPLAINT_AUTO_ESCALATED};
use crate::config::EscalationConfig;
use crate::domain::complaint::{
    Actor, Complaint, ComplaintId, Escalation, EscalationReason, UserId,
};
use crate::errors::ApplicationError;
use crate::notifications::{NotificationGateway, NotificationTemplates, RecipientRole};
use crate::ports::{ComplaintRepository, RecipientDirectory};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EscalationPolicy {
    pub sla: Duration,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self { sla: Duration::hours(24) }
    }
}

impl EscalationPolicy {
    pub fn from_config(config: &EscalationConfig) -> Self {
        Self { sla: Duration::hours(config.sla_hours) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemError {
    pub complaint_id: ComplaintId,
    pub message: String,
}

/// Per-run counts. Every candidate lands in exactly one of `escalated`,
/// `failed` or `skipped`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: String,
    pub escalated: u32,
    pub failed: u32,
    pub skipped: u32,
    pub errors: Vec<BatchItemError>,
}

enum ItemOutcome {
    Escalated,
    LostRace,
}

pub struct EscalationScheduler {
    complaints: Arc<dyn ComplaintRepository>,
    recipients: Arc<dyn RecipientDirectory>,
    notifications: Arc<dyn NotificationGateway>,
    audit: Arc<dyn AuditSink>,
    templates: NotificationTemplates,
    policy: EscalationPolicy,
}

impl EscalationScheduler {
    pub fn new(
        complaints: Arc<dyn ComplaintRepository>,
        recipients: Arc<dyn RecipientDirectory>,
        notifications: Arc<dyn NotificationGateway>,
        audit: Arc<dyn AuditSink>,
        policy: EscalationPolicy,
    ) -> Result<Self, ApplicationError> {
        let templates = NotificationTemplates::new(policy.sla.num_hours())?;
        Ok(Self { complaints, recipients, notifications, audit, templates, policy })
    }

    pub async fn process_overdue_complaints(&self) -> Result<BatchReport, ApplicationError> {
        self.process_overdue_complaints_at(Utc::now()).await
    }

    /// Escalates every open, never-escalated complaint at least one SLA
    /// window old. Only the candidate query can fail the whole run; item
    /// failures are collected into the report.
    pub async fn process_overdue_complaints_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<BatchReport, ApplicationError> {
        let run_id = Uuid::new_v4().to_string();
        let cutoff = now - self.policy.sla;
        let candidates = self.complaints.list_escalation_candidates(cutoff).await?;

        info!(
            event_name = "complaint.escalation.started",
            correlation_id = %run_id,
            candidates = candidates.len(),
            cutoff = %cutoff,
            "processing overdue complaints"
        );

        let mut report = BatchReport { run_id: run_id.clone(), ..BatchReport::default() };
        for complaint in candidates {
            if !complaint.is_overdue(now, self.policy.sla) {
                report.skipped += 1;
                continue;
            }

            match self.escalate_one(&complaint, now).await {
                Ok(ItemOutcome::Escalated) => {
                    report.escalated += 1;
                    info!(
                        event_name = "complaint.escalation.escalated",
                        correlation_id = %run_id,
                        complaint_id = %complaint.id,
                        tenant_id = %complaint.tenant_id,
                        "complaint escalated"
                    );
                }
                Ok(ItemOutcome::LostRace) => {
                    report.skipped += 1;
                    info!(
                        event_name = "complaint.escalation.skipped",
                        correlation_id = %run_id,
                        complaint_id = %complaint.id,
                        "complaint was no longer eligible at write time"
                    );
                }
                Err(message) => {
                    report.failed += 1;
                    warn!(
                        event_name = "complaint.escalation.item_failed",
                        correlation_id = %run_id,
                        complaint_id = %complaint.id,
                        error = %message,
                        "complaint escalation failed"
                    );
                    report.errors.push(BatchItemError { complaint_id: complaint.id.clone(), message });
                }
            }
        }

        info!(
            event_name = "complaint.escalation.completed",
            correlation_id = %run_id,
            escalated = report.escalated,
            failed = report.failed,
            skipped = report.skipped,
            "overdue complaint run finished"
        );
        Ok(report)
    }

    /// The conditional status write is the commit point. Anything that fails
    /// after it fails the item without undoing the escalation.
    async fn escalate_one(
        &self,
        complaint: &Complaint,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, String> {
        let escalation = Escalation { reason: EscalationReason::Auto24h, at: now };
        let won = self
            .complaints
            .mark_escalated(&complaint.id, &escalation)
            .await
            .map_err(|error| format!("escalation write failed: {error}"))?;
        if !won {
            return Ok(ItemOutcome::LostRace);
        }

        let mut failures = Vec::new();

        let event = AuditEvent::new(
            Actor::System,
            AuditSubject::Complaint(complaint.id.clone()),
            COMPLAINT_AUTO_ESCALATED,
            now,
        )
        .with_property("escalation_reason", escalation.reason.as_str())
        .with_property("order_id", complaint.order_id.0.clone())
        .with_property("tenant_id", complaint.tenant_id.0.clone());
        if let Err(error) = self.audit.append(event).await {
            failures.push(format!("audit: {error}"));
        }

        let mut recipients: Vec<(UserId, RecipientRole)> =
            match self.recipients.admins_and_super_admins().await {
                Ok(admins) => {
                    admins.into_iter().map(|admin| (admin, RecipientRole::Admin)).collect()
                }
                Err(error) => {
                    failures.push(format!("recipient lookup: {error}"));
                    Vec::new()
                }
            };
        recipients.push((complaint.client_id.clone(), RecipientRole::Client));
        recipients.push((complaint.cook_id.clone(), RecipientRole::Cook));

        for (recipient, role) in recipients {
            let label = format!("{} {recipient}", role.as_str());
            let sent = match self.templates.escalation(complaint, recipient, role, escalation.reason, now) {
                Ok(notification) => self.notifications.send(notification).await,
                Err(error) => Err(error),
            };
            if let Err(error) = sent {
                failures.push(format!("notify {label}: {error}"));
            }
        }

        if failures.is_empty() {
            Ok(ItemOutcome::Escalated)
        } else {
            Err(failures.join("; "))
        }
    }
}
