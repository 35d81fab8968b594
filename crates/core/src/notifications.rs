//! Escalation notification templates and the gateway seam.
//!
//! Delivery transport is someone else's job: a gateway accepts a rendered
//! [`Notification`] and must not block the caller on delivery.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use uuid::Uuid;

use crate::domain::complaint::{Complaint, ComplaintId, EscalationReason, OrderId, TenantId, UserId};
use crate::errors::ApplicationError;

const ADMIN_TITLE: &str = "Complaint Escalated";
const COOK_TITLE: &str = "Complaint Escalated to Admin";
const CLIENT_TITLE: &str = "Your Complaint Was Escalated";

const ADMIN_BODY: &str = "admin_escalated";
const COOK_BODY: &str = "cook_escalated";
const CLIENT_BODY: &str = "client_escalated";

const TEMPLATES: &[(&str, &str)] = &[
    (
        ADMIN_BODY,
        "Complaint {{ complaint_id }} ({{ category }}) on order #{{ order_number }} received no \
         response within {{ sla_hours }} hours and was escalated automatically.",
    ),
    (
        COOK_BODY,
        "A complaint on order #{{ order_number }} was not addressed within {{ sla_hours }} hours \
         and has been escalated to the admin team for review.",
    ),
    (
        CLIENT_BODY,
        "We're sorry for the wait. Your complaint has been escalated to our admin team, who will \
         review it and get back to you shortly.",
    ),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    Admin,
    Cook,
    Client,
}

impl RecipientRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Cook => "cook",
            Self::Client => "client",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscalationPayload {
    ComplaintEscalated {
        complaint_id: ComplaintId,
        order_id: OrderId,
        category: String,
        tenant_id: TenantId,
        escalation_reason: EscalationReason,
    },
    ComplaintEscalatedCook {
        complaint_id: ComplaintId,
        order_id: OrderId,
        category: String,
        escalation_reason: EscalationReason,
    },
    ComplaintEscalatedClient {
        complaint_id: ComplaintId,
        order_id: OrderId,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient: UserId,
    pub role: RecipientRole,
    pub title: String,
    pub body: String,
    pub payload: EscalationPayload,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct BodyContext<'a> {
    complaint_id: &'a str,
    order_number: &'a str,
    category: &'a str,
    sla_hours: i64,
}

pub struct NotificationTemplates {
    tera: Tera,
    sla_hours: i64,
}

impl NotificationTemplates {
    pub fn new(sla_hours: i64) -> Result<Self, ApplicationError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied()).map_err(|error| {
            ApplicationError::Configuration(format!("notification templates: {error}"))
        })?;
        Ok(Self { tera, sla_hours })
    }

    pub fn escalation(
        &self,
        complaint: &Complaint,
        recipient: UserId,
        role: RecipientRole,
        escalation_reason: EscalationReason,
        now: DateTime<Utc>,
    ) -> Result<Notification, ApplicationError> {
        let (title, template, payload) = match role {
            RecipientRole::Admin => (
                ADMIN_TITLE,
                ADMIN_BODY,
                EscalationPayload::ComplaintEscalated {
                    complaint_id: complaint.id.clone(),
                    order_id: complaint.order_id.clone(),
                    category: complaint.category.clone(),
                    tenant_id: complaint.tenant_id.clone(),
                    escalation_reason,
                },
            ),
            RecipientRole::Cook => (
                COOK_TITLE,
                COOK_BODY,
                EscalationPayload::ComplaintEscalatedCook {
                    complaint_id: complaint.id.clone(),
                    order_id: complaint.order_id.clone(),
                    category: complaint.category.clone(),
                    escalation_reason,
                },
            ),
            RecipientRole::Client => (
                CLIENT_TITLE,
                CLIENT_BODY,
                EscalationPayload::ComplaintEscalatedClient {
                    complaint_id: complaint.id.clone(),
                    order_id: complaint.order_id.clone(),
                },
            ),
        };

        Ok(Notification {
            id: Uuid::new_v4().to_string(),
            recipient,
            role,
            title: title.to_string(),
            body: self.render(template, complaint)?,
            payload,
            created_at: now,
        })
    }

    fn render(&self, template: &str, complaint: &Complaint) -> Result<String, ApplicationError> {
        let context = Context::from_serialize(BodyContext {
            complaint_id: &complaint.id.0,
            order_number: &complaint.order_number,
            category: &complaint.category,
            sla_hours: self.sla_hours,
        })
        .map_err(|error| ApplicationError::Integration(error.to_string()))?;

        self.tera
            .render(template, &context)
            .map_err(|error| ApplicationError::Integration(format!("render `{template}`: {error}")))
    }
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), ApplicationError>;
}

/// Logs each dispatch. Useful when no outbox is wired in.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotificationGateway;

#[async_trait]
impl NotificationGateway for TracingNotificationGateway {
    async fn send(&self, notification: Notification) -> Result<(), ApplicationError> {
        tracing::info!(
            event_name = "complaint.notification.dispatched",
            notification_id = %notification.id,
            recipient = %notification.recipient,
            role = notification.role.as_str(),
            title = %notification.title,
            "notification handed to gateway"
        );
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationGateway {
    sent: Arc<Mutex<Vec<Notification>>>,
    failing_recipients: HashSet<UserId>,
}

impl InMemoryNotificationGateway {
    /// Deliveries to `recipient` fail with an integration error.
    pub fn fail_for(mut self, recipient: UserId) -> Self {
        self.failing_recipients.insert(recipient);
        self
    }

    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn sent_to(&self, role: RecipientRole) -> Vec<Notification> {
        self.sent().into_iter().filter(|notification| notification.role == role).collect()
    }
}

#[async_trait]
impl NotificationGateway for InMemoryNotificationGateway {
    async fn send(&self, notification: Notification) -> Result<(), ApplicationError> {
        if self.failing_recipients.contains(&notification.recipient) {
            return Err(ApplicationError::Integration(format!(
                "notification channel rejected recipient `{}`",
                notification.recipient
            )));
        }

        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{NotificationTemplates, RecipientRole};
    use crate::domain::complaint::{
        Complaint, ComplaintId, ComplaintState, EscalationReason, OrderId, TenantId, UserId,
    };

    fn complaint(category: &str) -> Complaint {
        Complaint {
            id: ComplaintId("C-77".to_string()),
            client_id: UserId("client-7".to_string()),
            cook_id: UserId("cook-7".to_string()),
            tenant_id: TenantId("tenant-7".to_string()),
            order_id: OrderId("order-77".to_string()),
            order_number: "ORD-2026-0077".to_string(),
            category: category.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap(),
            submitted_at: None,
            state: ComplaintState::Open,
        }
    }

    #[test]
    fn admin_payload_carries_tenant_and_reason() {
        let templates = NotificationTemplates::new(24).expect("templates");
        let notification = templates
            .escalation(
                &complaint("wrong_item"),
                UserId("admin-1".to_string()),
                RecipientRole::Admin,
                EscalationReason::Auto24h,
                Utc::now(),
            )
            .expect("render");

        assert_eq!(notification.title, "Complaint Escalated");
        assert_eq!(
            serde_json::to_value(&notification.payload).expect("payload json"),
            json!({
                "type": "complaint_escalated",
                "complaint_id": "C-77",
                "order_id": "order-77",
                "category": "wrong_item",
                "tenant_id": "tenant-7",
                "escalation_reason": "auto_24h",
            })
        );
    }

    #[test]
    fn cook_body_cites_order_number_and_sla_window() {
        let templates = NotificationTemplates::new(24).expect("templates");
        let notification = templates
            .escalation(
                &complaint("cold_food"),
                UserId("cook-7".to_string()),
                RecipientRole::Cook,
                EscalationReason::Auto24h,
                Utc::now(),
            )
            .expect("render");

        assert!(notification.body.contains("ORD-2026-0077"));
        assert!(notification.body.contains("24 hours"));
        let payload = serde_json::to_value(&notification.payload).expect("payload json");
        assert_eq!(payload["type"], "complaint_escalated_cook");
        assert!(payload.get("tenant_id").is_none());
    }

    #[test]
    fn client_body_is_the_same_for_every_category() {
        let templates = NotificationTemplates::new(24).expect("templates");
        let render = |category: &str| {
            templates
                .escalation(
                    &complaint(category),
                    UserId("client-7".to_string()),
                    RecipientRole::Client,
                    EscalationReason::Auto24h,
                    Utc::now(),
                )
                .expect("render")
        };

        let first = render("cold_food");
        let second = render("rude_driver");
        assert_eq!(first.body, second.body);
        assert_eq!(
            serde_json::to_value(&first.payload).expect("payload json"),
            json!({"type": "complaint_escalated_client", "complaint_id": "C-77", "order_id": "order-77"})
        );
    }
}
