use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::complaint::{Actor, ComplaintId, TenantId, UserId};
use crate::errors::ApplicationError;

pub const COMPLAINT_AUTO_ESCALATED: &str = "complaint_auto_escalated";
pub const COMPLAINT_RESOLVED: &str = "complaint_resolved";
pub const WARNING_ISSUED: &str = "warning_issued";
pub const COOK_SUSPENDED: &str = "cook_suspended";

/// Records on a cook that make up their disciplinary history.
pub const COOK_DISCIPLINARY_EVENTS: &[&str] = &[WARNING_ISSUED, COOK_SUSPENDED];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum AuditSubject {
    Complaint(ComplaintId),
    Cook(UserId),
    Tenant(TenantId),
}

impl AuditSubject {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Complaint(_) => "complaint",
            Self::Cook(_) => "cook",
            Self::Tenant(_) => "tenant",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Complaint(id) => &id.0,
            Self::Cook(id) => &id.0,
            Self::Tenant(id) => &id.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub actor: Actor,
    pub subject: AuditSubject,
    pub event_name: String,
    pub properties: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        actor: Actor,
        subject: AuditSubject,
        event_name: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            actor,
            subject,
            event_name: event_name.into(),
            properties: BTreeMap::new(),
            occurred_at,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), ApplicationError>;
}

#[async_trait]
pub trait AuditQuery: Send + Sync {
    async fn count_events(
        &self,
        subject: &AuditSubject,
        event_names: &[&str],
    ) -> Result<u64, ApplicationError>;
}

/// An audit store that can both record and answer history queries.
pub trait AuditLog: AuditSink + AuditQuery {}

impl<T> AuditLog for T where T: AuditSink + AuditQuery + ?Sized {}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_named(&self, event_name: &str) -> Vec<AuditEvent> {
        self.events().into_iter().filter(|event| event.event_name == event_name).collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, event: AuditEvent) -> Result<(), ApplicationError> {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
        Ok(())
    }
}

#[async_trait]
impl AuditQuery for InMemoryAuditSink {
    async fn count_events(
        &self,
        subject: &AuditSubject,
        event_names: &[&str],
    ) -> Result<u64, ApplicationError> {
        let count = self
            .events()
            .iter()
            .filter(|event| &event.subject == subject)
            .filter(|event| event_names.contains(&event.event_name.as_str()))
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::audit::{
        AuditEvent, AuditQuery, AuditSink, AuditSubject, InMemoryAuditSink,
        COMPLAINT_AUTO_ESCALATED, COOK_DISCIPLINARY_EVENTS, WARNING_ISSUED,
    };
    use crate::domain::complaint::{Actor, ComplaintId, UserId};

    #[tokio::test]
    async fn in_memory_sink_records_actor_subject_and_properties() {
        let sink = InMemoryAuditSink::default();
        sink.append(
            AuditEvent::new(
                Actor::System,
                AuditSubject::Complaint(ComplaintId("C-42".to_owned())),
                COMPLAINT_AUTO_ESCALATED,
                Utc::now(),
            )
            .with_property("escalation_reason", "auto_24h")
            .with_property("order_id", "order-9"),
        )
        .await
        .expect("append");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor, Actor::System);
        assert_eq!(events[0].actor.causer_id(), None);
        assert_eq!(events[0].subject.kind(), "complaint");
        assert_eq!(events[0].properties.get("order_id").map(String::as_str), Some("order-9"));
    }

    #[tokio::test]
    async fn counts_only_matching_subject_and_names() {
        let sink = InMemoryAuditSink::default();
        let admin = Actor::User(UserId("admin-1".to_owned()));
        let cook = AuditSubject::Cook(UserId("cook-1".to_owned()));
        let other_cook = AuditSubject::Cook(UserId("cook-2".to_owned()));

        for subject in [cook.clone(), cook.clone(), other_cook] {
            sink.append(AuditEvent::new(admin.clone(), subject, WARNING_ISSUED, Utc::now()))
                .await
                .expect("append");
        }
        sink.append(AuditEvent::new(admin, cook.clone(), "profile_updated", Utc::now()))
            .await
            .expect("append");

        let count = sink.count_events(&cook, COOK_DISCIPLINARY_EVENTS).await.expect("count");
        assert_eq!(count, 2);
    }
}
