use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use cookhouse_core::audit::{AuditEvent, AuditQuery, AuditSink, AuditSubject};
use cookhouse_core::domain::complaint::{Actor, ComplaintId, TenantId, UserId};
use cookhouse_core::errors::ApplicationError;

use super::{column, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

/// Append-only audit trail backed by the `audit_event` table.
pub struct SqlAuditLog {
    pool: DbPool,
}

impl SqlAuditLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        let properties = serde_json::to_string(&event.properties)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO audit_event (id, event_name, actor_kind, actor_id, subject_type,
                                      subject_id, properties_json, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(&event.event_name)
        .bind(event.actor.kind())
        .bind(event.actor.causer_id().map(|id| id.0.as_str()))
        .bind(event.subject.kind())
        .bind(event.subject.id())
        .bind(properties)
        .bind(encode_timestamp(event.occurred_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count(
        &self,
        subject: &AuditSubject,
        event_names: &[&str],
    ) -> Result<u64, RepositoryError> {
        if event_names.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; event_names.len()].join(", ");
        let sql = format!(
            "SELECT COUNT(*) FROM audit_event
             WHERE subject_type = ? AND subject_id = ? AND event_name IN ({placeholders})"
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(subject.kind()).bind(subject.id());
        for name in event_names {
            query = query.bind(*name);
        }

        let count = query.fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    pub async fn list_for_subject(
        &self,
        subject: &AuditSubject,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, event_name, actor_kind, actor_id, subject_type, subject_id,
                    properties_json, occurred_at
             FROM audit_event
             WHERE subject_type = ? AND subject_id = ?
             ORDER BY occurred_at ASC, id ASC",
        )
        .bind(subject.kind())
        .bind(subject.id())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

#[async_trait]
impl AuditSink for SqlAuditLog {
    async fn append(&self, event: AuditEvent) -> Result<(), ApplicationError> {
        Ok(self.insert(&event).await?)
    }
}

#[async_trait]
impl AuditQuery for SqlAuditLog {
    async fn count_events(
        &self,
        subject: &AuditSubject,
        event_names: &[&str],
    ) -> Result<u64, ApplicationError> {
        Ok(self.count(subject, event_names).await?)
    }
}

fn row_to_event(row: &SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let actor_kind: String = column(row, "actor_kind")?;
    let actor_id: Option<String> = column(row, "actor_id")?;
    let actor = match (actor_kind.as_str(), actor_id) {
        ("system", _) => Actor::System,
        ("user", Some(id)) => Actor::User(UserId(id)),
        (kind, id) => {
            return Err(RepositoryError::Decode(format!("invalid actor `{kind}` / {id:?}")));
        }
    };

    let subject_type: String = column(row, "subject_type")?;
    let subject_id: String = column(row, "subject_id")?;
    let subject = match subject_type.as_str() {
        "complaint" => AuditSubject::Complaint(ComplaintId(subject_id)),
        "cook" => AuditSubject::Cook(UserId(subject_id)),
        "tenant" => AuditSubject::Tenant(TenantId(subject_id)),
        other => return Err(RepositoryError::Decode(format!("unknown audit subject `{other}`"))),
    };

    let properties_json: String = column(row, "properties_json")?;
    let properties: BTreeMap<String, String> = serde_json::from_str(&properties_json)
        .map_err(|error| RepositoryError::Decode(format!("properties_json: {error}")))?;
    let occurred_at: String = column(row, "occurred_at")?;

    Ok(AuditEvent {
        event_id: column(row, "id")?,
        actor,
        subject,
        event_name: column(row, "event_name")?,
        properties,
        occurred_at: decode_timestamp("occurred_at", &occurred_at)?,
    })
}
