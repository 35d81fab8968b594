use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;

use cookhouse_core::domain::complaint::UserId;
use cookhouse_core::errors::ApplicationError;
use cookhouse_core::notifications::{
    EscalationPayload, Notification, NotificationGateway, RecipientRole,
};

use super::{column, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

/// Durable hand-off point for notifications. `send` only enqueues; a
/// delivery worker drains `pending` rows and marks them dispatched.
pub struct SqlNotificationOutbox {
    pool: DbPool,
}

impl SqlNotificationOutbox {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(&self, notification: &Notification) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(&notification.payload)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO notification_outbox (id, recipient_id, recipient_role, title, body,
                                              payload_json, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)",
        )
        .bind(&notification.id)
        .bind(&notification.recipient.0)
        .bind(notification.role.as_str())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(payload)
        .bind(encode_timestamp(notification.created_at))
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            event_name = "complaint.notification.enqueued",
            notification_id = %notification.id,
            recipient = %notification.recipient,
            role = notification.role.as_str(),
            "notification written to outbox"
        );
        Ok(())
    }

    pub async fn list_pending(&self, limit: u32) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, recipient_id, recipient_role, title, body, payload_json, created_at
             FROM notification_outbox
             WHERE status = 'pending'
             ORDER BY created_at ASC, id ASC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_notification).collect()
    }

    pub async fn mark_dispatched(
        &self,
        id: &str,
        dispatched_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE notification_outbox SET status = 'dispatched', dispatched_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(encode_timestamp(dispatched_at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl NotificationGateway for SqlNotificationOutbox {
    async fn send(&self, notification: Notification) -> Result<(), ApplicationError> {
        Ok(self.enqueue(&notification).await?)
    }
}

fn parse_role(value: &str) -> Result<RecipientRole, RepositoryError> {
    match value {
        "admin" => Ok(RecipientRole::Admin),
        "cook" => Ok(RecipientRole::Cook),
        "client" => Ok(RecipientRole::Client),
        other => Err(RepositoryError::Decode(format!("unknown recipient role `{other}`"))),
    }
}

fn row_to_notification(row: &SqliteRow) -> Result<Notification, RepositoryError> {
    let role: String = column(row, "recipient_role")?;
    let payload_json: String = column(row, "payload_json")?;
    let payload: EscalationPayload = serde_json::from_str(&payload_json)
        .map_err(|error| RepositoryError::Decode(format!("payload_json: {error}")))?;
    let created_at: String = column(row, "created_at")?;

    Ok(Notification {
        id: column(row, "id")?,
        recipient: UserId(column(row, "recipient_id")?),
        role: parse_role(&role)?,
        title: column(row, "title")?,
        body: column(row, "body")?,
        payload,
        created_at: decode_timestamp("created_at", &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use cookhouse_core::domain::complaint::{ComplaintId, OrderId, UserId};
    use cookhouse_core::notifications::{
        EscalationPayload, Notification, NotificationGateway, RecipientRole,
    };

    use super::SqlNotificationOutbox;
    use crate::repositories::test_support::setup;

    fn client_notification(id: &str, minutes: i64) -> Notification {
        Notification {
            id: id.to_string(),
            recipient: UserId("client-1".to_string()),
            role: RecipientRole::Client,
            title: "Your Complaint Was Escalated".to_string(),
            body: "We're sorry for the wait.".to_string(),
            payload: EscalationPayload::ComplaintEscalatedClient {
                complaint_id: ComplaintId("C-1".to_string()),
                order_id: OrderId("order-1".to_string()),
            },
            created_at: Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn sent_notifications_wait_in_outbox_until_dispatched() {
        let outbox = SqlNotificationOutbox::new(setup().await);
        let later = client_notification("N-2", 5);
        let earlier = client_notification("N-1", 0);

        outbox.send(later.clone()).await.expect("enqueue later");
        outbox.send(earlier.clone()).await.expect("enqueue earlier");

        let pending = outbox.list_pending(10).await.expect("pending");
        assert_eq!(pending, vec![earlier.clone(), later.clone()]);

        assert!(outbox.mark_dispatched(&earlier.id, Utc::now()).await.expect("dispatch"));
        assert!(!outbox.mark_dispatched(&earlier.id, Utc::now()).await.expect("re-dispatch"));

        let pending = outbox.list_pending(10).await.expect("pending");
        assert_eq!(pending, vec![later]);
    }
}
