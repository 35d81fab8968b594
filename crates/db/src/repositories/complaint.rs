use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;

use cookhouse_core::domain::complaint::{
    Complaint, ComplaintId, ComplaintState, ComplaintStatus, Escalation, EscalationReason,
    OrderId, Resolution, ResolutionOutcome, ResolutionType, TenantId, UserId,
};
use cookhouse_core::errors::ApplicationError;
use cookhouse_core::ports::ComplaintRepository;

use super::{
    column, decode_decimal, decode_optional_timestamp, decode_timestamp, encode_timestamp,
    RepositoryError,
};
use crate::DbPool;

const COMPLAINT_COLUMNS: &str = "id, client_id, cook_id, tenant_id, order_id, order_number, \
     category, status, is_escalated, escalation_reason, escalated_at, resolution_type, \
     resolution_notes, refund_amount, suspension_days, suspension_ends_at, resolved_by, \
     resolved_at, submitted_at, created_at";

pub struct SqlComplaintRepository {
    pool: DbPool,
}

impl SqlComplaintRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn fetch(&self, id: &ComplaintId) -> Result<Option<Complaint>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_complaint).transpose()
    }

    /// Intake write. An existing row is never overwritten: lifecycle columns
    /// only change through the guarded transitions below. Returns `false`
    /// when the id is already stored.
    pub async fn insert(&self, complaint: &Complaint) -> Result<bool, RepositoryError> {
        let columns = FlatComplaint::from(complaint);
        let now = encode_timestamp(Utc::now());

        let result = sqlx::query(
            "INSERT INTO complaints (id, client_id, cook_id, tenant_id, order_id, order_number,
                                     category, status, is_escalated, escalation_reason,
                                     escalated_at, resolution_type, resolution_notes,
                                     refund_amount, suspension_days, suspension_ends_at,
                                     resolved_by, resolved_at, submitted_at, created_at,
                                     updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&complaint.id.0)
        .bind(&complaint.client_id.0)
        .bind(&complaint.cook_id.0)
        .bind(&complaint.tenant_id.0)
        .bind(&complaint.order_id.0)
        .bind(&complaint.order_number)
        .bind(&complaint.category)
        .bind(complaint.status().as_str())
        .bind(columns.is_escalated)
        .bind(columns.escalation_reason)
        .bind(&columns.escalated_at)
        .bind(columns.resolution_type)
        .bind(columns.resolution_notes)
        .bind(&columns.refund_amount)
        .bind(columns.suspension_days)
        .bind(&columns.suspension_ends_at)
        .bind(columns.resolved_by)
        .bind(&columns.resolved_at)
        .bind(complaint.submitted_at.map(encode_timestamp))
        .bind(encode_timestamp(complaint.created_at))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn escalation_candidates(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Complaint>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {COMPLAINT_COLUMNS} FROM complaints
             WHERE status = 'open' AND is_escalated = 0 AND created_at <= ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(encode_timestamp(cutoff))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_complaint).collect()
    }

    /// Guarded by the same predicate the candidate query uses, so a
    /// concurrent run that already escalated the row turns this into a no-op.
    pub async fn try_mark_escalated(
        &self,
        id: &ComplaintId,
        escalation: &Escalation,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE complaints
             SET status = 'escalated',
                 is_escalated = 1,
                 escalation_reason = ?,
                 escalated_at = ?,
                 updated_at = ?
             WHERE id = ? AND status = 'open' AND is_escalated = 0",
        )
        .bind(escalation.reason.as_str())
        .bind(encode_timestamp(escalation.at))
        .bind(encode_timestamp(Utc::now()))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn try_record_closure(
        &self,
        complaint: &Complaint,
        expected: ComplaintStatus,
    ) -> Result<bool, RepositoryError> {
        let columns = FlatComplaint::from(complaint);

        let result = sqlx::query(
            "UPDATE complaints
             SET status = ?,
                 resolution_type = ?,
                 resolution_notes = ?,
                 refund_amount = ?,
                 suspension_days = ?,
                 suspension_ends_at = ?,
                 resolved_by = ?,
                 resolved_at = ?,
                 updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(complaint.status().as_str())
        .bind(columns.resolution_type)
        .bind(columns.resolution_notes)
        .bind(&columns.refund_amount)
        .bind(columns.suspension_days)
        .bind(&columns.suspension_ends_at)
        .bind(columns.resolved_by)
        .bind(&columns.resolved_at)
        .bind(encode_timestamp(Utc::now()))
        .bind(&complaint.id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn count_by_cook(&self, cook_id: &UserId) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM complaints WHERE cook_id = ?")
            .bind(&cook_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    pub async fn suspensions_by_cook(
        &self,
        cook_id: &UserId,
    ) -> Result<Vec<Complaint>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {COMPLAINT_COLUMNS} FROM complaints
             WHERE cook_id = ? AND resolution_type = 'suspend'
             ORDER BY resolved_at DESC, id ASC"
        ))
        .bind(&cook_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_complaint).collect()
    }

    pub async fn other_refund_exists(
        &self,
        order_id: &OrderId,
        excluding: &ComplaintId,
    ) -> Result<bool, RepositoryError> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(
                 SELECT 1 FROM complaints
                 WHERE order_id = ? AND id <> ? AND refund_amount IS NOT NULL
             )",
        )
        .bind(&order_id.0)
        .bind(&excluding.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists == 1)
    }
}

#[async_trait]
impl ComplaintRepository for SqlComplaintRepository {
    async fn find_by_id(&self, id: &ComplaintId) -> Result<Option<Complaint>, ApplicationError> {
        Ok(self.fetch(id).await?)
    }

    async fn save(&self, complaint: Complaint) -> Result<bool, ApplicationError> {
        Ok(self.insert(&complaint).await?)
    }

    async fn list_escalation_candidates(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Complaint>, ApplicationError> {
        Ok(self.escalation_candidates(cutoff).await?)
    }

    async fn mark_escalated(
        &self,
        id: &ComplaintId,
        escalation: &Escalation,
    ) -> Result<bool, ApplicationError> {
        Ok(self.try_mark_escalated(id, escalation).await?)
    }

    async fn record_closure(
        &self,
        complaint: &Complaint,
        expected: ComplaintStatus,
    ) -> Result<bool, ApplicationError> {
        Ok(self.try_record_closure(complaint, expected).await?)
    }

    async fn count_for_cook(&self, cook_id: &UserId) -> Result<u64, ApplicationError> {
        Ok(self.count_by_cook(cook_id).await?)
    }

    async fn list_suspensions_for_cook(
        &self,
        cook_id: &UserId,
    ) -> Result<Vec<Complaint>, ApplicationError> {
        Ok(self.suspensions_by_cook(cook_id).await?)
    }

    async fn order_has_refund(
        &self,
        order_id: &OrderId,
        excluding: &ComplaintId,
    ) -> Result<bool, ApplicationError> {
        Ok(self.other_refund_exists(order_id, excluding).await?)
    }
}

/// Column view of the lifecycle state.
struct FlatComplaint<'a> {
    is_escalated: bool,
    escalation_reason: Option<&'static str>,
    escalated_at: Option<String>,
    resolution_type: Option<&'static str>,
    resolution_notes: Option<&'a str>,
    refund_amount: Option<String>,
    suspension_days: Option<i64>,
    suspension_ends_at: Option<String>,
    resolved_by: Option<&'a str>,
    resolved_at: Option<String>,
}

impl<'a> From<&'a Complaint> for FlatComplaint<'a> {
    fn from(complaint: &'a Complaint) -> Self {
        Self {
            is_escalated: complaint.is_escalated(),
            escalation_reason: complaint.escalation_reason().map(|reason| reason.as_str()),
            escalated_at: complaint.escalated_at().map(encode_timestamp),
            resolution_type: complaint.resolution_type().map(|kind| kind.as_str()),
            resolution_notes: complaint.resolution_notes(),
            refund_amount: complaint.refund_amount().map(|amount| amount.to_string()),
            suspension_days: complaint.suspension_days().map(i64::from),
            suspension_ends_at: complaint.suspension_ends_at().map(encode_timestamp),
            resolved_by: complaint.resolved_by().map(|user| user.0.as_str()),
            resolved_at: complaint.resolved_at().map(encode_timestamp),
        }
    }
}

fn required<T>(value: Option<T>, id: &str, column: &str) -> Result<T, RepositoryError> {
    value.ok_or_else(|| RepositoryError::Decode(format!("complaint `{id}` is missing {column}")))
}

fn row_to_complaint(row: &SqliteRow) -> Result<Complaint, RepositoryError> {
    let id: String = column(row, "id")?;
    let status_str: String = column(row, "status")?;
    let status = ComplaintStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown complaint status `{status_str}`")))?;

    let is_escalated: bool = column(row, "is_escalated")?;
    let escalation = if is_escalated {
        let reason_str: String = required(column(row, "escalation_reason")?, &id, "escalation_reason")?;
        let reason = EscalationReason::parse(&reason_str).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown escalation reason `{reason_str}`"))
        })?;
        let at: String = required(column(row, "escalated_at")?, &id, "escalated_at")?;
        Some(Escalation { reason, at: decode_timestamp("escalated_at", &at)? })
    } else {
        None
    };

    let state = match status {
        ComplaintStatus::Open => ComplaintState::Open,
        ComplaintStatus::InReview => ComplaintState::InReview,
        ComplaintStatus::Escalated => {
            ComplaintState::Escalated { escalation: required(escalation, &id, "escalation facts")? }
        }
        ComplaintStatus::Dismissed | ComplaintStatus::Resolved => {
            let notes: String = required(column(row, "resolution_notes")?, &id, "resolution_notes")?;
            let by: String = required(column(row, "resolved_by")?, &id, "resolved_by")?;
            let at = required(
                decode_optional_timestamp("resolved_at", column(row, "resolved_at")?)?,
                &id,
                "resolved_at",
            )?;

            if status == ComplaintStatus::Dismissed {
                ComplaintState::Dismissed { escalation, notes, by: UserId(by), at }
            } else {
                let outcome = decode_outcome(row, &id)?;
                ComplaintState::Resolved {
                    escalation,
                    resolution: Resolution { outcome, notes, by: UserId(by), at },
                }
            }
        }
    };

    Ok(Complaint {
        client_id: UserId(column(row, "client_id")?),
        cook_id: UserId(column(row, "cook_id")?),
        tenant_id: TenantId(column(row, "tenant_id")?),
        order_id: OrderId(column(row, "order_id")?),
        order_number: column(row, "order_number")?,
        category: column(row, "category")?,
        created_at: decode_timestamp("created_at", &column::<String>(row, "created_at")?)?,
        submitted_at: decode_optional_timestamp("submitted_at", column(row, "submitted_at")?)?,
        id: ComplaintId(id),
        state,
    })
}

fn decode_outcome(row: &SqliteRow, id: &str) -> Result<ResolutionOutcome, RepositoryError> {
    let type_str: String = required(column(row, "resolution_type")?, id, "resolution_type")?;
    let resolution_type = ResolutionType::parse(&type_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown resolution type `{type_str}`")))?;
    let refund_amount = || -> Result<_, RepositoryError> {
        let amount: String = required(column(row, "refund_amount")?, id, "refund_amount")?;
        decode_decimal("refund_amount", &amount)
    };

    match resolution_type {
        ResolutionType::PartialRefund => {
            Ok(ResolutionOutcome::PartialRefund { amount: refund_amount()? })
        }
        ResolutionType::FullRefund => Ok(ResolutionOutcome::FullRefund { amount: refund_amount()? }),
        ResolutionType::Warning => Ok(ResolutionOutcome::Warning),
        ResolutionType::Suspend => {
            let days: i64 = required(column(row, "suspension_days")?, id, "suspension_days")?;
            let days = u32::try_from(days).map_err(|_| {
                RepositoryError::Decode(format!("suspension_days out of range: {days}"))
            })?;
            let ends_at = required(
                decode_optional_timestamp("suspension_ends_at", column(row, "suspension_ends_at")?)?,
                id,
                "suspension_ends_at",
            )?;
            Ok(ResolutionOutcome::Suspend { days, ends_at })
        }
        ResolutionType::Dismiss => Err(RepositoryError::Decode(format!(
            "complaint `{id}` is resolved but carries a dismiss resolution type"
        ))),
    }
}
