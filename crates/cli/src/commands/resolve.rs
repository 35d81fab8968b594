use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;

use cookhouse_core::domain::complaint::{Complaint, ComplaintId, UserId};
use cookhouse_core::lifecycle::{DecisionInput, ResolutionEngine, ResolutionError, ResolutionPolicy};
use cookhouse_db::{
    DbPool, SqlAuditLog, SqlComplaintRepository, SqlPaymentLookup, SqlTenantStore,
};

use crate::commands::{open_database, prepare, to_data, CommandResult, Failure};

#[derive(Debug, Clone, Args)]
pub struct ResolveArgs {
    #[arg(long, help = "Identifier of the escalated complaint")]
    pub complaint: String,
    #[arg(
        long = "type",
        help = "dismiss | partial_refund | full_refund | warning | suspend"
    )]
    pub resolution_type: Option<String>,
    #[arg(long, help = "Resolution notes recorded verbatim")]
    pub notes: String,
    #[arg(long, help = "Refund amount for partial_refund")]
    pub refund_amount: Option<Decimal>,
    #[arg(long, help = "Suspension length in days for suspend")]
    pub suspension_days: Option<i64>,
    #[arg(long, help = "Identifier of the admin taking the decision")]
    pub actor: String,
}

impl ResolveArgs {
    fn decision(&self) -> DecisionInput {
        DecisionInput {
            resolution_type: self.resolution_type.clone(),
            resolution_notes: self.notes.clone(),
            refund_amount: self.refund_amount,
            suspension_days: self.suspension_days,
        }
    }
}

#[derive(Debug, Serialize)]
struct ResolvedComplaint {
    complaint_id: String,
    status: &'static str,
    resolution_type: Option<&'static str>,
    refund_amount: Option<Decimal>,
    suspension_days: Option<u32>,
    suspension_ends_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
}

impl From<&Complaint> for ResolvedComplaint {
    fn from(complaint: &Complaint) -> Self {
        Self {
            complaint_id: complaint.id.0.clone(),
            status: complaint.status().as_str(),
            resolution_type: complaint.resolution_type().map(|kind| kind.as_str()),
            refund_amount: complaint.refund_amount(),
            suspension_days: complaint.suspension_days(),
            suspension_ends_at: complaint.suspension_ends_at(),
            resolved_by: complaint.resolved_by().map(|user| user.0.clone()),
            resolved_at: complaint.resolved_at(),
        }
    }
}

pub(crate) fn engine(pool: &DbPool, policy: ResolutionPolicy) -> ResolutionEngine {
    ResolutionEngine::new(
        Arc::new(SqlComplaintRepository::new(pool.clone())),
        Arc::new(SqlPaymentLookup::new(pool.clone())),
        Arc::new(SqlTenantStore::new(pool.clone())),
        Arc::new(SqlAuditLog::new(pool.clone())),
        policy,
    )
}

pub fn run(args: ResolveArgs) -> CommandResult {
    let (config, runtime) = match prepare("resolve") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let engine = engine(&pool, ResolutionPolicy::from_config(&config.resolution));

        let outcome = engine
            .resolve(
                &ComplaintId(args.complaint.clone()),
                args.decision(),
                UserId(args.actor.clone()),
            )
            .await
            .map_err(classify);
        pool.close().await;
        outcome
    });

    match result {
        Ok(complaint) => CommandResult::success_with_data(
            "resolve",
            format!("complaint `{}` is now {}", complaint.id, complaint.status().as_str()),
            to_data(&ResolvedComplaint::from(&complaint)),
        ),
        Err(failure) => CommandResult::from_failure("resolve", failure),
    }
}

fn classify(error: ResolutionError) -> Failure {
    let message = error.to_string();
    match error {
        ResolutionError::Validation(_) => ("validation", message, 6),
        ResolutionError::IllegalState { .. } => ("illegal_state", message, 7),
        ResolutionError::NotEscalated { .. } => ("not_escalated", message, 7),
        ResolutionError::NotFound(_) => ("not_found", message, 8),
        ResolutionError::Conflict { .. } => ("conflict", message, 7),
        ResolutionError::SideEffect { .. } => ("side_effect", message, 9),
        ResolutionError::Application(_) => ("db_query", message, 4),
    }
}
