use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use cookhouse_core::domain::complaint::{Complaint, UserId};
use cookhouse_core::lifecycle::ResolutionPolicy;

use crate::commands::resolve::engine;
use crate::commands::{open_database, prepare, to_data, CommandResult};

#[derive(Debug, Serialize)]
struct CookRecord {
    cook_id: String,
    warnings: u64,
    complaints: u64,
    prior_suspensions: Vec<PriorSuspension>,
}

#[derive(Debug, Serialize)]
struct PriorSuspension {
    complaint_id: String,
    order_id: String,
    suspension_days: Option<u32>,
    suspension_ends_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    refund_amount: Option<Decimal>,
}

impl From<Complaint> for PriorSuspension {
    fn from(complaint: Complaint) -> Self {
        Self {
            suspension_days: complaint.suspension_days(),
            suspension_ends_at: complaint.suspension_ends_at(),
            resolved_at: complaint.resolved_at(),
            refund_amount: complaint.refund_amount(),
            complaint_id: complaint.id.0,
            order_id: complaint.order_id.0,
        }
    }
}

/// Disciplinary history used by admins before deciding on a complaint.
pub fn run(cook: String) -> CommandResult {
    let (config, runtime) = match prepare("cook-record") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let engine = engine(&pool, ResolutionPolicy::from_config(&config.resolution));
        let cook_id = UserId(cook.clone());

        let record = async {
            let warnings = engine.count_warnings(&cook_id).await?;
            let complaints = engine.count_complaints(&cook_id).await?;
            let prior_suspensions = engine.list_prior_suspensions(&cook_id).await?;
            Ok::<_, cookhouse_core::errors::ApplicationError>(CookRecord {
                cook_id: cook.clone(),
                warnings,
                complaints,
                prior_suspensions: prior_suspensions.into_iter().map(PriorSuspension::from).collect(),
            })
        }
        .await
        .map_err(|error| ("db_query", error.to_string(), 4u8));

        pool.close().await;
        record
    });

    match result {
        Ok(record) => CommandResult::success_with_data(
            "cook-record",
            format!(
                "cook `{}`: {} warning(s), {} complaint(s), {} prior suspension(s)",
                record.cook_id,
                record.warnings,
                record.complaints,
                record.prior_suspensions.len()
            ),
            to_data(&record),
        ),
        Err(failure) => CommandResult::from_failure("cook-record", failure),
    }
}
