use std::sync::Arc;

use cookhouse_core::lifecycle::{BatchReport, EscalationPolicy, EscalationScheduler};
use cookhouse_db::{SqlAuditLog, SqlComplaintRepository, SqlNotificationOutbox, SqlUserDirectory};

use crate::commands::{open_database, prepare, to_data, CommandResult};

/// Batch entry point for the external scheduler. Per-item failures are part
/// of a successful run; only infrastructure problems produce a non-zero exit.
pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("escalate") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let scheduler = EscalationScheduler::new(
            Arc::new(SqlComplaintRepository::new(pool.clone())),
            Arc::new(SqlUserDirectory::new(pool.clone())),
            Arc::new(SqlNotificationOutbox::new(pool.clone())),
            Arc::new(SqlAuditLog::new(pool.clone())),
            EscalationPolicy::from_config(&config.escalation),
        )
        .map_err(|error| ("scheduler_init", error.to_string(), 3u8))?;

        let report = scheduler
            .process_overdue_complaints()
            .await
            .map_err(|error| ("db_query", error.to_string(), 4u8));
        pool.close().await;
        report
    });

    match result {
        Ok(report) => {
            CommandResult::success_with_data("escalate", summary(&report), to_data(&report))
        }
        Err(failure) => CommandResult::from_failure("escalate", failure),
    }
}

fn summary(report: &BatchReport) -> String {
    format!(
        "escalated {} complaint(s), {} failed, {} skipped",
        report.escalated, report.failed, report.skipped
    )
}
