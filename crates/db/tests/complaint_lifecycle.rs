use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use cookhouse_core::audit::{
    AuditSubject, COMPLAINT_AUTO_ESCALATED, COMPLAINT_RESOLVED, WARNING_ISSUED,
};
use cookhouse_core::domain::complaint::{
    Actor, Complaint, ComplaintId, ComplaintState, ComplaintStatus, EscalationReason, OrderId,
    ResolutionType, TenantId, UserId,
};
use cookhouse_core::lifecycle::{
    DecisionInput, EscalationPolicy, EscalationScheduler, ResolutionEngine, ResolutionError,
    ResolutionPolicy,
};
use cookhouse_core::notifications::RecipientRole;
use cookhouse_core::ports::ComplaintRepository;
use cookhouse_db::{
    connect_with_settings, migrations, DbPool, PaymentRecord, PaymentStatus, SqlAuditLog,
    SqlComplaintRepository, SqlNotificationOutbox, SqlPaymentLookup, SqlTenantStore,
    SqlUserDirectory, UserRecord, UserRole,
};

type LifecycleTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

struct Stack {
    pool: DbPool,
    scheduler: EscalationScheduler,
    engine: ResolutionEngine,
}

async fn stack() -> LifecycleTestResult<Stack> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;

    let complaints = Arc::new(SqlComplaintRepository::new(pool.clone()));
    let audit = Arc::new(SqlAuditLog::new(pool.clone()));
    let scheduler = EscalationScheduler::new(
        complaints.clone(),
        Arc::new(SqlUserDirectory::new(pool.clone())),
        Arc::new(SqlNotificationOutbox::new(pool.clone())),
        audit.clone(),
        EscalationPolicy::default(),
    )
    .map_err(|error| format!("scheduler: {error}"))?;
    let engine = ResolutionEngine::new(
        complaints,
        Arc::new(SqlPaymentLookup::new(pool.clone())),
        Arc::new(SqlTenantStore::new(pool.clone())),
        audit,
        ResolutionPolicy::default(),
    );

    Ok(Stack { pool, scheduler, engine })
}

async fn seed_people(pool: &DbPool, admins: &[&str]) -> LifecycleTestResult {
    let tenants = SqlTenantStore::new(pool.clone());
    tenants
        .save(&TenantId("tenant-1".to_string()), "Auntie's Kitchen", true)
        .await
        .map_err(|error| format!("seed tenant: {error}"))?;

    let users = SqlUserDirectory::new(pool.clone());
    let mut records = vec![("client-1", UserRole::Client), ("cook-1", UserRole::Cook)];
    records.extend(admins.iter().map(|admin| (*admin, UserRole::Admin)));
    for (id, role) in records {
        users
            .save(&UserRecord {
                id: UserId(id.to_string()),
                display_name: id.to_string(),
                role,
                tenant_id: (role == UserRole::Cook).then(|| TenantId("tenant-1".to_string())),
                created_at: Utc::now(),
            })
            .await
            .map_err(|error| format!("seed user {id}: {error}"))?;
    }
    Ok(())
}

fn open_complaint(id: &str, created_at: DateTime<Utc>) -> Complaint {
    Complaint {
        id: ComplaintId(id.to_string()),
        client_id: UserId("client-1".to_string()),
        cook_id: UserId("cook-1".to_string()),
        tenant_id: TenantId("tenant-1".to_string()),
        order_id: OrderId(format!("order-{id}")),
        order_number: format!("ORD-{id}"),
        category: "rude_behaviour".to_string(),
        created_at,
        submitted_at: Some(created_at),
        state: ComplaintState::Open,
    }
}

async fn load(stack: &Stack, id: &ComplaintId) -> LifecycleTestResult<Complaint> {
    SqlComplaintRepository::new(stack.pool.clone())
        .find_by_id(id)
        .await
        .map_err(|error| format!("load {id}: {error}"))?
        .ok_or_else(|| format!("complaint {id} should exist"))
}

#[tokio::test]
async fn overdue_complaint_is_escalated_then_warned() -> LifecycleTestResult {
    let stack = stack().await?;
    seed_people(&stack.pool, &["admin-1"]).await?;
    let now = Utc::now();
    let c1 = open_complaint("C1", now - Duration::hours(25));
    SqlComplaintRepository::new(stack.pool.clone())
        .save(c1.clone())
        .await
        .map_err(|error| format!("save C1: {error}"))?;

    let report = stack
        .scheduler
        .process_overdue_complaints_at(now)
        .await
        .map_err(|error| format!("batch: {error}"))?;
    require_eq!(report.escalated, 1);
    require_eq!(report.failed, 0);

    let escalated = load(&stack, &c1.id).await?;
    require_eq!(escalated.status(), ComplaintStatus::Escalated);
    require_eq!(escalated.escalation_reason(), Some(EscalationReason::Auto24h));

    let outbox = SqlNotificationOutbox::new(stack.pool.clone());
    let pending = outbox.list_pending(50).await.map_err(|error| format!("outbox: {error}"))?;
    for role in [RecipientRole::Admin, RecipientRole::Client, RecipientRole::Cook] {
        let count = pending.iter().filter(|notification| notification.role == role).count();
        require!(count == 1, "expected one {} notification, found {count}", role.as_str());
    }

    let audit = SqlAuditLog::new(stack.pool.clone());
    let complaint_trail = audit
        .list_for_subject(&AuditSubject::Complaint(c1.id.clone()))
        .await
        .map_err(|error| format!("audit: {error}"))?;
    require!(
        complaint_trail
            .iter()
            .any(|event| event.event_name == COMPLAINT_AUTO_ESCALATED && event.actor == Actor::System),
        "auto escalation should be recorded with a system actor"
    );

    let admin = UserId("admin-1".to_string());
    let resolved = stack
        .engine
        .resolve(
            &c1.id,
            DecisionInput {
                resolution_type: Some("warning".to_string()),
                resolution_notes: "Unprofessional communication noted.".to_string(),
                ..DecisionInput::default()
            },
            admin.clone(),
        )
        .await
        .map_err(|error| format!("resolve: {error}"))?;
    require_eq!(resolved.status(), ComplaintStatus::Resolved);
    let stored = load(&stack, &c1.id).await?;
    require_eq!(stored.status(), ComplaintStatus::Resolved);
    require_eq!(stored.resolution_type(), Some(ResolutionType::Warning));
    require_eq!(stored.resolved_by(), Some(&admin));
    require!(stored.is_escalated(), "escalation facts should survive resolution");

    let cook_trail = audit
        .list_for_subject(&AuditSubject::Cook(c1.cook_id.clone()))
        .await
        .map_err(|error| format!("audit: {error}"))?;
    require!(
        cook_trail.iter().any(|event| event.event_name == WARNING_ISSUED),
        "warning should be recorded on the cook"
    );
    let complaint_trail = audit
        .list_for_subject(&AuditSubject::Complaint(c1.id.clone()))
        .await
        .map_err(|error| format!("audit: {error}"))?;
    let resolved_records: Vec<_> =
        complaint_trail.iter().filter(|event| event.event_name == COMPLAINT_RESOLVED).collect();
    require_eq!(resolved_records.len(), 1);
    require_eq!(resolved_records[0].actor, Actor::User(admin.clone()));

    let warnings = stack
        .engine
        .count_warnings(&c1.cook_id)
        .await
        .map_err(|error| format!("count warnings: {error}"))?;
    require_eq!(warnings, 1);

    let rerun = stack
        .scheduler
        .process_overdue_complaints_at(now + Duration::hours(1))
        .await
        .map_err(|error| format!("rerun: {error}"))?;
    require_eq!(rerun.escalated, 0);
    let pending_after = outbox.list_pending(50).await.map_err(|error| format!("outbox: {error}"))?;
    require_eq!(pending_after.len(), pending.len());

    Ok(())
}

#[tokio::test]
async fn suspension_and_full_refund_reach_their_collaborators() -> LifecycleTestResult {
    let stack = stack().await?;
    seed_people(&stack.pool, &[]).await?;
    let now = Utc::now();
    let repository = SqlComplaintRepository::new(stack.pool.clone());
    let suspended = open_complaint("C-suspend", now - Duration::hours(48));
    let refunded = open_complaint("C-refund", now - Duration::hours(30));
    for complaint in [suspended.clone(), refunded.clone()] {
        repository.save(complaint).await.map_err(|error| format!("save: {error}"))?;
    }
    SqlPaymentLookup::new(stack.pool.clone())
        .record(&PaymentRecord {
            id: "txn-1".to_string(),
            order_id: refunded.order_id.clone(),
            amount: Decimal::new(8500, 0),
            status: PaymentStatus::Success,
            created_at: now - Duration::hours(31),
        })
        .await
        .map_err(|error| format!("payment: {error}"))?;

    let report = stack
        .scheduler
        .process_overdue_complaints_at(now)
        .await
        .map_err(|error| format!("batch: {error}"))?;
    require_eq!(report.escalated, 2);

    let admin = UserId("admin-1".to_string());
    let closed = stack
        .engine
        .resolve(
            &suspended.id,
            DecisionInput {
                resolution_type: Some("suspend".to_string()),
                resolution_notes: "Repeated hygiene violations.".to_string(),
                suspension_days: Some(7),
                ..DecisionInput::default()
            },
            admin.clone(),
        )
        .await
        .map_err(|error| format!("suspend: {error}"))?;
    let resolved_at = closed.resolved_at().ok_or("resolved_at should be set")?;
    require_eq!(closed.suspension_ends_at(), Some(resolved_at + Duration::days(7)));
    let active = SqlTenantStore::new(stack.pool.clone())
        .is_active(&TenantId("tenant-1".to_string()))
        .await
        .map_err(|error| format!("tenant: {error}"))?;
    require_eq!(active, Some(false));

    let refund = stack
        .engine
        .resolve(
            &refunded.id,
            DecisionInput {
                resolution_type: Some("full_refund".to_string()),
                resolution_notes: "Order arrived inedible.".to_string(),
                refund_amount: Some(Decimal::new(10, 0)),
                ..DecisionInput::default()
            },
            admin.clone(),
        )
        .await
        .map_err(|error| format!("refund: {error}"))?;
    require_eq!(refund.refund_amount(), Some(Decimal::new(8500, 0)));

    let again = stack
        .engine
        .resolve(
            &refunded.id,
            DecisionInput {
                resolution_type: Some("dismiss".to_string()),
                resolution_notes: "Trying to close it twice.".to_string(),
                ..DecisionInput::default()
            },
            admin,
        )
        .await;
    require!(
        matches!(again, Err(ResolutionError::IllegalState { .. })),
        "second resolution should be rejected, got {again:?}"
    );
    let stored = load(&stack, &refunded.id).await?;
    require_eq!(stored.resolution_type(), Some(ResolutionType::FullRefund));
    require_eq!(stored.refund_amount(), refund.refund_amount());

    let prior = stack
        .engine
        .list_prior_suspensions(&suspended.cook_id)
        .await
        .map_err(|error| format!("suspensions: {error}"))?;
    require_eq!(prior.len(), 1);

    Ok(())
}

#[tokio::test]
async fn failed_tenant_deactivation_keeps_complaint_escalated() -> LifecycleTestResult {
    let stack = stack().await?;
    seed_people(&stack.pool, &[]).await?;
    let now = Utc::now();
    let mut complaint = open_complaint("C-orphan", now - Duration::hours(30));
    complaint.tenant_id = TenantId("tenant-2".to_string());
    SqlComplaintRepository::new(stack.pool.clone())
        .save(complaint.clone())
        .await
        .map_err(|error| format!("save: {error}"))?;
    stack
        .scheduler
        .process_overdue_complaints_at(now)
        .await
        .map_err(|error| format!("batch: {error}"))?;
    let escalated = load(&stack, &complaint.id).await?;
    require_eq!(escalated.status(), ComplaintStatus::Escalated);

    let suspend = || DecisionInput {
        resolution_type: Some("suspend".to_string()),
        resolution_notes: "Kitchen failed two inspections.".to_string(),
        suspension_days: Some(5),
        ..DecisionInput::default()
    };
    let admin = UserId("admin-1".to_string());

    let failed = stack.engine.resolve(&complaint.id, suspend(), admin.clone()).await;
    require!(
        matches!(failed, Err(ResolutionError::Application(_))),
        "missing tenant should abort the resolution, got {failed:?}"
    );
    let untouched = load(&stack, &complaint.id).await?;
    require_eq!(untouched, escalated);
    let trail = SqlAuditLog::new(stack.pool.clone())
        .list_for_subject(&AuditSubject::Complaint(complaint.id.clone()))
        .await
        .map_err(|error| format!("audit: {error}"))?;
    require!(
        trail.iter().all(|event| event.event_name != COMPLAINT_RESOLVED),
        "no resolution should be recorded"
    );

    let tenants = SqlTenantStore::new(stack.pool.clone());
    tenants
        .save(&complaint.tenant_id, "Night Market Stall", true)
        .await
        .map_err(|error| format!("seed tenant: {error}"))?;
    let closed = stack
        .engine
        .resolve(&complaint.id, suspend(), admin)
        .await
        .map_err(|error| format!("retry: {error}"))?;
    require_eq!(closed.status(), ComplaintStatus::Resolved);
    require_eq!(closed.suspension_days(), Some(5));
    let active = tenants
        .is_active(&complaint.tenant_id)
        .await
        .map_err(|error| format!("tenant: {error}"))?;
    require_eq!(active, Some(false));

    Ok(())
}
