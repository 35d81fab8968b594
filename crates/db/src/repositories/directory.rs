use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cookhouse_core::domain::complaint::{OrderId, TenantId, UserId};
use cookhouse_core::errors::ApplicationError;
use cookhouse_core::ports::{Payment, PaymentLookup, RecipientDirectory, TenantStore};

use super::{column, decode_decimal, encode_timestamp, RepositoryError};
use crate::DbPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    Admin,
    Cook,
    Client,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Cook => "cook",
            Self::Client => "client",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub display_name: String,
    pub role: UserRole,
    pub tenant_id: Option<TenantId>,
    pub created_at: DateTime<Utc>,
}

pub struct SqlUserDirectory {
    pool: DbPool,
}

impl SqlUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, user: &UserRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO users (id, display_name, role, tenant_id, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 role = excluded.role,
                 tenant_id = excluded.tenant_id",
        )
        .bind(&user.id.0)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(user.tenant_id.as_ref().map(|tenant| tenant.0.as_str()))
        .bind(encode_timestamp(user.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn administrators(&self) -> Result<Vec<UserId>, RepositoryError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM users WHERE role IN ('admin', 'super_admin') ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(UserId).collect())
    }
}

#[async_trait]
impl RecipientDirectory for SqlUserDirectory {
    async fn admins_and_super_admins(&self) -> Result<Vec<UserId>, ApplicationError> {
        Ok(self.administrators().await?)
    }
}

pub struct SqlTenantStore {
    pool: DbPool,
}

impl SqlTenantStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(
        &self,
        tenant_id: &TenantId,
        name: &str,
        active: bool,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO tenants (id, name, is_active, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 is_active = excluded.is_active,
                 updated_at = excluded.updated_at",
        )
        .bind(&tenant_id.0)
        .bind(name)
        .bind(active)
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn is_active(&self, tenant_id: &TenantId) -> Result<Option<bool>, RepositoryError> {
        let active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM tenants WHERE id = ?")
            .bind(&tenant_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(active)
    }

    pub async fn update_active(
        &self,
        tenant_id: &TenantId,
        active: bool,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE tenants SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(encode_timestamp(Utc::now()))
            .bind(&tenant_id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("tenant `{tenant_id}`")));
        }
        Ok(())
    }
}

#[async_trait]
impl TenantStore for SqlTenantStore {
    async fn set_active(&self, tenant_id: &TenantId, active: bool) -> Result<(), ApplicationError> {
        Ok(self.update_active(tenant_id, active).await?)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

pub struct SqlPaymentLookup {
    pool: DbPool,
}

impl SqlPaymentLookup {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, payment: &PaymentRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO payment_transactions (id, order_id, amount, status, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 amount = excluded.amount,
                 status = excluded.status",
        )
        .bind(&payment.id)
        .bind(&payment.order_id.0)
        .bind(payment.amount.to_string())
        .bind(payment.status.as_str())
        .bind(encode_timestamp(payment.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Latest successful transaction for the order.
    pub async fn successful_payment(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Payment>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, order_id, amount FROM payment_transactions
             WHERE order_id = ? AND status = 'success'
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(&order_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let amount: String = column(&row, "amount")?;
        Ok(Some(Payment {
            transaction_id: column(&row, "id")?,
            order_id: OrderId(column(&row, "order_id")?),
            amount: decode_decimal("amount", &amount)?,
        }))
    }
}

#[async_trait]
impl PaymentLookup for SqlPaymentLookup {
    async fn successful_payment_for(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Payment>, ApplicationError> {
        Ok(self.successful_payment(order_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use cookhouse_core::domain::complaint::{OrderId, TenantId, UserId};
    use cookhouse_core::errors::ApplicationError;
    use cookhouse_core::ports::{PaymentLookup, RecipientDirectory, TenantStore};

    use super::{
        PaymentRecord, PaymentStatus, SqlPaymentLookup, SqlTenantStore, SqlUserDirectory,
        UserRecord, UserRole,
    };
    use crate::repositories::test_support::setup;

    fn user(id: &str, role: UserRole) -> UserRecord {
        UserRecord {
            id: UserId(id.to_string()),
            display_name: id.to_uppercase(),
            role,
            tenant_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn directory_returns_admins_and_super_admins_only() {
        let directory = SqlUserDirectory::new(setup().await);
        for record in [
            user("admin-2", UserRole::Admin),
            user("root", UserRole::SuperAdmin),
            user("cook-1", UserRole::Cook),
            user("client-1", UserRole::Client),
            user("admin-1", UserRole::Admin),
        ] {
            directory.save(&record).await.expect("save user");
        }

        let admins = directory.admins_and_super_admins().await.expect("admins");

        assert_eq!(
            admins,
            vec![
                UserId("admin-1".to_string()),
                UserId("admin-2".to_string()),
                UserId("root".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn empty_directory_is_not_an_error() {
        let directory = SqlUserDirectory::new(setup().await);
        assert!(directory.admins_and_super_admins().await.expect("admins").is_empty());
    }

    #[tokio::test]
    async fn tenant_store_flips_active_flag() {
        let store = SqlTenantStore::new(setup().await);
        let tenant = TenantId("tenant-1".to_string());
        store.save(&tenant, "Mama's Kitchen", true).await.expect("save tenant");

        store.set_active(&tenant, false).await.expect("deactivate");

        assert_eq!(store.is_active(&tenant).await.expect("read"), Some(false));
    }

    #[tokio::test]
    async fn deactivating_unknown_tenant_fails() {
        let store = SqlTenantStore::new(setup().await);

        let error = store
            .set_active(&TenantId("ghost".to_string()), false)
            .await
            .expect_err("unknown tenant");

        assert!(matches!(error, ApplicationError::Persistence(message) if message.contains("ghost")));
    }

    #[tokio::test]
    async fn payment_lookup_ignores_unsuccessful_transactions() {
        let payments = SqlPaymentLookup::new(setup().await);
        let order = OrderId("order-1".to_string());
        let now = Utc::now();

        payments
            .record(&PaymentRecord {
                id: "txn-failed".to_string(),
                order_id: order.clone(),
                amount: Decimal::new(9900, 0),
                status: PaymentStatus::Failed,
                created_at: now,
            })
            .await
            .expect("record failed");
        assert_eq!(payments.successful_payment_for(&order).await.expect("lookup"), None);

        payments
            .record(&PaymentRecord {
                id: "txn-ok".to_string(),
                order_id: order.clone(),
                amount: Decimal::new(8500, 0),
                status: PaymentStatus::Success,
                created_at: now - Duration::minutes(5),
            })
            .await
            .expect("record success");

        let payment = payments.successful_payment_for(&order).await.expect("lookup").expect("paid");
        assert_eq!(payment.transaction_id, "txn-ok");
        assert_eq!(payment.amount, Decimal::new(8500, 0));
    }
}
