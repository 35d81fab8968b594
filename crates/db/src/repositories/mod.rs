use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::Row;
use thiserror::Error;

use cookhouse_core::errors::ApplicationError;

pub mod audit;
pub mod complaint;
pub mod directory;
pub mod notification_outbox;

pub use audit::SqlAuditLog;
pub use complaint::SqlComplaintRepository;
pub use directory::{
    PaymentRecord, PaymentStatus, SqlPaymentLookup, SqlTenantStore, SqlUserDirectory, UserRecord,
    UserRole,
};
pub use notification_outbox::SqlNotificationOutbox;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Fixed-width UTC encoding so that string comparison in SQL is chronological.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: `{value}`: {error}")))
}

pub(crate) fn decode_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|value| decode_timestamp(column, &value)).transpose()
}

pub(crate) fn decode_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("{column}: `{value}`: {error}")))
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|error| RepositoryError::Decode(error.to_string()))
}


#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{decode_timestamp, encode_timestamp, RepositoryError};

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let whole_second = encode_timestamp(base + Duration::seconds(1));
        let fraction = encode_timestamp(base + Duration::milliseconds(500));

        assert!(fraction < whole_second);
        assert_eq!(decode_timestamp("at", &whole_second).expect("decode"), base + Duration::seconds(1));
    }

    #[test]
    fn malformed_timestamp_is_a_decode_error() {
        let error = decode_timestamp("created_at", "yesterday").expect_err("should fail");
        assert!(matches!(error, RepositoryError::Decode(message) if message.contains("created_at")));
    }
}
