use chrono::{DateTime, Utc};
use log::debug;
use ose_common::MinorUnits;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{NewPaymentAttempt, OrderId, PaymentAuditRecord, PaymentOutcomeStatus, TenantId},
    traits::StorageError,
};

const PAYMENT_COLUMNS: &str =
    "id, order_id, tenant_id, idempotency_key, method, provider_txn_id, amount, outcome, created_at, updated_at";

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: i64,
    order_id: String,
    tenant_id: String,
    idempotency_key: String,
    method: String,
    provider_txn_id: Option<String>,
    amount: i64,
    outcome: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for PaymentAuditRecord {
    type Error = StorageError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let outcome = match row.outcome.as_str() {
            "Initiated" => PaymentOutcomeStatus::Initiated,
            "Processing" => PaymentOutcomeStatus::Processing,
            "Success" => PaymentOutcomeStatus::Success,
            "Failed" => PaymentOutcomeStatus::Failed,
            "Refunded" => PaymentOutcomeStatus::Refunded,
            other => return Err(StorageError::CorruptRecord(format!("Invalid payment outcome: {other}"))),
        };
        Ok(PaymentAuditRecord {
            id: row.id,
            order_id: OrderId::from(row.order_id),
            tenant_id: TenantId::from(row.tenant_id),
            idempotency_key: row.idempotency_key,
            method: row.method,
            provider_txn_id: row.provider_txn_id,
            amount: MinorUnits::from(row.amount),
            outcome,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn fetch_payment_by_key(
    key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentAuditRecord>, StorageError> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payment_audit WHERE idempotency_key = $1"
    ))
    .bind(key)
    .fetch_optional(conn)
    .await?;
    row.map(PaymentAuditRecord::try_from).transpose()
}

/// Inserts a payment audit record in `Initiated` state. Not atomic on its own; the caller wraps it in a transaction
/// together with the `PaymentAttempt` audit entry.
pub async fn insert_payment_attempt(
    attempt: &NewPaymentAttempt,
    conn: &mut SqliteConnection,
) -> Result<PaymentAuditRecord, StorageError> {
    let id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO payment_audit (order_id, tenant_id, idempotency_key, method, amount)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id;
        "#,
    )
    .bind(attempt.order_id.as_str())
    .bind(attempt.tenant_id.as_str())
    .bind(attempt.idempotency_key.as_str())
    .bind(attempt.method.as_str())
    .bind(attempt.amount.value())
    .fetch_one(&mut *conn)
    .await?;
    debug!("🗃️ Payment attempt [{}] recorded with id {id}", attempt.idempotency_key);
    fetch_payment_by_key(&attempt.idempotency_key, conn)
        .await?
        .ok_or_else(|| StorageError::DatabaseError("Payment record vanished immediately after insert".to_string()))
}

/// Advances the record's outcome and provider transaction id. Rows are never deleted; a trigger backs that up.
pub async fn mark_payment_outcome(
    key: &str,
    provider_txn_id: Option<&str>,
    outcome: PaymentOutcomeStatus,
    conn: &mut SqliteConnection,
) -> Result<(), StorageError> {
    let res = sqlx::query(
        r#"
            UPDATE payment_audit
            SET outcome = $1, provider_txn_id = COALESCE($2, provider_txn_id), updated_at = CURRENT_TIMESTAMP
            WHERE idempotency_key = $3
        "#,
    )
    .bind(outcome.to_string())
    .bind(provider_txn_id)
    .bind(key)
    .execute(conn)
    .await?;
    if res.rows_affected() == 0 {
        return Err(StorageError::DatabaseError(format!("No payment audit record for idempotency key {key}")));
    }
    Ok(())
}
