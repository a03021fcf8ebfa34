use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{AuditEntry, AuditEventType, NewAuditEntry, OrderId, TenantId},
    traits::StorageError,
};

#[derive(Debug, FromRow)]
struct AuditRow {
    id: i64,
    order_id: String,
    tenant_id: String,
    event_type: String,
    actor: String,
    order_version: i64,
    payload: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = StorageError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let event_type = match row.event_type.as_str() {
            "StatusChange" => AuditEventType::StatusChange,
            "OrderChange" => AuditEventType::OrderChange,
            "PaymentAttempt" => AuditEventType::PaymentAttempt,
            "PaymentResult" => AuditEventType::PaymentResult,
            other => return Err(StorageError::CorruptRecord(format!("Invalid audit event type: {other}"))),
        };
        let payload = serde_json::from_str(&row.payload)?;
        Ok(AuditEntry {
            id: row.id,
            order_id: OrderId::from(row.order_id),
            tenant_id: TenantId::from(row.tenant_id),
            event_type,
            actor: row.actor,
            order_version: row.order_version,
            payload,
            created_at: row.created_at,
        })
    }
}

/// Appends one audit entry. Not atomic on its own; embed the call in the transaction of the mutation it describes.
pub async fn insert_audit_entry(
    order_id: &OrderId,
    tenant_id: &TenantId,
    order_version: i64,
    entry: &NewAuditEntry,
    conn: &mut SqliteConnection,
) -> Result<i64, StorageError> {
    let id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO audit_log (order_id, tenant_id, event_type, actor, order_version, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id;
        "#,
    )
    .bind(order_id.as_str())
    .bind(tenant_id.as_str())
    .bind(entry.event_type.to_string())
    .bind(entry.actor.as_str())
    .bind(order_version)
    .bind(entry.payload.to_string())
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Fetches the full trail for an order, totally ordered by the version each entry accompanies.
pub async fn fetch_audit_trail(
    order_id: &OrderId,
    tenant_id: &TenantId,
    conn: &mut SqliteConnection,
) -> Result<Vec<AuditEntry>, StorageError> {
    let rows = sqlx::query_as::<_, AuditRow>(
        r#"
            SELECT id, order_id, tenant_id, event_type, actor, order_version, payload, created_at
            FROM audit_log
            WHERE order_id = $1 AND tenant_id = $2
            ORDER BY order_version ASC, id ASC
        "#,
    )
    .bind(order_id.as_str())
    .bind(tenant_id.as_str())
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(AuditEntry::try_from).collect()
}
