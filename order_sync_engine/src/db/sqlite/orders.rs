use chrono::{DateTime, Utc};
use log::trace;
use ose_common::MinorUnits;
use sqlx::{FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderChange, OrderId, OrderStatus, TenantId},
    traits::StorageError,
};

const ORDER_COLUMNS: &str =
    "id, order_id, tenant_id, seq_no, status, version, total_price, line_items, metadata, created_at, updated_at";

/// Raw orders row. JSON columns and the status string are decoded into [`Order`] explicitly so that a corrupt row
/// surfaces as [`StorageError::CorruptRecord`] instead of a driver panic.
#[derive(Debug, FromRow)]
pub(crate) struct OrderRow {
    id: i64,
    order_id: String,
    tenant_id: String,
    seq_no: i64,
    status: String,
    version: i64,
    total_price: i64,
    line_items: String,
    metadata: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StorageError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<OrderStatus>().map_err(|e| StorageError::CorruptRecord(e.to_string()))?;
        let line_items = serde_json::from_str(&row.line_items)?;
        let metadata = serde_json::from_str(&row.metadata)?;
        Ok(Order {
            id: row.id,
            order_id: OrderId::from(row.order_id),
            tenant_id: TenantId::from(row.tenant_id),
            seq_no: row.seq_no,
            status,
            version: row.version,
            total_price: MinorUnits::from(row.total_price),
            line_items,
            metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Allocates the next human-readable sequence number for the tenant. Must run inside the same transaction as the
/// insert that uses it; the UNIQUE (tenant_id, seq_no) constraint backs up the race.
pub async fn next_seq_no(tenant_id: &TenantId, conn: &mut SqliteConnection) -> Result<i64, StorageError> {
    let seq_no: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(seq_no), 0) + 1 FROM orders WHERE tenant_id = $1")
            .bind(tenant_id.as_str())
            .fetch_one(conn)
            .await?;
    Ok(seq_no)
}

/// Inserts a new order row. Not atomic on its own; embed the call in a transaction and pass `&mut *tx` as the
/// connection argument.
pub async fn insert_order(
    id: &OrderId,
    order: &NewOrder,
    total: MinorUnits,
    seq_no: i64,
    conn: &mut SqliteConnection,
) -> Result<i64, StorageError> {
    let line_items = serde_json::to_string(&order.line_items)?;
    let metadata = serde_json::to_string(&order.metadata)?;
    let row_id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO orders (
                order_id,
                tenant_id,
                seq_no,
                total_price,
                line_items,
                metadata
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id;
        "#,
    )
    .bind(id.as_str())
    .bind(order.tenant_id.as_str())
    .bind(seq_no)
    .bind(total.value())
    .bind(line_items)
    .bind(metadata)
    .fetch_one(conn)
    .await?;
    Ok(row_id)
}

/// Fetches the order scoped to the tenant. A row owned by a different tenant is reported as absent.
pub async fn fetch_order(
    order_id: &OrderId,
    tenant_id: &TenantId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StorageError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1 AND tenant_id = $2"
    ))
    .bind(order_id.as_str())
    .bind(tenant_id.as_str())
    .fetch_optional(conn)
    .await?;
    row.map(Order::try_from).transpose()
}

/// The stored version of the order, or `None` if it does not exist in the tenant's scope. Used to tell a stale
/// writer apart from a probe for a missing row after a guarded UPDATE touched nothing.
async fn stored_version(
    order_id: &OrderId,
    tenant_id: &TenantId,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, StorageError> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM orders WHERE order_id = $1 AND tenant_id = $2")
            .bind(order_id.as_str())
            .bind(tenant_id.as_str())
            .fetch_optional(conn)
            .await?;
    Ok(version)
}

/// Resolves a zero-rows-affected guarded update into the right error.
async fn conflict_or_not_found(
    order_id: &OrderId,
    tenant_id: &TenantId,
    expected_version: i64,
    conn: &mut SqliteConnection,
) -> StorageError {
    match stored_version(order_id, tenant_id, conn).await {
        Ok(Some(_)) => StorageError::VersionConflict { expected: expected_version },
        Ok(None) => StorageError::NotFound,
        Err(e) => e,
    }
}

/// Writes the new status and bumps the version, if and only if the stored version still equals `expected_version`.
pub async fn apply_status_change(
    order_id: &OrderId,
    tenant_id: &TenantId,
    expected_version: i64,
    new_status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<(), StorageError> {
    let res = sqlx::query(
        r#"
            UPDATE orders
            SET status = $1, version = version + 1, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $2 AND tenant_id = $3 AND version = $4
        "#,
    )
    .bind(new_status.to_string())
    .bind(order_id.as_str())
    .bind(tenant_id.as_str())
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;
    if res.rows_affected() == 0 {
        return Err(conflict_or_not_found(order_id, tenant_id, expected_version, conn).await);
    }
    trace!("🗃️ Order {order_id} moved to {new_status} at version {}", expected_version + 1);
    Ok(())
}

/// Writes the changed non-status fields and bumps the version under the same guard as [`apply_status_change`].
pub async fn apply_order_change(
    order_id: &OrderId,
    tenant_id: &TenantId,
    expected_version: i64,
    change: OrderChange,
    conn: &mut SqliteConnection,
) -> Result<(), StorageError> {
    let mut builder = QueryBuilder::new("UPDATE orders SET version = version + 1, updated_at = CURRENT_TIMESTAMP");
    if let Some(line_items) = change.line_items {
        builder.push(", line_items = ");
        builder.push_bind(serde_json::to_string(&line_items)?);
    }
    if let Some(total_price) = change.total_price {
        builder.push(", total_price = ");
        builder.push_bind(total_price.value());
    }
    if let Some(metadata) = change.metadata {
        builder.push(", metadata = ");
        builder.push_bind(serde_json::to_string(&metadata)?);
    }
    builder.push(" WHERE order_id = ");
    builder.push_bind(order_id.as_str());
    builder.push(" AND tenant_id = ");
    builder.push_bind(tenant_id.as_str());
    builder.push(" AND version = ");
    builder.push_bind(expected_version);
    trace!("🗃️ Executing query: {}", builder.sql());
    let res = builder.build().execute(&mut *conn).await?;
    if res.rows_affected() == 0 {
        return Err(conflict_or_not_found(order_id, tenant_id, expected_version, conn).await);
    }
    Ok(())
}
