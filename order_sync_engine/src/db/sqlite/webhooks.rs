use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{NewWebhookEvent, TenantId, WebhookEvent, WebhookStatus},
    traits::{InsertEventResult, StorageError},
};

const EVENT_COLUMNS: &str =
    "id, event_id, tenant_id, event_type, payload, status, attempts, next_attempt_at, last_error, created_at";

#[derive(Debug, FromRow)]
struct EventRow {
    id: i64,
    event_id: String,
    tenant_id: String,
    event_type: String,
    payload: String,
    status: String,
    attempts: i64,
    next_attempt_at: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

fn parse_status(status: &str) -> Result<WebhookStatus, StorageError> {
    match status {
        "Pending" => Ok(WebhookStatus::Pending),
        "Success" => Ok(WebhookStatus::Success),
        "Failed" => Ok(WebhookStatus::Failed),
        other => Err(StorageError::CorruptRecord(format!("Invalid webhook status: {other}"))),
    }
}

impl TryFrom<EventRow> for WebhookEvent {
    type Error = StorageError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let status = parse_status(&row.status)?;
        let payload = serde_json::from_str(&row.payload)?;
        Ok(WebhookEvent {
            id: row.id,
            event_id: row.event_id,
            tenant_id: TenantId::from(row.tenant_id),
            event_type: row.event_type,
            payload,
            status,
            attempts: row.attempts,
            next_attempt_at: row.next_attempt_at,
            last_error: row.last_error,
            created_at: row.created_at,
        })
    }
}

/// Inserts the event unless its provider event id has been seen before. The insert itself is the dedup check
/// (`ON CONFLICT DO NOTHING` against the UNIQUE `event_id` index), so two racing deliveries of the same event can
/// never both land, and the loser is reported as a duplicate rather than a storage failure.
pub async fn idempotent_insert(
    event: &NewWebhookEvent,
    now_ms: i64,
    conn: &mut SqliteConnection,
) -> Result<InsertEventResult, StorageError> {
    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
            INSERT INTO webhook_events (event_id, tenant_id, event_type, payload, next_attempt_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING id;
        "#,
    )
    .bind(event.event_id.as_str())
    .bind(event.tenant_id.as_str())
    .bind(event.event_type.as_str())
    .bind(event.payload.to_string())
    .bind(now_ms)
    .fetch_optional(&mut *conn)
    .await?;
    match inserted {
        Some(id) => Ok(InsertEventResult::Inserted(id)),
        // events are never deleted, so the winning row is still there to report on
        None => {
            let status: String = sqlx::query_scalar("SELECT status FROM webhook_events WHERE event_id = $1")
                .bind(event.event_id.as_str())
                .fetch_one(conn)
                .await?;
            debug!("🗃️ Webhook event [{}] was seen before with status {status}", event.event_id);
            Ok(InsertEventResult::Duplicate(parse_status(&status)?))
        },
    }
}

pub async fn fetch_by_event_id(
    event_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookEvent>, StorageError> {
    let row = sqlx::query_as::<_, EventRow>(&format!(
        "SELECT {EVENT_COLUMNS} FROM webhook_events WHERE event_id = $1"
    ))
    .bind(event_id)
    .fetch_optional(conn)
    .await?;
    row.map(WebhookEvent::try_from).transpose()
}

/// Pending events whose due instant has passed, oldest due first.
pub async fn fetch_due_events(
    now_ms: i64,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<WebhookEvent>, StorageError> {
    let rows = sqlx::query_as::<_, EventRow>(&format!(
        r#"
            SELECT {EVENT_COLUMNS} FROM webhook_events
            WHERE status = 'Pending' AND next_attempt_at <= $1
            ORDER BY next_attempt_at ASC, id ASC
            LIMIT $2
        "#
    ))
    .bind(now_ms)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(WebhookEvent::try_from).collect()
}

pub async fn mark_success(event_id: &str, conn: &mut SqliteConnection) -> Result<(), StorageError> {
    let res = sqlx::query(
        "UPDATE webhook_events SET status = 'Success', attempts = attempts + 1, last_error = NULL WHERE event_id = $1",
    )
    .bind(event_id)
    .execute(conn)
    .await?;
    if res.rows_affected() == 0 {
        return Err(StorageError::EventNotFound(event_id.to_string()));
    }
    Ok(())
}

pub async fn mark_failure(
    event_id: &str,
    error: &str,
    next_attempt_at: i64,
    exhausted: bool,
    conn: &mut SqliteConnection,
) -> Result<(), StorageError> {
    let status = if exhausted { WebhookStatus::Failed } else { WebhookStatus::Pending };
    let res = sqlx::query(
        r#"
            UPDATE webhook_events
            SET status = $1, attempts = attempts + 1, last_error = $2, next_attempt_at = $3
            WHERE event_id = $4
        "#,
    )
    .bind(status.to_string())
    .bind(error)
    .bind(next_attempt_at)
    .bind(event_id)
    .execute(conn)
    .await?;
    if res.rows_affected() == 0 {
        return Err(StorageError::EventNotFound(event_id.to_string()));
    }
    Ok(())
}
