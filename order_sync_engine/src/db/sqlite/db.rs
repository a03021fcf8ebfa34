use std::fmt::Debug;

use log::*;
use ose_common::MinorUnits;
use sqlx::SqlitePool;

use super::{audit, db_url, new_pool, orders, payments, webhooks};
use crate::{
    db_types::{
        AuditEntry,
        NewAuditEntry,
        NewOrder,
        NewPaymentAttempt,
        NewWebhookEvent,
        Order,
        OrderChange,
        OrderId,
        OrderStatus,
        PaymentAuditRecord,
        PaymentOutcomeStatus,
        TenantId,
        WebhookEvent,
    },
    traits::{InsertAttemptResult, InsertEventResult, OrderSyncDatabase, StorageError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the url from the environment.
    pub async fn new(max_connections: u32) -> Result<Self, StorageError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl OrderSyncDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_order(&self, id: OrderId, order: NewOrder, total: MinorUnits) -> Result<Order, StorageError> {
        let mut tx = self.pool.begin().await?;
        let seq_no = orders::next_seq_no(&order.tenant_id, &mut tx).await?;
        orders::insert_order(&id, &order, total, seq_no, &mut tx).await?;
        let entry = NewAuditEntry::status_change(
            order.actor.clone(),
            serde_json::json!({
                "from": serde_json::Value::Null,
                "to": OrderStatus::Pending,
                "origin": order.origin,
                "declared_total": order.declared_total,
            }),
        );
        audit::insert_audit_entry(&id, &order.tenant_id, 1, &entry, &mut tx).await?;
        let created = orders::fetch_order(&id, &order.tenant_id, &mut tx)
            .await?
            .ok_or_else(|| StorageError::DatabaseError(format!("Order {id} vanished inside its own transaction")))?;
        tx.commit().await?;
        debug!("🗃️ Order {id} saved as #{seq_no} for tenant {}", order.tenant_id);
        Ok(created)
    }

    async fn fetch_order(&self, order_id: &OrderId, tenant_id: &TenantId) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(order_id, tenant_id, &mut conn).await
    }

    async fn commit_status_change(
        &self,
        order_id: &OrderId,
        tenant_id: &TenantId,
        expected_version: i64,
        new_status: OrderStatus,
        audit_entry: NewAuditEntry,
    ) -> Result<Order, StorageError> {
        let mut tx = self.pool.begin().await?;
        orders::apply_status_change(order_id, tenant_id, expected_version, new_status, &mut tx).await?;
        audit::insert_audit_entry(order_id, tenant_id, expected_version + 1, &audit_entry, &mut tx).await?;
        let updated = orders::fetch_order(order_id, tenant_id, &mut tx).await?.ok_or(StorageError::NotFound)?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} committed at version {}", updated.version);
        Ok(updated)
    }

    async fn commit_order_change(
        &self,
        order_id: &OrderId,
        tenant_id: &TenantId,
        expected_version: i64,
        change: OrderChange,
        audit_entry: NewAuditEntry,
    ) -> Result<Order, StorageError> {
        let mut tx = self.pool.begin().await?;
        orders::apply_order_change(order_id, tenant_id, expected_version, change, &mut tx).await?;
        audit::insert_audit_entry(order_id, tenant_id, expected_version + 1, &audit_entry, &mut tx).await?;
        let updated = orders::fetch_order(order_id, tenant_id, &mut tx).await?.ok_or(StorageError::NotFound)?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn upsert_payment_attempt(
        &self,
        attempt: NewPaymentAttempt,
        order_version: i64,
        audit_entry: NewAuditEntry,
    ) -> Result<InsertAttemptResult, StorageError> {
        let mut tx = self.pool.begin().await?;
        if let Some(existing) = payments::fetch_payment_by_key(&attempt.idempotency_key, &mut tx).await? {
            debug!("🗃️ Payment attempt [{}] already recorded; returning the stored record", attempt.idempotency_key);
            return Ok(InsertAttemptResult::AlreadyExists(existing));
        }
        let record = payments::insert_payment_attempt(&attempt, &mut tx).await?;
        audit::insert_audit_entry(&attempt.order_id, &attempt.tenant_id, order_version, &audit_entry, &mut tx)
            .await?;
        tx.commit().await?;
        Ok(InsertAttemptResult::Inserted(record))
    }

    async fn commit_payment_outcome(
        &self,
        order_id: &OrderId,
        tenant_id: &TenantId,
        expected_version: i64,
        idempotency_key: &str,
        provider_txn_id: Option<&str>,
        outcome: PaymentOutcomeStatus,
        new_status: Option<OrderStatus>,
        audit_entry: NewAuditEntry,
    ) -> Result<Order, StorageError> {
        let mut tx = self.pool.begin().await?;
        match new_status {
            Some(status) => {
                orders::apply_status_change(order_id, tenant_id, expected_version, status, &mut tx).await?
            },
            None => {
                // the outcome still claims a version slot so the audit trail stays totally ordered
                orders::apply_order_change(order_id, tenant_id, expected_version, OrderChange::default(), &mut tx)
                    .await?
            },
        }
        payments::mark_payment_outcome(idempotency_key, provider_txn_id, outcome, &mut tx).await?;
        audit::insert_audit_entry(order_id, tenant_id, expected_version + 1, &audit_entry, &mut tx).await?;
        let updated = orders::fetch_order(order_id, tenant_id, &mut tx).await?.ok_or(StorageError::NotFound)?;
        tx.commit().await?;
        debug!("🗃️ Payment [{idempotency_key}] is now {outcome}. Order {order_id} at version {}", updated.version);
        Ok(updated)
    }

    async fn fetch_payment_audit_by_key(&self, key: &str) -> Result<Option<PaymentAuditRecord>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment_by_key(key, &mut conn).await
    }

    async fn insert_webhook_event(&self, event: NewWebhookEvent) -> Result<InsertEventResult, StorageError> {
        let mut tx = self.pool.begin().await?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let result = webhooks::idempotent_insert(&event, now_ms, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_webhook_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        webhooks::fetch_by_event_id(event_id, &mut conn).await
    }

    async fn fetch_due_webhook_events(&self, now_ms: i64, limit: i64) -> Result<Vec<WebhookEvent>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        webhooks::fetch_due_events(now_ms, limit, &mut conn).await
    }

    async fn record_webhook_success(&self, event_id: &str) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        webhooks::mark_success(event_id, &mut conn).await
    }

    async fn record_webhook_failure(
        &self,
        event_id: &str,
        error: &str,
        next_attempt_at: i64,
        exhausted: bool,
    ) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        webhooks::mark_failure(event_id, error, next_attempt_at, exhausted, &mut conn).await
    }

    async fn fetch_audit_trail(
        &self,
        order_id: &OrderId,
        tenant_id: &TenantId,
    ) -> Result<Vec<AuditEntry>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        audit::fetch_audit_trail(order_id, tenant_id, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}
