use ose_common::MinorUnits;
use thiserror::Error;

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
    traits::{InsertAttemptResult, InsertEventResult},
};

/// This trait defines the highest level of behaviour for backends supporting the order sync engine.
///
/// This behaviour includes:
/// * Atomic creation of an order together with its first audit entry,
/// * Version-checked (optimistic) commits of order mutations, each paired with an audit entry,
/// * Idempotent payment-attempt records keyed by idempotency key,
/// * The persisted webhook queue that survives a process restart.
///
/// Every method that touches an order is tenant-scoped. A row that exists under a different tenant behaves exactly
/// like a row that does not exist.
#[allow(async_fn_in_trait)]
pub trait OrderSyncDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Takes a new order and, in a single atomic transaction,
    /// * allocates the next per-tenant sequence number,
    /// * inserts the order row with `version = 1` and `Pending` status,
    /// * inserts the first `StatusChange` audit entry.
    ///
    /// If any of these writes fails the whole transaction is rolled back and no order is visible to readers.
    /// `total` is the server-side validated total, not the client-declared one.
    async fn create_order(&self, id: OrderId, order: NewOrder, total: MinorUnits) -> Result<Order, StorageError>;

    /// Fetches the order scoped to the given tenant. Returns `None` for a missing row *and* for a row owned by a
    /// different tenant.
    async fn fetch_order(&self, order_id: &OrderId, tenant_id: &TenantId) -> Result<Option<Order>, StorageError>;

    /// Commits a status change if and only if the stored row still has `expected_version`. On success the row is
    /// written with `version + 1` and the audit entry is inserted in the same transaction. On a version mismatch,
    /// nothing is written and [`StorageError::VersionConflict`] is returned; retry policy belongs to the caller.
    async fn commit_status_change(
        &self,
        order_id: &OrderId,
        tenant_id: &TenantId,
        expected_version: i64,
        new_status: OrderStatus,
        audit: NewAuditEntry,
    ) -> Result<Order, StorageError>;

    /// Commits a change to the non-status fields of an order under the same version discipline as
    /// [`Self::commit_status_change`].
    async fn commit_order_change(
        &self,
        order_id: &OrderId,
        tenant_id: &TenantId,
        expected_version: i64,
        change: OrderChange,
        audit: NewAuditEntry,
    ) -> Result<Order, StorageError>;

    /// Records a payment attempt, keyed by the attempt's idempotency key, together with its `PaymentAttempt` audit
    /// entry in one transaction. A duplicate key performs no write and returns the stored record.
    ///
    /// `order_version` is the version of the order the attempt was made against; it orders the audit entry within
    /// the order's trail without bumping the order itself.
    async fn upsert_payment_attempt(
        &self,
        attempt: NewPaymentAttempt,
        order_version: i64,
        audit: NewAuditEntry,
    ) -> Result<InsertAttemptResult, StorageError>;

    /// In a single atomic transaction,
    /// * commits the order row with `version + 1` (and `new_status`, when given) under the version check,
    /// * marks the payment audit record's outcome and provider transaction id,
    /// * appends the `PaymentResult` audit entry.
    ///
    /// If any write fails, the payment outcome is not marked and the order is untouched.
    #[allow(clippy::too_many_arguments)]
    async fn commit_payment_outcome(
        &self,
        order_id: &OrderId,
        tenant_id: &TenantId,
        expected_version: i64,
        idempotency_key: &str,
        provider_txn_id: Option<&str>,
        outcome: PaymentOutcomeStatus,
        new_status: Option<OrderStatus>,
        audit: NewAuditEntry,
    ) -> Result<Order, StorageError>;

    /// Fetches the payment audit record for the given idempotency key, if any.
    async fn fetch_payment_audit_by_key(&self, key: &str) -> Result<Option<PaymentAuditRecord>, StorageError>;

    /// Inserts a webhook event if its provider event id has not been seen before. A duplicate id performs no write
    /// and reports the stored processing status.
    async fn insert_webhook_event(&self, event: NewWebhookEvent) -> Result<InsertEventResult, StorageError>;

    /// Fetches a webhook event by its provider event id. Failed events stay queryable here for manual
    /// reconciliation.
    async fn fetch_webhook_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, StorageError>;

    /// Fetches up to `limit` pending events whose `next_attempt_at` is at or before `now_ms`, oldest first.
    async fn fetch_due_webhook_events(&self, now_ms: i64, limit: i64) -> Result<Vec<WebhookEvent>, StorageError>;

    /// Marks the event as successfully processed.
    async fn record_webhook_success(&self, event_id: &str) -> Result<(), StorageError>;

    /// Records a processing failure: bumps the attempt count, stores the error and the next due instant. When
    /// `exhausted` is set, the event is marked `Failed` and left for manual reconciliation.
    async fn record_webhook_failure(
        &self,
        event_id: &str,
        error: &str,
        next_attempt_at: i64,
        exhausted: bool,
    ) -> Result<(), StorageError>;

    /// Fetches the audit trail for an order, ordered by the order version each entry accompanies.
    async fn fetch_audit_trail(&self, order_id: &OrderId, tenant_id: &TenantId)
        -> Result<Vec<AuditEntry>, StorageError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested order does not exist in the caller's tenant scope")]
    NotFound,
    #[error("The order was modified concurrently; the expected version {expected} is stale")]
    VersionConflict { expected: i64 },
    #[error("The webhook event {0} does not exist")]
    EventNotFound(String),
    #[error("Stored record could not be decoded: {0}")]
    CorruptRecord(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::CorruptRecord(e.to_string())
    }
}
