use std::{fmt::Debug, future::Future, time::Duration};

use log::*;
use ose_common::{MinorUnits, Secret};

use crate::{
    db_types::{
        AccessClaims,
        NewAuditEntry,
        NewPaymentAttempt,
        Order,
        OrderId,
        OrderStatus,
        PaymentAuditRecord,
        PaymentOutcomePayload,
        PaymentOutcomeStatus,
    },
    events::{EventProducers, OrderUpdatedEvent},
    ose_api::errors::{OrderFlowError, PaymentError},
    traits::{OrderSyncDatabase, PaymentProcessor, StorageError},
};

pub const DEFAULT_AUDIT_TIMEOUT: Duration = Duration::from_secs(5);

/// The money path, with the audit gate in front of it.
///
/// The gate is fail-closed: a payment attempt that cannot be durably recorded is never submitted to the processor.
/// The inconvenience of a rejected payment is recoverable; a charge with no record of why it happened is not.
pub struct PaymentApi<B> {
    db: B,
    producers: EventProducers,
    audit_timeout: Duration,
}

impl<B: Clone> Clone for PaymentApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone(), audit_timeout: self.audit_timeout }
    }
}

impl<B: Debug> Debug for PaymentApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentApi ({:?})", self.db)
    }
}

impl<B> PaymentApi<B>
where B: OrderSyncDatabase
{
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, audit_timeout: DEFAULT_AUDIT_TIMEOUT }
    }

    pub fn with_audit_timeout(mut self, timeout: Duration) -> Self {
        self.audit_timeout = timeout;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    async fn publish_updated(&self, previous_status: OrderStatus, order: &Order) {
        for producer in &self.producers.order_updated_producer {
            producer.publish_event(OrderUpdatedEvent::new(previous_status, order.clone())).await;
        }
    }

    /// Bounds a storage call outside the gate itself. The deadline is the same one the gate uses; the difference is
    /// that these calls surface as `StorageUnavailable` rather than refusing the payment outright.
    async fn guarded<T, F>(&self, fut: F) -> Result<T, PaymentError>
    where F: Future<Output = Result<T, StorageError>> {
        match tokio::time::timeout(self.audit_timeout, fut).await {
            Ok(result) => result.map_err(PaymentError::from),
            Err(_) => {
                warn!("💰 Storage call exceeded {}ms", self.audit_timeout.as_millis());
                Err(PaymentError::OrderFlow(OrderFlowError::StorageUnavailable("storage call timed out".to_string())))
            },
        }
    }

    async fn fetch_order_checked(&self, claims: &AccessClaims, order_id: &OrderId) -> Result<Order, PaymentError> {
        self.guarded(self.db.fetch_order(order_id, &claims.tenant_id))
            .await?
            .ok_or(PaymentError::OrderFlow(OrderFlowError::NotFound))
    }

    /// Writes the payment attempt record and its audit entry, or refuses to let the payment proceed.
    ///
    /// Any storage failure here, including a timeout, maps to [`PaymentError::AuditUnavailable`]. A duplicate
    /// idempotency key is not an error; the stored record is returned as-is.
    pub async fn record_payment_attempt<K, M>(
        &self,
        claims: &AccessClaims,
        order: &Order,
        idempotency_key: K,
        method: M,
        amount: MinorUnits,
    ) -> Result<PaymentAuditRecord, PaymentError>
    where
        K: Into<String>,
        M: Into<String>,
    {
        let attempt = NewPaymentAttempt::new(order, idempotency_key, method, amount);
        let entry = NewAuditEntry::payment_attempt(
            claims.actor.clone(),
            serde_json::json!({
                "idempotency_key": attempt.idempotency_key,
                "method": attempt.method,
                "amount": attempt.amount,
            }),
        );
        let write = self.db.upsert_payment_attempt(attempt, order.version, entry);
        match tokio::time::timeout(self.audit_timeout, write).await {
            Ok(Ok(result)) => Ok(result.into_record()),
            Ok(Err(e)) => {
                error!("💰 Audit gate refused a payment on order {}: {e}", order.order_id);
                Err(PaymentError::AuditUnavailable(e.to_string()))
            },
            Err(_) => {
                error!("💰 Audit gate timed out on order {}. The payment will not proceed", order.order_id);
                Err(PaymentError::AuditUnavailable("audit write timed out".to_string()))
            },
        }
    }

    /// Runs a payment end to end: gate, charge, atomic outcome commit.
    ///
    /// The charge amount is always the stored order total; callers cannot charge a different figure. An approved
    /// charge on a `Ready` order also completes the order; on any earlier status the outcome is recorded and the
    /// order keeps moving through its normal lifecycle. A repeat call with an idempotency key that already reached a
    /// terminal outcome returns the stored record without contacting the processor.
    pub async fn submit_payment<C, K, M>(
        &self,
        claims: &AccessClaims,
        order_id: &OrderId,
        idempotency_key: K,
        method: M,
        token: &Secret<String>,
        processor: &C,
    ) -> Result<PaymentAuditRecord, PaymentError>
    where
        C: PaymentProcessor,
        K: Into<String>,
        M: Into<String>,
    {
        let key = idempotency_key.into();
        let order = self.fetch_order_checked(claims, order_id).await?;
        let record = self.record_payment_attempt(claims, &order, key.as_str(), method, order.total_price).await?;
        if record.outcome.is_terminal() {
            info!("💰 Payment [{key}] on order {order_id} already settled as {}. Not charging again", record.outcome);
            return Ok(record);
        }
        let charge = processor.charge(token, order.total_price, key.as_str()).await?;
        let outcome = if charge.approved { PaymentOutcomeStatus::Success } else { PaymentOutcomeStatus::Failed };
        self.commit_outcome(claims, &order, &key, &charge.provider_txn_id, outcome, &charge.decline_reason).await?;
        let settled = self
            .guarded(self.db.fetch_payment_audit_by_key(&key))
            .await?
            .ok_or(PaymentError::OrderFlow(OrderFlowError::NotFound))?;
        Ok(settled)
    }

    /// Applies a payment outcome reported by the provider out-of-band. This is the reconciliation path: the same
    /// event may be delivered any number of times, and every delivery after the first is a no-op.
    pub async fn apply_provider_outcome(
        &self,
        claims: &AccessClaims,
        payload: &PaymentOutcomePayload,
    ) -> Result<(), PaymentError> {
        let order = self.fetch_order_checked(claims, &payload.order_id).await?;
        let record = match self.guarded(self.db.fetch_payment_audit_by_key(&payload.idempotency_key)).await? {
            Some(record) => record,
            // the provider settled a payment we never saw an attempt for; record it before applying the outcome
            None => {
                self.record_payment_attempt(
                    claims,
                    &order,
                    payload.idempotency_key.as_str(),
                    "provider-webhook",
                    payload.amount,
                )
                .await?
            },
        };
        if record.outcome.is_terminal() {
            debug!(
                "💰 Payment [{}] on order {} is already {}. Ignoring repeat delivery",
                payload.idempotency_key, payload.order_id, record.outcome
            );
            return Ok(());
        }
        let outcome = if payload.success { PaymentOutcomeStatus::Success } else { PaymentOutcomeStatus::Failed };
        self.commit_outcome(claims, &order, &payload.idempotency_key, &payload.provider_txn_id, outcome, &None)
            .await?;
        Ok(())
    }

    async fn commit_outcome(
        &self,
        claims: &AccessClaims,
        order: &Order,
        idempotency_key: &str,
        provider_txn_id: &str,
        outcome: PaymentOutcomeStatus,
        decline_reason: &Option<String>,
    ) -> Result<(), PaymentError> {
        let approved = outcome == PaymentOutcomeStatus::Success;
        let new_status = (approved && order.status == OrderStatus::Ready).then_some(OrderStatus::Completed);
        let entry = NewAuditEntry::payment_result(
            claims.actor.clone(),
            serde_json::json!({
                "idempotency_key": idempotency_key,
                "provider_txn_id": provider_txn_id,
                "outcome": outcome,
                "decline_reason": decline_reason,
            }),
        );
        let updated = self
            .guarded(self.db.commit_payment_outcome(
                &order.order_id,
                &order.tenant_id,
                order.version,
                idempotency_key,
                Some(provider_txn_id),
                outcome,
                new_status,
                entry,
            ))
            .await?;
        info!("💰 Payment [{idempotency_key}] on order {} settled as {outcome}", order.order_id);
        self.publish_updated(order.status, &updated).await;
        Ok(())
    }
}
