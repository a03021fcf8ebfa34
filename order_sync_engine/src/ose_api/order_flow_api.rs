use std::{fmt::Debug, future::Future, time::Duration};

use log::*;
use ose_common::MinorUnits;

use crate::{
    db_types::{
        AccessClaims,
        AuditEntry,
        LineItem,
        NewAuditEntry,
        NewOrder,
        Order,
        OrderChange,
        OrderId,
        OrderStatus,
        WriteOrigin,
    },
    events::{EventProducers, OrderCreatedEvent, OrderUpdatedEvent},
    helpers::{access::ensure_tenant_access, new_order_id},
    ose_api::errors::OrderFlowError,
    traits::{OrderSyncDatabase, PriceResolver, StorageError},
};

/// Exact-match totals by default. Venues that want to absorb sub-unit rounding differences raise this via
/// [`OrderFlowApi::with_total_epsilon`].
pub const DEFAULT_TOTAL_EPSILON: MinorUnits = MinorUnits::ZERO;
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// The order lifecycle API.
///
/// All writes go through the backend's atomic commit methods, so an order and its audit entry always land together
/// or not at all. All mutations carry the caller's expected version; a stale version is reported as
/// [`OrderFlowError::VersionConflict`] and nothing is written. Retrying is the caller's decision.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
    total_epsilon: MinorUnits,
    storage_timeout: Duration,
}

impl<B: Clone> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            producers: self.producers.clone(),
            total_epsilon: self.total_epsilon,
            storage_timeout: self.storage_timeout,
        }
    }
}

impl<B: Debug> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({:?})", self.db)
    }
}

impl<B> OrderFlowApi<B>
where B: OrderSyncDatabase
{
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, total_epsilon: DEFAULT_TOTAL_EPSILON, storage_timeout: DEFAULT_STORAGE_TIMEOUT }
    }

    pub fn with_total_epsilon(mut self, epsilon: MinorUnits) -> Self {
        self.total_epsilon = epsilon;
        self
    }

    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Bounds a storage call so that a wedged connection surfaces as `StorageUnavailable` rather than hanging the
    /// caller.
    async fn guarded<T, F>(&self, fut: F) -> Result<T, OrderFlowError>
    where F: Future<Output = Result<T, StorageError>> {
        match tokio::time::timeout(self.storage_timeout, fut).await {
            Ok(result) => result.map_err(OrderFlowError::from),
            Err(_) => {
                warn!("🔄 Storage call exceeded {}ms", self.storage_timeout.as_millis());
                Err(OrderFlowError::StorageUnavailable("storage call timed out".to_string()))
            },
        }
    }

    /// Recomputes the order total from the single price source of truth. The client-declared total is never trusted
    /// for anything beyond comparison.
    async fn compute_total<P: PriceResolver>(
        &self,
        line_items: &[LineItem],
        resolver: &P,
    ) -> Result<MinorUnits, OrderFlowError> {
        let mut total = MinorUnits::ZERO;
        for item in line_items {
            let unit_price = resolver.get_price(&item.catalog_item_id, &item.modifications).await?;
            total += unit_price * item.quantity;
        }
        Ok(total)
    }

    async fn publish_created(&self, order: &Order) {
        for producer in &self.producers.order_created_producer {
            producer.publish_event(OrderCreatedEvent::new(order.clone())).await;
        }
    }

    async fn publish_updated(&self, previous_status: OrderStatus, order: &Order) {
        for producer in &self.producers.order_updated_producer {
            producer.publish_event(OrderUpdatedEvent::new(previous_status, order.clone())).await;
        }
    }

    /// Validates and persists a new order.
    ///
    /// The declared total is compared against a server-side recomputation; a difference beyond the configured
    /// epsilon rejects the order before anything touches storage. On success the order, its sequence number and its
    /// first audit entry are committed in one transaction and an [`OrderCreatedEvent`] is published.
    pub async fn create_order<P: PriceResolver>(
        &self,
        claims: &AccessClaims,
        order: NewOrder,
        resolver: &P,
    ) -> Result<Order, OrderFlowError> {
        ensure_tenant_access(claims, &order.tenant_id)?;
        let computed = self.compute_total(&order.line_items, resolver).await?;
        if order.declared_total.abs_diff(computed) > self.total_epsilon {
            warn!(
                "🔄 Rejecting order for tenant {}. Declared total {} differs from computed total {computed}",
                order.tenant_id, order.declared_total
            );
            return Err(OrderFlowError::TotalMismatch { declared: order.declared_total, computed });
        }
        let id = new_order_id();
        let tenant_id = order.tenant_id.clone();
        let created = self.guarded(self.db.create_order(id.clone(), order, computed)).await?;
        info!("🔄 Order {id} (#{}) created for tenant {tenant_id} at {computed}", created.seq_no);
        self.publish_created(&created).await;
        Ok(created)
    }

    /// Fetches the order, scoped to the caller's tenant.
    pub async fn order(&self, claims: &AccessClaims, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        self.guarded(self.db.fetch_order(order_id, &claims.tenant_id)).await
    }

    async fn fetch_order_checked(&self, claims: &AccessClaims, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        self.order(claims, order_id).await?.ok_or(OrderFlowError::NotFound)
    }

    /// Moves the order along the status state machine.
    pub async fn update_order_status(
        &self,
        claims: &AccessClaims,
        order_id: &OrderId,
        expected_version: i64,
        new_status: OrderStatus,
    ) -> Result<Order, OrderFlowError> {
        self.update_order_status_from(claims, order_id, expected_version, new_status, WriteOrigin::Direct).await
    }

    /// As [`Self::update_order_status`], with the write origin recorded in the audit payload. Offline queue replays
    /// come through here so that a replayed transition is distinguishable in the trail.
    pub async fn update_order_status_from(
        &self,
        claims: &AccessClaims,
        order_id: &OrderId,
        expected_version: i64,
        new_status: OrderStatus,
        origin: WriteOrigin,
    ) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order_checked(claims, order_id).await?;
        if order.version != expected_version {
            debug!("🔄 Order {order_id} is at version {}, caller expected {expected_version}", order.version);
            return Err(OrderFlowError::VersionConflict);
        }
        if !order.status.can_transition_to(new_status) {
            return Err(OrderFlowError::InvalidTransition { from: order.status, to: new_status });
        }
        let entry = NewAuditEntry::status_change(
            claims.actor.clone(),
            serde_json::json!({ "from": order.status, "to": new_status, "origin": origin }),
        );
        let updated = self
            .guarded(self.db.commit_status_change(order_id, &claims.tenant_id, expected_version, new_status, entry))
            .await?;
        info!("🔄 Order {order_id} moved {} → {new_status} (v{})", order.status, updated.version);
        self.publish_updated(order.status, &updated).await;
        Ok(updated)
    }

    /// Commits a change to the order's content under the same version discipline as a status change.
    ///
    /// The total is recomputed server-side from the effective line items (the new ones if the change carries any,
    /// the stored ones otherwise) and the recomputed value is what gets stored. A declared total, if present, is
    /// validated against it first; there is no way to write an arbitrary total.
    pub async fn update_order<P: PriceResolver>(
        &self,
        claims: &AccessClaims,
        order_id: &OrderId,
        expected_version: i64,
        mut change: OrderChange,
        resolver: &P,
    ) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order_checked(claims, order_id).await?;
        if order.status.is_terminal() {
            return Err(OrderFlowError::OrderClosed(order.status));
        }
        if order.version != expected_version {
            return Err(OrderFlowError::VersionConflict);
        }
        if change.line_items.is_some() || change.total_price.is_some() {
            let items = change.line_items.as_deref().unwrap_or(&order.line_items);
            let computed = self.compute_total(items, resolver).await?;
            if let Some(declared) = change.total_price {
                if declared.abs_diff(computed) > self.total_epsilon {
                    warn!(
                        "🔄 Rejecting content change on order {order_id}. Declared total {declared} differs from \
                         computed total {computed}"
                    );
                    return Err(OrderFlowError::TotalMismatch { declared, computed });
                }
            }
            change.total_price = Some(computed);
        }
        let entry = NewAuditEntry::order_change(
            claims.actor.clone(),
            serde_json::json!({
                "line_items_changed": change.line_items.is_some(),
                "total_price": change.total_price,
                "metadata_changed": change.metadata.is_some(),
            }),
        );
        let updated = self
            .guarded(self.db.commit_order_change(order_id, &claims.tenant_id, expected_version, change, entry))
            .await?;
        info!("🔄 Order {order_id} content updated (v{})", updated.version);
        self.publish_updated(order.status, &updated).await;
        Ok(updated)
    }

    /// The order's complete audit trail, totally ordered by the version each entry accompanies.
    pub async fn audit_trail(
        &self,
        claims: &AccessClaims,
        order_id: &OrderId,
    ) -> Result<Vec<AuditEntry>, OrderFlowError> {
        // existence check first, so that a probe for a foreign order gets NotFound rather than an empty trail
        let _ = self.fetch_order_checked(claims, order_id).await?;
        self.guarded(self.db.fetch_audit_trail(order_id, &claims.tenant_id)).await
    }
}
