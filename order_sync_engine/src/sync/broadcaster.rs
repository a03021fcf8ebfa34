use std::{
    collections::HashMap,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures_util::Stream;
use log::*;
use serde::{Deserialize, Serialize};
use tokio::sync::{
    mpsc,
    mpsc::error::TrySendError,
    RwLock,
};

use crate::{
    db_types::{Order, OrderStatus, TenantId},
    events::{EventHooks, OrderCreatedEvent, OrderUpdatedEvent},
};

/// What subscribers receive. Every message carries the full order snapshot at the version that was committed, so a
/// subscriber that misses a message is merely behind, not wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMessage {
    OrderCreated(Order),
    OrderUpdated { previous_status: OrderStatus, order: Order },
}

impl SyncMessage {
    pub fn order(&self) -> &Order {
        match self {
            SyncMessage::OrderCreated(order) => order,
            SyncMessage::OrderUpdated { order, .. } => order,
        }
    }
}

/// Tenant-scoped fan-out of committed order changes.
///
/// Subscribers for one tenant never see another tenant's orders; isolation is by construction (each tenant has its
/// own sender list), not by filtering. Closed subscriptions are pruned on the next publish to their tenant.
pub struct SyncBroadcaster {
    buffer_size: usize,
    subscribers: RwLock<HashMap<TenantId, Vec<mpsc::Sender<SyncMessage>>>>,
}

impl SyncBroadcaster {
    pub fn new(buffer_size: usize) -> Arc<Self> {
        Arc::new(Self { buffer_size, subscribers: RwLock::new(HashMap::new()) })
    }

    pub async fn subscribe<T: Into<TenantId>>(&self, tenant_id: T) -> Subscription {
        let tenant_id = tenant_id.into();
        let (sender, receiver) = mpsc::channel(self.buffer_size);
        self.subscribers.write().await.entry(tenant_id.clone()).or_default().push(sender);
        debug!("📡 New subscriber for tenant {tenant_id}");
        Subscription { tenant_id, receiver }
    }

    pub async fn subscriber_count(&self, tenant_id: &TenantId) -> usize {
        self.subscribers
            .read()
            .await
            .get(tenant_id)
            .map(|senders| senders.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }

    /// Delivers the message to every live subscriber of the tenant. A subscriber whose buffer is full misses this
    /// message; since messages are full snapshots, the next one it does receive makes it current again.
    pub async fn publish(&self, tenant_id: &TenantId, message: SyncMessage) {
        let mut subscribers = self.subscribers.write().await;
        let Some(senders) = subscribers.get_mut(tenant_id) else {
            return;
        };
        senders.retain(|sender| !sender.is_closed());
        if senders.is_empty() {
            subscribers.remove(tenant_id);
            return;
        }
        trace!("📡 Broadcasting {} to {} subscriber(s) of tenant {tenant_id}", message.order().order_id, senders.len());
        for sender in senders.iter() {
            match sender.try_send(message.clone()) {
                Ok(()) => {},
                Err(TrySendError::Full(_)) => {
                    warn!("📡 A subscriber of tenant {tenant_id} is lagging and missed an update");
                },
                Err(TrySendError::Closed(_)) => {},
            }
        }
    }

    /// The hook set that wires this broadcaster into the engine's event handlers. Pass the result to
    /// [`crate::events::EventHandlers::new`].
    pub fn event_hooks(self: &Arc<Self>) -> EventHooks {
        let mut hooks = EventHooks::default();
        let broadcaster = Arc::clone(self);
        hooks.on_order_created(move |ev: OrderCreatedEvent| {
            let broadcaster = Arc::clone(&broadcaster);
            Box::pin(async move {
                let tenant_id = ev.order.tenant_id.clone();
                broadcaster.publish(&tenant_id, SyncMessage::OrderCreated(ev.order)).await;
            })
        });
        let broadcaster = Arc::clone(self);
        hooks.on_order_updated(move |ev: OrderUpdatedEvent| {
            let broadcaster = Arc::clone(&broadcaster);
            Box::pin(async move {
                let tenant_id = ev.order.tenant_id.clone();
                let message = SyncMessage::OrderUpdated { previous_status: ev.previous_status, order: ev.order };
                broadcaster.publish(&tenant_id, message).await;
            })
        });
        hooks
    }
}

/// One subscriber's view of the stream. Dropping the subscription unsubscribes.
pub struct Subscription {
    tenant_id: TenantId,
    receiver: mpsc::Receiver<SyncMessage>,
}

impl Subscription {
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub async fn recv(&mut self) -> Option<SyncMessage> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = SyncMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
