use std::collections::VecDeque;

use log::*;
use thiserror::Error;

use crate::{
    db_types::{AccessClaims, NewOrder, OrderId, OrderStatus, WriteOrigin},
    ose_api::{OrderFlowApi, OrderFlowError},
    traits::{OrderSyncDatabase, PriceResolver},
};

/// A write captured while the device was offline.
#[derive(Debug, Clone)]
pub enum QueuedWrite {
    CreateOrder(NewOrder),
    UpdateStatus { order_id: OrderId, new_status: OrderStatus },
}

#[derive(Debug, Clone, Error)]
pub enum OfflineQueueError {
    #[error("The offline queue is full ({0} writes pending). Reconnect before taking more orders")]
    QueueFull(usize),
}

/// What a replay achieved. `rejected` writes were refused by the server on their merits (the state moved on without
/// them); they are reported, not retried. `interrupted` is set when storage went away mid-replay, in which case the
/// remaining writes are still queued.
#[derive(Debug, Default)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: Vec<(QueuedWrite, OrderFlowError)>,
    pub interrupted: Option<OrderFlowError>,
}

/// The client-side queue of writes made while disconnected.
///
/// Writes replay strictly in capture order. Every replayed write is tagged [`WriteOrigin::OfflineReplay`], so the
/// audit trail distinguishes a live transition from a replayed one. A status update whose expected version went
/// stale while offline is re-read and retried a bounded number of times; a transition the server's state machine no
/// longer admits is rejected and surfaced to the device, never forced.
#[derive(Debug)]
pub struct OfflineWriteQueue {
    pending: VecDeque<QueuedWrite>,
    max_pending: usize,
    max_write_retries: u32,
}

impl OfflineWriteQueue {
    pub fn new(max_pending: usize) -> Self {
        Self { pending: VecDeque::new(), max_pending, max_write_retries: 3 }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn queue_write(&mut self, write: QueuedWrite) -> Result<(), OfflineQueueError> {
        if self.pending.len() >= self.max_pending {
            return Err(OfflineQueueError::QueueFull(self.pending.len()));
        }
        self.pending.push_back(write);
        Ok(())
    }

    /// Drains the queue through the order flow API, oldest write first.
    pub async fn replay<B, P>(
        &mut self,
        api: &OrderFlowApi<B>,
        claims: &AccessClaims,
        resolver: &P,
    ) -> ReplaySummary
    where
        B: OrderSyncDatabase,
        P: PriceResolver,
    {
        let mut summary = ReplaySummary::default();
        info!("📡 Replaying {} offline write(s)", self.pending.len());
        while let Some(write) = self.pending.pop_front() {
            match self.apply(api, claims, resolver, &write).await {
                Ok(()) => summary.applied += 1,
                Err(e @ OrderFlowError::StorageUnavailable(_)) => {
                    warn!("📡 Storage went away mid-replay; {} write(s) stay queued", self.pending.len() + 1);
                    self.pending.push_front(write);
                    summary.interrupted = Some(e);
                    break;
                },
                Err(e) => {
                    warn!("📡 Offline write was rejected on replay: {e}");
                    summary.rejected.push((write, e));
                },
            }
        }
        info!("📡 Replay done. {} applied, {} rejected", summary.applied, summary.rejected.len());
        summary
    }

    async fn apply<B, P>(
        &self,
        api: &OrderFlowApi<B>,
        claims: &AccessClaims,
        resolver: &P,
        write: &QueuedWrite,
    ) -> Result<(), OrderFlowError>
    where
        B: OrderSyncDatabase,
        P: PriceResolver,
    {
        match write {
            QueuedWrite::CreateOrder(order) => {
                let order = order.clone().with_origin(WriteOrigin::OfflineReplay);
                api.create_order(claims, order, resolver).await.map(|_| ())
            },
            QueuedWrite::UpdateStatus { order_id, new_status } => {
                let mut retries = 0;
                loop {
                    let current = api.order(claims, order_id).await?.ok_or(OrderFlowError::NotFound)?;
                    let result = api
                        .update_order_status_from(
                            claims,
                            order_id,
                            current.version,
                            *new_status,
                            WriteOrigin::OfflineReplay,
                        )
                        .await;
                    match result {
                        Err(OrderFlowError::VersionConflict) if retries < self.max_write_retries => {
                            retries += 1;
                        },
                        other => return other.map(|_| ()),
                    }
                }
            },
        }
    }
}
