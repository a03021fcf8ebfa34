use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatus};

/// Emitted once the order and its first audit entry are durably committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted on every successful version-checked commit. Carries the full new snapshot, so late-joining subscribers
/// never need a change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdatedEvent {
    pub order: Order,
    pub previous_status: OrderStatus,
}

impl OrderUpdatedEvent {
    pub fn new(previous_status: OrderStatus, order: Order) -> Self {
        Self { order, previous_status }
    }
}
