use log::*;

use crate::{
    db_types::{NewWebhookEvent, WebhookStatus},
    traits::{InsertEventResult, OrderSyncDatabase, StorageError},
};

/// What intake did with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueAck {
    /// First sighting of this event id; it is now queued for processing.
    Accepted,
    /// The event id was seen before. The stored status says how far processing got; the delivery had no effect.
    Duplicate(WebhookStatus),
}

/// Intake for provider callbacks. Persist first, process later: an event that is acknowledged here survives a crash
/// or restart and will eventually be picked up by the worker.
#[derive(Debug, Clone)]
pub struct WebhookQueue<B> {
    db: B,
}

impl<B> WebhookQueue<B>
where B: OrderSyncDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Persists the event unless its provider event id has been seen before. Callers should acknowledge the
    /// delivery to the provider on either result; a duplicate is a successful delivery too.
    pub async fn enqueue(&self, event: NewWebhookEvent) -> Result<EnqueueAck, StorageError> {
        let event_id = event.event_id.clone();
        match self.db.insert_webhook_event(event).await? {
            InsertEventResult::Inserted(id) => {
                debug!("📬 Webhook event [{event_id}] queued (row {id})");
                Ok(EnqueueAck::Accepted)
            },
            InsertEventResult::Duplicate(status) => {
                debug!("📬 Webhook event [{event_id}] is a repeat delivery (status {status})");
                Ok(EnqueueAck::Duplicate(status))
            },
        }
    }
}
