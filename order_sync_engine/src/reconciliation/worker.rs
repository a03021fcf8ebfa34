use std::time::Duration;

use chrono::Utc;
use log::*;
use thiserror::Error;
use tokio::sync::watch;

use crate::{
    db_types::{AccessClaims, PaymentOutcomePayload, WebhookEvent},
    ose_api::{OrderFlowError, PaymentApi, PaymentError},
    traits::{OrderSyncDatabase, StorageError},
};

/// The actor recorded in audit entries written on the reconciliation path.
pub const WORKER_ACTOR: &str = "reconciliation-worker";

/// How often a failing event is retried before it is parked as `Failed`.
///
/// `delay_for(n)` is the wait scheduled for an event that had n failed attempts before the current one:
/// `base_delay * 2^n`, capped at `max_delay`. The first retry therefore waits exactly `base_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base_delay: Duration::from_secs(1), max_delay: Duration::from_secs(300), max_attempts: 8 }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // cap the shift; the min() against max_delay does the real bounding
        let factor = 1u32 << attempt.min(20);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn is_exhausted(&self, attempts: i64) -> bool {
        attempts >= i64::from(self.max_attempts)
    }
}

#[derive(Debug, Error)]
enum ReconcileError {
    #[error("Malformed payload: {0}")]
    BadPayload(#[from] serde_json::Error),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// The queue drainer.
///
/// Polls for due events on an interval and applies each one through [`PaymentApi::apply_provider_outcome`]. A
/// failure reschedules the event with backoff; success and exhaustion both take it off the due list, but an
/// exhausted event is kept as `Failed` so that a human can reconcile it by hand. The worker holds no state of its
/// own, so stopping it mid-queue loses nothing.
pub struct ReconciliationWorker<B> {
    db: B,
    payments: PaymentApi<B>,
    policy: RetryPolicy,
    poll_interval: Duration,
    batch_size: i64,
}

impl<B> ReconciliationWorker<B>
where B: OrderSyncDatabase
{
    pub fn new(db: B, payments: PaymentApi<B>) -> Self {
        Self { db, payments, policy: RetryPolicy::default(), poll_interval: Duration::from_secs(1), batch_size: 50 }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Runs until the shutdown signal flips to `true`. Callers spawn this on their runtime.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("🔁 Reconciliation worker started (poll every {}ms)", self.poll_interval.as_millis());
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.process_due_events().await {
                        error!("🔁 Reconciliation pass could not read the queue: {e}");
                    }
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("🔁 Reconciliation worker shutting down. Pending events stay queued");
                        break;
                    }
                },
            }
        }
    }

    /// One drain pass. Visible for tests; production code goes through [`Self::run`].
    pub async fn process_due_events(&self) -> Result<usize, StorageError> {
        let now_ms = Utc::now().timestamp_millis();
        let due = self.db.fetch_due_webhook_events(now_ms, self.batch_size).await?;
        let n = due.len();
        for event in due {
            if let Err(e) = self.process_event(&event).await {
                // the event itself carries its failure state; this is the bookkeeping write failing
                error!("🔁 Could not record the outcome for event [{}]: {e}", event.event_id);
            }
        }
        Ok(n)
    }

    async fn process_event(&self, event: &WebhookEvent) -> Result<(), StorageError> {
        trace!("🔁 Processing webhook event [{}] (attempt {})", event.event_id, event.attempts + 1);
        match self.apply(event).await {
            Ok(()) => {
                debug!("🔁 Webhook event [{}] applied", event.event_id);
                self.db.record_webhook_success(&event.event_id).await
            },
            Err(e) => {
                let attempts_after = event.attempts + 1;
                let exhausted = self.policy.is_exhausted(attempts_after);
                // the delay is keyed on the attempts that had already failed going in, so the first retry waits
                // base_delay and each one after doubles
                let delay = self.policy.delay_for(u32::try_from(event.attempts).unwrap_or(u32::MAX));
                let next_attempt_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
                if exhausted {
                    warn!(
                        "🔁 Webhook event [{}] failed {attempts_after} times: {e}. Parking it as Failed for manual \
                         reconciliation",
                        event.event_id
                    );
                } else {
                    debug!(
                        "🔁 Webhook event [{}] failed: {e}. Retrying in {}ms",
                        event.event_id,
                        delay.as_millis()
                    );
                }
                self.db.record_webhook_failure(&event.event_id, &e.to_string(), next_attempt_at, exhausted).await
            },
        }
    }

    async fn apply(&self, event: &WebhookEvent) -> Result<(), ReconcileError> {
        let payload: PaymentOutcomePayload = serde_json::from_value(event.payload.clone())?;
        let claims = AccessClaims::new(WORKER_ACTOR, event.tenant_id.clone());
        // the order may be moving while we reconcile; a conflicted commit is re-read and retried a few times before
        // the event goes back on the queue
        let mut conflicts = 0;
        loop {
            match self.payments.apply_provider_outcome(&claims, &payload).await {
                Err(PaymentError::OrderFlow(OrderFlowError::VersionConflict)) if conflicts < 3 => {
                    conflicts += 1;
                    trace!("🔁 Version conflict applying event [{}], retry {conflicts}", event.event_id);
                },
                other => return other.map_err(ReconcileError::from),
            }
        }
    }
}
