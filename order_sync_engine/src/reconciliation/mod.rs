//! The webhook reconciliation pipeline.
//!
//! Payment providers deliver callbacks at-least-once and in no particular order. [`WebhookQueue`] is the intake: it
//! persists each event exactly once, keyed by the provider's event id, before anything is processed. The
//! [`ReconciliationWorker`] drains the queue on an interval, applies each outcome through
//! [`crate::PaymentApi`], and reschedules failures with exponential backoff until the [`RetryPolicy`] is exhausted.
//! Exhausted events are kept as `Failed`, never dropped.

mod queue;
mod worker;

pub use queue::{EnqueueAck, WebhookQueue};
pub use worker::{ReconciliationWorker, RetryPolicy};
