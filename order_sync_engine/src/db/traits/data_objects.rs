use crate::db_types::{PaymentAuditRecord, WebhookStatus};

/// The result of recording a payment attempt. A duplicate idempotency key resolves to the stored record rather
/// than an error, so the caller can always continue with *a* record.
#[derive(Debug, Clone)]
pub enum InsertAttemptResult {
    Inserted(PaymentAuditRecord),
    AlreadyExists(PaymentAuditRecord),
}

impl InsertAttemptResult {
    pub fn record(&self) -> &PaymentAuditRecord {
        match self {
            InsertAttemptResult::Inserted(r) | InsertAttemptResult::AlreadyExists(r) => r,
        }
    }

    pub fn into_record(self) -> PaymentAuditRecord {
        match self {
            InsertAttemptResult::Inserted(r) | InsertAttemptResult::AlreadyExists(r) => r,
        }
    }
}

/// The result of enqueuing a webhook event. A duplicate provider event id reports the stored processing status so
/// the queue can acknowledge without reprocessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertEventResult {
    Inserted(i64),
    Duplicate(WebhookStatus),
}
