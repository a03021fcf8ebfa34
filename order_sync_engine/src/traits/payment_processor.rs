use ose_common::{MinorUnits, Secret};
use thiserror::Error;

/// The payment-processing collaborator. The engine records outcomes; it never talks to card networks itself.
#[allow(async_fn_in_trait)]
pub trait PaymentProcessor {
    /// Submits a charge against the opaque payment method token. The same idempotency key must be forwarded so that
    /// a retried call cannot double-charge.
    async fn charge(
        &self,
        token: &Secret<String>,
        amount: MinorUnits,
        idempotency_key: &str,
    ) -> Result<ChargeResult, ProcessorError>;
}

/// What the provider said about a charge. A declined charge is a *result*, not an error; [`ProcessorError`] is
/// reserved for not getting an answer at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeResult {
    pub provider_txn_id: String,
    pub approved: bool,
    pub decline_reason: Option<String>,
}

#[derive(Debug, Clone, Error)]
pub enum ProcessorError {
    #[error("Payment provider unreachable: {0}")]
    Transport(String),
    #[error("Payment provider rejected the request: {0}")]
    Rejected(String),
}
