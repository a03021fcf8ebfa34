//! The public API surface of the engine.
//!
//! [`OrderFlowApi`] owns the order lifecycle: validated creation, version-checked status and content mutations, and
//! reads of the order and its audit trail. [`PaymentApi`] owns the money path and the fail-closed audit gate in
//! front of it. Both are generic over the storage backend and publish lifecycle events through the hook system in
//! [`crate::events`].

mod errors;
mod order_flow_api;
mod payment_api;

pub use errors::{OrderFlowError, PaymentError};
pub use order_flow_api::OrderFlowApi;
pub use payment_api::PaymentApi;
