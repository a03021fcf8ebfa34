//! Error taxonomy of the public API layer.
//!
//! The `Display` strings here are user-facing; clients relay them verbatim. They therefore describe what the caller
//! can do about the problem rather than what went wrong internally. The internal detail goes to the logs at the site
//! where the error is constructed.

use ose_common::MinorUnits;
use thiserror::Error;

use crate::{
    db_types::OrderStatus,
    helpers::AccessDenied,
    traits::{PriceResolverError, ProcessorError, StorageError},
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("The requested order could not be found")]
    NotFound,
    #[error("You are not authorized to create orders for this venue")]
    TenantMismatch,
    #[error("The order total does not match the current menu prices. Expected {computed}, got {declared}")]
    TotalMismatch { declared: MinorUnits, computed: MinorUnits },
    #[error("An order that is {from} cannot move to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("The order is {0} and can no longer be edited")]
    OrderClosed(OrderStatus),
    #[error("This order was just changed by someone else. Refresh and try again")]
    VersionConflict,
    #[error("The order service is temporarily unavailable. Please try again")]
    StorageUnavailable(String),
    #[error("One or more items could not be priced: {0}")]
    Pricing(#[from] PriceResolverError),
}

impl From<StorageError> for OrderFlowError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => OrderFlowError::NotFound,
            StorageError::VersionConflict { .. } => OrderFlowError::VersionConflict,
            e => OrderFlowError::StorageUnavailable(e.to_string()),
        }
    }
}

impl From<AccessDenied> for OrderFlowError {
    // Reads and updates never reach this conversion; they go through a tenant-scoped fetch that reports `NotFound`
    // instead, so a cross-tenant probe learns nothing.
    fn from(_: AccessDenied) -> Self {
        OrderFlowError::TenantMismatch
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    /// The audit record could not be written, so the payment was not attempted. Fail closed: no audit, no charge.
    #[error("Payments are temporarily unavailable. You have not been charged. Please try again")]
    AuditUnavailable(String),
    #[error("The payment could not be submitted. You may not have been charged; please check before retrying")]
    Processor(#[from] ProcessorError),
    #[error(transparent)]
    OrderFlow(#[from] OrderFlowError),
}

impl From<StorageError> for PaymentError {
    fn from(e: StorageError) -> Self {
        PaymentError::OrderFlow(e.into())
    }
}
