//! The engine's seams.
//!
//! * [`OrderSyncDatabase`] is the storage backend contract (implemented by
//!   [`crate::SqliteDatabase`]).
//! * [`PriceResolver`] and [`PaymentProcessor`] are the two external collaborators the engine consults but does not
//!   own: pricing rules and card-network communication live on the other side of these traits, which keeps them
//!   mockable in tests.

mod payment_processor;
mod pricing;

pub use payment_processor::{ChargeResult, PaymentProcessor, ProcessorError};
pub use pricing::{PriceResolver, PriceResolverError};

pub use crate::db::traits::{InsertAttemptResult, InsertEventResult, OrderSyncDatabase, StorageError};
