//! Behaviour that a storage backend needs to expose in order to act as a backend for the order sync engine.
//!
//! * [`OrderSyncDatabase`] defines the full backend contract: atomic order+audit creation, version-checked commits,
//!   idempotent payment-attempt records, and the persisted webhook queue.
//! * The result enums in [`data_objects`] distinguish "inserted" from "already existed" without losing the stored
//!   record, which is what makes retried client requests safe.

mod data_objects;
mod order_sync_database;

pub use data_objects::{InsertAttemptResult, InsertEventResult};
pub use order_sync_database::{OrderSyncDatabase, StorageError};
