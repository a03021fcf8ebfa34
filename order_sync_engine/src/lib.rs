//! Order Consistency & Synchronization Engine
//!
//! The engine keeps a multi-tenant restaurant's order state consistent across every device that touches it. This
//! library contains the core logic; it is transport-agnostic and knows nothing about HTTP or websockets.
//!
//! The library is divided into four main sections:
//! 1. Database management and control ([`mod@db_types`] and the storage contract in [`mod@traits`]). SQLite is the
//!    supported backend. You should never need to access the database directly; use the public APIs instead. The
//!    exception is the data types used in the database, which are defined in `db_types` and are public.
//! 2. The engine's public API: [`OrderFlowApi`] for the order lifecycle (validated creation, version-checked
//!    mutations, the audit trail) and [`PaymentApi`] for the money path, with its fail-closed audit gate.
//! 3. Webhook reconciliation ([`mod@reconciliation`]): the persisted, deduplicated intake for provider callbacks and
//!    the backoff-retrying worker that drains it.
//! 4. Real-time synchronization ([`mod@sync`]): tenant-scoped fan-out of committed order snapshots, plus the
//!    client-side reconnect schedule and offline write queue.
//!
//! The engine also emits events when orders are created or updated. A simple hook framework ([`mod@events`]) lets
//! you subscribe to these and perform custom actions; the sync broadcaster is itself wired in through these hooks.
mod db;

pub mod db_types;
pub mod events;
pub mod helpers;
mod ose_api;
pub mod reconciliation;
pub mod sync;
pub mod traits;

pub use db::sqlite::{db_url, new_pool, run_migrations, SqliteDatabase};
pub use ose_api::{OrderFlowApi, OrderFlowError, PaymentApi, PaymentError};
