//! Database management and control.
//!
//! This module provides the interface contract of the engine's storage *backends*, and the SQLite implementation.
//! You should never need to access the database directly; use [`crate::OrderFlowApi`] and [`crate::PaymentApi`]
//! instead. The
//! exception is the data types used in the database, which are defined in [`crate::db_types`] and are public.

pub mod sqlite;
pub mod traits;
