//! Real-time synchronization.
//!
//! [`SyncBroadcaster`] fans committed order snapshots out to subscribers, strictly scoped by tenant. It plugs into
//! the engine's event hooks, so anything that goes through [`crate::OrderFlowApi`] or [`crate::PaymentApi`] reaches
//! subscribers without those APIs knowing the broadcaster exists.
//!
//! The client-side pieces live here too: [`ClientConnection`] decides when a dropped subscriber should dial back in
//! (exponential backoff with jitter, so a venue full of devices does not reconnect in lockstep), and
//! [`OfflineWriteQueue`] holds writes made while disconnected and replays them, in order, once the connection is
//! back.

mod broadcaster;
mod offline_queue;
mod reconnect;

pub use broadcaster::{SyncBroadcaster, SyncMessage, Subscription};
pub use offline_queue::{OfflineQueueError, OfflineWriteQueue, QueuedWrite, ReplaySummary};
pub use reconnect::{ClientConnection, ReconnectDecision, ReconnectPolicy};
