pub mod access;

pub use access::{ensure_tenant_access, AccessDenied};
use rand::RngCore;

/// Mints a new opaque order id. Uniqueness is backed by the UNIQUE constraint on the orders table; 128 random bits
/// make a collision a storage error rather than a design concern.
pub fn new_order_id() -> crate::db_types::OrderId {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex = bytes.iter().map(|b| format!("{b:02x}")).collect::<String>();
    crate::db_types::OrderId::from(format!("ord-{hex}"))
}
