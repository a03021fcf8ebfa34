#![allow(dead_code)]
//! Shared scaffolding for the integration tests: a fresh migrated database per test, a canned menu standing in for
//! the pricing service, and a scriptable payment processor.

pub mod prepare_env;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use order_sync_engine::{
    db_types::{AccessClaims, LineItem, NewOrder},
    events::EventProducers,
    traits::{ChargeResult, PaymentProcessor, PriceResolver, PriceResolverError, ProcessorError},
    OrderFlowApi,
    PaymentApi,
    SqliteDatabase,
};
use ose_common::{MinorUnits, Secret};
use prepare_env::{prepare_test_env, random_db_path};

pub async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub async fn setup() -> (SqliteDatabase, OrderFlowApi<SqliteDatabase>, PaymentApi<SqliteDatabase>) {
    let db = new_db().await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let payments = PaymentApi::new(db.clone(), EventProducers::default());
    (db, orders, payments)
}

pub fn claims(tenant: &str) -> AccessClaims {
    AccessClaims::new("tester", tenant)
}

/// Injects a storage failure: any further INSERT into the table aborts, and with it the surrounding transaction.
pub async fn block_inserts(db: &SqliteDatabase, table: &str) {
    let sql = format!(
        "CREATE TRIGGER test_block_{table} BEFORE INSERT ON {table} BEGIN SELECT RAISE(ABORT, 'injected storage \
         failure'); END;"
    );
    sqlx::query(&sql).execute(db.pool()).await.expect("Error installing the failure trigger");
}

pub async fn unblock_inserts(db: &SqliteDatabase, table: &str) {
    let sql = format!("DROP TRIGGER test_block_{table};");
    sqlx::query(&sql).execute(db.pool()).await.expect("Error removing the failure trigger");
}

/// As [`block_inserts`], but for UPDATE statements.
pub async fn block_updates(db: &SqliteDatabase, table: &str) {
    let sql = format!(
        "CREATE TRIGGER test_block_update_{table} BEFORE UPDATE ON {table} BEGIN SELECT RAISE(ABORT, 'injected \
         storage failure'); END;"
    );
    sqlx::query(&sql).execute(db.pool()).await.expect("Error installing the failure trigger");
}

pub async fn unblock_updates(db: &SqliteDatabase, table: &str) {
    let sql = format!("DROP TRIGGER test_block_update_{table};");
    sqlx::query(&sql).execute(db.pool()).await.expect("Error removing the failure trigger");
}

//--------------------------------------       TestMenu       --------------------------------------------------------

/// A canned price list. Each modification adds a flat surcharge.
pub struct TestMenu {
    prices: HashMap<String, MinorUnits>,
    surcharge: MinorUnits,
}

impl TestMenu {
    pub fn cafe() -> Self {
        let prices = [("espresso", 350i64), ("flat-white", 450), ("muffin", 400)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), MinorUnits::from(v)))
            .collect();
        Self { prices, surcharge: MinorUnits::from(50) }
    }
}

impl PriceResolver for TestMenu {
    async fn get_price(
        &self,
        catalog_item_id: &str,
        modifications: &[String],
    ) -> Result<MinorUnits, PriceResolverError> {
        let base = self
            .prices
            .get(catalog_item_id)
            .copied()
            .ok_or_else(|| PriceResolverError::UnknownItem(catalog_item_id.to_string()))?;
        #[allow(clippy::cast_possible_wrap)]
        Ok(base + self.surcharge * modifications.len() as i64)
    }
}

/// One espresso and one flat white: 8.00 at [`TestMenu::cafe`] prices.
pub fn coffee_order(tenant: &str) -> NewOrder {
    let items = vec![LineItem::new("espresso", 1), LineItem::new("flat-white", 1)];
    NewOrder::new(tenant, "tester", items, MinorUnits::from(800))
}

pub fn payment_token() -> Secret<String> {
    Secret::new("tok_test_4242".to_string())
}

//--------------------------------------    TestProcessor     --------------------------------------------------------

pub enum ChargeMode {
    Approve,
    Decline(String),
    Unreachable,
}

/// A scriptable stand-in for the card network. Counts calls so tests can assert the fail-closed gate never let a
/// charge through.
pub struct TestProcessor {
    mode: Mutex<ChargeMode>,
    calls: AtomicUsize,
}

impl TestProcessor {
    pub fn approving() -> Self {
        Self { mode: Mutex::new(ChargeMode::Approve), calls: AtomicUsize::new(0) }
    }

    pub fn declining(reason: &str) -> Self {
        Self { mode: Mutex::new(ChargeMode::Decline(reason.to_string())), calls: AtomicUsize::new(0) }
    }

    pub fn unreachable() -> Self {
        Self { mode: Mutex::new(ChargeMode::Unreachable), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PaymentProcessor for TestProcessor {
    async fn charge(
        &self,
        _token: &Secret<String>,
        _amount: MinorUnits,
        idempotency_key: &str,
    ) -> Result<ChargeResult, ProcessorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = self.mode.lock().unwrap();
        match &*mode {
            ChargeMode::Approve => Ok(ChargeResult {
                provider_txn_id: format!("txn-{idempotency_key}"),
                approved: true,
                decline_reason: None,
            }),
            ChargeMode::Decline(reason) => Ok(ChargeResult {
                provider_txn_id: format!("txn-{idempotency_key}"),
                approved: false,
                decline_reason: Some(reason.clone()),
            }),
            ChargeMode::Unreachable => Err(ProcessorError::Transport("connection refused".to_string())),
        }
    }
}
