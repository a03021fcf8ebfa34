pub mod db;

pub mod audit;
pub mod orders;
pub mod payments;
pub mod webhooks;

use std::env;

pub use db::SqliteDatabase;
use log::info;
use sqlx::{migrate, sqlite::SqlitePoolOptions, SqlitePool};

use crate::traits::StorageError;

const SQLITE_DB_URL: &str = "sqlite://data/order_store.db";

pub fn db_url() -> String {
    let result = env::var("OSE_DATABASE_URL").unwrap_or_else(|_| {
        info!("OSE_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, StorageError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StorageError> {
    migrate!("./src/db/sqlite/migrations")
        .run(pool)
        .await
        .map_err(|e| StorageError::DatabaseError(e.to_string()))?;
    info!("🗃️ Migrations complete");
    Ok(())
}
