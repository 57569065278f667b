mod from_row;
mod schema;
pub mod queries;

pub use from_row::{FromRow, query_all, query_one};
pub use schema::init_db;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::fulfillment::Fulfillment;
use crate::payments::StripeClient;
use crate::storage::MemoryBlobStore;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub stripe: StripeClient,
    pub fulfillment: Fulfillment,
    /// In-memory contract store served under `/contracts` (dev mode without a bucket).
    pub contract_files: Option<Arc<MemoryBlobStore>>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
    Pool::builder().max_size(10).build(manager)
}
