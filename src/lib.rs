//! Parking lot reservation backend.
//!
//! Admins provision lots with deterministically numbered spots; users book
//! the first available spot, hold at most one active reservation, and pay an
//! elapsed-time cost on vacate. Lot availability is served from a short-TTL
//! in-process cache backed by Postgres.

use sqlx::PgPool;

pub mod allocation;
pub mod cache;
pub mod db;
pub mod error;
pub mod models;
pub mod provisioning;
pub mod routes;
pub mod store;

pub use error::{AppError, Result};

use cache::LotCache;
use store::postgres::PgStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub store: PgStore,
    pub cache: LotCache,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            store: PgStore::new(pool.clone()),
            db: pool,
            cache: LotCache::new(),
        }
    }
}
