//! In-memory availability caching using moka
//!
//! Holds each lot's occupancy projection for five minutes. The cache is never
//! the source of truth: every miss falls back to the entity store, and the
//! entry is rebuilt only after the backing mutation has committed.

use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::models::LotView;

/// Lot status entries expire after five minutes
const LOT_STATUS_TTL_SECS: u64 = 5 * 60;

/// Availability cache keyed by lot id
#[derive(Clone)]
pub struct LotCache {
    lots: Cache<i64, Arc<LotView>>,
}

impl LotCache {
    /// Create a new cache instance with the configured TTL
    pub fn new() -> Self {
        Self {
            // Lot projections: 1000 entries, 5 min TTL
            lots: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(Duration::from_secs(LOT_STATUS_TTL_SECS))
                .build(),
        }
    }

    /// Cached projection for a lot, if present and unexpired
    pub async fn get(&self, lot_id: i64) -> Option<Arc<LotView>> {
        self.lots.get(&lot_id).await
    }

    /// Overwrite the entry for a lot with a fresh TTL
    pub async fn insert(&self, view: LotView) {
        self.lots.insert(view.id, Arc::new(view)).await;
    }

    /// Drop the entry for a single lot
    pub async fn invalidate(&self, lot_id: i64) {
        self.lots.invalidate(&lot_id).await;
    }

    /// Drop every cached projection
    pub fn invalidate_all(&self) {
        self.lots.invalidate_all();
        info!("Lot availability cache invalidated");
    }

    /// Cache statistics for monitoring
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            lots_size: self.lots.entry_count(),
        }
    }
}

impl Default for LotCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics for the monitoring endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub lots_size: u64,
}
