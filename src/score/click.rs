use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ScoreError, ScoreResult};
use crate::model::CounterUpdate;
use crate::score::locks::CounterLocks;
use crate::store::ProductStore;

/// Records outbound link follows.
///
/// One click adds exactly 1 to all three horizons. The read and the write
/// happen under the product's counter lock, which is the same lock the decay
/// tick takes, so neither clicks nor decay can lose each other's updates.
pub struct ClickRecorder {
    store: Arc<dyn ProductStore>,
    locks: Arc<CounterLocks>,
    recorded: AtomicU64,
    not_found: AtomicU64,
    failed: AtomicU64,
}

impl ClickRecorder {
    pub fn new(store: Arc<dyn ProductStore>, locks: Arc<CounterLocks>) -> Self {
        Self {
            store,
            locks,
            recorded: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Count a click and return the product's destination url
    pub fn record_click(&self, product_id: &str) -> ScoreResult<String> {
        let result = self.record_locked(product_id);
        match &result {
            Ok(_) => {
                self.recorded.fetch_add(1, Ordering::Relaxed);
                debug!("Click recorded for {}", product_id);
            }
            Err(ScoreError::NotFound { .. }) => {
                self.not_found.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                debug!("Click on {} not recorded: {}", product_id, e);
            }
        }
        result
    }

    fn record_locked(&self, product_id: &str) -> ScoreResult<String> {
        let _guard = self.locks.lock(product_id);
        let product = self.store.read_product(product_id)?;

        let update = CounterUpdate {
            interactions: Some(product.interactions + 1.0),
            interactions_weekly: Some(product.interactions_weekly + 1.0),
            interactions_daily: Some(product.interactions_daily + 1.0),
        };
        self.store.update_counters(product_id, &update)?;
        Ok(product.url)
    }

    pub fn get_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "recorded": self.recorded.load(Ordering::Relaxed),
            "not_found": self.not_found.load(Ordering::Relaxed),
            "failed": self.failed.load(Ordering::Relaxed),
        })
    }

    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    pub fn not_found(&self) -> u64 {
        self.not_found.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
