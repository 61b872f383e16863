use std::sync::Arc;
use std::time::Instant;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DecayConfig;
use crate::error::ScoreResult;
use crate::model::{round_to, CounterUpdate};
use crate::score::locks::CounterLocks;
use crate::store::ProductStore;

/// Outcome of one decay tick
#[derive(Debug, Clone, Serialize)]
pub struct DecayReport {
    pub started_at: DateTime<Utc>,
    pub products: usize,
    pub updated: usize,
    pub failed: usize,
    /// Rows that vanished between listing and writing
    pub skipped: usize,
    pub elapsed_ms: u64,
}

/// Attenuates the weekly and daily horizons of every product.
///
/// Lifetime `interactions` is never touched. Decay is not idempotent:
/// scheduling has to make sure this runs once per calendar day.
pub struct DecayEngine {
    store: Arc<dyn ProductStore>,
    locks: Arc<CounterLocks>,
    weekly_factor: f64,
    daily_factor: f64,
    precision: u32,
    tick_lock: Mutex<()>,
}

impl DecayEngine {
    pub fn new(store: Arc<dyn ProductStore>, locks: Arc<CounterLocks>, config: &DecayConfig) -> Self {
        Self {
            store,
            locks,
            weekly_factor: config.weekly_factor,
            daily_factor: config.daily_factor,
            precision: config.precision,
            tick_lock: Mutex::new(()),
        }
    }

    /// New (weekly, daily) values after one tick
    pub fn decayed(&self, weekly: f64, daily: f64) -> (f64, f64) {
        (
            round_to(weekly * self.weekly_factor, self.precision),
            round_to(daily * self.daily_factor, self.precision),
        )
    }

    /// Run one tick over the full product set.
    ///
    /// Only a failure to list products fails the tick; per-product errors are
    /// logged and counted, and the rest of the set is still processed.
    pub fn run_tick(&self) -> ScoreResult<DecayReport> {
        let _tick = self.tick_lock.lock();
        let started_at = Utc::now();
        let start = Instant::now();

        let rows = self.store.list_all_products()?;
        let mut report = DecayReport {
            started_at,
            products: rows.len(),
            updated: 0,
            failed: 0,
            skipped: 0,
            elapsed_ms: 0,
        };

        for row in &rows {
            match self.decay_one(&row.id) {
                Ok(()) => report.updated += 1,
                Err(e) if e.is_not_found() => {
                    debug!("Product {} disappeared before decay", row.id);
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!("Decay write failed for {}: {}", row.id, e);
                    report.failed += 1;
                }
            }
        }

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            "📉 Decayed scores of {} products (updated: {}, failed: {}, skipped: {}, {}ms)",
            report.products, report.updated, report.failed, report.skipped, report.elapsed_ms
        );
        Ok(report)
    }

    fn decay_one(&self, product_id: &str) -> ScoreResult<()> {
        let _guard = self.locks.lock(product_id);
        // Re-read under the lock: a click may have landed since the listing
        let current = self.store.read_product(product_id)?;
        let (weekly, daily) = self.decayed(current.interactions_weekly, current.interactions_daily);
        self.store.update_counters(
            product_id,
            &CounterUpdate {
                interactions: None,
                interactions_weekly: Some(weekly),
                interactions_daily: Some(daily),
            },
        )
    }
}
