use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::ReferenceCache;
use crate::config::Config;
use crate::error::ScoreResult;
use crate::history::TickHistory;
use crate::model::{Merchant, Product, RankCriteria, Tag};
use crate::schedule::{self, TickLedger};
use crate::score::click::ClickRecorder;
use crate::score::decay::{DecayEngine, DecayReport};
use crate::score::locks::CounterLocks;
use crate::score::rank::Ranker;
use crate::store::{CatalogStore, ProductStore, ReferenceStore};

/// How long to wait before retrying a tick that could not list products
const TICK_RETRY: Duration = Duration::from_secs(300);

/// A ranked product with its display data resolved through the entity cache
#[derive(Debug, Clone, Serialize)]
pub struct ListedProduct {
    #[serde(flatten)]
    pub product: Product,
    pub merchant: Merchant,
    pub tag_list: Vec<Tag>,
}

/// Core scoring engine - owns the entity cache, counters, decay and ranking
pub struct ScoreEngine {
    pub config: Arc<Config>,
    pub references: Arc<ReferenceCache>,
    pub clicks: Arc<ClickRecorder>,
    pub decay: Arc<DecayEngine>,
    pub ranker: Arc<Ranker>,
    pub ledger: Arc<TickLedger>,
    pub history: Arc<TickHistory>,
    catalog: Arc<dyn CatalogStore>,
    pub start_time: Instant,
    offset: FixedOffset,
}

impl ScoreEngine {
    pub fn new<S>(config: Arc<Config>, store: Arc<S>) -> anyhow::Result<Self>
    where
        S: ProductStore + ReferenceStore + CatalogStore + 'static,
    {
        let ledger = match &config.decay.ledger_path {
            Some(path) => TickLedger::open(path)?,
            None => {
                warn!("No decay.ledger_path configured; missed ticks cannot be detected across restarts");
                TickLedger::in_memory()
            }
        };
        Self::with_ledger(config, store, ledger)
    }

    pub fn with_ledger<S>(config: Arc<Config>, store: Arc<S>, ledger: TickLedger) -> anyhow::Result<Self>
    where
        S: ProductStore + ReferenceStore + CatalogStore + 'static,
    {
        let offset = FixedOffset::east_opt(config.decay.utc_offset_minutes * 60).ok_or_else(|| {
            anyhow::anyhow!("Invalid UTC offset: {} minutes", config.decay.utc_offset_minutes)
        })?;

        let products: Arc<dyn ProductStore> = store.clone();
        let references: Arc<dyn ReferenceStore> = store.clone();
        let catalog: Arc<dyn CatalogStore> = store;
        let locks = Arc::new(CounterLocks::new());

        Ok(Self {
            references: Arc::new(ReferenceCache::new(references)),
            clicks: Arc::new(ClickRecorder::new(products.clone(), locks.clone())),
            decay: Arc::new(DecayEngine::new(products.clone(), locks, &config.decay)),
            ranker: Arc::new(Ranker::new(products)),
            ledger: Arc::new(ledger),
            history: Arc::new(TickHistory::new(&config.history)),
            catalog,
            start_time: Instant::now(),
            offset,
            config,
        })
    }

    /// Count a click on `product_id` and return the url to redirect to
    pub fn record_click(&self, product_id: &str) -> ScoreResult<String> {
        self.clicks.record_click(product_id)
    }

    pub fn rank_by(&self, criteria: RankCriteria) -> ScoreResult<Vec<Product>> {
        self.ranker.rank_by(criteria)
    }

    /// One decay tick over every product
    pub fn run_decay_tick(&self) -> ScoreResult<DecayReport> {
        self.decay.run_tick()
    }

    /// Ranked products with merchant and tags hydrated, as the listing pages need them
    pub fn ranked_listing(&self, criteria: RankCriteria) -> ScoreResult<Vec<ListedProduct>> {
        self.before_listing();
        self.hydrate(self.rank_by(criteria)?)
    }

    /// Products matching a free-text query by shortcode or name
    pub fn search_listing(&self, query: &str) -> ScoreResult<Vec<ListedProduct>> {
        self.before_listing();
        debug!("Search for {:?}", query);
        self.hydrate(self.catalog.search_products(query)?)
    }

    /// Products carrying the tag with this display name
    pub fn tag_listing(&self, tag_name: &str) -> ScoreResult<Vec<ListedProduct>> {
        self.before_listing();
        let tag = self.catalog.find_tag_by_name(tag_name)?;
        self.hydrate(self.catalog.list_products_tagged(&tag.id)?)
    }

    fn before_listing(&self) {
        if self.config.web.dev_mode {
            self.references.reset();
        }
    }

    fn hydrate(&self, products: Vec<Product>) -> ScoreResult<Vec<ListedProduct>> {
        products
            .into_iter()
            .map(|product| -> ScoreResult<ListedProduct> {
                let merchant = self.references.merchant_for(&product)?;
                let tag_list = self.references.tags_for(&product)?;
                Ok(ListedProduct { product, merchant, tag_list })
            })
            .collect()
    }

    /// Run a tick for every day owed as of `now`, recording each in the ledger.
    ///
    /// Stops at the first tick that fails outright; that day stays owed.
    pub fn run_owed_ticks(&self, now: DateTime<Utc>) -> ScoreResult<usize> {
        let today = schedule::local_date(now, self.offset);
        let owed = self.ledger.owed_ticks(today, self.config.decay.max_catch_up_days);
        if owed.is_empty() {
            debug!("No decay owed for {}", today);
            return Ok(0);
        }
        if owed.len() > 1 {
            info!("Catching up {} missed decay days", owed.len());
        }

        let mut ran = 0;
        for day in owed {
            match self.run_decay_tick() {
                Ok(report) => {
                    self.history.record_success(day, report);
                    if let Err(e) = self.ledger.record(day) {
                        // The tick itself happened; a restart before the next
                        // successful save would repeat this day.
                        error!("Failed to persist tick ledger for {}: {}", day, e);
                    }
                    ran += 1;
                }
                Err(e) => {
                    self.history.record_failure(day, e.to_string());
                    return Err(e);
                }
            }
        }
        Ok(ran)
    }

    /// Decay scheduler - catches up at startup, then ticks at every midnight
    pub async fn run_decay_loop(self: Arc<Self>) {
        if !self.config.decay.enabled {
            info!("Decay scheduler disabled");
            return;
        }
        info!(
            "📉 Decay scheduler started (weekly x{}, daily x{}, offset {})",
            self.config.decay.weekly_factor, self.config.decay.daily_factor, self.offset
        );

        loop {
            let engine = self.clone();
            let outcome = tokio::task::spawn_blocking(move || engine.run_owed_ticks(Utc::now())).await;

            let wait = match outcome {
                Ok(Ok(_)) => self.until_next_midnight(Utc::now()),
                Ok(Err(e)) => {
                    error!("Decay tick failed: {} (retrying in {:?})", e, TICK_RETRY);
                    TICK_RETRY.min(self.until_next_midnight(Utc::now()))
                }
                Err(e) => {
                    error!("Decay task panicked: {}", e);
                    TICK_RETRY
                }
            };
            debug!("Next decay check in {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    fn until_next_midnight(&self, now: DateTime<Utc>) -> Duration {
        (schedule::next_midnight(now, self.offset) - now)
            .to_std()
            .unwrap_or(Duration::from_secs(1))
    }

    /// Get stats for the web API
    pub fn get_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.start_time.elapsed().as_secs(),
            "entity_cache": self.references.get_stats(),
            "clicks": self.clicks.get_stats(),
            "decay": {
                "enabled": self.config.decay.enabled,
                "weekly_factor": self.config.decay.weekly_factor,
                "daily_factor": self.config.decay.daily_factor,
                "last_tick_day": self.ledger.last_tick(),
                "history": self.history.get_stats(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::store::memory::{product, MemoryStore};

    fn config(extra: &str) -> Arc<Config> {
        Arc::new(Config::parse(&format!("[store]\npath = \":memory:\"\n{}", extra)).unwrap())
    }

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.put_product(product("p", 10.0, 4.0, 8.0));
        store.put_tag(Tag { id: "t1".into(), name: "diy".into(), color: "red".into() });
        store.put_tag(Tag { id: "t2".into(), name: "tools".into(), color: "blue".into() });
        store.put_merchant(Merchant {
            id: "m1".into(),
            name: "Acme".into(),
            affiliate: true,
            label: "acme".into(),
        });
        store
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_catch_up_runs_once_per_day() {
        let store = store();
        let engine = ScoreEngine::with_ledger(config(""), store.clone(), TickLedger::in_memory()).unwrap();

        // First boot seeds the ledger, no decay
        assert_eq!(engine.run_owed_ticks(at(2024, 5, 1, 12)).unwrap(), 0);
        assert_eq!(store.product("p").interactions_daily, 8.0);

        // Midnight passes once: one tick
        assert_eq!(engine.run_owed_ticks(at(2024, 5, 2, 0)).unwrap(), 1);
        assert_eq!(store.product("p").interactions_daily, 4.0);

        // Waking again the same day does nothing
        assert_eq!(engine.run_owed_ticks(at(2024, 5, 2, 9)).unwrap(), 0);
        assert_eq!(store.product("p").interactions_daily, 4.0);

        // Two days of downtime: both days are decayed
        assert_eq!(engine.run_owed_ticks(at(2024, 5, 4, 1)).unwrap(), 2);
        assert_eq!(store.product("p").interactions_daily, 1.0);
        assert_eq!(engine.history.recent(10).len(), 3);
    }

    #[test]
    fn test_catch_up_is_capped() {
        let store = store();
        let engine =
            ScoreEngine::with_ledger(config("[decay]\nmax_catch_up_days = 1\n"), store.clone(), TickLedger::in_memory())
                .unwrap();
        engine.run_owed_ticks(at(2024, 5, 1, 12)).unwrap();
        assert_eq!(engine.run_owed_ticks(at(2024, 5, 9, 0)).unwrap(), 1);
        assert_eq!(engine.ledger.last_tick(), chrono::NaiveDate::from_ymd_opt(2024, 5, 9));
    }

    #[test]
    fn test_ranked_listing_hydrates_references() {
        let store = store();
        let engine = ScoreEngine::with_ledger(config(""), store.clone(), TickLedger::in_memory()).unwrap();

        let listing = engine.ranked_listing(RankCriteria::Top).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].merchant.name, "Acme");
        let tags: Vec<_> = listing[0].tag_list.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(tags, vec!["diy", "tools"]);

        // Second listing is served from the cache
        let reads = store.reference_reads();
        engine.ranked_listing(RankCriteria::Top).unwrap();
        assert_eq!(store.reference_reads(), reads);
    }

    #[test]
    fn test_dev_mode_reloads_references() {
        let store = store();
        let engine =
            ScoreEngine::with_ledger(config("[web]\ndev_mode = true\n"), store.clone(), TickLedger::in_memory())
                .unwrap();
        engine.ranked_listing(RankCriteria::Top).unwrap();
        let reads = store.reference_reads();
        engine.ranked_listing(RankCriteria::Top).unwrap();
        assert_eq!(store.reference_reads(), reads * 2);
    }

    #[test]
    fn test_listing_fails_on_missing_merchant() {
        let store = store();
        let mut orphan = product("orphan", 0.0, 0.0, 0.0);
        orphan.merchant_id = "gone".into();
        store.put_product(orphan);
        let engine = ScoreEngine::with_ledger(config(""), store, TickLedger::in_memory()).unwrap();
        assert!(engine.ranked_listing(RankCriteria::Top).unwrap_err().is_not_found());
    }

    #[test]
    fn test_search_listing_hydrates_matches() {
        let store = store();
        let mut iron = product("iron", 1.0, 1.0, 20.0);
        iron.name = "Soldering Iron".into();
        store.put_product(iron);
        let engine = ScoreEngine::with_ledger(config(""), store.clone(), TickLedger::in_memory()).unwrap();

        let by_code = engine.search_listing("iron").unwrap();
        assert_eq!(by_code.len(), 1);
        assert_eq!(by_code[0].product.id, "iron");
        assert_eq!(by_code[0].merchant.name, "Acme");

        let by_name: Vec<_> = engine
            .search_listing("PRODUCT")
            .unwrap()
            .into_iter()
            .map(|l| l.product.id)
            .collect();
        assert_eq!(by_name, vec!["p"]);
        assert!(engine.search_listing("nothing like it").unwrap().is_empty());
    }

    #[test]
    fn test_tag_listing_resolves_name() {
        let store = store();
        let mut untagged = product("bare", 0.0, 0.0, 50.0);
        untagged.tags = "[]".into();
        store.put_product(untagged);
        let engine = ScoreEngine::with_ledger(config(""), store.clone(), TickLedger::in_memory()).unwrap();

        let listing = engine.tag_listing("tools").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].product.id, "p");
        let tags: Vec<_> = listing[0].tag_list.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(tags, vec!["t1", "t2"]);

        assert!(engine.tag_listing("no-such-tag").unwrap_err().is_not_found());
    }

    #[test]
    fn test_end_to_end_click_and_tick() {
        let store = store();
        let engine = ScoreEngine::with_ledger(config(""), store.clone(), TickLedger::in_memory()).unwrap();
        assert_eq!(engine.record_click("p").unwrap(), "https://shop.example/p");
        engine.run_decay_tick().unwrap();
        let p = store.product("p");
        assert_eq!((p.interactions, p.interactions_weekly, p.interactions_daily), (11.0, 4.5, 4.5));
        assert_eq!(engine.get_stats()["clicks"]["recorded"], 1);
    }
}
