use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::debug;

use crate::error::ScoreResult;
use crate::model::{Merchant, Product, Tag};
use crate::store::ReferenceStore;

/// Kinds of reference data the cache serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Tag,
    Merchant,
}

impl EntityKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tag" | "tags" => Some(EntityKind::Tag),
            "merchant" | "merchants" => Some(EntityKind::Merchant),
            _ => None,
        }
    }
}

/// Reference data that can be hydrated from the store by id
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn load(store: &dyn ReferenceStore, id: &str) -> ScoreResult<Self>;
}

impl Entity for Tag {
    const KIND: EntityKind = EntityKind::Tag;

    fn load(store: &dyn ReferenceStore, id: &str) -> ScoreResult<Self> {
        store.read_tag(id)
    }
}

impl Entity for Merchant {
    const KIND: EntityKind = EntityKind::Merchant;

    fn load(store: &dyn ReferenceStore, id: &str) -> ScoreResult<Self> {
        store.read_merchant(id)
    }
}

/// Lazy, write-once-per-key memo table for one entity kind.
///
/// Each key owns a `OnceCell`, so concurrent misses on the same id wait for a
/// single store read instead of racing. A failed read leaves the cell empty
/// and the next caller retries. Entries are never evicted.
pub struct EntityCache<T: Entity> {
    entries: DashMap<String, Arc<OnceCell<T>>>,
    store: Arc<dyn ReferenceStore>,
    hits: AtomicU64,
    misses: AtomicU64,
    load_failures: AtomicU64,
}

impl<T: Entity> EntityCache<T> {
    pub fn new(store: Arc<dyn ReferenceStore>) -> Self {
        Self {
            entries: DashMap::new(),
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
        }
    }

    pub fn get(&self, id: &str) -> ScoreResult<T> {
        // Clone the cell out so no shard lock is held across the store read
        let cell = self
            .entries
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if let Some(value) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value.clone());
        }

        let result = cell.get_or_try_init(|| {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Entity cache miss: {:?} {}", T::KIND, id);
            T::load(self.store.as_ref(), id)
        });

        match result {
            Ok(value) => Ok(value.clone()),
            Err(e) => {
                self.load_failures.fetch_add(1, Ordering::Relaxed);
                // Drop the empty cell unless someone filled or replaced it meanwhile
                self.entries
                    .remove_if(id, |_, c| Arc::ptr_eq(c, &cell) && c.get().is_none());
                Err(e)
            }
        }
    }

    /// Number of hydrated entries
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().get().is_some()).count()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub load_failures: u64,
}

/// A cached entity of either kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReferenceEntity {
    Tag(Tag),
    Merchant(Merchant),
}

/// Tag and merchant caches, one container per kind so ids never collide
/// across kinds.
pub struct ReferenceCache {
    pub tags: EntityCache<Tag>,
    pub merchants: EntityCache<Merchant>,
}

impl ReferenceCache {
    pub fn new(store: Arc<dyn ReferenceStore>) -> Self {
        Self {
            tags: EntityCache::new(store.clone()),
            merchants: EntityCache::new(store),
        }
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> ScoreResult<ReferenceEntity> {
        match kind {
            EntityKind::Tag => self.tags.get(id).map(ReferenceEntity::Tag),
            EntityKind::Merchant => self.merchants.get(id).map(ReferenceEntity::Merchant),
        }
    }

    /// Resolve a product's tag list in list order
    pub fn tags_for(&self, product: &Product) -> ScoreResult<Vec<Tag>> {
        product
            .tag_ids()
            .iter()
            .map(|id| self.tags.get(id))
            .collect()
    }

    pub fn merchant_for(&self, product: &Product) -> ScoreResult<Merchant> {
        self.merchants.get(&product.merchant_id)
    }

    /// Drop everything; used when reference data is edited under a running process
    pub fn reset(&self) {
        self.tags.clear();
        self.merchants.clear();
        debug!("Reference cache reset");
    }

    pub fn get_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "tags": self.tags.stats(),
            "merchants": self.merchants.stats(),
        })
    }
}
