use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::{ScoreError, ScoreResult};
use crate::model::{CounterRow, CounterUpdate, Direction, Merchant, OrderField, Product, Tag};
use crate::store::{CatalogStore, ProductStore, ReferenceStore};

/// In-memory store for tests. Counts traffic and can be told to fail writes.
#[derive(Default)]
pub struct MemoryStore {
    products: RwLock<HashMap<String, Product>>,
    tags: RwLock<HashMap<String, Tag>>,
    merchants: RwLock<HashMap<String, Merchant>>,
    failing_writes: RwLock<Vec<String>>,
    pub reference_reads: AtomicU64,
    pub writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_product(&self, product: Product) {
        self.products.write().insert(product.id.clone(), product);
    }

    pub fn put_tag(&self, tag: Tag) {
        self.tags.write().insert(tag.id.clone(), tag);
    }

    pub fn put_merchant(&self, merchant: Merchant) {
        self.merchants.write().insert(merchant.id.clone(), merchant);
    }

    pub fn remove_product(&self, id: &str) {
        self.products.write().remove(id);
    }

    /// Make every `update_counters` for this id fail with a store error.
    pub fn fail_writes_for(&self, id: &str) {
        self.failing_writes.write().push(id.to_string());
    }

    pub fn product(&self, id: &str) -> Product {
        self.products.read()[id].clone()
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reference_reads(&self) -> u64 {
        self.reference_reads.load(Ordering::SeqCst)
    }

    fn hottest_first(&self, keep: impl Fn(&Product) -> bool) -> Vec<Product> {
        let mut products: Vec<Product> =
            self.products.read().values().filter(|p| keep(p)).cloned().collect();
        products.sort_by(|a, b| {
            b.interactions_daily
                .total_cmp(&a.interactions_daily)
                .then_with(|| a.id.cmp(&b.id))
        });
        products
    }
}

impl ProductStore for MemoryStore {
    fn list_all_products(&self) -> ScoreResult<Vec<CounterRow>> {
        Ok(self
            .products
            .read()
            .values()
            .map(|p| CounterRow {
                id: p.id.clone(),
                interactions: p.interactions,
                interactions_weekly: p.interactions_weekly,
                interactions_daily: p.interactions_daily,
            })
            .collect())
    }

    fn read_product(&self, id: &str) -> ScoreResult<Product> {
        self.products
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ScoreError::not_found("product", id))
    }

    fn update_counters(&self, id: &str, update: &CounterUpdate) -> ScoreResult<()> {
        if self.failing_writes.read().iter().any(|f| f == id) {
            return Err(ScoreError::Store(format!("write to {} rejected", id)));
        }
        let mut products = self.products.write();
        let product = products
            .get_mut(id)
            .ok_or_else(|| ScoreError::not_found("product", id))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(v) = update.interactions {
            product.interactions = v;
        }
        if let Some(v) = update.interactions_weekly {
            product.interactions_weekly = v;
        }
        if let Some(v) = update.interactions_daily {
            product.interactions_daily = v;
        }
        Ok(())
    }

    fn list_products_ordered_by(
        &self,
        field: OrderField,
        direction: Direction,
    ) -> ScoreResult<Vec<Product>> {
        let mut products: Vec<Product> = self.products.read().values().cloned().collect();
        products.sort_by(|a, b| {
            let ord = match field {
                OrderField::Interactions => a.interactions.total_cmp(&b.interactions),
                OrderField::InteractionsDaily => {
                    a.interactions_daily.total_cmp(&b.interactions_daily)
                }
                OrderField::Created => a.created.cmp(&b.created),
            };
            let ord = match direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            ord.then_with(|| a.id.cmp(&b.id))
        });
        Ok(products)
    }
}

impl ReferenceStore for MemoryStore {
    fn read_tag(&self, id: &str) -> ScoreResult<Tag> {
        self.reference_reads.fetch_add(1, Ordering::SeqCst);
        self.tags
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ScoreError::not_found("tag", id))
    }

    fn read_merchant(&self, id: &str) -> ScoreResult<Merchant> {
        self.reference_reads.fetch_add(1, Ordering::SeqCst);
        self.merchants
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ScoreError::not_found("merchant", id))
    }
}

impl CatalogStore for MemoryStore {
    fn search_products(&self, query: &str) -> ScoreResult<Vec<Product>> {
        let code = query.to_uppercase();
        let needle = query.to_lowercase();
        Ok(self.hottest_first(|p| p.shortcode == code || p.name.to_lowercase().contains(&needle)))
    }

    fn find_tag_by_name(&self, name: &str) -> ScoreResult<Tag> {
        self.tags
            .read()
            .values()
            .filter(|t| t.name == name)
            .min_by(|a, b| a.id.cmp(&b.id))
            .cloned()
            .ok_or_else(|| ScoreError::not_found("tag", name))
    }

    fn list_products_tagged(&self, tag_id: &str) -> ScoreResult<Vec<Product>> {
        Ok(self.hottest_first(|p| p.tag_ids().iter().any(|t| t == tag_id)))
    }
}

/// Product fixture with the given counters.
pub fn product(id: &str, lifetime: f64, weekly: f64, daily: f64) -> Product {
    Product {
        id: id.to_string(),
        name: format!("Product {}", id),
        shortcode: id.to_uppercase(),
        url: format!("https://shop.example/{}", id),
        merchant_id: "m1".to_string(),
        tags: r#"["t1","t2"]"#.to_string(),
        interactions: lifetime,
        interactions_weekly: weekly,
        interactions_daily: daily,
        created: "2024-01-01 00:00:00.000Z".to_string(),
        updated: "2024-01-01 00:00:00.000Z".to_string(),
    }
}
