use std::sync::Arc;

use crate::error::ScoreResult;
use crate::model::{Product, RankCriteria};
use crate::store::ProductStore;

/// Read-only ordering of products. No caching: every call hits the store.
pub struct Ranker {
    store: Arc<dyn ProductStore>,
}

impl Ranker {
    pub fn new(store: Arc<dyn ProductStore>) -> Self {
        Self { store }
    }

    pub fn rank_by(&self, criteria: RankCriteria) -> ScoreResult<Vec<Product>> {
        let (field, direction) = criteria.ordering();
        self.store.list_products_ordered_by(field, direction)
    }
}
