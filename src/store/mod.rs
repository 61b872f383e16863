pub mod sqlite;
#[cfg(test)]
pub mod memory;

use crate::error::ScoreResult;
use crate::model::{CounterRow, CounterUpdate, Direction, Merchant, OrderField, Product, Tag};

/// Product rows and their counters.
///
/// Every call is an independent unit of work; the store applies its own
/// timeouts and the core adds none.
pub trait ProductStore: Send + Sync {
    fn list_all_products(&self) -> ScoreResult<Vec<CounterRow>>;

    /// Fails with `NotFound` when no row has this id.
    fn read_product(&self, id: &str) -> ScoreResult<Product>;

    /// Absolute overwrite of the fields present in `update`.
    fn update_counters(&self, id: &str, update: &CounterUpdate) -> ScoreResult<()>;

    fn list_products_ordered_by(
        &self,
        field: OrderField,
        direction: Direction,
    ) -> ScoreResult<Vec<Product>>;
}

/// Single-row lookups of reference data, used on entity cache misses.
pub trait ReferenceStore: Send + Sync {
    fn read_tag(&self, id: &str) -> ScoreResult<Tag>;
    fn read_merchant(&self, id: &str) -> ScoreResult<Merchant>;
}

/// Read-only product lookups behind the search and tag pages.
pub trait CatalogStore: Send + Sync {
    /// Products whose shortcode equals the upper-cased query, or whose name
    /// contains it (case-insensitive). An empty query matches every name.
    fn search_products(&self, query: &str) -> ScoreResult<Vec<Product>>;

    /// Fails with `NotFound` when no tag has this name.
    fn find_tag_by_name(&self, name: &str) -> ScoreResult<Tag>;

    /// Products whose tag list contains `tag_id`.
    fn list_products_tagged(&self, tag_id: &str) -> ScoreResult<Vec<Product>>;
}
