use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Deserialize;
use tracing::info;

use crate::error::{ScoreError, ScoreResult};
use crate::model::{CounterRow, CounterUpdate, Direction, Merchant, OrderField, Product, Tag};
use crate::store::{CatalogStore, ProductStore, ReferenceStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    shortcode TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL DEFAULT '',
    merchant TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    interactions REAL NOT NULL DEFAULT 0,
    interactions_weekly REAL NOT NULL DEFAULT 0,
    interactions_daily REAL NOT NULL DEFAULT 0,
    created TEXT NOT NULL DEFAULT '',
    updated TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    color TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS merchants (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    affiliate INTEGER NOT NULL DEFAULT 0,
    label TEXT NOT NULL DEFAULT ''
);
";

const PRODUCT_COLUMNS: &str = "id, name, shortcode, url, merchant, tags, interactions, \
     interactions_weekly, interactions_daily, created, updated";

/// Listings without a ranking of their own show the hottest first
const CATALOG_ORDER: &str = "ORDER BY interactions_daily DESC, id ASC";

/// Initial data for an empty store
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub products: Vec<Product>,
    pub tags: Vec<Tag>,
    pub merchants: Vec<Merchant>,
}

/// SQLite-backed store. One connection, serialized behind a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch(SCHEMA)
            .map_err(|e| anyhow::anyhow!("Failed to create schema in '{}': {}", path, e))?;
        info!("Store opened at {}", path);
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Load a seed file if the products table is empty. Returns rows inserted.
    ///
    /// All rows go in one transaction: a bad seed leaves the store empty, so
    /// the next boot tries again.
    pub fn seed_if_empty(&self, path: &str) -> anyhow::Result<usize> {
        let mut conn = self.conn.lock();
        let existing: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        if existing > 0 {
            info!("Store already holds {} products, seed '{}' ignored", existing, path);
            return Ok(0);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", path, e))?;
        let seed: SeedFile = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", path, e))?;

        let tx = conn.transaction()?;
        for tag in &seed.tags {
            insert_tag_row(&tx, tag)
                .map_err(|e| anyhow::anyhow!("Seed tag '{}' rejected: {}", tag.id, e))?;
        }
        for merchant in &seed.merchants {
            insert_merchant_row(&tx, merchant)
                .map_err(|e| anyhow::anyhow!("Seed merchant '{}' rejected: {}", merchant.id, e))?;
        }
        for product in &seed.products {
            insert_product_row(&tx, product)
                .map_err(|e| anyhow::anyhow!("Seed product '{}' rejected: {}", product.id, e))?;
        }
        tx.commit()?;

        let total = seed.tags.len() + seed.merchants.len() + seed.products.len();
        info!(
            "Seeded store from {} ({} products, {} tags, {} merchants)",
            path,
            seed.products.len(),
            seed.tags.len(),
            seed.merchants.len()
        );
        Ok(total)
    }

    fn query_products(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> ScoreResult<Vec<Product>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, product_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Single-row inserts for fixtures
#[cfg(test)]
impl SqliteStore {
    pub fn insert_product(&self, product: &Product) -> ScoreResult<()> {
        insert_product_row(&self.conn.lock(), product)?;
        Ok(())
    }

    pub fn insert_tag(&self, tag: &Tag) -> ScoreResult<()> {
        insert_tag_row(&self.conn.lock(), tag)?;
        Ok(())
    }

    pub fn insert_merchant(&self, merchant: &Merchant) -> ScoreResult<()> {
        insert_merchant_row(&self.conn.lock(), merchant)?;
        Ok(())
    }
}

fn insert_product_row(conn: &Connection, product: &Product) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO products ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            PRODUCT_COLUMNS
        ),
        params![
            product.id,
            product.name,
            product.shortcode,
            product.url,
            product.merchant_id,
            product.tags,
            product.interactions,
            product.interactions_weekly,
            product.interactions_daily,
            product.created,
            product.updated,
        ],
    )?;
    Ok(())
}

fn insert_tag_row(conn: &Connection, tag: &Tag) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO tags (id, name, color) VALUES (?1, ?2, ?3)",
        params![tag.id, tag.name, tag.color],
    )?;
    Ok(())
}

fn insert_merchant_row(conn: &Connection, merchant: &Merchant) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO merchants (id, name, affiliate, label) VALUES (?1, ?2, ?3, ?4)",
        params![merchant.id, merchant.name, merchant.affiliate, merchant.label],
    )?;
    Ok(())
}

/// `%text%` with LIKE wildcards in `text` taken literally (`ESCAPE '\'`)
fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        shortcode: row.get(2)?,
        url: row.get(3)?,
        merchant_id: row.get(4)?,
        tags: row.get(5)?,
        interactions: row.get(6)?,
        interactions_weekly: row.get(7)?,
        interactions_daily: row.get(8)?,
        created: row.get(9)?,
        updated: row.get(10)?,
    })
}

impl ProductStore for SqliteStore {
    fn list_all_products(&self) -> ScoreResult<Vec<CounterRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, interactions, interactions_weekly, interactions_daily FROM products",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CounterRow {
                    id: row.get(0)?,
                    interactions: row.get(1)?,
                    interactions_weekly: row.get(2)?,
                    interactions_daily: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn read_product(&self, id: &str) -> ScoreResult<Product> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS),
            params![id],
            product_from_row,
        )
        .optional()?
        .ok_or_else(|| ScoreError::not_found("product", id))
    }

    fn update_counters(&self, id: &str, update: &CounterUpdate) -> ScoreResult<()> {
        if update.is_empty() {
            // Still report a missing row
            return self.read_product(id).map(|_| ());
        }

        let mut sets = Vec::new();
        let mut values: Vec<f64> = Vec::new();
        for (column, value) in [
            ("interactions", update.interactions),
            ("interactions_weekly", update.interactions_weekly),
            ("interactions_daily", update.interactions_daily),
        ] {
            if let Some(v) = value {
                values.push(v);
                sets.push(format!("{} = ?{}", column, values.len()));
            }
        }
        let sql = format!(
            "UPDATE products SET {} WHERE id = ?{}",
            sets.join(", "),
            values.len() + 1
        );
        let mut bound: Vec<&dyn rusqlite::ToSql> =
            values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
        bound.push(&id);

        let changed = self.conn.lock().execute(&sql, bound.as_slice())?;
        if changed == 0 {
            return Err(ScoreError::not_found("product", id));
        }
        Ok(())
    }

    fn list_products_ordered_by(
        &self,
        field: OrderField,
        direction: Direction,
    ) -> ScoreResult<Vec<Product>> {
        // Column and keyword come from closed enums, never from callers
        let sql = format!(
            "SELECT {} FROM products ORDER BY {} {}, id ASC",
            PRODUCT_COLUMNS,
            field.column(),
            direction.keyword()
        );
        self.query_products(&sql, params![])
    }
}

impl CatalogStore for SqliteStore {
    fn search_products(&self, query: &str) -> ScoreResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE shortcode = ?1 OR name LIKE ?2 ESCAPE '\\' {}",
            PRODUCT_COLUMNS, CATALOG_ORDER
        );
        let code = query.to_uppercase();
        let pattern = contains_pattern(query);
        self.query_products(&sql, params![code, pattern])
    }

    fn find_tag_by_name(&self, name: &str) -> ScoreResult<Tag> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, color FROM tags WHERE name = ?1 ORDER BY id LIMIT 1",
            params![name],
            |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    color: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| ScoreError::not_found("tag", name))
    }

    fn list_products_tagged(&self, tag_id: &str) -> ScoreResult<Vec<Product>> {
        // LIKE narrows the scan; the parsed list decides membership
        let sql = format!(
            "SELECT {} FROM products WHERE tags LIKE ?1 ESCAPE '\\' {}",
            PRODUCT_COLUMNS, CATALOG_ORDER
        );
        let pattern = contains_pattern(&format!("\"{}\"", tag_id));
        let products = self.query_products(&sql, params![pattern])?;
        Ok(products
            .into_iter()
            .filter(|p| p.tag_ids().iter().any(|t| t == tag_id))
            .collect())
    }
}

impl ReferenceStore for SqliteStore {
    fn read_tag(&self, id: &str) -> ScoreResult<Tag> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, color FROM tags WHERE id = ?1",
            params![id],
            |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    color: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| ScoreError::not_found("tag", id))
    }

    fn read_merchant(&self, id: &str) -> ScoreResult<Merchant> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, affiliate, label FROM merchants WHERE id = ?1",
            params![id],
            |row| {
                Ok(Merchant {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    affiliate: row.get(2)?,
                    label: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| ScoreError::not_found("merchant", id))
    }
}
