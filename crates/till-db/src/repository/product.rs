//! # Product Repository
//!
//! Catalog read side consumed by the cart engine. Catalog management
//! (CRUD, attributes, categories) is an external collaborator; this
//! repository only answers "what is this barcode" and "find me a SKU".
//!
//! ## Barcode Lookup
//! ```text
//! Scan "4000001234567"
//!      │
//!      ▼
//! lookup_by_barcode(store, barcode)
//!      │
//!      ├── [] ───────► unknown barcode, cashier falls back to search
//!      ├── [one] ────► add to cart directly
//!      └── [many] ───► shared barcode across variants: cashier picks
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use till_core::Product;

const PRODUCT_COLUMNS: &str = "id, product_id, store_id, sku_code, barcode, name, price_cents, \
     size, length, image_url, is_active, created_at, updated_at";

/// Repository for product lookups.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets an active SKU by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product: Option<Product> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1 AND is_active = 1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    /// Gets an active SKU by its business code.
    pub async fn get_by_sku_code(&self, sku_code: &str) -> DbResult<Option<Product>> {
        let product: Option<Product> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku_code = ?1 AND is_active = 1"
        ))
        .bind(sku_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    /// All active SKUs carrying a barcode in a store.
    ///
    /// Zero, one, or many: variants of one product may share a barcode.
    pub async fn lookup_by_barcode(&self, store_id: &str, barcode: &str) -> DbResult<Vec<Product>> {
        debug!(store_id, barcode, "Barcode lookup");
        let products: Vec<Product> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE store_id = ?1 AND barcode = ?2 AND is_active = 1 \
             ORDER BY sku_code"
        ))
        .bind(store_id)
        .bind(barcode)
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    /// Searches active SKUs by name, SKU code, or barcode fragment.
    pub async fn search(&self, store_id: &str, query: &str, limit: i64) -> DbResult<Vec<Product>> {
        debug!(store_id, query, "Product search");
        let pattern = format!("%{}%", query.trim());
        let products: Vec<Product> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE store_id = ?1 AND is_active = 1 \
               AND (name LIKE ?2 OR sku_code LIKE ?2 OR barcode LIKE ?2) \
             ORDER BY name LIMIT ?3"
        ))
        .bind(store_id)
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    /// Inserts a SKU (seeding and tests; the catalog collaborator owns
    /// real product management).
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, product_id, store_id, sku_code, barcode, name, price_cents,
                size, length, image_url, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&product.id)
        .bind(&product.product_id)
        .bind(&product.store_id)
        .bind(&product.sku_code)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(&product.size)
        .bind(&product.length)
        .bind(&product.image_url)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Builds a product row for seeding and tests.
pub fn seed_product(store_id: &str, sku_code: &str, name: &str, price_cents: i64) -> Product {
    let now = Utc::now();
    Product {
        id: Uuid::new_v4().to_string(),
        product_id: Uuid::new_v4().to_string(),
        store_id: store_id.to_string(),
        sku_code: sku_code.to_string(),
        barcode: None,
        name: name.to_string(),
        price_cents,
        size: None,
        length: None,
        image_url: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_barcode_lookup_returns_all_variants() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        let mut a = seed_product("store1", "WIG-001-S", "Lace Front Wig (S)", 12000);
        a.barcode = Some("4000001234567".to_string());
        let mut b = seed_product("store1", "WIG-001-M", "Lace Front Wig (M)", 12000);
        b.barcode = Some("4000001234567".to_string());
        repo.insert(&a).await.unwrap();
        repo.insert(&b).await.unwrap();

        let hits = repo.lookup_by_barcode("store1", "4000001234567").await.unwrap();
        assert_eq!(hits.len(), 2);

        let none = repo.lookup_by_barcode("store1", "0000000000000").await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_search_matches_name_and_code() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.insert(&seed_product("store1", "WIG-001", "Lace Front Wig", 12000))
            .await
            .unwrap();
        repo.insert(&seed_product("store1", "COMB-002", "Wide Tooth Comb", 500))
            .await
            .unwrap();

        let by_name = repo.search("store1", "wig", 20).await.unwrap();
        assert_eq!(by_name.len(), 1);

        let by_code = repo.search("store1", "COMB", 20).await.unwrap();
        assert_eq!(by_code.len(), 1);
        assert_eq!(by_code[0].sku_code, "COMB-002");
    }

    #[tokio::test]
    async fn test_duplicate_sku_code_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.insert(&seed_product("store1", "WIG-001", "Wig", 12000)).await.unwrap();
        let err = repo
            .insert(&seed_product("store1", "WIG-001", "Other Wig", 9000))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }
}
