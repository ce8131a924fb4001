//! Product repository for database operations.

use sqlx::{PgConnection, PgPool};

use shop_next_door_core::{ProductId, ShopId};

use super::RepositoryError;
use crate::models::{Product, ProductInput};

const PRODUCT_COLUMNS: &str =
    "id, shop_id, name, description, price, stock, image_url, archived, created_at, updated_at";

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Add a product to a shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(
        &self,
        shop_id: ShopId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "INSERT INTO products (shop_id, name, description, price, stock, image_url) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(shop_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.stock)
        .bind(input.image_url.as_deref())
        .fetch_one(self.pool)
        .await?;

        Ok(product)
    }

    /// Get a product by ID, including archived ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(product)
    }

    /// List a shop's live products, optionally only those in stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_shop(
        &self,
        shop_id: ShopId,
        in_stock_only: bool,
    ) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE shop_id = $1 AND NOT archived AND (NOT $2 OR stock > 0) \
             ORDER BY name"
        ))
        .bind(shop_id)
        .bind(in_stock_only)
        .fetch_all(self.pool)
        .await?;

        Ok(products)
    }

    /// Replace a product's editable fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist or is archived.
    pub async fn update(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(&format!(
            "UPDATE products \
             SET name = $2, description = $3, price = $4, stock = $5, image_url = $6 \
             WHERE id = $1 AND NOT archived \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.stock)
        .bind(input.image_url.as_deref())
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Archive a product so it disappears from the shop but stays in order history.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn archive(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE products SET archived = TRUE WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

// =============================================================================
// Transaction-scoped helpers
// =============================================================================

/// Lock a product row for the rest of the database transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_for_update(
    conn: &mut PgConnection,
    id: ProductId,
) -> Result<Option<Product>, RepositoryError> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(product)
}

/// Change a product's stock by `delta` (negative to take stock).
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the change would take stock below zero.
pub async fn adjust_stock(
    conn: &mut PgConnection,
    id: ProductId,
    delta: i32,
) -> Result<i32, RepositoryError> {
    let stock: Option<i32> = sqlx::query_scalar(
        "UPDATE products SET stock = stock + $2 WHERE id = $1 AND stock + $2 >= 0 RETURNING stock",
    )
    .bind(id)
    .bind(delta)
    .fetch_optional(conn)
    .await?;

    stock.ok_or_else(|| RepositoryError::Conflict(format!("insufficient stock for product {id}")))
}
