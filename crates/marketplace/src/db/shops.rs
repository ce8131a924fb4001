//! Shop repository for database operations.

use sqlx::{PgConnection, PgPool};

use shop_next_door_core::{ShopId, ShopStatus, ShopType, UserId};

use super::RepositoryError;
use crate::models::{Shop, ShopInput, ShopListing};

const SHOP_COLUMNS: &str =
    "s.id, s.vendor_id, s.name, s.description, s.location, s.shop_type, s.status, \
     s.created_at, s.updated_at";

/// Repository for shop database operations.
pub struct ShopRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ShopRepository<'a> {
    /// Create a new shop repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create an active shop owned by `vendor_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(
        &self,
        vendor_id: UserId,
        input: &ShopInput,
    ) -> Result<Shop, RepositoryError> {
        let shop = sqlx::query_as::<_, Shop>(&format!(
            "INSERT INTO shops AS s (vendor_id, name, description, location, shop_type) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {SHOP_COLUMNS}"
        ))
        .bind(vendor_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.location)
        .bind(input.shop_type)
        .fetch_one(self.pool)
        .await?;

        Ok(shop)
    }

    /// Get a shop by ID, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ShopId) -> Result<Option<Shop>, RepositoryError> {
        let shop = sqlx::query_as::<_, Shop>(&format!(
            "SELECT {SHOP_COLUMNS} FROM shops s WHERE s.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(shop)
    }

    /// List active shops for public browsing, optionally by type.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(
        &self,
        shop_type: Option<ShopType>,
    ) -> Result<Vec<Shop>, RepositoryError> {
        let shops = sqlx::query_as::<_, Shop>(&format!(
            "SELECT {SHOP_COLUMNS} FROM shops s \
             WHERE s.status = 'active' AND ($1::shop_type IS NULL OR s.shop_type = $1) \
             ORDER BY s.name"
        ))
        .bind(shop_type)
        .fetch_all(self.pool)
        .await?;

        Ok(shops)
    }

    /// List the shops a vendor owns.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_vendor(&self, vendor_id: UserId) -> Result<Vec<Shop>, RepositoryError> {
        let shops = sqlx::query_as::<_, Shop>(&format!(
            "SELECT {SHOP_COLUMNS} FROM shops s WHERE s.vendor_id = $1 ORDER BY s.created_at"
        ))
        .bind(vendor_id)
        .fetch_all(self.pool)
        .await?;

        Ok(shops)
    }

    /// List every shop with its owner and live product count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<ShopListing>, RepositoryError> {
        let shops = sqlx::query_as::<_, ShopListing>(&format!(
            "SELECT {SHOP_COLUMNS}, u.name AS vendor_name, \
                    (SELECT COUNT(*) FROM products p \
                     WHERE p.shop_id = s.id AND NOT p.archived) AS product_count \
             FROM shops s \
             JOIN users u ON u.id = s.vendor_id \
             ORDER BY s.created_at DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(shops)
    }

    /// Update a shop's descriptive fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the shop doesn't exist.
    pub async fn update_details(
        &self,
        id: ShopId,
        input: &ShopInput,
    ) -> Result<Shop, RepositoryError> {
        sqlx::query_as::<_, Shop>(&format!(
            "UPDATE shops AS s \
             SET name = $2, description = $3, location = $4, shop_type = $5 \
             WHERE s.id = $1 \
             RETURNING {SHOP_COLUMNS}"
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.location)
        .bind(input.shop_type)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Activate or deactivate a shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the shop doesn't exist.
    pub async fn set_status(
        &self,
        id: ShopId,
        status: ShopStatus,
    ) -> Result<Shop, RepositoryError> {
        sqlx::query_as::<_, Shop>(&format!(
            "UPDATE shops AS s SET status = $2 WHERE s.id = $1 RETURNING {SHOP_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }
}

// =============================================================================
// Transaction-scoped helpers
// =============================================================================

/// Lock a shop row for the rest of the database transaction.
///
/// Holding the lock keeps an admin from deactivating the shop halfway
/// through an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_for_share(
    conn: &mut PgConnection,
    id: ShopId,
) -> Result<Option<Shop>, RepositoryError> {
    let shop = sqlx::query_as::<_, Shop>(&format!(
        "SELECT {SHOP_COLUMNS} FROM shops s WHERE s.id = $1 FOR SHARE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(shop)
}
