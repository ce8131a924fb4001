//! Order repository for database operations.
//!
//! Reads go through [`OrderRepository`]. Writes that must share a database
//! transaction with stock and payment changes are free functions taking a
//! `&mut PgConnection`, so the order service controls the transaction.

use sqlx::{PgConnection, PgPool};

use shop_next_door_core::{Money, OrderId, OrderStatus, ProductId, ShopId, UserId};

use super::{PAGE_SIZE, RepositoryError, TransactionRepository, page_offset};
use crate::models::{Order, OrderDetail, OrderItem, OrderListing};

const ORDER_COLUMNS: &str = "o.id, o.customer_id, o.shop_id, o.status, o.total, \
                             o.delivery_address, o.created_at, o.updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, quantity, unit_price";

/// SELECT ... FROM for order listings; callers append WHERE and ORDER BY.
fn listing_query(filter: &str) -> String {
    format!(
        "SELECT {ORDER_COLUMNS}, s.name AS shop_name, u.name AS customer_name, \
                u.email AS customer_email, t.method AS payment_method, \
                t.status AS payment_status \
         FROM orders o \
         JOIN shops s ON s.id = o.shop_id \
         JOIN users u ON u.id = o.customer_id \
         JOIN transactions t ON t.order_id = o.id \
         {filter}"
    )
}

/// Repository for order reads.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an order row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE o.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Get an order with its shop name, items and transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_detail(&self, id: OrderId) -> Result<Option<OrderDetail>, RepositoryError> {
        let Some(order) = self.get(id).await? else {
            return Ok(None);
        };

        let (shop_name, vendor_id): (String, UserId) =
            sqlx::query_as("SELECT name, vendor_id FROM shops WHERE id = $1")
                .bind(order.shop_id)
                .fetch_one(self.pool)
                .await?;

        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        let transaction = TransactionRepository::new(self.pool)
            .get_by_order(id)
            .await?;

        Ok(Some(OrderDetail {
            order,
            shop_name,
            vendor_id,
            items,
            transaction,
        }))
    }

    /// A customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_customer(
        &self,
        customer_id: UserId,
    ) -> Result<Vec<OrderListing>, RepositoryError> {
        let orders = sqlx::query_as::<_, OrderListing>(&listing_query(
            "WHERE o.customer_id = $1 ORDER BY o.created_at DESC, o.id DESC",
        ))
        .bind(customer_id)
        .fetch_all(self.pool)
        .await?;

        Ok(orders)
    }

    /// Orders across every shop a vendor owns, optionally by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_vendor(
        &self,
        vendor_id: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderListing>, RepositoryError> {
        let orders = sqlx::query_as::<_, OrderListing>(&listing_query(
            "WHERE s.vendor_id = $1 AND ($2::order_status IS NULL OR o.status = $2) \
             ORDER BY o.created_at DESC, o.id DESC",
        ))
        .bind(vendor_id)
        .bind(status)
        .fetch_all(self.pool)
        .await?;

        Ok(orders)
    }

    /// Every order on the marketplace, newest first, one page at a time.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self, page: u32) -> Result<Vec<OrderListing>, RepositoryError> {
        let orders = sqlx::query_as::<_, OrderListing>(&listing_query(
            "ORDER BY o.created_at DESC, o.id DESC LIMIT $1 OFFSET $2",
        ))
        .bind(PAGE_SIZE)
        .bind(page_offset(page))
        .fetch_all(self.pool)
        .await?;

        Ok(orders)
    }
}

// =============================================================================
// Transaction-scoped writes
// =============================================================================

/// Insert a pending order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_order(
    conn: &mut PgConnection,
    customer_id: UserId,
    shop_id: ShopId,
    total: Money,
    delivery_address: &str,
) -> Result<Order, RepositoryError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "INSERT INTO orders AS o (customer_id, shop_id, total, delivery_address) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(customer_id)
    .bind(shop_id)
    .bind(total)
    .bind(delivery_address)
    .fetch_one(conn)
    .await?;

    Ok(order)
}

/// Insert one order line.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_item(
    conn: &mut PgConnection,
    order_id: OrderId,
    product_id: ProductId,
    product_name: &str,
    quantity: i32,
    unit_price: Money,
) -> Result<OrderItem, RepositoryError> {
    let item = sqlx::query_as::<_, OrderItem>(&format!(
        "INSERT INTO order_items (order_id, product_id, product_name, quantity, unit_price) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {ITEM_COLUMNS}"
    ))
    .bind(order_id)
    .bind(product_id)
    .bind(product_name)
    .bind(quantity)
    .bind(unit_price)
    .fetch_one(conn)
    .await?;

    Ok(item)
}

/// Lock an order row for the rest of the database transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_for_update(
    conn: &mut PgConnection,
    id: OrderId,
) -> Result<Option<Order>, RepositoryError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders o WHERE o.id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(order)
}

/// The items of an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn items(conn: &mut PgConnection, id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
    let items = sqlx::query_as::<_, OrderItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
    ))
    .bind(id)
    .fetch_all(conn)
    .await?;

    Ok(items)
}

/// Set an order's status.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order doesn't exist.
pub async fn set_status(
    conn: &mut PgConnection,
    id: OrderId,
    status: OrderStatus,
) -> Result<Order, RepositoryError> {
    sqlx::query_as::<_, Order>(&format!(
        "UPDATE orders AS o SET status = $2 WHERE o.id = $1 RETURNING {ORDER_COLUMNS}"
    ))
    .bind(id)
    .bind(status)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}
