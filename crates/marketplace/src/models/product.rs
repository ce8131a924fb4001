//! Product domain types.

use chrono::{DateTime, Utc};

use shop_next_door_core::{Money, ProductId, ShopId};

/// An item a shop sells.
///
/// Deleted products are archived rather than removed so that order history
/// keeps pointing at them.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub shop_id: ShopId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: i32,
    pub image_url: Option<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether at least one unit can be ordered.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0 && !self.archived
    }
}

/// Validated input for creating or editing a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInput {
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: i32,
    pub image_url: Option<String>,
}
