//! Shop domain types.

use chrono::{DateTime, Utc};

use shop_next_door_core::{ShopId, ShopStatus, ShopType, UserId};

/// A vendor-owned storefront.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Shop {
    pub id: ShopId,
    pub vendor_id: UserId,
    pub name: String,
    pub description: String,
    pub location: String,
    pub shop_type: ShopType,
    pub status: ShopStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shop {
    /// Whether customers can see and order from this shop.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, ShopStatus::Active)
    }

    /// Whether `user_id` owns this shop.
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.vendor_id == user_id
    }
}

/// A shop joined with its owner, for admin listings.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShopListing {
    #[sqlx(flatten)]
    pub shop: Shop,
    pub vendor_name: String,
    pub product_count: i64,
}

/// Validated input for creating or editing a shop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopInput {
    pub name: String,
    pub description: String,
    pub location: String,
    pub shop_type: ShopType,
}
