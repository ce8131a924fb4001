//! Analytics result types.

use chrono::NaiveDate;
use serde::Serialize;

use shop_next_door_core::{Money, ProductId, UserId};

/// Which orders an analytics query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsScope {
    /// Every shop on the marketplace.
    All,
    /// Only the shops of one vendor.
    Vendor(UserId),
}

impl AnalyticsScope {
    /// The vendor filter as a nullable query parameter.
    #[must_use]
    pub fn vendor_id(self) -> Option<UserId> {
        match self {
            Self::All => None,
            Self::Vendor(id) => Some(id),
        }
    }
}

/// Headline sales numbers.
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct SalesSummary {
    pub order_count: i64,
    pub pending_orders: i64,
    pub completed_orders: i64,
    pub cancelled_orders: i64,
    /// Sum of successful transactions.
    pub revenue: Money,
    /// Revenue per paid order.
    pub average_order_value: Money,
}

/// Revenue for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DailyRevenue {
    pub day: NaiveDate,
    pub revenue: Money,
    pub orders: i64,
}

/// A best-selling product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TopProduct {
    pub product_id: ProductId,
    pub name: String,
    pub shop_name: String,
    pub units_sold: i64,
    pub revenue: Money,
}
