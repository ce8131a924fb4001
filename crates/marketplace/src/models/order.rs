//! Order domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shop_next_door_core::{
    Money, OrderId, OrderItemId, OrderStatus, PaymentMethod, ProductId, ShopId,
    TransactionStatus, UserId,
};

use super::Transaction;

/// A customer's purchase against a single shop.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: UserId,
    pub shop_id: ShopId,
    pub status: OrderStatus,
    /// Sum of item line totals, computed server-side when the order is placed.
    pub total: Money,
    pub delivery_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One product line of an order, priced at the time of ordering.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Money,
}

impl OrderItem {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price
            .checked_mul(self.quantity)
            .unwrap_or(Money::ZERO)
    }
}

/// A requested product and quantity, as submitted by the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// An order joined with the names and payment state listings need.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderListing {
    #[sqlx(flatten)]
    pub order: Order,
    pub shop_name: String,
    pub customer_name: String,
    pub customer_email: String,
    pub payment_method: PaymentMethod,
    pub payment_status: TransactionStatus,
}

/// An order with everything its detail page shows.
#[derive(Debug, Clone)]
pub struct OrderDetail {
    pub order: Order,
    pub shop_name: String,
    pub vendor_id: UserId,
    pub items: Vec<OrderItem>,
    pub transaction: Option<Transaction>,
}
