//! Order workflow error types.

use thiserror::Error;

use shop_next_door_core::{OrderStatus, PaymentMethod, PhoneNumberError, ProductId};

use crate::db::RepositoryError;

/// Errors raised while placing or updating orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// No lines in the order.
    #[error("an order needs at least one product")]
    EmptyOrder,

    /// A line quantity outside `1..=1000`.
    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },

    #[error("shop not found")]
    ShopNotFound,

    /// The shop exists but is not taking orders.
    #[error("this shop is not accepting orders")]
    ShopInactive,

    /// A vendor tried to buy from their own shop.
    #[error("you cannot order from your own shop")]
    OwnShop,

    /// The product is missing, archived or belongs to another shop.
    #[error("product {0} is not available in this shop")]
    ProductUnavailable(ProductId),

    #[error("only {available} of {product} left in stock")]
    InsufficientStock { product: String, available: i32 },

    /// The order total does not fit in a money amount.
    #[error("order total is too large")]
    TotalTooLarge,

    /// Mobile money needs the payer's phone number.
    #[error("a phone number is required for this payment method")]
    PhoneRequired,

    #[error("invalid phone number: {0}")]
    InvalidPhone(#[from] PhoneNumberError),

    /// The payment method is switched off on this deployment.
    #[error("{} is not available right now", .0.label())]
    PaymentMethodUnavailable(PaymentMethod),

    #[error("invalid delivery address: {0}")]
    InvalidAddress(String),

    #[error("order not found")]
    NotFound,

    /// The actor may see the order but not make this change.
    #[error("you are not allowed to change this order")]
    Forbidden,

    #[error("cannot move an order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}
