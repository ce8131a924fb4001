//! Business logic layer.
//!
//! Services sit between route handlers and repositories. Each borrows the
//! pool (and the Daraja client where needed) for the length of a request.

pub mod analytics;
pub mod auth;
pub mod impersonation;
pub mod orders;
pub mod payments;
pub mod shops;

use shop_next_door_core::PaymentMethod;

use crate::models::CurrentUser;
use crate::state::AppState;
use orders::{NewOrder, OrderError, OrderService, PlacedOrder};
use payments::PaymentService;

/// What happened to the payment of a freshly placed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentPrompt {
    /// Cash on delivery or Airtel Money; nothing to send.
    NotNeeded,
    /// The STK push is on the customer's phone.
    Sent,
    /// The order stands but the push failed; the customer can retry.
    /// Carries a message fit to show the customer.
    Failed(String),
}

/// A placed order and the state of its payment prompt.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub placed: PlacedOrder,
    pub prompt: PaymentPrompt,
}

/// Place an order and, for M-Pesa, send the STK push once it is committed.
///
/// # Errors
///
/// Returns `OrderError::PaymentMethodUnavailable` when M-Pesa is chosen but
/// not configured, and any error from [`OrderService::place_order`]. A
/// failed STK push does not fail the checkout.
pub async fn checkout(
    state: &AppState,
    customer: &CurrentUser,
    new_order: &NewOrder,
) -> Result<Checkout, OrderError> {
    if new_order.payment_method == PaymentMethod::Mpesa && state.mpesa().is_none() {
        return Err(OrderError::PaymentMethodUnavailable(PaymentMethod::Mpesa));
    }

    let placed = OrderService::new(state.pool())
        .place_order(customer, new_order)
        .await?;

    let prompt = if placed.transaction.method == PaymentMethod::Mpesa {
        match PaymentService::from_state(state)
            .initiate_mpesa(customer, placed.order.id, None)
            .await
        {
            Ok(_) => PaymentPrompt::Sent,
            Err(e) => {
                tracing::error!(
                    order_id = %placed.order.id,
                    error = %e,
                    "M-Pesa prompt for new order failed"
                );
                PaymentPrompt::Failed(e.customer_message())
            }
        }
    } else {
        PaymentPrompt::NotNeeded
    };

    Ok(Checkout { placed, prompt })
}
