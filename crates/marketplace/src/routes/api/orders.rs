//! Order JSON API.
//!
//! Same checkout as the storefront form, plus the payment status endpoint
//! the order page polls while an STK push is open.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shop_next_door_core::{
    Money, OrderId, OrderStatus, PaymentMethod, ShopId, TransactionStatus,
};

use crate::error::ApiResult;
use crate::middleware::RequireAuth;
use crate::models::{OrderLine, Transaction};
use crate::services::orders::NewOrder;
use crate::services::payments::PaymentService;
use crate::services::{PaymentPrompt, checkout};
use crate::state::AppState;

/// Request body for `POST /api/orders`.
#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub shop_id: ShopId,
    pub items: Vec<OrderLine>,
    pub payment_method: PaymentMethod,
    pub phone: Option<String>,
    #[serde(default)]
    pub delivery_address: String,
}

impl From<PlaceOrderRequest> for NewOrder {
    fn from(request: PlaceOrderRequest) -> Self {
        Self {
            shop_id: request.shop_id,
            lines: request.items,
            payment_method: request.payment_method,
            phone: request.phone,
            delivery_address: request.delivery_address,
        }
    }
}

/// Response body for `POST /api/orders`.
#[derive(Debug, Serialize)]
pub struct PlaceOrderResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total: Money,
    pub payment: PaymentView,
    /// `not_needed`, `sent` or `failed`.
    pub prompt: &'static str,
    pub prompt_error: Option<String>,
}

/// Payment state as seen by the customer.
#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub status: TransactionStatus,
    pub amount: Money,
    pub receipt_number: Option<String>,
    pub description: Option<String>,
    /// Whether an STK push is waiting on the customer's phone.
    pub awaiting_customer: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Transaction> for PaymentView {
    fn from(t: &Transaction) -> Self {
        Self {
            order_id: t.order_id,
            method: t.method,
            status: t.status,
            amount: t.amount,
            receipt_number: t.mpesa_receipt_number.clone(),
            description: t.result_description.clone(),
            awaiting_customer: t.is_awaiting_mpesa(),
            completed_at: t.completed_at,
        }
    }
}

/// Place an order.
///
/// POST /api/orders
///
/// # Errors
///
/// Returns the order error as JSON; a failed STK push still returns 201
/// with `prompt: "failed"`.
pub async fn place(
    State(state): State<AppState>,
    RequireAuth(customer): RequireAuth,
    Json(request): Json<PlaceOrderRequest>,
) -> ApiResult<(StatusCode, Json<PlaceOrderResponse>)> {
    let checkout = checkout(&state, &customer, &request.into()).await?;
    let placed = &checkout.placed;

    let (prompt, prompt_error) = match checkout.prompt {
        PaymentPrompt::NotNeeded => ("not_needed", None),
        PaymentPrompt::Sent => ("sent", None),
        PaymentPrompt::Failed(reason) => ("failed", Some(reason)),
    };

    Ok((
        StatusCode::CREATED,
        Json(PlaceOrderResponse {
            order_id: placed.order.id,
            status: placed.order.status,
            total: placed.order.total,
            payment: PaymentView::from(&placed.transaction),
            prompt,
            prompt_error,
        }),
    ))
}

/// Payment status of an order.
///
/// GET /api/orders/{id}/payment
///
/// # Errors
///
/// Returns 404 unless the caller is the order's customer or an admin.
pub async fn payment(
    State(state): State<AppState>,
    RequireAuth(viewer): RequireAuth,
    Path(id): Path<i32>,
) -> ApiResult<Json<PaymentView>> {
    let transaction = PaymentService::from_state(&state)
        .payment_for(&viewer, OrderId::new(id))
        .await?;
    Ok(Json(PaymentView::from(&transaction)))
}
