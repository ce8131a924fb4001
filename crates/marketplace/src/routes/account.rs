//! Customer account pages.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};

use shop_next_door_core::{OrderId, OrderStatus, PaymentMethod, TransactionStatus};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{CurrentUser, OrderDetail, OrderListing, Transaction};
use crate::routes::page::Page;
use crate::services::orders::OrderService;
use crate::state::AppState;

/// Order history template.
#[derive(Template, WebTemplate)]
#[template(path = "account/orders.html")]
pub struct OrdersTemplate {
    pub page: Page,
    pub orders: Vec<OrderListing>,
}

/// Order detail template.
#[derive(Template, WebTemplate)]
#[template(path = "account/order.html")]
pub struct OrderTemplate {
    pub page: Page,
    pub detail: OrderDetail,
    pub actions: OrderActions,
}

/// What the viewer can do on the order page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderActions {
    /// Unpaid M-Pesa order of the viewer: show the pay button.
    pub can_pay: bool,
    /// An STK push is open: poll for the result.
    pub awaiting_payment: bool,
    pub can_cancel: bool,
    /// The viewer runs the shop (or is an admin) and can move the order on.
    pub can_manage: bool,
}

impl OrderActions {
    /// Actions on `detail` for `viewer`.
    #[must_use]
    pub fn for_viewer(detail: &OrderDetail, viewer: &CurrentUser, mpesa_enabled: bool) -> Self {
        let is_customer = detail.order.customer_id == viewer.id;
        let pending = detail.order.status == OrderStatus::Pending;
        let transaction = detail.transaction.as_ref();

        Self {
            can_pay: mpesa_enabled
                && is_customer
                && pending
                && transaction.is_some_and(|t| {
                    t.method == PaymentMethod::Mpesa && t.status != TransactionStatus::Successful
                }),
            awaiting_payment: transaction.is_some_and(Transaction::is_awaiting_mpesa),
            can_cancel: is_customer && pending,
            can_manage: (viewer.is_admin() || detail.vendor_id == viewer.id)
                && !detail.order.status.is_terminal(),
        }
    }
}

/// Display the customer's order history.
pub async fn orders(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    page: Page,
) -> Result<impl IntoResponse> {
    let orders = OrderService::new(state.pool()).history(&user).await?;
    Ok(OrdersTemplate { page, orders })
}

/// Display one order with its payment.
///
/// Customers see their own orders, vendors their shops' and admins any.
pub async fn order(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    page: Page,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    let detail = OrderService::new(state.pool())
        .detail_for(&user, OrderId::new(id))
        .await?;

    let actions = OrderActions::for_viewer(&detail, &user, state.mpesa().is_some());
    Ok(OrderTemplate {
        page,
        detail,
        actions,
    })
}
