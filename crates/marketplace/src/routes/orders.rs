//! Order placement and customer payment actions.

use axum::{
    Form,
    extract::{Path, State},
    response::Redirect,
};
use serde::Deserialize;
use tower_sessions::Session;

use shop_next_door_core::{OrderId, OrderStatus, PaymentMethod, ProductId, ShopId};

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::OrderLine;
use crate::routes::page::{FlashKind, finish, flash};
use crate::services::orders::{NewOrder, OrderService};
use crate::services::payments::PaymentService;
use crate::services::{PaymentPrompt, checkout};
use crate::state::AppState;

/// Prefix of the per-product quantity fields on the order form.
const QUANTITY_FIELD: &str = "qty_";

/// Read the storefront order form.
///
/// Each product has a `qty_{product_id}` field; blank or zero quantities
/// are skipped.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for missing or malformed fields.
pub fn parse_order_form(fields: &[(String, String)]) -> Result<NewOrder> {
    let mut shop_id = None;
    let mut payment_method = None;
    let mut phone = None;
    let mut delivery_address = String::new();
    let mut lines = Vec::new();

    for (key, value) in fields {
        let value = value.trim();
        match key.as_str() {
            "shop_id" => shop_id = value.parse::<i32>().ok().map(ShopId::new),
            "payment_method" => payment_method = value.parse::<PaymentMethod>().ok(),
            "phone" => phone = Some(value.to_owned()).filter(|p| !p.is_empty()),
            "delivery_address" => value.clone_into(&mut delivery_address),
            _ => {
                let Some(product) = key.strip_prefix(QUANTITY_FIELD) else {
                    continue;
                };
                if value.is_empty() {
                    continue;
                }
                let product_id = product
                    .parse::<i32>()
                    .map(ProductId::new)
                    .map_err(|_| AppError::BadRequest("Unknown product".to_owned()))?;
                let quantity = value
                    .parse::<i32>()
                    .map_err(|_| AppError::BadRequest("Quantities must be whole numbers".to_owned()))?;
                if quantity != 0 {
                    lines.push(OrderLine {
                        product_id,
                        quantity,
                    });
                }
            }
        }
    }

    Ok(NewOrder {
        shop_id: shop_id.ok_or_else(|| AppError::BadRequest("Missing shop".to_owned()))?,
        lines,
        payment_method: payment_method
            .ok_or_else(|| AppError::BadRequest("Choose a payment method".to_owned()))?,
        phone,
        delivery_address,
    })
}

/// Place an order from the storefront form.
pub async fn place(
    State(state): State<AppState>,
    RequireAuth(customer): RequireAuth,
    session: Session,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Redirect> {
    let new_order = match parse_order_form(&fields) {
        Ok(order) => order,
        Err(e) => return finish(&session, "/", Err::<(), _>(e), "").await,
    };
    let back = format!("/shops/{}", new_order.shop_id);

    let checkout = match checkout(&state, &customer, &new_order).await {
        Ok(checkout) => checkout,
        Err(e) => return finish(&session, &back, Err::<(), _>(e), "").await,
    };

    let order_id = checkout.placed.order.id;
    match checkout.prompt {
        PaymentPrompt::NotNeeded => {
            flash(&session, FlashKind::Success, "Order placed").await?;
        }
        PaymentPrompt::Sent => {
            flash(
                &session,
                FlashKind::Success,
                "Order placed. Check your phone and enter your M-Pesa PIN to pay.",
            )
            .await?;
        }
        PaymentPrompt::Failed(reason) => {
            flash(
                &session,
                FlashKind::Error,
                format!("Order placed, but the M-Pesa prompt failed: {reason}. You can retry below."),
            )
            .await?;
        }
    }

    Ok(Redirect::to(&format!("/account/orders/{order_id}")))
}

/// Payment retry form.
#[derive(Debug, Deserialize)]
pub struct PayForm {
    pub phone: Option<String>,
}

/// Send a new STK push for an unpaid order.
pub async fn pay(
    State(state): State<AppState>,
    RequireAuth(customer): RequireAuth,
    session: Session,
    Path(id): Path<i32>,
    Form(form): Form<PayForm>,
) -> Result<Redirect> {
    let order_id = OrderId::new(id);
    let phone = form.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());

    let outcome = PaymentService::from_state(&state)
        .initiate_mpesa(&customer, order_id, phone)
        .await;

    finish(
        &session,
        &format!("/account/orders/{order_id}"),
        outcome,
        "Check your phone and enter your M-Pesa PIN to pay.",
    )
    .await
}

/// Ask Daraja for the latest state of an order's payment.
pub async fn refresh(
    State(state): State<AppState>,
    RequireAuth(customer): RequireAuth,
    session: Session,
    Path(id): Path<i32>,
) -> Result<Redirect> {
    let order_id = OrderId::new(id);
    let outcome = PaymentService::from_state(&state)
        .refresh_for_customer(&customer, order_id)
        .await;

    finish(
        &session,
        &format!("/account/orders/{order_id}"),
        outcome,
        "Payment status updated",
    )
    .await
}

/// Cancel a pending order.
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(customer): RequireAuth,
    session: Session,
    Path(id): Path<i32>,
) -> Result<Redirect> {
    let order_id = OrderId::new(id);
    let outcome = OrderService::new(state.pool())
        .update_status(&customer, order_id, OrderStatus::Cancelled)
        .await;

    finish(
        &session,
        &format!("/account/orders/{order_id}"),
        outcome,
        "Order cancelled",
    )
    .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_parse_order_form() {
        let order = parse_order_form(&fields(&[
            ("shop_id", "4"),
            ("payment_method", "mpesa"),
            ("phone", " 0712345678 "),
            ("delivery_address", " Kilimani, Argwings Kodhek Rd "),
            ("qty_10", "2"),
            ("qty_11", ""),
            ("qty_12", "0"),
            ("qty_13", "1"),
        ]))
        .unwrap();

        assert_eq!(order.shop_id, ShopId::new(4));
        assert_eq!(order.payment_method, PaymentMethod::Mpesa);
        assert_eq!(order.phone.as_deref(), Some("0712345678"));
        assert_eq!(order.delivery_address, "Kilimani, Argwings Kodhek Rd");
        assert_eq!(
            order.lines,
            vec![
                OrderLine {
                    product_id: ProductId::new(10),
                    quantity: 2
                },
                OrderLine {
                    product_id: ProductId::new(13),
                    quantity: 1
                },
            ]
        );
    }

    #[test]
    fn test_parse_order_form_keeps_negative_quantities_for_validation() {
        let order = parse_order_form(&fields(&[
            ("shop_id", "1"),
            ("payment_method", "cod"),
            ("qty_3", "-2"),
        ]))
        .unwrap();
        assert_eq!(order.lines[0].quantity, -2);
        assert_eq!(order.phone, None);
    }

    #[test]
    fn test_parse_order_form_rejects_bad_fields() {
        assert!(parse_order_form(&fields(&[("payment_method", "cod")])).is_err());
        assert!(parse_order_form(&fields(&[("shop_id", "1"), ("payment_method", "cheque")])).is_err());
        assert!(
            parse_order_form(&fields(&[
                ("shop_id", "1"),
                ("payment_method", "cod"),
                ("qty_x", "1"),
            ]))
            .is_err()
        );
        assert!(
            parse_order_form(&fields(&[
                ("shop_id", "1"),
                ("payment_method", "cod"),
                ("qty_2", "two"),
            ]))
            .is_err()
        );
    }
}
