//! M-Pesa callback endpoint.
//!
//! Daraja posts the STK result to the signed URL given at push time:
//! `/api/payments/mpesa/callback?order={id}&sig={hmac}`. A bad signature is
//! answered with 401 and changes nothing. Anything Daraja cannot act on
//! (unknown checkout, already settled) is still acknowledged so it stops
//! retrying.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use shop_next_door_core::OrderId;

use crate::error::ApiResult;
use crate::mpesa::{CallbackAck, CallbackEnvelope};
use crate::services::payments::PaymentService;
use crate::state::AppState;

/// Query parameters carried by the callback URL.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub order: i32,
    pub sig: String,
}

/// Receive an STK push result.
///
/// POST /api/payments/mpesa/callback
///
/// # Errors
///
/// Returns 401 for a bad signature, 503 when M-Pesa is disabled and 500 if
/// the result could not be stored (Daraja will retry).
pub async fn mpesa_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    Json(envelope): Json<CallbackEnvelope>,
) -> ApiResult<Json<CallbackAck>> {
    let ack = PaymentService::from_state(&state)
        .handle_callback(
            OrderId::new(query.order),
            &query.sig,
            &envelope.body.stk_callback,
        )
        .await?;
    Ok(Json(ack))
}
