//! The Daraja callback endpoint.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use shop_next_door_core::OrderId;
use shop_next_door_integration_tests::{TestApp, body_text, post_json};

fn failed_payment() -> serde_json::Value {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }
        }
    })
}

#[tokio::test]
async fn test_callback_with_bad_signature_is_rejected() {
    let app = TestApp::with_mpesa();
    let response = app
        .send(post_json(
            "/api/payments/mpesa/callback?order=7&sig=deadbeef",
            &failed_payment(),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_signature_for_another_order_is_rejected() {
    let app = TestApp::with_mpesa();
    let url = app
        .mpesa
        .as_ref()
        .unwrap()
        .callback_url_for(OrderId::new(7))
        .unwrap();
    let sig = url.split("sig=").nth(1).unwrap();

    let response = app
        .send(post_json(
            &format!("/api/payments/mpesa/callback?order=8&sig={sig}"),
            &failed_payment(),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_valid_signature_reaches_the_database() {
    let app = TestApp::with_mpesa();
    let url = app
        .mpesa
        .as_ref()
        .unwrap()
        .callback_url_for(OrderId::new(7))
        .unwrap();
    let query = url.split_once('?').unwrap().1;

    let response = app
        .send(post_json(
            &format!("/api/payments/mpesa/callback?{query}"),
            &failed_payment(),
        ))
        .await;

    // Signature accepted; the unreachable database makes Daraja retry later.
    assert!(response.status().is_server_error());
}

#[tokio::test]
async fn test_callback_without_mpesa_is_unavailable() {
    let app = TestApp::new();
    let response = app
        .send(post_json(
            "/api/payments/mpesa/callback?order=7&sig=deadbeef",
            &failed_payment(),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
