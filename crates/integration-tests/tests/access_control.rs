//! Role checks on page and API routes.

#![allow(clippy::unwrap_used)]

use axum::http::{StatusCode, header};

use shop_next_door_core::{Email, UserId, UserRole};
use shop_next_door_marketplace::middleware::SESSION_COOKIE_NAME;
use shop_next_door_marketplace::models::CurrentUser;
use shop_next_door_integration_tests::{TestApp, get};

fn location(response: &axum::http::Response<axum::body::Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_anonymous_pages_redirect_to_login() {
    let app = TestApp::new();

    for path in ["/account/orders", "/account/orders/1", "/vendor", "/admin", "/dashboard"] {
        let response = app.send(get(path, None)).await;
        assert!(response.status().is_redirection(), "{path}");
        assert_eq!(location(&response), "/auth/login", "{path}");
    }
}

#[tokio::test]
async fn test_anonymous_api_requests_are_unauthorized() {
    let app = TestApp::new();

    for path in ["/api/orders/1/payment", "/api/analytics/sales"] {
        let response = app.send(get(path, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
    }
}

#[tokio::test]
async fn test_customer_cannot_open_vendor_or_admin_pages() {
    let app = TestApp::new();
    let cookie = app.sign_in_as(10, UserRole::Customer).await;

    for path in ["/vendor", "/vendor/orders", "/admin", "/admin/users", "/api/analytics/sales"] {
        let response = app.send(get(path, Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{path}");
    }
}

#[tokio::test]
async fn test_vendor_cannot_open_admin_pages() {
    let app = TestApp::new();
    let cookie = app.sign_in_as(20, UserRole::Vendor).await;

    for path in ["/admin", "/admin/shops", "/admin/transactions"] {
        let response = app.send(get(path, Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{path}");
    }
}

#[tokio::test]
async fn test_dashboard_redirects_by_role() {
    let app = TestApp::new();

    for (role, expected) in [
        (UserRole::Customer, "/account/orders"),
        (UserRole::Vendor, "/vendor"),
        (UserRole::Admin, "/admin"),
    ] {
        let cookie = app.sign_in_as(30, role).await;
        let response = app.send(get("/dashboard", Some(&cookie))).await;
        assert!(response.status().is_redirection());
        assert_eq!(location(&response), expected);
    }
}

#[tokio::test]
async fn test_unsigned_session_cookie_is_ignored() {
    let app = TestApp::new();
    let user = CurrentUser {
        id: UserId::new(40),
        email: Email::parse("user40@example.com").unwrap(),
        name: "User 40".to_owned(),
        role: UserRole::Customer,
    };
    let session_id = app.store_session(&user).await;
    let forged = format!("{SESSION_COOKIE_NAME}={session_id}");

    let response = app.send(get("/account/orders", Some(&forged))).await;
    assert!(response.status().is_redirection());
    assert_eq!(location(&response), "/auth/login");
}
