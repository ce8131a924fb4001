//! Health checks, middleware headers and public pages.

#![allow(clippy::unwrap_used)]

use axum::http::{StatusCode, header};

use shop_next_door_integration_tests::{TestApp, body_text, get};

#[tokio::test]
async fn test_health_is_ok() {
    let app = TestApp::new();
    let response = app.send(get("/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn test_readiness_reports_unreachable_database() {
    let app = TestApp::new();
    let response = app.send(get("/health/ready", None)).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_security_headers_and_request_id() {
    let app = TestApp::new();
    let response = app.send(get("/health", None)).await;
    let headers = response.headers();

    assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
    assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
    let csp = headers
        .get(header::CONTENT_SECURITY_POLICY)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(csp.contains("script-src 'self'"));
    assert!(headers.get("x-request-id").is_some());
}

#[tokio::test]
async fn test_upstream_request_id_is_echoed() {
    let app = TestApp::new();
    let mut request = get("/health", None);
    request
        .headers_mut()
        .insert("x-request-id", "req-abc-123".parse().unwrap());

    let response = app.send(request).await;
    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-abc-123");
}

#[tokio::test]
async fn test_login_page_shows_fixed_messages_only() {
    let app = TestApp::new();

    let response = app.send(get("/auth/login?error=credentials", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Invalid email or password"));
    assert!(body.contains("name=\"password\""));

    let response = app
        .send(get("/auth/login?error=%3Cscript%3Ealert(1)%3C/script%3E", None))
        .await;
    let body = body_text(response).await;
    assert!(!body.contains("<script>alert"));
}

#[tokio::test]
async fn test_register_page_offers_customer_and_vendor_only() {
    let app = TestApp::new();
    let response = app.send(get("/auth/register", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("value=\"customer\""));
    assert!(body.contains("value=\"vendor\""));
    assert!(!body.contains("value=\"admin\""));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = TestApp::new();
    let response = app.send(get("/no/such/page", None)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
