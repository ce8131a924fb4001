//! HTTP route handlers for the marketplace.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Active shops (?type=)
//! GET  /shops/{id}             - Storefront with order form
//! GET  /dashboard              - Redirect to the dashboard for the role
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database)
//!
//! # Auth (strict rate limit)
//! GET  /auth/login             - Login page
//! POST /auth/login             - Login action
//! GET  /auth/register          - Register page
//! POST /auth/register          - Register action
//! POST /auth/logout            - Logout action
//!
//! # Customer (requires auth)
//! GET  /account/orders         - Order history
//! GET  /account/orders/{id}    - Order detail and payment status
//! POST /orders                 - Place order
//! POST /orders/{id}/pay        - Send a new STK push
//! POST /orders/{id}/refresh    - Query Daraja for the payment result
//! POST /orders/{id}/cancel     - Cancel a pending order
//!
//! # Vendor (vendor or admin)
//! GET  /vendor                 - Dashboard
//! POST /vendor/shops           - Create shop
//! GET  /vendor/shops/{id}      - Manage shop and products
//! POST /vendor/shops/{id}      - Update shop
//! POST /vendor/shops/{id}/status   - Open or close shop
//! POST /vendor/shops/{id}/products - Add product
//! POST /vendor/products/{id}       - Update product
//! POST /vendor/products/{id}/delete - Archive product
//! GET  /vendor/orders          - Orders (?status=)
//! POST /vendor/orders/{id}/status  - Change order status
//!
//! # Admin
//! GET  /admin                  - Dashboard
//! GET  /admin/users            - Users (?role=&page=)
//! POST /admin/users/{id}/role  - Change role
//! GET  /admin/shops            - All shops
//! POST /admin/shops/{id}/status - Set shop status
//! GET  /admin/orders           - All orders (?page=)
//! GET  /admin/transactions     - Transactions (?status=&page=)
//! POST /admin/transactions/{id}/status  - Manual settlement
//! POST /admin/transactions/{id}/refresh - Query Daraja
//! POST /admin/impersonate/{user_id}     - Start impersonation
//! POST /impersonate/stop       - Stop impersonation
//!
//! # JSON API (relaxed rate limit)
//! POST /api/orders             - Place order
//! GET  /api/orders/{id}/payment - Payment status (polling)
//! POST /api/payments/mpesa/callback - Daraja STK callback (?order=&sig=)
//! GET  /api/analytics/sales    - Summary and daily revenue (?days=)
//! ```

pub mod account;
pub mod admin;
pub mod api;
pub mod auth;
pub mod home;
pub mod orders;
pub mod page;
pub mod vendor;

use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn,
    routing::{get, post},
};
use tower_http::{
    services::ServeDir,
    trace::{DefaultOnResponse, OnResponse, TraceLayer},
};
use tower_sessions::service::SignedCookie;
use tower_sessions::{SessionManagerLayer, SessionStore};
use tracing::Span;

use crate::middleware::{
    api_rate_limiter, auth_rate_limiter, request_id_middleware, security_headers_middleware,
};
use crate::state::AppState;

/// Static assets, relative to the workspace root.
const STATIC_DIR: &str = "crates/marketplace/static";

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
}

/// Create the customer account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(account::orders))
        .route("/orders/{id}", get(account::order))
}

/// Create the order action routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(orders::place))
        .route("/{id}/pay", post(orders::pay))
        .route("/{id}/refresh", post(orders::refresh))
        .route("/{id}/cancel", post(orders::cancel))
}

/// Create the vendor routes router.
pub fn vendor_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(vendor::dashboard))
        .route("/shops", post(vendor::create_shop))
        .route(
            "/shops/{id}",
            get(vendor::show_shop).post(vendor::update_shop),
        )
        .route("/shops/{id}/status", post(vendor::toggle_shop))
        .route("/shops/{id}/products", post(vendor::create_product))
        .route("/products/{id}", post(vendor::update_product))
        .route("/products/{id}/delete", post(vendor::delete_product))
        .route("/orders", get(vendor::orders))
        .route("/orders/{id}/status", post(vendor::update_order_status))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(admin::dashboard))
        .route("/users", get(admin::users))
        .route("/users/{id}/role", post(admin::change_role))
        .route("/shops", get(admin::shops))
        .route("/shops/{id}/status", post(admin::set_shop_status))
        .route("/orders", get(admin::orders))
        .route("/transactions", get(admin::transactions))
        .route(
            "/transactions/{id}/status",
            post(admin::settle_transaction),
        )
        .route(
            "/transactions/{id}/refresh",
            post(admin::refresh_transaction),
        )
        .route("/impersonate/{id}", post(admin::impersonate))
}

/// Create all page and API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/shops/{id}", get(home::show_shop))
        .route("/dashboard", get(home::dashboard))
        .nest("/auth", auth_routes().layer(auth_rate_limiter()))
        .nest("/account", account_routes())
        .nest("/orders", order_routes())
        .nest("/vendor", vendor_routes())
        .nest("/admin", admin_routes())
        .route("/impersonate/stop", post(admin::stop_impersonating))
        .nest("/api", api::routes().layer(api_rate_limiter()))
}

/// Build the full application with its middleware stack.
///
/// The session store is a parameter so tests can use an in-memory store.
/// Sentry layers are added by the binary.
pub fn app<Store>(state: AppState, session_layer: SessionManagerLayer<Store, SignedCookie>) -> Router
where
    Store: SessionStore + Clone,
{
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes())
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(session_layer)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
