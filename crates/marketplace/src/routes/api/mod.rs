//! JSON API routes.
//!
//! Errors are returned as `{"error": "..."}`; unauthenticated requests get
//! 401 rather than a login redirect.

pub mod analytics;
pub mod orders;
pub mod payments;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the API routes router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(orders::place))
        .route("/orders/{id}/payment", get(orders::payment))
        .route("/payments/mpesa/callback", post(payments::mpesa_callback))
        .route("/analytics/sales", get(analytics::sales))
}
