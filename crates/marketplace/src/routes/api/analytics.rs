//! Sales analytics JSON for dashboard charts.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::middleware::RequireVendor;
use crate::models::{AnalyticsScope, CurrentUser, TopProduct};
use crate::services::analytics::{AnalyticsService, SalesReport};
use crate::state::AppState;

/// Query parameters for the sales report.
#[derive(Debug, Deserialize)]
pub struct SalesQuery {
    pub days: Option<u32>,
}

/// Sales report plus best sellers.
#[derive(Debug, Serialize)]
pub struct SalesResponse {
    #[serde(flatten)]
    pub report: SalesReport,
    pub top_products: Vec<TopProduct>,
}

/// Admins see the whole marketplace, vendors their own shops.
fn scope_for(user: &CurrentUser) -> AnalyticsScope {
    if user.is_admin() {
        AnalyticsScope::All
    } else {
        AnalyticsScope::Vendor(user.id)
    }
}

/// Sales summary and daily revenue.
///
/// GET /api/analytics/sales?days=30
///
/// # Errors
///
/// Returns 500 if a query fails.
pub async fn sales(
    State(state): State<AppState>,
    RequireVendor(user): RequireVendor,
    Query(query): Query<SalesQuery>,
) -> ApiResult<Json<SalesResponse>> {
    let scope = scope_for(&user);
    let analytics = AnalyticsService::new(state.pool());
    let report = analytics.report(scope, query.days).await?;
    let top_products = analytics.top_products(scope).await?;

    Ok(Json(SalesResponse {
        report,
        top_products,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shop_next_door_core::{Email, UserId, UserRole};

    use super::*;

    #[test]
    fn test_scope_for_role() {
        let mut user = CurrentUser {
            id: UserId::new(9),
            email: Email::parse("duka@example.com").unwrap(),
            name: "Duka".to_owned(),
            role: UserRole::Vendor,
        };
        assert_eq!(scope_for(&user), AnalyticsScope::Vendor(UserId::new(9)));

        user.role = UserRole::Admin;
        assert_eq!(scope_for(&user), AnalyticsScope::All);
    }
}
