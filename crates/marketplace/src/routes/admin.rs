//! Admin dashboard: users, shops, orders, transactions and impersonation.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use tower_sessions::Session;

use shop_next_door_core::{ShopId, ShopStatus, TransactionId, TransactionStatus, UserId, UserRole};

use crate::db::{PAGE_SIZE, TransactionRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{
    AnalyticsScope, OrderListing, SalesSummary, ShopListing, TopProduct, TransactionListing, User,
};
use crate::routes::page::{FilterOption, FlashKind, Page, filter_options, finish, flash};
use crate::services::analytics::AnalyticsService;
use crate::services::auth::AuthService;
use crate::services::impersonation;
use crate::services::orders::OrderService;
use crate::services::payments::PaymentService;
use crate::services::shops::ShopService;
use crate::state::AppState;

// =============================================================================
// Query and Form Types
// =============================================================================

/// User listing filter.
#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub role: Option<String>,
    pub page: Option<u32>,
}

/// Paged listing.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

/// Transaction listing filter.
#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
}

/// Role change form.
#[derive(Debug, Deserialize)]
pub struct RoleForm {
    pub role: UserRole,
}

/// Shop status form.
#[derive(Debug, Deserialize)]
pub struct ShopStatusForm {
    pub status: ShopStatus,
}

/// Manual settlement form.
#[derive(Debug, Deserialize)]
pub struct SettleForm {
    pub status: TransactionStatus,
}

// =============================================================================
// Templates
// =============================================================================

/// Admin dashboard template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/dashboard.html")]
pub struct DashboardTemplate {
    pub page: Page,
    pub summary: SalesSummary,
    pub top_products: Vec<TopProduct>,
    pub role_counts: Vec<(UserRole, i64)>,
}

/// Users template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/users.html")]
pub struct UsersTemplate {
    pub page: Page,
    pub users: Vec<User>,
    pub filters: Vec<FilterOption>,
    /// Current role filter, empty for all.
    pub role_param: &'static str,
    pub page_number: u32,
    pub has_next: bool,
}

/// Shops template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/shops.html")]
pub struct ShopsTemplate {
    pub page: Page,
    pub shops: Vec<ShopListing>,
}

/// Orders template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/orders.html")]
pub struct OrdersTemplate {
    pub page: Page,
    pub orders: Vec<OrderListing>,
    pub page_number: u32,
    pub has_next: bool,
}

/// Transactions template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/transactions.html")]
pub struct TransactionsTemplate {
    pub page: Page,
    pub transactions: Vec<TransactionListing>,
    pub filters: Vec<FilterOption>,
    /// Current status filter, empty for all.
    pub status_param: &'static str,
    pub page_number: u32,
    pub has_next: bool,
}

/// Whether a listing filled its page, so another may follow.
fn is_full_page(len: usize) -> bool {
    i64::try_from(len).is_ok_and(|len| len >= PAGE_SIZE)
}

// =============================================================================
// Dashboard
// =============================================================================

/// Display the admin dashboard.
pub async fn dashboard(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    page: Page,
) -> Result<impl IntoResponse> {
    let analytics = AnalyticsService::new(state.pool());
    let summary = analytics.summary(AnalyticsScope::All).await?;
    let top_products = analytics.top_products(AnalyticsScope::All).await?;
    let role_counts = UserRepository::new(state.pool()).count_by_role().await?;

    Ok(DashboardTemplate {
        page,
        summary,
        top_products,
        role_counts,
    })
}

// =============================================================================
// Users
// =============================================================================

/// Display users, optionally of one role.
pub async fn users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    page: Page,
    Query(query): Query<UsersQuery>,
) -> Result<impl IntoResponse> {
    let selected = query
        .role
        .as_deref()
        .and_then(|r| r.parse::<UserRole>().ok());
    let page_number = query.page.unwrap_or(1).max(1);
    let users = UserRepository::new(state.pool())
        .list(selected, page_number)
        .await?;

    Ok(UsersTemplate {
        page,
        has_next: is_full_page(users.len()),
        users,
        filters: filter_options(UserRole::ALL, selected, UserRole::as_str, UserRole::as_str),
        role_param: selected.as_ref().map_or("", UserRole::as_str),
        page_number,
    })
}

/// Change a user's role.
///
/// Admins cannot change their own role.
pub async fn change_role(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    session: Session,
    Path(id): Path<i32>,
    Form(form): Form<RoleForm>,
) -> Result<Redirect> {
    let id = UserId::new(id);
    let changed = if id == admin.id {
        Err(AppError::BadRequest("You cannot change your own role".to_owned()))
    } else {
        AuthService::new(state.pool())
            .set_role(id, form.role)
            .await
            .map_err(AppError::from)
    };

    if let Ok(user) = &changed {
        tracing::warn!(
            admin_id = %admin.id,
            user_id = %user.id,
            role = %user.role,
            "User role changed"
        );
    }
    finish(&session, "/admin/users", changed, "Role updated").await
}

// =============================================================================
// Shops
// =============================================================================

/// Display every shop.
pub async fn shops(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    page: Page,
) -> Result<impl IntoResponse> {
    let shops = ShopService::new(state.pool()).all_shops().await?;
    Ok(ShopsTemplate { page, shops })
}

/// Activate or deactivate any shop.
pub async fn set_shop_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    session: Session,
    Path(id): Path<i32>,
    Form(form): Form<ShopStatusForm>,
) -> Result<Redirect> {
    let updated = ShopService::new(state.pool())
        .set_status(&admin, ShopId::new(id), form.status)
        .await;

    finish(&session, "/admin/shops", updated, "Shop status updated").await
}

// =============================================================================
// Orders and Transactions
// =============================================================================

/// Display every order.
pub async fn orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    page: Page,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    let page_number = query.page.unwrap_or(1).max(1);
    let orders = OrderService::new(state.pool())
        .all_orders(page_number)
        .await?;

    Ok(OrdersTemplate {
        page,
        has_next: is_full_page(orders.len()),
        orders,
        page_number,
    })
}

/// Display transactions, optionally of one status.
pub async fn transactions(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    page: Page,
    Query(query): Query<TransactionsQuery>,
) -> Result<impl IntoResponse> {
    let selected = query
        .status
        .as_deref()
        .and_then(|s| s.parse::<TransactionStatus>().ok());
    let page_number = query.page.unwrap_or(1).max(1);
    let transactions = TransactionRepository::new(state.pool())
        .list(selected, page_number)
        .await?;

    Ok(TransactionsTemplate {
        page,
        has_next: is_full_page(transactions.len()),
        transactions,
        filters: filter_options(
            TransactionStatus::ALL,
            selected,
            TransactionStatus::as_str,
            TransactionStatus::as_str,
        ),
        status_param: selected.as_ref().map_or("", TransactionStatus::as_str),
        page_number,
    })
}

/// Mark a transaction successful or failed by hand.
pub async fn settle_transaction(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    session: Session,
    Path(id): Path<i32>,
    Form(form): Form<SettleForm>,
) -> Result<Redirect> {
    let settled = PaymentService::from_state(&state)
        .settle_manually(&admin, TransactionId::new(id), form.status)
        .await;

    finish(&session, "/admin/transactions", settled, "Transaction updated").await
}

/// Ask Daraja for the latest state of a transaction.
pub async fn refresh_transaction(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    session: Session,
    Path(id): Path<i32>,
) -> Result<Redirect> {
    let refreshed = PaymentService::from_state(&state)
        .refresh_transaction(TransactionId::new(id))
        .await;

    let message = match &refreshed {
        Ok(t) => format!("Transaction #{} is {}", t.id, t.status),
        Err(_) => String::new(),
    };
    finish(&session, "/admin/transactions", refreshed, &message).await
}

// =============================================================================
// Impersonation
// =============================================================================

/// Start acting as another user.
pub async fn impersonate(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    session: Session,
    Path(id): Path<i32>,
) -> Result<Redirect> {
    match impersonation::start(state.pool(), &session, &admin, UserId::new(id)).await {
        Ok(target) => {
            flash(
                &session,
                FlashKind::Success,
                format!("You are now acting as {}", target.name),
            )
            .await?;
            Ok(Redirect::to(target.role.dashboard_path()))
        }
        Err(e) => finish(&session, "/admin/users", Err::<(), _>(e), "").await,
    }
}

/// Return to the admin identity.
pub async fn stop_impersonating(session: Session) -> Result<Redirect> {
    let admin = impersonation::stop(&session).await?;
    flash(&session, FlashKind::Success, "Back to your admin account").await?;
    Ok(Redirect::to(admin.role.dashboard_path()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_full_page() {
        assert!(!is_full_page(0));
        assert!(!is_full_page(49));
        assert!(is_full_page(50));
    }
}
