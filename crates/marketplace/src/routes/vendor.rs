//! Vendor dashboard: shops, products and incoming orders.
//!
//! Every handler requires a vendor (or admin). Ownership is checked by the
//! shop service, so a vendor addressing another vendor's shop gets a 404.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use tower_sessions::Session;

use shop_next_door_core::{OrderId, OrderStatus, ProductId, ShopId, ShopType};

use crate::error::{AppError, Result};
use crate::middleware::RequireVendor;
use crate::models::{AnalyticsScope, OrderListing, Product, SalesSummary, Shop, TopProduct};
use crate::routes::page::{FilterOption, Page, filter_options, finish};
use crate::services::analytics::AnalyticsService;
use crate::services::orders::OrderService;
use crate::services::shops::{ShopService, product_input, shop_input};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Shop create/edit form.
#[derive(Debug, Deserialize)]
pub struct ShopForm {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub location: String,
    pub shop_type: ShopType,
}

/// Product create/edit form.
///
/// Numbers arrive as text so a typo becomes a message, not a 422.
#[derive(Debug, Deserialize)]
pub struct ProductForm {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: String,
    pub stock: String,
    pub image_url: Option<String>,
}

/// Order status form.
#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: String,
}

/// Vendor order filter.
#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub status: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Vendor dashboard template.
#[derive(Template, WebTemplate)]
#[template(path = "vendor/dashboard.html")]
pub struct DashboardTemplate {
    pub page: Page,
    pub summary: SalesSummary,
    pub top_products: Vec<TopProduct>,
    pub shops: Vec<Shop>,
    pub shop_types: Vec<FilterOption>,
}

/// Shop management template.
#[derive(Template, WebTemplate)]
#[template(path = "vendor/shop.html")]
pub struct ShopTemplate {
    pub page: Page,
    pub shop: Shop,
    pub products: Vec<Product>,
    pub shop_types: Vec<FilterOption>,
}

/// Vendor orders template.
#[derive(Template, WebTemplate)]
#[template(path = "vendor/orders.html")]
pub struct OrdersTemplate {
    pub page: Page,
    pub orders: Vec<OrderListing>,
    pub filters: Vec<FilterOption>,
    pub filtered: bool,
}

fn shop_type_options(selected: Option<ShopType>) -> Vec<FilterOption> {
    filter_options(ShopType::ALL, selected, ShopType::as_str, ShopType::label)
}

// =============================================================================
// Dashboard
// =============================================================================

/// Display the vendor dashboard.
pub async fn dashboard(
    State(state): State<AppState>,
    RequireVendor(vendor): RequireVendor,
    page: Page,
) -> Result<impl IntoResponse> {
    let scope = AnalyticsScope::Vendor(vendor.id);
    let analytics = AnalyticsService::new(state.pool());
    let summary = analytics.summary(scope).await?;
    let top_products = analytics.top_products(scope).await?;
    let shops = ShopService::new(state.pool()).vendor_shops(&vendor).await?;

    Ok(DashboardTemplate {
        page,
        summary,
        top_products,
        shops,
        shop_types: shop_type_options(None),
    })
}

// =============================================================================
// Shops
// =============================================================================

/// Create a shop.
pub async fn create_shop(
    State(state): State<AppState>,
    RequireVendor(vendor): RequireVendor,
    session: Session,
    Form(form): Form<ShopForm>,
) -> Result<Redirect> {
    let service = ShopService::new(state.pool());
    let created = match shop_input(&form.name, &form.description, &form.location, form.shop_type) {
        Ok(input) => service.create_shop(&vendor, &input).await,
        Err(e) => Err(e),
    };

    let to = created
        .as_ref()
        .map_or_else(|_| "/vendor".to_owned(), |shop| format!("/vendor/shops/{}", shop.id));
    finish(&session, &to, created, "Shop created").await
}

/// Display a shop with all its products.
pub async fn show_shop(
    State(state): State<AppState>,
    RequireVendor(vendor): RequireVendor,
    page: Page,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    let (shop, products) = ShopService::new(state.pool())
        .managed_shop_with_products(&vendor, ShopId::new(id))
        .await?;

    Ok(ShopTemplate {
        page,
        shop_types: shop_type_options(Some(shop.shop_type)),
        shop,
        products,
    })
}

/// Update a shop's details.
pub async fn update_shop(
    State(state): State<AppState>,
    RequireVendor(vendor): RequireVendor,
    session: Session,
    Path(id): Path<i32>,
    Form(form): Form<ShopForm>,
) -> Result<Redirect> {
    let id = ShopId::new(id);
    let service = ShopService::new(state.pool());
    let updated = match shop_input(&form.name, &form.description, &form.location, form.shop_type) {
        Ok(input) => service.update_shop(&vendor, id, &input).await,
        Err(e) => Err(e),
    };

    finish(&session, &format!("/vendor/shops/{id}"), updated, "Shop updated").await
}

/// Open or close a shop.
pub async fn toggle_shop(
    State(state): State<AppState>,
    RequireVendor(vendor): RequireVendor,
    session: Session,
    Path(id): Path<i32>,
) -> Result<Redirect> {
    let id = ShopId::new(id);
    let toggled = ShopService::new(state.pool())
        .toggle_status(&vendor, id)
        .await;

    let message = match &toggled {
        Ok(shop) if shop.is_active() => "Shop is open",
        _ => "Shop is closed",
    };
    finish(&session, &format!("/vendor/shops/{id}"), toggled, message).await
}

// =============================================================================
// Products
// =============================================================================

fn parse_stock(raw: &str) -> Result<i32> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| AppError::BadRequest("Stock must be a whole number".to_owned()))
}

/// Validate a product form.
fn product_from_form(form: &ProductForm) -> Result<crate::models::ProductInput> {
    let stock = parse_stock(&form.stock)?;
    Ok(product_input(
        &form.name,
        &form.description,
        &form.price,
        stock,
        form.image_url.as_deref(),
    )?)
}

/// Add a product to a shop.
pub async fn create_product(
    State(state): State<AppState>,
    RequireVendor(vendor): RequireVendor,
    session: Session,
    Path(id): Path<i32>,
    Form(form): Form<ProductForm>,
) -> Result<Redirect> {
    let shop_id = ShopId::new(id);
    let created = match product_from_form(&form) {
        Ok(input) => ShopService::new(state.pool())
            .create_product(&vendor, shop_id, &input)
            .await
            .map_err(AppError::from),
        Err(e) => Err(e),
    };

    finish(&session, &format!("/vendor/shops/{shop_id}"), created, "Product added").await
}

/// Edit a product.
pub async fn update_product(
    State(state): State<AppState>,
    RequireVendor(vendor): RequireVendor,
    session: Session,
    Path(id): Path<i32>,
    Form(form): Form<ProductForm>,
) -> Result<Redirect> {
    let service = ShopService::new(state.pool());
    let id = ProductId::new(id);
    let updated = match product_from_form(&form) {
        Ok(input) => service
            .update_product(&vendor, id, &input)
            .await
            .map_err(AppError::from),
        Err(e) => Err(e),
    };

    let to = updated
        .as_ref()
        .map_or_else(|_| "/vendor".to_owned(), |p| format!("/vendor/shops/{}", p.shop_id));
    finish(&session, &to, updated, "Product updated").await
}

/// Archive a product.
pub async fn delete_product(
    State(state): State<AppState>,
    RequireVendor(vendor): RequireVendor,
    session: Session,
    Path(id): Path<i32>,
) -> Result<Redirect> {
    let archived = ShopService::new(state.pool())
        .archive_product(&vendor, ProductId::new(id))
        .await;

    let to = archived
        .as_ref()
        .map_or_else(|_| "/vendor".to_owned(), |p| format!("/vendor/shops/{}", p.shop_id));
    finish(&session, &to, archived, "Product removed").await
}

// =============================================================================
// Orders
// =============================================================================

/// Display orders across the vendor's shops.
pub async fn orders(
    State(state): State<AppState>,
    RequireVendor(vendor): RequireVendor,
    page: Page,
    Query(query): Query<OrdersQuery>,
) -> Result<impl IntoResponse> {
    let selected = query
        .status
        .as_deref()
        .and_then(|s| s.parse::<OrderStatus>().ok());
    let orders = OrderService::new(state.pool())
        .vendor_orders(&vendor, selected)
        .await?;

    Ok(OrdersTemplate {
        page,
        orders,
        filters: filter_options(OrderStatus::ALL, selected, OrderStatus::as_str, OrderStatus::as_str),
        filtered: selected.is_some(),
    })
}

/// Move an order along its lifecycle.
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireVendor(vendor): RequireVendor,
    session: Session,
    Path(id): Path<i32>,
    Form(form): Form<StatusForm>,
) -> Result<Redirect> {
    let order_id = OrderId::new(id);
    let updated = match form.status.parse::<OrderStatus>() {
        Ok(next) => OrderService::new(state.pool())
            .update_status(&vendor, order_id, next)
            .await
            .map_err(AppError::from),
        Err(e) => Err(AppError::BadRequest(e.to_string())),
    };

    let message = match &updated {
        Ok(order) => format!("Order #{order_id} is now {}", order.status),
        Err(_) => String::new(),
    };
    finish(&session, "/vendor/orders", updated, &message).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stock() {
        assert_eq!(parse_stock(" 12 ").ok(), Some(12));
        assert!(parse_stock("twelve").is_err());
        assert!(parse_stock("").is_err());
    }

    #[test]
    fn test_product_from_form_reports_bad_price() {
        let form = ProductForm {
            name: "Sukuma wiki".to_owned(),
            description: String::new(),
            price: "free".to_owned(),
            stock: "10".to_owned(),
            image_url: None,
        };
        let err = product_from_form(&form).err();
        assert!(matches!(err, Some(AppError::Shop(_))));
    }
}
