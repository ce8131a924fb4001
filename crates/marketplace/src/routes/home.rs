//! Public browsing: shop directory and storefronts.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;

use shop_next_door_core::{PaymentMethod, ShopId, ShopType};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{Product, Shop};
use crate::routes::page::{FilterOption, Page, filter_options};
use crate::services::shops::ShopService;
use crate::state::AppState;

/// Shop directory filter.
#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    #[serde(rename = "type")]
    pub shop_type: Option<String>,
}

/// Shop directory template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub page: Page,
    pub shops: Vec<Shop>,
    pub filters: Vec<FilterOption>,
    pub filtered: bool,
}

/// Storefront template with the order form.
#[derive(Template, WebTemplate)]
#[template(path = "shops/show.html")]
pub struct ShopTemplate {
    pub page: Page,
    pub shop: Shop,
    pub products: Vec<Product>,
    pub payment_methods: Vec<PaymentMethod>,
}

/// Display active shops, optionally of one type.
///
/// An unknown `type` shows every shop.
pub async fn home(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<BrowseQuery>,
) -> Result<impl IntoResponse> {
    let selected = query
        .shop_type
        .as_deref()
        .and_then(|t| t.parse::<ShopType>().ok());
    let shops = ShopService::new(state.pool()).browse(selected).await?;

    Ok(HomeTemplate {
        page,
        shops,
        filters: filter_options(ShopType::ALL, selected, ShopType::as_str, ShopType::label),
        filtered: selected.is_some(),
    })
}

/// Display a shop and its products.
pub async fn show_shop(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    let (shop, products) = ShopService::new(state.pool())
        .storefront(ShopId::new(id))
        .await?;

    let payment_methods = PaymentMethod::ALL
        .iter()
        .copied()
        .filter(|m| *m != PaymentMethod::Mpesa || state.mpesa().is_some())
        .collect();

    Ok(ShopTemplate {
        page,
        shop,
        products,
        payment_methods,
    })
}

/// Send the user to the dashboard for their role.
pub async fn dashboard(RequireAuth(user): RequireAuth) -> Redirect {
    Redirect::to(user.role.dashboard_path())
}
