//! Shop and product management.

use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use shop_next_door_core::{Money, MoneyError, ProductId, ShopId, ShopStatus, ShopType};

use crate::db::{ProductRepository, RepositoryError, ShopRepository};
use crate::models::{CurrentUser, Product, ProductInput, Shop, ShopInput, ShopListing};

const MIN_SHOP_NAME: usize = 2;
const MAX_SHOP_NAME: usize = 100;
const MAX_PRODUCT_NAME: usize = 200;
const MAX_LOCATION: usize = 200;
const MAX_DESCRIPTION: usize = 2000;
const MAX_IMAGE_URL: usize = 2048;
const MAX_STOCK: i32 = 1_000_000;

/// Errors from shop and product management.
#[derive(Debug, Error)]
pub enum ShopError {
    /// Submitted fields failed validation.
    #[error("{0}")]
    Invalid(String),

    #[error("invalid price: {0}")]
    InvalidPrice(#[from] MoneyError),

    #[error("shop not found")]
    ShopNotFound,

    #[error("product not found")]
    ProductNotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

fn invalid(message: impl Into<String>) -> ShopError {
    ShopError::Invalid(message.into())
}

fn bounded(field: &str, value: &str, min: usize, max: usize) -> Result<String, ShopError> {
    let value = value.trim();
    let len = value.chars().count();
    if len < min {
        return Err(if min <= 1 {
            invalid(format!("{field} is required"))
        } else {
            invalid(format!("{field} must be at least {min} characters"))
        });
    }
    if len > max {
        return Err(invalid(format!("{field} must be at most {max} characters")));
    }
    Ok(value.to_owned())
}

/// Validate and normalize a shop form.
///
/// # Errors
///
/// Returns `ShopError::Invalid` naming the first bad field.
pub fn shop_input(
    name: &str,
    description: &str,
    location: &str,
    shop_type: ShopType,
) -> Result<ShopInput, ShopError> {
    Ok(ShopInput {
        name: bounded("shop name", name, MIN_SHOP_NAME, MAX_SHOP_NAME)?,
        description: bounded("description", description, 0, MAX_DESCRIPTION)?,
        location: bounded("location", location, 1, MAX_LOCATION)?,
        shop_type,
    })
}

/// Validate and normalize a product form.
///
/// # Errors
///
/// Returns `ShopError::Invalid` or `ShopError::InvalidPrice` naming the
/// first bad field.
pub fn product_input(
    name: &str,
    description: &str,
    price: &str,
    stock: i32,
    image_url: Option<&str>,
) -> Result<ProductInput, ShopError> {
    let price = Money::parse(price)?;
    if price.is_zero() {
        return Err(invalid("price must be greater than zero"));
    }
    if !(0..=MAX_STOCK).contains(&stock) {
        return Err(invalid(format!("stock must be between 0 and {MAX_STOCK}")));
    }

    let image_url = image_url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(validate_image_url)
        .transpose()?;

    Ok(ProductInput {
        name: bounded("product name", name, 1, MAX_PRODUCT_NAME)?,
        description: bounded("description", description, 0, MAX_DESCRIPTION)?,
        price,
        stock,
        image_url,
    })
}

fn validate_image_url(raw: &str) -> Result<String, ShopError> {
    if raw.len() > MAX_IMAGE_URL {
        return Err(invalid("image URL is too long"));
    }
    let url = Url::parse(raw).map_err(|_| invalid("image URL is not a valid URL"))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid("image URL must start with http:// or https://"));
    }
    Ok(url.into())
}

/// Shop service.
///
/// Vendors manage their own shops; admins may manage any.
pub struct ShopService<'a> {
    shops: ShopRepository<'a>,
    products: ProductRepository<'a>,
}

impl<'a> ShopService<'a> {
    /// Create a new shop service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            shops: ShopRepository::new(pool),
            products: ProductRepository::new(pool),
        }
    }

    // =========================================================================
    // Public browsing
    // =========================================================================

    /// Active shops, optionally of one type.
    ///
    /// # Errors
    ///
    /// Returns `ShopError::Repository` if the query fails.
    pub async fn browse(&self, shop_type: Option<ShopType>) -> Result<Vec<Shop>, ShopError> {
        Ok(self.shops.list_active(shop_type).await?)
    }

    /// An active shop with its live products.
    ///
    /// # Errors
    ///
    /// Returns `ShopError::ShopNotFound` for missing or inactive shops.
    pub async fn storefront(&self, id: ShopId) -> Result<(Shop, Vec<Product>), ShopError> {
        let shop = self
            .shops
            .get(id)
            .await?
            .filter(Shop::is_active)
            .ok_or(ShopError::ShopNotFound)?;
        let products = self.products.list_by_shop(id, false).await?;
        Ok((shop, products))
    }

    // =========================================================================
    // Vendor management
    // =========================================================================

    /// Shops owned by a vendor.
    ///
    /// # Errors
    ///
    /// Returns `ShopError::Repository` if the query fails.
    pub async fn vendor_shops(&self, vendor: &CurrentUser) -> Result<Vec<Shop>, ShopError> {
        Ok(self.shops.list_by_vendor(vendor.id).await?)
    }

    /// A shop the actor manages.
    ///
    /// # Errors
    ///
    /// Returns `ShopError::ShopNotFound` if it doesn't exist or belongs to
    /// another vendor.
    pub async fn managed_shop(&self, actor: &CurrentUser, id: ShopId) -> Result<Shop, ShopError> {
        self.shops
            .get(id)
            .await?
            .filter(|shop| actor.is_admin() || shop.is_owned_by(actor.id))
            .ok_or(ShopError::ShopNotFound)
    }

    /// A managed shop with all its live products, in stock or not.
    ///
    /// # Errors
    ///
    /// Same as [`ShopService::managed_shop`].
    pub async fn managed_shop_with_products(
        &self,
        actor: &CurrentUser,
        id: ShopId,
    ) -> Result<(Shop, Vec<Product>), ShopError> {
        let shop = self.managed_shop(actor, id).await?;
        let products = self.products.list_by_shop(id, false).await?;
        Ok((shop, products))
    }

    /// Open a new shop for the vendor.
    ///
    /// # Errors
    ///
    /// Returns `ShopError::Repository` if the insert fails.
    #[instrument(skip(self, vendor, input), fields(vendor_id = %vendor.id))]
    pub async fn create_shop(
        &self,
        vendor: &CurrentUser,
        input: &ShopInput,
    ) -> Result<Shop, ShopError> {
        let shop = self.shops.create(vendor.id, input).await?;
        tracing::info!(shop_id = %shop.id, name = %shop.name, "Shop created");
        Ok(shop)
    }

    /// Edit a managed shop.
    ///
    /// # Errors
    ///
    /// Returns `ShopError::ShopNotFound` if the actor doesn't manage it.
    pub async fn update_shop(
        &self,
        actor: &CurrentUser,
        id: ShopId,
        input: &ShopInput,
    ) -> Result<Shop, ShopError> {
        self.managed_shop(actor, id).await?;
        Ok(self.shops.update_details(id, input).await?)
    }

    /// Switch a managed shop between active and inactive.
    ///
    /// # Errors
    ///
    /// Returns `ShopError::ShopNotFound` if the actor doesn't manage it.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn toggle_status(&self, actor: &CurrentUser, id: ShopId) -> Result<Shop, ShopError> {
        let shop = self.managed_shop(actor, id).await?;
        self.set_status(actor, id, shop.status.toggled()).await
    }

    /// Set a shop's status. Admins may set it on any shop.
    ///
    /// # Errors
    ///
    /// Returns `ShopError::ShopNotFound` if the actor doesn't manage it.
    pub async fn set_status(
        &self,
        actor: &CurrentUser,
        id: ShopId,
        status: ShopStatus,
    ) -> Result<Shop, ShopError> {
        self.managed_shop(actor, id).await?;
        let shop = self.shops.set_status(id, status).await?;
        tracing::info!(
            shop_id = %id,
            status = %shop.status,
            actor_id = %actor.id,
            "Shop status changed"
        );
        Ok(shop)
    }

    /// Every shop, for admins.
    ///
    /// # Errors
    ///
    /// Returns `ShopError::Repository` if the query fails.
    pub async fn all_shops(&self) -> Result<Vec<ShopListing>, ShopError> {
        Ok(self.shops.list_all().await?)
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// A live product in a shop the actor manages.
    async fn managed_product(
        &self,
        actor: &CurrentUser,
        id: ProductId,
    ) -> Result<Product, ShopError> {
        let product = self
            .products
            .get(id)
            .await?
            .filter(|p| !p.archived)
            .ok_or(ShopError::ProductNotFound)?;
        self.managed_shop(actor, product.shop_id)
            .await
            .map_err(|_| ShopError::ProductNotFound)?;
        Ok(product)
    }

    /// Add a product to a managed shop.
    ///
    /// # Errors
    ///
    /// Returns `ShopError::ShopNotFound` if the actor doesn't manage the shop.
    pub async fn create_product(
        &self,
        actor: &CurrentUser,
        shop_id: ShopId,
        input: &ProductInput,
    ) -> Result<Product, ShopError> {
        self.managed_shop(actor, shop_id).await?;
        let product = self.products.create(shop_id, input).await?;
        tracing::info!(shop_id = %shop_id, product_id = %product.id, "Product created");
        Ok(product)
    }

    /// Edit a product in a managed shop.
    ///
    /// # Errors
    ///
    /// Returns `ShopError::ProductNotFound` if the actor doesn't manage it.
    pub async fn update_product(
        &self,
        actor: &CurrentUser,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, ShopError> {
        self.managed_product(actor, id).await?;
        Ok(self.products.update(id, input).await?)
    }

    /// Remove a product from its shop; past orders keep referring to it.
    ///
    /// # Errors
    ///
    /// Returns `ShopError::ProductNotFound` if the actor doesn't manage it.
    pub async fn archive_product(
        &self,
        actor: &CurrentUser,
        id: ProductId,
    ) -> Result<Product, ShopError> {
        let product = self.managed_product(actor, id).await?;
        self.products.archive(id).await?;
        tracing::info!(product_id = %id, shop_id = %product.shop_id, "Product archived");
        Ok(product)
    }
}
