//! Order workflow.
//!
//! Placing an order locks every product row, takes the stock and writes the
//! order, its items and its payment record in one database transaction.
//! Status changes lock the order row and keep stock and payment state in
//! step with the order.

mod error;

pub use error::OrderError;

use std::collections::HashMap;

use sqlx::PgPool;
use tracing::instrument;

use shop_next_door_core::{
    Money, OrderId, OrderStatus, PaymentMethod, PhoneNumber, ProductId, ShopId,
    TransactionStatus, UserId,
};

use crate::db::{OrderRepository, orders, products, shops, transactions};
use crate::models::{
    CurrentUser, Order, OrderDetail, OrderItem, OrderLine, OrderListing, PaymentOutcome,
    Transaction,
};

/// Largest quantity of one product in one order.
pub const MAX_LINE_QUANTITY: i32 = 1000;

/// Longest accepted delivery address.
const MAX_ADDRESS_LENGTH: usize = 500;

/// An order as submitted by a customer.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub shop_id: ShopId,
    pub lines: Vec<OrderLine>,
    pub payment_method: PaymentMethod,
    pub phone: Option<String>,
    pub delivery_address: String,
}

/// The rows written by a successful [`OrderService::place_order`].
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub transaction: Transaction,
}

/// Validate quantities and merge repeated products.
///
/// The result is sorted by product ID so concurrent orders lock rows in the
/// same order.
///
/// # Errors
///
/// Returns `OrderError::EmptyOrder` or `OrderError::InvalidQuantity`.
pub fn merge_lines(lines: &[OrderLine]) -> Result<Vec<OrderLine>, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyOrder);
    }

    let mut merged: HashMap<ProductId, i32> = HashMap::new();
    for line in lines {
        if !(1..=MAX_LINE_QUANTITY).contains(&line.quantity) {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            });
        }
        let quantity = merged.entry(line.product_id).or_insert(0);
        *quantity += line.quantity;
        if *quantity > MAX_LINE_QUANTITY {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id,
                quantity: *quantity,
            });
        }
    }

    let mut lines: Vec<OrderLine> = merged
        .into_iter()
        .map(|(product_id, quantity)| OrderLine {
            product_id,
            quantity,
        })
        .collect();
    lines.sort_by_key(|line| line.product_id);
    Ok(lines)
}

fn validate_address(address: &str) -> Result<String, OrderError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(OrderError::InvalidAddress("address is required".to_owned()));
    }
    if address.chars().count() > MAX_ADDRESS_LENGTH {
        return Err(OrderError::InvalidAddress(format!(
            "address must be at most {MAX_ADDRESS_LENGTH} characters"
        )));
    }
    Ok(address.to_owned())
}

fn payer_phone(
    method: PaymentMethod,
    phone: Option<&str>,
) -> Result<Option<PhoneNumber>, OrderError> {
    let phone = phone.map(str::trim).filter(|p| !p.is_empty());
    match (method.requires_phone(), phone) {
        (true, None) => Err(OrderError::PhoneRequired),
        (_, Some(raw)) => Ok(Some(PhoneNumber::parse(raw)?)),
        (false, None) => Ok(None),
    }
}

/// Whether `actor` may move `order` to `next`.
///
/// Admins may change any order and the shop's vendor their own orders. A
/// customer may only cancel their own order while it is still pending.
#[must_use]
pub fn may_update(
    actor: &CurrentUser,
    order: &Order,
    shop_vendor: UserId,
    next: OrderStatus,
) -> bool {
    actor.is_admin()
        || shop_vendor == actor.id
        || (order.customer_id == actor.id
            && order.status == OrderStatus::Pending
            && next == OrderStatus::Cancelled)
}

/// Check that `actor` may move `order` to `next`.
///
/// A step the lifecycle never allows is reported as such before asking
/// whether this actor could take it.
///
/// # Errors
///
/// Returns `OrderError::InvalidTransition` or `OrderError::Forbidden`.
pub fn authorize_update(
    actor: &CurrentUser,
    order: &Order,
    shop_vendor: UserId,
    next: OrderStatus,
) -> Result<(), OrderError> {
    if !order.status.can_transition_to(next) {
        return Err(OrderError::InvalidTransition {
            from: order.status,
            to: next,
        });
    }
    if !may_update(actor, order, shop_vendor, next) {
        return Err(OrderError::Forbidden);
    }
    Ok(())
}

/// Order service.
pub struct OrderService<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Place an order for `customer`.
    ///
    /// Prices come from the product rows, never from the request. Every
    /// write happens in one database transaction; on any error nothing is
    /// kept.
    ///
    /// # Errors
    ///
    /// Returns a validation error, `OrderError::InsufficientStock` when a
    /// product ran out, or `OrderError::Repository` if the database fails.
    #[instrument(
        skip(self, customer, new_order),
        fields(customer_id = %customer.id, shop_id = %new_order.shop_id, method = %new_order.payment_method)
    )]
    pub async fn place_order(
        &self,
        customer: &CurrentUser,
        new_order: &NewOrder,
    ) -> Result<PlacedOrder, OrderError> {
        let lines = merge_lines(&new_order.lines)?;
        let address = validate_address(&new_order.delivery_address)?;
        let phone = payer_phone(new_order.payment_method, new_order.phone.as_deref())?;

        let mut tx = self.pool.begin().await?;

        let shop = shops::lock_for_share(&mut tx, new_order.shop_id)
            .await?
            .ok_or(OrderError::ShopNotFound)?;
        if !shop.is_active() {
            return Err(OrderError::ShopInactive);
        }
        if shop.is_owned_by(customer.id) {
            return Err(OrderError::OwnShop);
        }

        let mut priced = Vec::with_capacity(lines.len());
        let mut total = Money::ZERO.amount();
        for line in &lines {
            let product = products::lock_for_update(&mut tx, line.product_id)
                .await?
                .filter(|p| p.shop_id == shop.id && !p.archived)
                .ok_or(OrderError::ProductUnavailable(line.product_id))?;

            if product.stock < line.quantity {
                return Err(OrderError::InsufficientStock {
                    product: product.name,
                    available: product.stock,
                });
            }

            let line_total = product
                .price
                .checked_mul(line.quantity)
                .ok_or(OrderError::TotalTooLarge)?;
            total = total
                .checked_add(line_total.amount())
                .ok_or(OrderError::TotalTooLarge)?;

            products::adjust_stock(&mut tx, product.id, -line.quantity).await?;
            priced.push((product, line.quantity));
        }
        let total = Money::new(total).map_err(|_| OrderError::TotalTooLarge)?;

        let order = orders::insert_order(&mut tx, customer.id, shop.id, total, &address).await?;

        let mut items = Vec::with_capacity(priced.len());
        for (product, quantity) in &priced {
            items.push(
                orders::insert_item(
                    &mut tx,
                    order.id,
                    product.id,
                    &product.name,
                    *quantity,
                    product.price,
                )
                .await?,
            );
        }

        let transaction = transactions::insert(
            &mut tx,
            order.id,
            new_order.payment_method,
            total,
            phone.as_ref(),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            total = %order.total,
            items = items.len(),
            "Order placed"
        );

        Ok(PlacedOrder {
            order,
            items,
            transaction,
        })
    }

    /// Move an order to `next`.
    ///
    /// Cancelling restocks every item and fails a pending payment.
    /// Completing a cash-on-delivery order settles its payment.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order doesn't exist or isn't
    /// visible to the actor, `OrderError::InvalidTransition` for a step the
    /// lifecycle doesn't allow, and `OrderError::Forbidden` if the actor may
    /// see the order but not make this change.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn update_status(
        &self,
        actor: &CurrentUser,
        order_id: OrderId,
        next: OrderStatus,
    ) -> Result<Order, OrderError> {
        let mut tx = self.pool.begin().await?;

        let order = orders::lock_for_update(&mut tx, order_id)
            .await?
            .ok_or(OrderError::NotFound)?;
        let shop = shops::lock_for_share(&mut tx, order.shop_id)
            .await?
            .ok_or(OrderError::NotFound)?;

        let involved =
            actor.is_admin() || shop.is_owned_by(actor.id) || order.customer_id == actor.id;
        if !involved {
            return Err(OrderError::NotFound);
        }
        authorize_update(actor, &order, shop.vendor_id, next)?;

        let updated = orders::set_status(&mut tx, order_id, next).await?;

        if next.releases_stock() {
            let mut items = orders::items(&mut tx, order_id).await?;
            items.sort_by_key(|item| item.product_id);
            for item in &items {
                products::adjust_stock(&mut tx, item.product_id, item.quantity).await?;
            }
        }

        if let Some(transaction) = transactions::lock_by_order(&mut tx, order_id).await? {
            let outcome = settlement_for(next, &transaction);
            if let Some(outcome) = outcome {
                transactions::apply_outcome(
                    &mut tx,
                    transaction.id,
                    TransactionStatus::Pending,
                    &outcome,
                )
                .await?;
                tracing::info!(
                    order_id = %order_id,
                    transaction_id = %transaction.id,
                    status = %outcome.status(),
                    "Payment settled by order status change"
                );
            }
        }

        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            from = %order.status,
            to = %next,
            "Order status updated"
        );

        Ok(updated)
    }

    /// An order's detail page, if `viewer` may see it.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order doesn't exist or belongs
    /// to someone else.
    pub async fn detail_for(
        &self,
        viewer: &CurrentUser,
        order_id: OrderId,
    ) -> Result<OrderDetail, OrderError> {
        let detail = OrderRepository::new(self.pool)
            .get_detail(order_id)
            .await?
            .ok_or(OrderError::NotFound)?;

        let visible = viewer.is_admin()
            || detail.order.customer_id == viewer.id
            || detail.vendor_id == viewer.id;
        if visible {
            Ok(detail)
        } else {
            Err(OrderError::NotFound)
        }
    }

    /// A customer's order history.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn history(&self, customer: &CurrentUser) -> Result<Vec<OrderListing>, OrderError> {
        Ok(OrderRepository::new(self.pool)
            .list_by_customer(customer.id)
            .await?)
    }

    /// Orders across a vendor's shops.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn vendor_orders(
        &self,
        vendor: &CurrentUser,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderListing>, OrderError> {
        Ok(OrderRepository::new(self.pool)
            .list_by_vendor(vendor.id, status)
            .await?)
    }

    /// Every order, one page at a time.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn all_orders(&self, page: u32) -> Result<Vec<OrderListing>, OrderError> {
        Ok(OrderRepository::new(self.pool).list_all(page).await?)
    }
}

/// The payment change an order status change implies, if any.
fn settlement_for(next: OrderStatus, transaction: &Transaction) -> Option<PaymentOutcome> {
    if transaction.status != TransactionStatus::Pending {
        return None;
    }
    match next {
        OrderStatus::Cancelled => Some(PaymentOutcome::failed("order cancelled")),
        OrderStatus::Completed if transaction.method == PaymentMethod::Cod => {
            Some(PaymentOutcome::Successful {
                receipt_number: None,
                paid_amount: Some(transaction.amount),
                phone: None,
                result_code: 0,
                description: "cash collected on delivery".to_owned(),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use shop_next_door_core::{Email, TransactionId, UserRole};

    use super::*;

    fn line(product: i32, quantity: i32) -> OrderLine {
        OrderLine {
            product_id: ProductId::new(product),
            quantity,
        }
    }

    fn user(id: i32, role: UserRole) -> CurrentUser {
        CurrentUser {
            id: UserId::new(id),
            email: Email::parse(&format!("user{id}@example.com")).unwrap(),
            name: format!("User {id}"),
            role,
        }
    }

    fn order(customer: i32, status: OrderStatus) -> Order {
        Order {
            id: OrderId::new(1),
            customer_id: UserId::new(customer),
            shop_id: ShopId::new(1),
            status,
            total: Money::from_shillings(500),
            delivery_address: "Moi Avenue, Nairobi".to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn transaction(method: PaymentMethod, status: TransactionStatus) -> Transaction {
        Transaction {
            id: TransactionId::new(1),
            order_id: OrderId::new(1),
            method,
            status,
            amount: Money::from_shillings(500),
            phone: None,
            merchant_request_id: None,
            checkout_request_id: None,
            mpesa_receipt_number: None,
            paid_amount: None,
            result_code: None,
            result_description: None,
            initiated_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_merge_lines_sums_duplicates_and_sorts() {
        let merged = merge_lines(&[line(5, 2), line(3, 1), line(5, 4)]).unwrap();
        assert_eq!(merged, vec![line(3, 1), line(5, 6)]);
    }

    #[test]
    fn test_merge_lines_rejects_empty_and_bad_quantities() {
        assert!(matches!(merge_lines(&[]), Err(OrderError::EmptyOrder)));
        assert!(matches!(
            merge_lines(&[line(1, 0)]),
            Err(OrderError::InvalidQuantity { quantity: 0, .. })
        ));
        assert!(matches!(
            merge_lines(&[line(1, -3)]),
            Err(OrderError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            merge_lines(&[line(1, 1001)]),
            Err(OrderError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_merge_lines_caps_merged_quantity() {
        assert!(merge_lines(&[line(1, 500), line(1, 500)]).is_ok());
        assert!(matches!(
            merge_lines(&[line(1, 600), line(1, 401)]),
            Err(OrderError::InvalidQuantity { quantity: 1001, .. })
        ));
    }

    #[test]
    fn test_validate_address() {
        assert_eq!(validate_address("  Kenyatta Ave ").unwrap(), "Kenyatta Ave");
        assert!(validate_address("   ").is_err());
        assert!(validate_address(&"x".repeat(501)).is_err());
    }

    #[test]
    fn test_payer_phone_required_for_mobile_money() {
        assert!(matches!(
            payer_phone(PaymentMethod::Mpesa, None),
            Err(OrderError::PhoneRequired)
        ));
        assert!(matches!(
            payer_phone(PaymentMethod::Airtel, Some("  ")),
            Err(OrderError::PhoneRequired)
        ));
        assert!(payer_phone(PaymentMethod::Cod, None).unwrap().is_none());
        assert_eq!(
            payer_phone(PaymentMethod::Mpesa, Some("0712345678"))
                .unwrap()
                .unwrap()
                .as_str(),
            "254712345678"
        );
        assert!(matches!(
            payer_phone(PaymentMethod::Mpesa, Some("12")),
            Err(OrderError::InvalidPhone(_))
        ));
    }

    #[test]
    fn test_customer_may_only_cancel_own_pending_order() {
        let customer = user(10, UserRole::Customer);
        let vendor = UserId::new(20);

        let own_pending = order(10, OrderStatus::Pending);
        let own_shipped = order(10, OrderStatus::Shipped);
        let someone_elses = order(11, OrderStatus::Pending);

        assert!(may_update(&customer, &own_pending, vendor, OrderStatus::Cancelled));
        assert!(!may_update(&customer, &own_pending, vendor, OrderStatus::Shipped));
        assert!(!may_update(&customer, &own_shipped, vendor, OrderStatus::Cancelled));
        assert!(!may_update(&customer, &someone_elses, vendor, OrderStatus::Cancelled));
    }

    #[test]
    fn test_vendor_and_admin_may_update() {
        let vendor = user(20, UserRole::Vendor);
        let other_vendor = user(21, UserRole::Vendor);
        let admin = user(1, UserRole::Admin);
        let pending = order(10, OrderStatus::Pending);

        assert!(may_update(&vendor, &pending, UserId::new(20), OrderStatus::Shipped));
        assert!(!may_update(&other_vendor, &pending, UserId::new(20), OrderStatus::Shipped));
        assert!(may_update(&admin, &pending, UserId::new(20), OrderStatus::Completed));
    }

    #[test]
    fn test_cancelling_cancelled_order_is_invalid_transition() {
        let customer = user(10, UserRole::Customer);
        let vendor = UserId::new(20);
        let cancelled = order(10, OrderStatus::Cancelled);

        assert!(matches!(
            authorize_update(&customer, &cancelled, vendor, OrderStatus::Cancelled),
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Cancelled,
                to: OrderStatus::Cancelled,
            })
        ));
        assert!(
            authorize_update(&customer, &order(10, OrderStatus::Pending), vendor, OrderStatus::Cancelled)
                .is_ok()
        );
        assert!(matches!(
            authorize_update(&customer, &order(11, OrderStatus::Pending), vendor, OrderStatus::Cancelled),
            Err(OrderError::Forbidden)
        ));
    }

    #[test]
    fn test_settlement_for_cancel_and_cod_completion() {
        let pending_mpesa = transaction(PaymentMethod::Mpesa, TransactionStatus::Pending);
        assert_eq!(
            settlement_for(OrderStatus::Cancelled, &pending_mpesa),
            Some(PaymentOutcome::failed("order cancelled"))
        );
        assert_eq!(settlement_for(OrderStatus::Completed, &pending_mpesa), None);

        let pending_cod = transaction(PaymentMethod::Cod, TransactionStatus::Pending);
        let outcome = settlement_for(OrderStatus::Completed, &pending_cod).unwrap();
        assert_eq!(outcome.status(), TransactionStatus::Successful);

        let paid = transaction(PaymentMethod::Mpesa, TransactionStatus::Successful);
        assert_eq!(settlement_for(OrderStatus::Cancelled, &paid), None);
        assert_eq!(settlement_for(OrderStatus::Shipped, &pending_cod), None);
    }
}
