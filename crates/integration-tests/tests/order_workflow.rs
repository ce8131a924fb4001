//! Order placement, cancellation and completion against `PostgreSQL`.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;

use shop_next_door_core::{OrderStatus, PaymentMethod, TransactionStatus, UserRole};
use shop_next_door_integration_tests::fixtures::{
    create_product, create_shop, create_user, order_count, place_order, stock_of, test_pool,
};
use shop_next_door_integration_tests::{TestApp, get};
use shop_next_door_marketplace::db::TransactionRepository;
use shop_next_door_marketplace::models::OrderLine;
use shop_next_door_marketplace::services::auth::AuthService;
use shop_next_door_marketplace::services::orders::{NewOrder, OrderError, OrderService};

#[tokio::test]
#[ignore = "requires SND_TEST_DATABASE_URL"]
async fn test_short_stock_rolls_back_whole_order() {
    let pool = test_pool().await;
    let vendor = create_user(&pool, UserRole::Vendor).await;
    let customer = create_user(&pool, UserRole::Customer).await;
    let shop = create_shop(&pool, &vendor).await;
    let plenty = create_product(&pool, &shop, 120, 5).await;
    let scarce = create_product(&pool, &shop, 80, 1).await;

    let result = OrderService::new(&pool)
        .place_order(
            &customer,
            &NewOrder {
                shop_id: shop.id,
                lines: vec![
                    OrderLine {
                        product_id: plenty.id,
                        quantity: 2,
                    },
                    OrderLine {
                        product_id: scarce.id,
                        quantity: 3,
                    },
                ],
                payment_method: PaymentMethod::Cod,
                phone: None,
                delivery_address: "Ngong Rd".to_owned(),
            },
        )
        .await;

    assert!(matches!(
        result,
        Err(OrderError::InsufficientStock { available: 1, .. })
    ));
    assert_eq!(stock_of(&pool, plenty.id).await, 5);
    assert_eq!(stock_of(&pool, scarce.id).await, 1);
    assert_eq!(order_count(&pool, &customer).await, 0);
}

#[tokio::test]
#[ignore = "requires SND_TEST_DATABASE_URL"]
async fn test_cancel_restocks_and_fails_pending_payment() {
    let pool = test_pool().await;
    let vendor = create_user(&pool, UserRole::Vendor).await;
    let customer = create_user(&pool, UserRole::Customer).await;
    let shop = create_shop(&pool, &vendor).await;
    let product = create_product(&pool, &shop, 250, 10).await;

    let placed = place_order(&pool, &customer, &product, 3, PaymentMethod::Mpesa).await;
    assert_eq!(stock_of(&pool, product.id).await, 7);

    let cancelled = OrderService::new(&pool)
        .update_status(&customer, placed.order.id, OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(stock_of(&pool, product.id).await, 10);

    let transaction = TransactionRepository::new(&pool)
        .get_by_order(placed.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Failed);
    assert_eq!(transaction.result_description.as_deref(), Some("order cancelled"));
}

#[tokio::test]
#[ignore = "requires SND_TEST_DATABASE_URL"]
async fn test_second_cancel_is_invalid_transition_and_keeps_stock() {
    let pool = test_pool().await;
    let vendor = create_user(&pool, UserRole::Vendor).await;
    let customer = create_user(&pool, UserRole::Customer).await;
    let shop = create_shop(&pool, &vendor).await;
    let product = create_product(&pool, &shop, 90, 4).await;

    let placed = place_order(&pool, &customer, &product, 2, PaymentMethod::Cod).await;
    let orders = OrderService::new(&pool);
    orders
        .update_status(&customer, placed.order.id, OrderStatus::Cancelled)
        .await
        .unwrap();

    let again = orders
        .update_status(&customer, placed.order.id, OrderStatus::Cancelled)
        .await;
    assert!(matches!(again, Err(OrderError::InvalidTransition { .. })));
    assert_eq!(stock_of(&pool, product.id).await, 4);
}

#[tokio::test]
#[ignore = "requires SND_TEST_DATABASE_URL"]
async fn test_completing_cash_order_settles_payment() {
    let pool = test_pool().await;
    let vendor = create_user(&pool, UserRole::Vendor).await;
    let customer = create_user(&pool, UserRole::Customer).await;
    let shop = create_shop(&pool, &vendor).await;
    let product = create_product(&pool, &shop, 400, 3).await;

    let placed = place_order(&pool, &customer, &product, 1, PaymentMethod::Cod).await;
    assert_eq!(placed.transaction.status, TransactionStatus::Pending);

    let orders = OrderService::new(&pool);
    orders
        .update_status(&vendor, placed.order.id, OrderStatus::Shipped)
        .await
        .unwrap();
    let completed = orders
        .update_status(&vendor, placed.order.id, OrderStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);

    let transaction = TransactionRepository::new(&pool)
        .get_by_order(placed.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Successful);
    assert_eq!(transaction.paid_amount, Some(placed.order.total));
    assert_eq!(stock_of(&pool, product.id).await, 2);
}

#[tokio::test]
#[ignore = "requires SND_TEST_DATABASE_URL"]
async fn test_demoted_vendor_loses_vendor_pages_in_open_session() {
    let pool = test_pool().await;
    let vendor = create_user(&pool, UserRole::Vendor).await;
    let app = TestApp::with_pool(pool.clone());
    let cookie = app.sign_in(&vendor).await;

    let response = app.send(get("/vendor", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    AuthService::new(&pool)
        .set_role(vendor.id, UserRole::Customer)
        .await
        .unwrap();

    let response = app.send(get("/vendor", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The refreshed role sticks to the session.
    let response = app.send(get("/dashboard", Some(&cookie))).await;
    assert!(response.status().is_redirection());
    assert_eq!(
        response.headers()["location"].to_str().unwrap(),
        "/account/orders"
    );
}
