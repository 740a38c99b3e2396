mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{checkout_input, TestApp};
use rust_decimal_macros::dec;
use stockroom_api::{
    entities::{Actor, LeadStatus, OrderStatus, PaymentStatus, ProductType, SaleStatus},
    errors::ServiceError,
    services::{
        customers::CustomerInput,
        orders::{OrderView, WalkInLine, WalkInOrderInput},
        payments::{ProviderStatus, SettlementOutcome},
    },
};
use uuid::Uuid;

/// A pending walk-in order for one fresh unit, with a registered provider payment.
async fn pending_order(app: &TestApp, tracking_id: &str) -> (OrderView, Uuid) {
    let phone = app.product("Galaxy S24 FE", ProductType::Phone).await;
    let unit = app.unit(&phone, dec!(65000)).await;
    let salesperson = app.salesperson("Ngugi").await;
    let order = app
        .services
        .orders
        .create_walk_in_order(WalkInOrderInput {
            salesperson_id: salesperson.id,
            tenant: None,
            customer: CustomerInput {
                name: Some("Adhiambo".into()),
                ..CustomerInput::with_phone("0788000000")
            },
            lines: vec![WalkInLine {
                unit_id: unit.id,
                quantity: 1,
                promotion_id: None,
            }],
            idempotency_key: format!("walk-{}", tracking_id),
        })
        .await
        .unwrap();
    app.services
        .payments
        .register_payment(order.order.id, tracking_id, Some("card".into()))
        .await
        .unwrap();
    (order, unit.id)
}

#[tokio::test]
async fn amount_mismatch_leaves_the_order_pending() {
    let app = TestApp::new().await;
    let (order, unit_id) = pending_order(&app, "TRK-MISMATCH").await;

    let outcome = app
        .services
        .payments
        .apply_provider_status("TRK-MISMATCH", ProviderStatus::Success, Some(dec!(60000)))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SettlementOutcome::AmountMismatch {
            expected: dec!(65000),
            reported: dec!(60000),
        }
    );
    assert_eq!(
        app.services.orders.get_order(order.order.id).await.unwrap().order.status,
        OrderStatus::Pending
    );
    assert_eq!(app.unit_status(unit_id).await, SaleStatus::PendingPayment);
    let payments = app
        .services
        .payments
        .payments_for_order(order.order.id)
        .await
        .unwrap();
    assert_eq!(payments[0].status, PaymentStatus::Failed);
    assert_eq!(app.receipts.count_for(order.order.id), 0);
}

#[tokio::test]
async fn amount_within_tolerance_settles() {
    let app = TestApp::new().await;
    let (order, unit_id) = pending_order(&app, "TRK-TOL").await;

    let outcome = app
        .services
        .payments
        .apply_provider_status("trk-tol", ProviderStatus::Success, Some(dec!(65000.01)))
        .await;
    // tracking ids are matched exactly
    assert_matches!(outcome, Err(ServiceError::NotFound(_)));

    let outcome = app
        .services
        .payments
        .apply_provider_status("TRK-TOL", ProviderStatus::Success, Some(dec!(65000.01)))
        .await
        .unwrap();
    assert_eq!(outcome, SettlementOutcome::Settled);
    assert_eq!(app.unit_status(unit_id).await, SaleStatus::Sold);
    assert_eq!(app.receipts.count_for(order.order.id), 1);
}

#[tokio::test]
async fn failed_payment_releases_units_once() {
    let app = TestApp::new().await;
    let (order, unit_id) = pending_order(&app, "TRK-FAIL").await;

    let outcome = app
        .services
        .payments
        .apply_provider_status("TRK-FAIL", ProviderStatus::Failed, None)
        .await
        .unwrap();
    assert_eq!(outcome, SettlementOutcome::Released);
    assert_eq!(app.unit_status(unit_id).await, SaleStatus::Available);
    assert_eq!(
        app.services.orders.get_order(order.order.id).await.unwrap().order.status,
        OrderStatus::Canceled
    );

    let again = app
        .services
        .payments
        .apply_provider_status("TRK-FAIL", ProviderStatus::Expired, None)
        .await
        .unwrap();
    assert_eq!(again, SettlementOutcome::AlreadyReleased);

    // a success arriving after the release is logged and ignored
    let late = app
        .services
        .payments
        .apply_provider_status("TRK-FAIL", ProviderStatus::Success, Some(dec!(65000)))
        .await
        .unwrap();
    assert_eq!(late, SettlementOutcome::LateSuccessIgnored);
    assert_eq!(app.unit_status(unit_id).await, SaleStatus::Available);
    assert_eq!(app.receipts.count_for(order.order.id), 0);
}

#[tokio::test]
async fn failure_after_payment_keeps_the_sale() {
    let app = TestApp::new().await;
    let (order, unit_id) = pending_order(&app, "TRK-PAID").await;
    app.services
        .payments
        .apply_provider_status("TRK-PAID", ProviderStatus::Success, None)
        .await
        .unwrap();

    let outcome = app
        .services
        .payments
        .apply_provider_status("TRK-PAID", ProviderStatus::Canceled, None)
        .await
        .unwrap();
    assert_eq!(outcome, SettlementOutcome::AlreadySettled);
    assert_eq!(app.unit_status(unit_id).await, SaleStatus::Sold);
    assert_eq!(
        app.services.orders.get_order(order.order.id).await.unwrap().order.status,
        OrderStatus::Paid
    );
}

#[tokio::test]
async fn pending_report_changes_nothing() {
    let app = TestApp::new().await;
    let (order, unit_id) = pending_order(&app, "TRK-WAIT").await;

    let outcome = app
        .services
        .payments
        .apply_provider_status("TRK-WAIT", ProviderStatus::Pending, None)
        .await
        .unwrap();
    assert_eq!(outcome, SettlementOutcome::StillPending);
    assert_eq!(app.unit_status(unit_id).await, SaleStatus::PendingPayment);
    let payments = app
        .services
        .payments
        .payments_for_order(order.order.id)
        .await
        .unwrap();
    assert_eq!(payments[0].callback_count, 1);
    assert!(payments[0].last_callback_at.is_some());
}

#[tokio::test]
async fn tracking_id_maps_to_one_order() {
    let app = TestApp::new().await;
    let (first, _) = pending_order(&app, "TRK-ONE").await;
    let (second, _) = pending_order(&app, "TRK-TWO").await;

    let again = app
        .services
        .payments
        .register_payment(first.order.id, "TRK-ONE", None)
        .await
        .unwrap();
    assert_eq!(again.order_id, first.order.id);
    assert_matches!(
        app.services
            .payments
            .register_payment(second.order.id, "TRK-ONE", None)
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn canceled_order_cannot_take_cash() {
    let app = TestApp::new().await;
    let (order, _) = pending_order(&app, "TRK-CASH").await;
    let manager = app.manager("Kinyua").await;
    app.services
        .orders
        .cancel_order(order.order.id, Actor::Staff(manager.id))
        .await
        .unwrap();

    assert_matches!(
        app.services
            .payments
            .confirm_cash_payment(order.order.id, manager.id)
            .await,
        Err(ServiceError::InvalidTransition(_))
    );
    let payments = app
        .services
        .payments
        .payments_for_order(order.order.id)
        .await
        .unwrap();
    assert_eq!(payments[0].status, PaymentStatus::Failed);
}

#[tokio::test]
async fn sweep_expires_unpaid_orders_and_stale_leads() {
    let app = TestApp::new().await;
    let (order, unit_id) = pending_order(&app, "TRK-SWEEP").await;

    let phone = app.product("Pixel 9", ProductType::Phone).await;
    let unit = app.unit(&phone, dec!(95000)).await;
    let cart = app
        .services
        .cart
        .get_or_create_cart(None, Some("sweep".into()), None)
        .await
        .unwrap();
    app.services.cart.add_item(cart.id, unit.id, 1, None).await.unwrap();
    let lead = app
        .services
        .checkout
        .checkout(cart.id, checkout_input("0777000000", "Kendi"))
        .await
        .unwrap();

    let report = app
        .services
        .sweeps
        .run(Utc::now() + Duration::days(4))
        .await
        .unwrap();
    assert_eq!(report.orders_expired, 1);
    assert_eq!(report.leads_expired, 1);
    assert_eq!(report.failures, 0);

    assert_eq!(
        app.services.orders.get_order(order.order.id).await.unwrap().order.status,
        OrderStatus::Canceled
    );
    assert_eq!(app.unit_status(unit_id).await, SaleStatus::Available);
    assert_eq!(
        app.services.leads.get_lead(lead.lead.id).await.unwrap().lead.status,
        LeadStatus::Expired
    );
    // the lead's cart lingers until the grace period passes
    assert_eq!(report.stale_carts_deleted, 0);
    app.services.cart.get_cart(cart.id).await.unwrap();

    let later = app
        .services
        .sweeps
        .run(Utc::now() + Duration::days(12))
        .await
        .unwrap();
    assert_eq!(later.stale_carts_deleted, 1);
    assert_matches!(
        app.services.cart.get_cart(cart.id).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn sweep_deletes_abandoned_carts() {
    let app = TestApp::new().await;
    let abandoned = app
        .services
        .cart
        .get_or_create_cart(None, Some("abandoned".into()), None)
        .await
        .unwrap();

    let report = app
        .services
        .sweeps
        .run(Utc::now() + Duration::hours(12))
        .await
        .unwrap();
    assert_eq!(report.carts_deleted, 0);

    let report = app
        .services
        .sweeps
        .run(Utc::now() + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(report.carts_deleted, 1);
    assert_eq!(report.total_changes(), 1);
    assert_matches!(
        app.services.cart.get_cart(abandoned.id).await,
        Err(ServiceError::NotFound(_))
    );
}
