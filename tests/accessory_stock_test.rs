mod common;

use assert_matches::assert_matches;
use common::{checkout_input, TestApp};
use rust_decimal_macros::dec;
use stockroom_api::{
    entities::{Actor, OrderStatus, ProductType, SaleStatus},
    errors::ServiceError,
    services::{
        customers::CustomerInput,
        orders::{WalkInLine, WalkInOrderInput},
        payments::{ProviderStatus, SettlementOutcome},
    },
    tenancy::BrandScope,
};
use uuid::Uuid;

fn counter_sale(salesperson_id: Uuid, unit_id: Uuid, quantity: i32, key: &str) -> WalkInOrderInput {
    WalkInOrderInput {
        salesperson_id,
        tenant: None,
        customer: CustomerInput {
            name: Some("Mwangi".into()),
            ..CustomerInput::with_phone("0733000111")
        },
        lines: vec![WalkInLine {
            unit_id,
            quantity,
            promotion_id: None,
        }],
        idempotency_key: key.to_string(),
    }
}

#[tokio::test]
async fn online_order_holds_only_the_ordered_pieces() {
    let app = TestApp::new().await;
    let cable = app.product("USB-C cable", ProductType::Accessory).await;
    let stock = app
        .unit_with(&cable, dec!(700), 10, BrandScope::unrestricted())
        .await;
    let salesperson = app.salesperson("Kerubo").await;

    let cart = app
        .services
        .cart
        .get_or_create_cart(None, Some("two-cables".into()), None)
        .await
        .unwrap();
    app.services.cart.add_item(cart.id, stock.id, 2, None).await.unwrap();
    let lead = app
        .services
        .checkout
        .checkout(cart.id, checkout_input("0711222333", "Atieno"))
        .await
        .unwrap();
    app.services
        .leads
        .mark_contacted(lead.lead.id, salesperson.id)
        .await
        .unwrap();
    let order = app
        .services
        .leads
        .convert_lead(lead.lead.id, salesperson.id, "cables-1")
        .await
        .unwrap();
    assert_eq!(order.order.total_amount, dec!(1400));

    let line = app.reload_unit(stock.id).await;
    assert_eq!(line.sale_status, SaleStatus::Available);
    assert_eq!(line.quantity, 10);
    assert_eq!(line.held_quantity, 2);

    // the other eight pieces are still on sale
    let other = app
        .services
        .cart
        .get_or_create_cart(None, Some("eight-cables".into()), None)
        .await
        .unwrap();
    assert_matches!(
        app.services.cart.add_item(other.id, stock.id, 9, None).await,
        Err(ServiceError::UnitUnavailable(_))
    );
    app.services.cart.add_item(other.id, stock.id, 8, None).await.unwrap();

    app.services
        .payments
        .register_payment(order.order.id, "TRK-CABLE", None)
        .await
        .unwrap();
    let outcome = app
        .services
        .payments
        .apply_provider_status("TRK-CABLE", ProviderStatus::Success, None)
        .await
        .unwrap();
    assert_eq!(outcome, SettlementOutcome::Settled);

    let line = app.reload_unit(stock.id).await;
    assert_eq!(line.sale_status, SaleStatus::Available);
    assert_eq!(line.quantity, 8);
    assert_eq!(line.held_quantity, 0);
}

#[tokio::test]
async fn selling_the_last_pieces_marks_the_line_sold() {
    let app = TestApp::new().await;
    let charger = app.product("65W charger", ProductType::Accessory).await;
    let stock = app
        .unit_with(&charger, dec!(2500), 2, BrandScope::unrestricted())
        .await;
    let salesperson = app.salesperson("Odhiambo").await;
    let manager = app.manager("Wairimu").await;

    let order = app
        .services
        .orders
        .create_walk_in_order(counter_sale(salesperson.id, stock.id, 2, "chargers-1"))
        .await
        .unwrap();
    assert_eq!(order.order.total_amount, dec!(5000));
    assert_eq!(app.reload_unit(stock.id).await.held_quantity, 2);

    let outcome = app
        .services
        .payments
        .confirm_cash_payment(order.order.id, manager.id)
        .await
        .unwrap();
    assert_eq!(outcome, SettlementOutcome::Settled);

    let line = app.reload_unit(stock.id).await;
    assert_eq!(line.sale_status, SaleStatus::Sold);
    assert_eq!(line.quantity, 0);
    assert_eq!(line.held_quantity, 0);
}

#[tokio::test]
async fn canceled_order_frees_its_pieces() {
    let app = TestApp::new().await;
    let case = app.product("iPhone 15 case", ProductType::Accessory).await;
    let stock = app
        .unit_with(&case, dec!(1200), 5, BrandScope::unrestricted())
        .await;
    let salesperson = app.salesperson("Langat").await;
    let manager = app.manager("Mwende").await;

    let first = app
        .services
        .orders
        .create_walk_in_order(counter_sale(salesperson.id, stock.id, 3, "cases-1"))
        .await
        .unwrap();
    assert_matches!(
        app.services
            .orders
            .create_walk_in_order(counter_sale(salesperson.id, stock.id, 3, "cases-2"))
            .await,
        Err(ServiceError::UnitUnavailable(_))
    );

    let cancelled = app
        .services
        .orders
        .cancel_order(first.order.id, Actor::Staff(manager.id))
        .await
        .unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Canceled);
    let line = app.reload_unit(stock.id).await;
    assert_eq!(line.held_quantity, 0);
    assert_eq!(line.quantity, 5);

    app.services
        .orders
        .create_walk_in_order(counter_sale(salesperson.id, stock.id, 3, "cases-3"))
        .await
        .unwrap();
    assert_eq!(app.reload_unit(stock.id).await.held_quantity, 3);
}
