// Pricing and the unit ledger
pub mod ledger;
pub mod pricing;

// Approval workflows
pub mod reservations;
pub mod returns;
pub mod staff;
pub mod transfers;

// Sales pipeline
pub mod cart;
pub mod checkout;
pub mod customers;
pub mod delivery;
pub mod leads;
pub mod orders;
pub mod payments;

// Background maintenance
pub mod sweeps;

use crate::{
    config::AppConfig,
    db::DbPool,
    entities::{InventoryUnit, InventoryUnitModel, Product, ProductModel},
    errors::ServiceError,
    events::EventSender,
    notifications::{NotificationSink, ReceiptDispatcher},
};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use uuid::Uuid;

/// Every service wired to one pool, event channel and set of outbound sinks.
#[derive(Clone)]
pub struct AppServices {
    pub reservations: Arc<reservations::ReservationService>,
    pub returns: Arc<returns::ReturnService>,
    pub transfers: Arc<transfers::TransferService>,
    pub customers: Arc<customers::CustomerService>,
    pub delivery: Arc<delivery::DeliveryService>,
    pub cart: Arc<cart::CartService>,
    pub checkout: Arc<checkout::CheckoutService>,
    pub leads: Arc<leads::LeadService>,
    pub orders: Arc<orders::OrderService>,
    pub payments: Arc<payments::PaymentService>,
    pub sweeps: Arc<sweeps::SweepService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
        notifier: Arc<dyn NotificationSink>,
        receipts: Arc<dyn ReceiptDispatcher>,
    ) -> Self {
        let reservations = Arc::new(reservations::ReservationService::new(
            db_pool.clone(),
            event_sender.clone(),
            notifier.clone(),
            config.clone(),
        ));
        let leads = Arc::new(leads::LeadService::new(
            db_pool.clone(),
            event_sender.clone(),
            notifier.clone(),
        ));
        let orders = Arc::new(orders::OrderService::new(
            db_pool.clone(),
            event_sender.clone(),
            notifier.clone(),
        ));
        let payments = Arc::new(payments::PaymentService::new(
            db_pool.clone(),
            event_sender.clone(),
            receipts,
            config.clone(),
        ));
        let sweeps = Arc::new(sweeps::SweepService::new(
            db_pool.clone(),
            config.clone(),
            reservations.clone(),
            leads.clone(),
            orders.clone(),
        ));

        Self {
            returns: Arc::new(returns::ReturnService::new(
                db_pool.clone(),
                event_sender.clone(),
                notifier.clone(),
            )),
            transfers: Arc::new(transfers::TransferService::new(
                db_pool.clone(),
                event_sender.clone(),
                notifier.clone(),
            )),
            customers: Arc::new(customers::CustomerService::new(db_pool.clone())),
            delivery: Arc::new(delivery::DeliveryService::new(db_pool.clone())),
            cart: Arc::new(cart::CartService::new(
                db_pool.clone(),
                event_sender.clone(),
                config.clone(),
            )),
            checkout: Arc::new(checkout::CheckoutService::new(
                db_pool,
                event_sender,
                notifier,
                config,
            )),
            reservations,
            leads,
            orders,
            payments,
            sweeps,
        }
    }
}

/// Drops repeated ids, keeping first-seen order.
pub(crate) fn dedupe_ids(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

/// Loads every unit in `ids`, failing with `NotFound` on the first missing one.
pub(crate) async fn load_units<C: ConnectionTrait>(
    conn: &C,
    ids: &[Uuid],
) -> Result<Vec<InventoryUnitModel>, ServiceError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let units = InventoryUnit::find()
        .filter(crate::entities::inventory_unit::Column::Id.is_in(ids.iter().copied()))
        .all(conn)
        .await?;
    if let Some(missing) = ids.iter().find(|id| !units.iter().any(|u| u.id == **id)) {
        return Err(ServiceError::NotFound(format!(
            "Inventory unit {} not found",
            missing
        )));
    }
    Ok(units)
}

pub(crate) async fn load_unit_with_product<C: ConnectionTrait>(
    conn: &C,
    unit_id: Uuid,
) -> Result<(InventoryUnitModel, ProductModel), ServiceError> {
    match InventoryUnit::find_by_id(unit_id)
        .find_also_related(Product)
        .one(conn)
        .await?
    {
        Some((unit, Some(product))) => Ok((unit, product)),
        Some((_, None)) => Err(ServiceError::InternalError(format!(
            "Inventory unit {} has no product",
            unit_id
        ))),
        None => Err(ServiceError::NotFound(format!(
            "Inventory unit {} not found",
            unit_id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keeps_first_occurrence_order() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(dedupe_ids(vec![b, a, b, c, a]), vec![b, a, c]);
    }
}
