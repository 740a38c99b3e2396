use crate::{
    entities::{
        order, order_item, payment, Actor, Order, OrderItem, OrderItemModel, OrderModel,
        OrderSource, OrderStatus, Payment, PaymentStatus, Promotion, RelatedEntity, SaleStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{deliver_all, Notification, NotificationKind, NotificationSink, Recipient},
    services::{
        customers::{find_or_create_customer, CustomerInput},
        ledger::{as_unavailable, InventoryLedger, Transition},
        load_unit_with_product, pricing, staff,
    },
    tenancy::{tenant_may_see, TenantId},
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

pub(crate) struct NewOrderLine {
    pub unit_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub bundle_id: Option<Uuid>,
    pub bundle_group_id: Option<Uuid>,
}

pub(crate) struct NewOrder {
    pub brand_id: Option<Uuid>,
    pub customer_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub source: OrderSource,
    pub total_amount: Decimal,
    pub delivery_fee: Decimal,
    pub idempotency_key: String,
    pub lines: Vec<NewOrderLine>,
}

/// Inserts a Pending order and its lines. Units are not touched.
pub(crate) async fn insert_order<C: ConnectionTrait>(
    conn: &C,
    new: NewOrder,
) -> Result<OrderModel, ServiceError> {
    let now = Utc::now();
    let order = order::ActiveModel {
        id: Set(Uuid::new_v4()),
        brand_id: Set(new.brand_id),
        customer_id: Set(new.customer_id),
        lead_id: Set(new.lead_id),
        created_by: Set(new.created_by),
        source: Set(new.source),
        status: Set(OrderStatus::Pending),
        total_amount: Set(new.total_amount),
        delivery_fee: Set(new.delivery_fee),
        idempotency_key: Set(new.idempotency_key),
        paid_at: Set(None),
        delivered_at: Set(None),
        canceled_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    for line in new.lines {
        order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            unit_id: Set(Some(line.unit_id)),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            bundle_id: Set(line.bundle_id),
            bundle_group_id: Set(line.bundle_group_id),
        }
        .insert(conn)
        .await?;
    }
    Ok(order)
}

pub(crate) async fn load_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<OrderModel, ServiceError> {
    Order::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

pub(crate) async fn order_view<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<OrderView, ServiceError> {
    let order = load_order(conn, order_id).await?;
    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(conn)
        .await?;
    Ok(OrderView { order, items })
}

/// Quantity per unit across the order's lines, first-seen order.
async fn order_quantities<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<(Uuid, i32)>, ServiceError> {
    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(conn)
        .await?;
    Ok(quantities_by_unit(
        items
            .iter()
            .filter_map(|item| item.unit_id.map(|unit_id| (unit_id, item.quantity))),
    ))
}

/// Sums quantities of lines pointing at the same unit.
pub(crate) fn quantities_by_unit(lines: impl Iterator<Item = (Uuid, i32)>) -> Vec<(Uuid, i32)> {
    let mut merged: Vec<(Uuid, i32)> = Vec::new();
    for (unit_id, quantity) in lines {
        match merged.iter_mut().find(|(id, _)| *id == unit_id) {
            Some((_, total)) => *total += quantity,
            None => merged.push((unit_id, quantity)),
        }
    }
    merged
}

/// Takes stock for a new order: serialized units move AVAILABLE -> PENDING_PAYMENT,
/// bulk lines stay AVAILABLE with the ordered pieces held.
///
/// Fails with `UnitUnavailable` on the first unit that cannot be taken; the caller
/// drops its transaction so nothing sticks.
pub(crate) async fn hold_order_stock<C: ConnectionTrait>(
    conn: &C,
    quantities: &[(Uuid, i32)],
    actor: Actor,
    reason: &str,
) -> Result<Vec<Transition>, ServiceError> {
    let mut transitions = Vec::new();
    for (unit_id, quantity) in quantities {
        let (_, product) = load_unit_with_product(conn, *unit_id).await?;
        if product.product_type.is_serialized() {
            let transition = InventoryLedger::transition(
                conn,
                *unit_id,
                &[SaleStatus::Available],
                SaleStatus::PendingPayment,
                actor,
                reason,
            )
            .await
            .map_err(as_unavailable)?;
            transitions.push(transition);
        } else {
            InventoryLedger::hold_quantity(conn, *unit_id, *quantity).await?;
        }
    }
    Ok(transitions)
}

/// Compare-and-swap on the order status. `false` means another writer got there first.
async fn swap_order_status<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
    stamp: order::Column,
    at: DateTime<Utc>,
) -> Result<bool, ServiceError> {
    let result = Order::update_many()
        .col_expr(order::Column::Status, Expr::value(to))
        .col_expr(stamp, Expr::value(Some(at)))
        .col_expr(order::Column::UpdatedAt, Expr::value(at))
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::Status.eq(from))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Pending -> Paid. Serialized units go PENDING_PAYMENT -> SOLD; bulk lines give up
/// their held pieces and go SOLD once none are left.
///
/// Returns `None` if the order had already left Pending.
pub(crate) async fn settle_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    actor: Actor,
) -> Result<Option<Vec<Transition>>, ServiceError> {
    let now = Utc::now();
    if !swap_order_status(
        conn,
        order_id,
        OrderStatus::Pending,
        OrderStatus::Paid,
        order::Column::PaidAt,
        now,
    )
    .await?
    {
        return Ok(None);
    }
    let reason = format!("order {} paid", order_id);
    let mut transitions = Vec::new();
    for (unit_id, quantity) in order_quantities(conn, order_id).await? {
        let (_, product) = load_unit_with_product(conn, unit_id).await?;
        if product.product_type.is_serialized() {
            transitions.push(
                InventoryLedger::transition(
                    conn,
                    unit_id,
                    &[SaleStatus::PendingPayment],
                    SaleStatus::Sold,
                    actor,
                    &reason,
                )
                .await?,
            );
        } else if let Some(sold_out) =
            InventoryLedger::sell_quantity(conn, unit_id, quantity, actor, &reason).await?
        {
            transitions.push(sold_out);
        }
    }
    Ok(Some(transitions))
}

/// Pending -> Canceled, returning held units to AVAILABLE and failing open payments.
///
/// Returns `None` if the order had already left Pending.
pub(crate) async fn release_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    actor: Actor,
    reason: &str,
) -> Result<Option<Vec<Transition>>, ServiceError> {
    let now = Utc::now();
    if !swap_order_status(
        conn,
        order_id,
        OrderStatus::Pending,
        OrderStatus::Canceled,
        order::Column::CanceledAt,
        now,
    )
    .await?
    {
        return Ok(None);
    }

    let mut transitions = Vec::new();
    for (unit_id, quantity) in order_quantities(conn, order_id).await? {
        let (unit, product) = load_unit_with_product(conn, unit_id).await?;
        if !product.product_type.is_serialized() {
            if !InventoryLedger::release_quantity(conn, unit_id, quantity).await? {
                warn!(%unit_id, quantity, %order_id, "bulk pieces not held by order, skipping release");
            }
            continue;
        }
        if unit.sale_status != SaleStatus::PendingPayment {
            warn!(unit_id = %unit.id, status = %unit.sale_status, %order_id, "unit not held by order, skipping release");
            continue;
        }
        transitions.push(
            InventoryLedger::transition(
                conn,
                unit.id,
                &[SaleStatus::PendingPayment],
                SaleStatus::Available,
                actor,
                reason,
            )
            .await?,
        );
    }

    Payment::update_many()
        .col_expr(payment::Column::Status, Expr::value(PaymentStatus::Failed))
        .col_expr(payment::Column::UpdatedAt, Expr::value(now))
        .filter(payment::Column::OrderId.eq(order_id))
        .filter(payment::Column::Status.eq(PaymentStatus::Pending))
        .exec(conn)
        .await?;
    Ok(Some(transitions))
}

/// One line of a walk-in sale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkInLine {
    pub unit_id: Uuid,
    pub quantity: i32,
    pub promotion_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkInOrderInput {
    pub salesperson_id: Uuid,
    pub tenant: Option<TenantId>,
    pub customer: CustomerInput,
    pub lines: Vec<WalkInLine>,
    pub idempotency_key: String,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    notifier: Arc<dyn NotificationSink>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            db,
            event_sender,
            notifier,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderView, ServiceError> {
        order_view(&*self.db, order_id).await
    }

    /// Records an in-store sale. Serialized units move AVAILABLE -> PENDING_PAYMENT and
    /// bulk pieces are held until the order is paid or released.
    #[instrument(skip(self, input), fields(salesperson_id = %input.salesperson_id))]
    pub async fn create_walk_in_order(
        &self,
        input: WalkInOrderInput,
    ) -> Result<OrderView, ServiceError> {
        let key = input.idempotency_key.trim().to_string();
        if key.is_empty() {
            return Err(ServiceError::ValidationError(
                "An idempotency key is required for walk-in orders".to_string(),
            ));
        }
        if input.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "A walk-in order needs at least one item".to_string(),
            ));
        }
        if input
            .customer
            .name
            .as_deref()
            .map_or(true, |name| name.trim().is_empty())
        {
            return Err(ServiceError::ValidationError(
                "Customer name is required for walk-in orders".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        if let Some(existing) = Order::find()
            .filter(order::Column::IdempotencyKey.eq(key.as_str()))
            .one(&txn)
            .await?
        {
            info!(order_id = %existing.id, "duplicate walk-in order ignored");
            return order_view(&txn, existing.id).await;
        }
        staff::require_salesperson(&txn, input.salesperson_id).await?;
        let customer = find_or_create_customer(&txn, &input.customer).await?;

        let now = Utc::now();
        let mut lines = Vec::with_capacity(input.lines.len());
        for line in &input.lines {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity must be at least 1, got {}",
                    line.quantity
                )));
            }
            let (unit, product) = load_unit_with_product(&txn, line.unit_id).await?;
            if product.product_type.is_serialized() && line.quantity != 1 {
                return Err(ServiceError::ValidationError(format!(
                    "{} units are unique; quantity must be 1",
                    product.name
                )));
            }
            if !tenant_may_see(&unit, &product, input.tenant)
                || line.quantity > unit.available_quantity()
            {
                return Err(ServiceError::UnitUnavailable(format!(
                    "{} (unit {}) is not available for this sale",
                    product.name, unit.id
                )));
            }
            let promotion = match line.promotion_id {
                Some(id) => Promotion::find_by_id(id).one(&txn).await?.filter(|promo| {
                    promo.brand_id.is_none() || promo.brand_id == input.tenant.map(|t| t.as_uuid())
                }),
                None => None,
            };
            lines.push(NewOrderLine {
                unit_id: unit.id,
                quantity: line.quantity,
                unit_price: pricing::price_unit(&unit, &product, promotion.as_ref(), now),
                bundle_id: None,
                bundle_group_id: None,
            });
        }
        let total_amount = lines
            .iter()
            .map(|line| line.unit_price * Decimal::from(line.quantity))
            .sum();
        let quantities = quantities_by_unit(lines.iter().map(|line| (line.unit_id, line.quantity)));

        let order = insert_order(
            &txn,
            NewOrder {
                brand_id: input.tenant.map(|t| t.as_uuid()),
                customer_id: customer.id,
                lead_id: None,
                created_by: Some(input.salesperson_id),
                source: OrderSource::WalkIn,
                total_amount,
                delivery_fee: Decimal::ZERO,
                idempotency_key: key,
                lines,
            },
        )
        .await?;
        let transitions = hold_order_stock(
            &txn,
            &quantities,
            Actor::Staff(input.salesperson_id),
            "walk-in sale",
        )
        .await?;
        let managers = staff::approvers(&txn).await?;
        let view = order_view(&txn, order.id).await?;
        txn.commit().await?;

        info!(order_id = %order.id, total = %order.total_amount, "walk-in order created");
        let mut events: Vec<Event> = transitions.iter().map(Transition::event).collect();
        events.push(Event::OrderCreated(order.id));
        self.event_sender.send_all(events).await;
        let batch = managers
            .into_iter()
            .map(|manager| {
                Notification::new(
                    Recipient::Staff(manager.id),
                    NotificationKind::OrderCreated,
                    "New walk-in order",
                    format!("Walk-in order for {} awaiting payment", order.total_amount),
                    RelatedEntity::Order(order.id),
                )
            })
            .collect();
        deliver_all(&*self.notifier, batch).await;

        Ok(view)
    }

    /// Pending -> Canceled, releasing units. Canceling twice is a no-op; a paid or
    /// delivered order cannot be canceled.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: Uuid, actor: Actor) -> Result<OrderView, ServiceError> {
        let txn = self.db.begin().await?;
        let order = load_order(&txn, order_id).await?;
        match order.status {
            OrderStatus::Canceled => return order_view(&txn, order_id).await,
            OrderStatus::Paid | OrderStatus::Delivered => {
                return Err(ServiceError::InvalidTransition(format!(
                    "Order {} is {:?} and cannot be canceled",
                    order_id, order.status
                )))
            }
            OrderStatus::Pending => {}
        }

        let transitions = release_order(&txn, order_id, actor, "order canceled")
            .await?
            .unwrap_or_default();
        let view = order_view(&txn, order_id).await?;
        txn.commit().await?;

        info!(%order_id, %actor, released = transitions.len(), "order canceled");
        let mut events: Vec<Event> = transitions.iter().map(Transition::event).collect();
        events.push(Event::OrderCanceled(order_id));
        self.event_sender.send_all(events).await;
        Ok(view)
    }

    /// Paid -> Delivered. Delivering twice is a no-op.
    #[instrument(skip(self))]
    pub async fn mark_delivered(&self, order_id: Uuid, staff_id: Uuid) -> Result<OrderView, ServiceError> {
        let txn = self.db.begin().await?;
        let member = staff::find_staff(&txn, staff_id).await?;
        if !member.is_active {
            return Err(ServiceError::Forbidden(format!(
                "{} is not an active staff member",
                member.name
            )));
        }
        let order = load_order(&txn, order_id).await?;
        match order.status {
            OrderStatus::Delivered => return order_view(&txn, order_id).await,
            OrderStatus::Paid => {}
            other => {
                return Err(ServiceError::InvalidTransition(format!(
                    "Order {} is {:?}; only paid orders can be delivered",
                    order_id, other
                )))
            }
        }
        swap_order_status(
            &txn,
            order_id,
            OrderStatus::Paid,
            OrderStatus::Delivered,
            order::Column::DeliveredAt,
            Utc::now(),
        )
        .await?;
        let view = order_view(&txn, order_id).await?;
        txn.commit().await?;

        info!(%order_id, "order delivered");
        self.event_sender
            .send_or_log(Event::OrderDelivered(order_id))
            .await;
        Ok(view)
    }

    /// Pending orders created before `as_of - window`.
    pub async fn unpaid_order_ids(
        &self,
        as_of: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<Uuid>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::CreatedAt.lt(as_of - window))
            .order_by_asc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|o| o.id)
            .collect())
    }

    /// Releases an order whose payment window lapsed, as a provider expiry would.
    #[instrument(skip(self))]
    pub async fn expire_unpaid_order(&self, order_id: Uuid) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;
        let Some(transitions) =
            release_order(&txn, order_id, Actor::System, "payment window expired").await?
        else {
            return Ok(false);
        };
        txn.commit().await?;

        info!(%order_id, released = transitions.len(), "unpaid order expired");
        let mut events: Vec<Event> = transitions.iter().map(Transition::event).collect();
        events.push(Event::OrderCanceled(order_id));
        self.event_sender.send_all(events).await;
        Ok(true)
    }
}
