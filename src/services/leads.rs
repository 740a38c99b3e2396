use crate::{
    entities::{
        cart, lead, lead_item, order, Actor, Cart, Lead, LeadItem, LeadItemModel, LeadModel,
        LeadStatus, Order, OrderSource, RelatedEntity,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{deliver_all, Notification, NotificationKind, NotificationSink, Recipient},
    services::{
        cart::delete_cart,
        ledger::Transition,
        orders::{
            hold_order_stock, insert_order, order_view, quantities_by_unit, NewOrder,
            NewOrderLine, OrderView,
        },
        staff,
    },
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadView {
    pub lead: LeadModel,
    pub items: Vec<LeadItemModel>,
}

pub(crate) async fn load_lead<C: ConnectionTrait>(
    conn: &C,
    lead_id: Uuid,
) -> Result<LeadModel, ServiceError> {
    Lead::find_by_id(lead_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Lead {} not found", lead_id)))
}

pub(crate) async fn lead_view<C: ConnectionTrait>(
    conn: &C,
    lead_id: Uuid,
) -> Result<LeadView, ServiceError> {
    let lead = load_lead(conn, lead_id).await?;
    let items = LeadItem::find()
        .filter(lead_item::Column::LeadId.eq(lead_id))
        .all(conn)
        .await?;
    Ok(LeadView { lead, items })
}

/// Lead lifecycle: claim, contact, close, expire, and conversion to an order.
#[derive(Clone)]
pub struct LeadService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    notifier: Arc<dyn NotificationSink>,
}

impl LeadService {
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
    pub async fn get_lead(&self, lead_id: Uuid) -> Result<LeadView, ServiceError> {
        lead_view(&*self.db, lead_id).await
    }

    /// Assigns an open lead to a salesperson. Leads are pulled, never pushed.
    #[instrument(skip(self))]
    pub async fn claim_lead(
        &self,
        lead_id: Uuid,
        salesperson_id: Uuid,
    ) -> Result<LeadModel, ServiceError> {
        let txn = self.db.begin().await?;
        let lead = load_lead(&txn, lead_id).await?;
        if lead.assigned_to == Some(salesperson_id) {
            return Ok(lead);
        }
        let lead = self.assign(&txn, lead, salesperson_id).await?;
        txn.commit().await?;

        info!(%lead_id, %salesperson_id, "lead claimed");
        self.event_sender
            .send_or_log(Event::LeadClaimed {
                lead_id,
                salesperson: salesperson_id,
            })
            .await;
        Ok(lead)
    }

    /// NEW -> CONTACTED, claiming the lead first if nobody has.
    #[instrument(skip(self))]
    pub async fn mark_contacted(
        &self,
        lead_id: Uuid,
        salesperson_id: Uuid,
    ) -> Result<LeadModel, ServiceError> {
        let txn = self.db.begin().await?;
        let mut lead = load_lead(&txn, lead_id).await?;
        if lead.status == LeadStatus::Contacted && lead.assigned_to == Some(salesperson_id) {
            return Ok(lead);
        }
        if lead.status != LeadStatus::New {
            return Err(ServiceError::InvalidLeadState(format!(
                "Lead {} is {:?}; only new leads can be marked contacted",
                lead.reference, lead.status
            )));
        }
        let claimed = lead.assigned_to.is_none();
        if lead.assigned_to != Some(salesperson_id) {
            lead = self.assign(&txn, lead, salesperson_id).await?;
        }

        let now = Utc::now();
        let mut active: lead::ActiveModel = lead.into();
        active.status = Set(LeadStatus::Contacted);
        active.contacted_at = Set(Some(now));
        active.updated_at = Set(now);
        let lead = active.update(&txn).await?;
        txn.commit().await?;

        info!(%lead_id, %salesperson_id, "lead contacted");
        let mut events = Vec::new();
        if claimed {
            events.push(Event::LeadClaimed {
                lead_id,
                salesperson: salesperson_id,
            });
        }
        events.push(Event::LeadContacted(lead_id));
        self.event_sender.send_all(events).await;
        Ok(lead)
    }

    /// NEW or CONTACTED -> CLOSED without a sale. Closing a closed lead is a no-op.
    #[instrument(skip(self))]
    pub async fn close_lead(&self, lead_id: Uuid, actor: Actor) -> Result<LeadModel, ServiceError> {
        let txn = self.db.begin().await?;
        let lead = load_lead(&txn, lead_id).await?;
        if lead.status == LeadStatus::Closed {
            return Ok(lead);
        }
        if !lead.status.is_open() {
            return Err(ServiceError::InvalidLeadState(format!(
                "Lead {} is {:?} and cannot be closed",
                lead.reference, lead.status
            )));
        }

        let now = Utc::now();
        let mut active: lead::ActiveModel = lead.into();
        active.status = Set(LeadStatus::Closed);
        active.closed_at = Set(Some(now));
        active.updated_at = Set(now);
        let lead = active.update(&txn).await?;
        txn.commit().await?;

        info!(%lead_id, %actor, "lead closed");
        self.event_sender
            .send_or_log(Event::LeadClosed(lead_id))
            .await;
        Ok(lead)
    }

    /// NEW leads whose `expires_at` is before `as_of`.
    pub async fn stale_lead_ids(&self, as_of: DateTime<Utc>) -> Result<Vec<Uuid>, ServiceError> {
        Ok(Lead::find()
            .filter(lead::Column::Status.eq(LeadStatus::New))
            .filter(lead::Column::ExpiresAt.lt(as_of))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|l| l.id)
            .collect())
    }

    /// Marks one stale NEW lead EXPIRED. Returns `false` if it no longer qualifies.
    #[instrument(skip(self))]
    pub async fn expire_lead(&self, lead_id: Uuid, as_of: DateTime<Utc>) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;
        let lead = load_lead(&txn, lead_id).await?;
        let stale = lead.status == LeadStatus::New && lead.expires_at.is_some_and(|e| e < as_of);
        if !stale {
            return Ok(false);
        }
        let mut active: lead::ActiveModel = lead.into();
        active.status = Set(LeadStatus::Expired);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::LeadExpired(lead_id))
            .await;
        Ok(true)
    }

    /// Expires every stale NEW lead, one transaction each. Returns how many expired.
    #[instrument(skip(self))]
    pub async fn expire_stale_leads(&self, as_of: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut expired = 0;
        for lead_id in self.stale_lead_ids(as_of).await? {
            match self.expire_lead(lead_id, as_of).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => warn!(%lead_id, error = %e, "failed to expire lead"),
            }
        }
        Ok(expired)
    }

    /// Converts a CONTACTED lead into a Pending order, taking stock for every line:
    /// serialized units go AVAILABLE -> PENDING_PAYMENT and bulk pieces are held.
    /// All or nothing: if any unit was claimed elsewhere, nothing changes and the
    /// lead stays CONTACTED.
    ///
    /// A repeated `idempotency_key` for the same lead returns the order it created.
    #[instrument(skip(self))]
    pub async fn convert_lead(
        &self,
        lead_id: Uuid,
        staff_id: Uuid,
        idempotency_key: &str,
    ) -> Result<OrderView, ServiceError> {
        let key = idempotency_key.trim();
        if key.is_empty() {
            return Err(ServiceError::ValidationError(
                "An idempotency key is required to convert a lead".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        if let Some(existing) = Order::find()
            .filter(order::Column::IdempotencyKey.eq(key))
            .one(&txn)
            .await?
        {
            if existing.lead_id != Some(lead_id) {
                return Err(ServiceError::ValidationError(format!(
                    "Idempotency key {} already belongs to another order",
                    key
                )));
            }
            info!(%lead_id, order_id = %existing.id, "duplicate conversion ignored");
            return order_view(&txn, existing.id).await;
        }

        let member = staff::find_staff(&txn, staff_id).await?;
        if !member.is_active {
            return Err(ServiceError::Forbidden(format!(
                "{} is not an active staff member",
                member.name
            )));
        }
        let LeadView { lead, items } = lead_view(&txn, lead_id).await?;
        if lead.status != LeadStatus::Contacted {
            return Err(ServiceError::InvalidLeadState(format!(
                "Lead {} is {:?}; only contacted leads can be converted",
                lead.reference, lead.status
            )));
        }

        let actor = Actor::Staff(staff_id);
        let order = insert_order(
            &txn,
            NewOrder {
                brand_id: lead.brand_id,
                customer_id: lead.customer_id,
                lead_id: Some(lead.id),
                created_by: Some(staff_id),
                source: OrderSource::Online,
                total_amount: lead.total_value,
                delivery_fee: lead.delivery_fee,
                idempotency_key: key.to_string(),
                lines: items
                    .iter()
                    .map(|item| NewOrderLine {
                        unit_id: item.unit_id,
                        quantity: item.quantity,
                        unit_price: item.unit_price,
                        bundle_id: item.bundle_id,
                        bundle_group_id: item.bundle_group_id,
                    })
                    .collect(),
            },
        )
        .await?;

        let quantities = quantities_by_unit(items.iter().map(|item| (item.unit_id, item.quantity)));
        let transitions = hold_order_stock(
            &txn,
            &quantities,
            actor,
            &format!("lead {} converted", lead.reference),
        )
        .await?;

        let now = Utc::now();
        let customer_id = lead.customer_id;
        let reference = lead.reference.clone();
        let mut active: lead::ActiveModel = lead.into();
        active.status = Set(LeadStatus::Converted);
        active.converted_at = Set(Some(now));
        active.order_id = Set(Some(order.id));
        active.updated_at = Set(now);
        active.update(&txn).await?;

        let carts = Cart::find()
            .filter(cart::Column::LeadId.eq(lead_id))
            .all(&txn)
            .await?;
        for cart in carts {
            delete_cart(&txn, cart.id).await?;
        }

        let managers = staff::approvers(&txn).await?;
        let view = order_view(&txn, order.id).await?;
        txn.commit().await?;

        info!(%lead_id, order_id = %order.id, units = quantities.len(), "lead converted to order");
        let mut events: Vec<Event> = transitions.iter().map(Transition::event).collect();
        events.push(Event::LeadConverted {
            lead_id,
            order_id: order.id,
        });
        events.push(Event::OrderCreated(order.id));
        self.event_sender.send_all(events).await;

        let mut batch = vec![Notification::new(
            Recipient::Customer(customer_id),
            NotificationKind::OrderConfirmation,
            "Order confirmed",
            format!("Your order for {} is awaiting payment of {}", reference, order.amount_due()),
            RelatedEntity::Order(order.id),
        )];
        batch.extend(managers.into_iter().map(|manager| {
            Notification::new(
                Recipient::Staff(manager.id),
                NotificationKind::OrderCreated,
                "New order",
                format!("Lead {} was converted to an order", reference),
                RelatedEntity::Order(order.id),
            )
        }));
        deliver_all(&*self.notifier, batch).await;

        Ok(view)
    }

    async fn assign<C: ConnectionTrait>(
        &self,
        conn: &C,
        lead: LeadModel,
        salesperson_id: Uuid,
    ) -> Result<LeadModel, ServiceError> {
        let salesperson = staff::require_salesperson(conn, salesperson_id).await?;
        if !lead.status.is_open() {
            return Err(ServiceError::InvalidLeadState(format!(
                "Lead {} is {:?} and can no longer be claimed",
                lead.reference, lead.status
            )));
        }
        if let Some(holder) = lead.assigned_to {
            if holder != salesperson_id {
                return Err(ServiceError::InvalidLeadState(format!(
                    "Lead {} is already claimed by another salesperson",
                    lead.reference
                )));
            }
        }
        if let Some(brand) = lead.brand_id {
            if !salesperson.brands.0.contains(&brand) {
                return Err(ServiceError::Forbidden(format!(
                    "{} does not serve the storefront of lead {}",
                    salesperson.name, lead.reference
                )));
            }
        }

        let mut active: lead::ActiveModel = lead.into();
        active.assigned_to = Set(Some(salesperson_id));
        active.updated_at = Set(Utc::now());
        Ok(active.update(conn).await?)
    }
}
