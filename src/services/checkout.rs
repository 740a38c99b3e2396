use crate::{
    config::AppConfig,
    entities::{cart, lead, lead_item, Lead, LeadStatus, RelatedEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{deliver_all, Notification, NotificationKind, NotificationSink, Recipient},
    services::{
        cart::{cart_items, load_cart},
        customers::{find_or_create_customer, CustomerInput},
        delivery,
        leads::{lead_view, LeadView},
        staff,
    },
    tenancy::TenantId,
};
use chrono::{Datelike, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Customer details collected at checkout
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CheckoutInput {
    #[validate(length(min = 1, message = "phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub delivery_county: Option<String>,
    pub delivery_ward: Option<String>,
    pub delivery_address: Option<String>,
    /// Client-chosen key making resubmission of the same checkout a no-op
    pub idempotency_key: Option<String>,
}

pub fn format_lead_reference(year: i32, sequence: u32) -> String {
    format!("LEAD-{:04}-{:06}", year, sequence)
}

/// Sequence number of a reference issued in `year`, if it is one.
pub fn parse_lead_sequence(reference: &str, year: i32) -> Option<u32> {
    reference
        .strip_prefix(&format!("LEAD-{:04}-", year))
        .and_then(|seq| seq.parse().ok())
}

/// Highest sequence issued in `year` among `references`, compared numerically so a
/// seven-digit sequence still beats `999999`.
pub fn highest_lead_sequence<'a>(references: impl IntoIterator<Item = &'a str>, year: i32) -> u32 {
    references
        .into_iter()
        .filter_map(|reference| parse_lead_sequence(reference, year))
        .max()
        .unwrap_or(0)
}

/// Next free reference for `year`. Must run in the transaction that inserts the lead.
pub async fn next_lead_reference<C: ConnectionTrait>(
    conn: &C,
    year: i32,
) -> Result<String, ServiceError> {
    let issued = Lead::find()
        .filter(lead::Column::Reference.starts_with(&format!("LEAD-{:04}-", year)))
        .all(conn)
        .await?;
    let last = highest_lead_sequence(issued.iter().map(|l| l.reference.as_str()), year);
    Ok(format_lead_reference(year, last + 1))
}

/// Turns a cart into a lead. Inventory is not touched.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    notifier: Arc<dyn NotificationSink>,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        notifier: Arc<dyn NotificationSink>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            notifier,
            config,
        }
    }

    /// Submits the cart as a NEW lead with prices copied from the cart lines.
    ///
    /// Resubmitting a submitted cart with the same idempotency key returns the lead
    /// it produced; without a matching key it fails with `InvalidCartState`.
    #[instrument(skip(self, input), fields(phone = %input.phone))]
    pub async fn checkout(
        &self,
        cart_id: Uuid,
        input: CheckoutInput,
    ) -> Result<LeadView, ServiceError> {
        input.validate()?;
        let key = input
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let cart = load_cart(&txn, cart_id).await?;

        if cart.is_submitted {
            let previous = match (cart.lead_id, &key) {
                (Some(lead_id), Some(key)) => Lead::find_by_id(lead_id)
                    .one(&txn)
                    .await?
                    .filter(|lead| lead.checkout_key.as_deref() == Some(key.as_str())),
                _ => None,
            };
            return match previous {
                Some(lead) => {
                    info!(%cart_id, lead_id = %lead.id, "duplicate checkout ignored");
                    lead_view(&txn, lead.id).await
                }
                None => Err(ServiceError::InvalidCartState(format!(
                    "Cart {} has already been submitted",
                    cart_id
                ))),
            };
        }
        if cart.is_expired(now) {
            return Err(ServiceError::InvalidCartState(format!(
                "Cart {} has expired",
                cart_id
            )));
        }

        let items = cart_items(&txn, cart_id).await?;
        if items.is_empty() {
            return Err(ServiceError::InvalidCartState(format!(
                "Cart {} is empty",
                cart_id
            )));
        }

        let customer = find_or_create_customer(
            &txn,
            &CustomerInput {
                phone: input.phone.clone(),
                name: Some(input.name.clone()),
                email: input.email.clone(),
                delivery_address: input.delivery_address.clone(),
            },
        )
        .await?;

        let total_value: Decimal = items.iter().map(|item| item.line_total()).sum();
        let delivery_fee = match input.delivery_county.as_deref() {
            Some(county) => delivery::fee_for(&txn, county, input.delivery_ward.as_deref()).await?,
            None => Decimal::ZERO,
        };
        let reference = next_lead_reference(&txn, now.year()).await?;

        let lead = lead::ActiveModel {
            id: Set(Uuid::new_v4()),
            reference: Set(reference.clone()),
            brand_id: Set(cart.brand_id),
            customer_id: Set(customer.id),
            customer_name: Set(input.name.trim().to_string()),
            customer_phone: Set(customer.phone.clone()),
            customer_email: Set(input.email.clone()),
            delivery_county: Set(input.delivery_county.clone()),
            delivery_ward: Set(input.delivery_ward.clone()),
            delivery_address: Set(input.delivery_address.clone()),
            status: Set(LeadStatus::New),
            assigned_to: Set(None),
            total_value: Set(total_value),
            delivery_fee: Set(delivery_fee),
            checkout_key: Set(key),
            order_id: Set(None),
            expires_at: Set(Some(now + self.config.lead_ttl())),
            contacted_at: Set(None),
            converted_at: Set(None),
            closed_at: Set(None),
            submitted_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for item in &items {
            lead_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                lead_id: Set(lead.id),
                unit_id: Set(item.unit_id),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                promotion_id: Set(item.promotion_id),
                bundle_id: Set(item.bundle_id),
                bundle_group_id: Set(item.bundle_group_id),
            }
            .insert(&txn)
            .await?;
        }

        let mut submitted: cart::ActiveModel = cart.into();
        submitted.is_submitted = Set(true);
        submitted.lead_id = Set(Some(lead.id));
        submitted.customer_id = Set(Some(customer.id));
        submitted.customer_phone = Set(Some(customer.phone.clone()));
        submitted.updated_at = Set(now);
        let cart = submitted.update(&txn).await?;

        let salespeople = staff::salespeople_for(&txn, cart.brand_id.map(TenantId)).await?;
        let view = lead_view(&txn, lead.id).await?;
        txn.commit().await?;

        counter!("stockroom.checkout.leads_created", 1);
        info!(lead_id = %lead.id, %reference, total = %total_value, "lead created from cart");
        self.event_sender
            .send_or_log(Event::LeadCreated {
                lead_id: lead.id,
                reference: reference.clone(),
            })
            .await;
        let batch = salespeople
            .into_iter()
            .map(|salesperson| {
                Notification::new(
                    Recipient::Staff(salesperson.id),
                    NotificationKind::NewLead,
                    format!("New lead {}", reference),
                    format!(
                        "{} is interested in {} item(s) worth {}",
                        lead.customer_name,
                        items.len(),
                        total_value
                    ),
                    RelatedEntity::Lead(lead.id),
                )
            })
            .collect();
        deliver_all(&*self.notifier, batch).await;

        Ok(view)
    }
}
