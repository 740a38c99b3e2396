use crate::{
    config::AppConfig,
    entities::{
        bundle_item, cart, cart_item, inventory_unit, BundleItem, Bundle, Cart, CartItem,
        CartItemModel, CartModel, InventoryUnit, InventoryUnitModel, ProductModel, Promotion,
        SaleStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        load_unit_with_product,
        pricing::{self, BundleLine},
    },
    tenancy::{is_publicly_visible, TenantId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// A cart with its lines and the sum of their locked prices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartView {
    pub cart: CartModel,
    pub items: Vec<CartItemModel>,
    pub total: Decimal,
}

impl CartView {
    pub fn item_for_unit(&self, unit_id: Uuid) -> Option<&CartItemModel> {
        self.items.iter().find(|item| item.unit_id == unit_id)
    }
}

/// Shopping carts. Adding to a cart never reserves a unit; prices are locked per
/// line at insert time.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Returns the open cart for this phone or session within the tenant, creating
    /// one if needed. An expired cart found on the way is deleted.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(
        &self,
        tenant: Option<TenantId>,
        session_key: Option<String>,
        phone: Option<String>,
    ) -> Result<CartModel, ServiceError> {
        let session_key = session_key.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let phone = phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
        if session_key.is_none() && phone.is_none() {
            return Err(ServiceError::ValidationError(
                "A session key or phone number is required to open a cart".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();

        let mut found = None;
        if let Some(phone) = &phone {
            found = open_carts(tenant)
                .filter(cart::Column::CustomerPhone.eq(phone.as_str()))
                .order_by_desc(cart::Column::CreatedAt)
                .one(&txn)
                .await?;
        }
        if found.is_none() {
            if let Some(session_key) = &session_key {
                found = open_carts(tenant)
                    .filter(cart::Column::SessionKey.eq(session_key.as_str()))
                    .order_by_desc(cart::Column::CreatedAt)
                    .one(&txn)
                    .await?;
            }
        }

        if let Some(existing) = found {
            if !existing.is_expired(now) {
                let existing = if existing.customer_phone.is_none() && phone.is_some() {
                    let mut active: cart::ActiveModel = existing.into();
                    active.customer_phone = Set(phone);
                    active.updated_at = Set(now);
                    active.update(&txn).await?
                } else {
                    existing
                };
                txn.commit().await?;
                return Ok(existing);
            }
            info!(cart_id = %existing.id, "discarding expired cart");
            delete_cart(&txn, existing.id).await?;
        }

        let created = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            brand_id: Set(tenant.map(|t| t.as_uuid())),
            session_key: Set(session_key),
            customer_phone: Set(phone),
            customer_id: Set(None),
            is_submitted: Set(false),
            lead_id: Set(None),
            expires_at: Set(now + self.config.cart_ttl()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCreated(created.id))
            .await;
        info!(cart_id = %created.id, "cart created");
        Ok(created)
    }

    /// Adds `quantity` of a unit at its current (optionally promoted) price.
    ///
    /// Re-adding a unit already on a standalone line increments that line and keeps
    /// its locked price.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        unit_id: Uuid,
        quantity: i32,
        promotion_id: Option<Uuid>,
    ) -> Result<CartView, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity must be at least 1, got {}",
                quantity
            )));
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let cart = mutable_cart(&txn, cart_id, now).await?;
        let tenant = cart_tenant(&cart);
        let (unit, product) = load_unit_with_product(&txn, unit_id).await?;

        if product.product_type.is_serialized() && quantity != 1 {
            return Err(ServiceError::ValidationError(format!(
                "{} units are unique; quantity must be 1",
                product.name
            )));
        }
        ensure_addable(&unit, &product, tenant)?;

        let lines = lines_for_unit(&txn, cart_id, unit_id).await?;
        let already: i32 = lines.iter().map(|line| line.quantity).sum();
        ensure_stock(&unit, already + quantity)?;

        let standalone = lines.into_iter().find(|line| line.bundle_group_id.is_none());
        match standalone {
            Some(line) => {
                let new_quantity = line.quantity + quantity;
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(new_quantity);
                active.update(&txn).await?;
            }
            None => {
                let promotion = match promotion_id {
                    Some(id) => Promotion::find_by_id(id)
                        .one(&txn)
                        .await?
                        .filter(|promo| {
                            promo.brand_id.is_none() || promo.brand_id == cart.brand_id
                        })
                        .filter(|promo| pricing::promotion_applies(promo, &product, now)),
                    None => None,
                };
                let unit_price = pricing::price_unit(&unit, &product, promotion.as_ref(), now);
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart_id),
                    unit_id: Set(unit_id),
                    quantity: Set(quantity),
                    unit_price: Set(unit_price),
                    promotion_id: Set(promotion.map(|p| p.id)),
                    bundle_id: Set(None),
                    bundle_group_id: Set(None),
                    added_at: Set(now),
                }
                .insert(&txn)
                .await?;
            }
        }
        touch(&txn, cart, now).await?;
        let view = cart_view(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded { cart_id, unit_id })
            .await;
        info!(%cart_id, %unit_id, quantity, "added unit to cart");
        Ok(view)
    }

    /// Adds a bundle: one unit per bundle line, main product first, then the bundle
    /// items in display order. Lines share a fresh bundle group id and carry the
    /// distributed bundle prices.
    #[instrument(skip(self))]
    pub async fn add_bundle(
        &self,
        cart_id: Uuid,
        bundle_id: Uuid,
        unit_ids: Vec<Uuid>,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let cart = mutable_cart(&txn, cart_id, now).await?;
        let tenant = cart_tenant(&cart);

        let bundle = Bundle::find_by_id(bundle_id)
            .one(&txn)
            .await?
            .filter(|b| b.brand_id.is_none() || b.brand_id == cart.brand_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Bundle {} not found", bundle_id)))?;
        if !bundle.is_live(now) {
            return Err(ServiceError::ValidationError(format!(
                "Bundle {} is not currently available",
                bundle.title
            )));
        }
        let items = BundleItem::find()
            .filter(bundle_item::Column::BundleId.eq(bundle_id))
            .order_by_asc(bundle_item::Column::DisplayOrder)
            .all(&txn)
            .await?;

        // (product, quantity, override) per line, main product first
        let mut wanted = vec![(bundle.main_product_id, 1, None)];
        wanted.extend(
            items
                .iter()
                .map(|item| (item.product_id, item.quantity, item.override_price)),
        );
        if unit_ids.len() != wanted.len() {
            return Err(ServiceError::ValidationError(format!(
                "Bundle {} needs {} units, got {}",
                bundle.title,
                wanted.len(),
                unit_ids.len()
            )));
        }

        let mut lines = Vec::with_capacity(wanted.len());
        for ((product_id, quantity, override_price), unit_id) in wanted.iter().zip(&unit_ids) {
            let (unit, product) = load_unit_with_product(&txn, *unit_id).await?;
            if unit.product_id != *product_id {
                return Err(ServiceError::ValidationError(format!(
                    "Unit {} is not a {} required by this bundle",
                    unit_id, product_id
                )));
            }
            if product.product_type.is_serialized() && *quantity != 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Bundle line for {} asks for {} unique units",
                    product.name, quantity
                )));
            }
            ensure_addable(&unit, &product, tenant)?;
            let already: i32 = lines_for_unit(&txn, cart_id, unit.id)
                .await?
                .iter()
                .map(|line| line.quantity)
                .sum();
            ensure_stock(&unit, already + quantity)?;

            let standalone_price = match override_price {
                Some(price) => *price,
                None => cheapest_available_price(&txn, *product_id)
                    .await?
                    .unwrap_or(unit.selling_price),
            };
            lines.push((unit.id, BundleLine::new(*product_id, *quantity, standalone_price)));
        }

        let bundle_lines: Vec<BundleLine> = lines.iter().map(|(_, line)| line.clone()).collect();
        let quote = pricing::quote_bundle(&bundle, &bundle_lines)?;

        let group_id = Uuid::new_v4();
        for ((unit_id, line), unit_price) in lines.iter().zip(&quote.unit_prices) {
            cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart_id),
                unit_id: Set(*unit_id),
                quantity: Set(line.quantity),
                unit_price: Set(*unit_price),
                promotion_id: Set(None),
                bundle_id: Set(Some(bundle_id)),
                bundle_group_id: Set(Some(group_id)),
                added_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }
        touch(&txn, cart, now).await?;
        let view = cart_view(&txn, cart_id).await?;
        txn.commit().await?;

        for (unit_id, _) in &lines {
            self.event_sender
                .send_or_log(Event::CartItemAdded {
                    cart_id,
                    unit_id: *unit_id,
                })
                .await;
        }
        info!(%cart_id, %bundle_id, total = %quote.target_total, "added bundle to cart");
        Ok(view)
    }

    /// Sets a standalone line's quantity. Bundle lines are fixed.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity must be at least 1, got {}",
                quantity
            )));
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let cart = mutable_cart(&txn, cart_id, now).await?;
        let item = cart_line(&txn, cart_id, item_id).await?;
        if item.bundle_group_id.is_some() {
            return Err(ServiceError::ValidationError(
                "Bundle lines cannot change quantity; remove the bundle instead".to_string(),
            ));
        }

        let (unit, product) = load_unit_with_product(&txn, item.unit_id).await?;
        if product.product_type.is_serialized() && quantity != 1 {
            return Err(ServiceError::ValidationError(format!(
                "{} units are unique; quantity must be 1",
                product.name
            )));
        }
        let others: i32 = lines_for_unit(&txn, cart_id, item.unit_id)
            .await?
            .iter()
            .filter(|line| line.id != item_id)
            .map(|line| line.quantity)
            .sum();
        ensure_stock(&unit, others + quantity)?;

        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        active.update(&txn).await?;
        touch(&txn, cart, now).await?;
        let view = cart_view(&txn, cart_id).await?;
        txn.commit().await?;
        Ok(view)
    }

    /// Removes a line; removing any line of a bundle removes the whole bundle group.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let cart = mutable_cart(&txn, cart_id, now).await?;
        let item = cart_line(&txn, cart_id, item_id).await?;

        match item.bundle_group_id {
            Some(group_id) => {
                CartItem::delete_many()
                    .filter(cart_item::Column::CartId.eq(cart_id))
                    .filter(cart_item::Column::BundleGroupId.eq(group_id))
                    .exec(&txn)
                    .await?;
            }
            None => {
                CartItem::delete_by_id(item_id).exec(&txn).await?;
            }
        }
        touch(&txn, cart, now).await?;
        let view = cart_view(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { cart_id, item_id })
            .await;
        Ok(view)
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, cart_id: Uuid) -> Result<CartView, ServiceError> {
        cart_view(&*self.db, cart_id).await
    }
}

fn open_carts(tenant: Option<TenantId>) -> sea_orm::Select<Cart> {
    let query = Cart::find().filter(cart::Column::IsSubmitted.eq(false));
    match tenant {
        Some(tenant) => query.filter(cart::Column::BrandId.eq(tenant.as_uuid())),
        None => query.filter(cart::Column::BrandId.is_null()),
    }
}

fn cart_tenant(cart: &CartModel) -> Option<TenantId> {
    cart.brand_id.map(TenantId)
}

fn ensure_addable(
    unit: &InventoryUnitModel,
    product: &ProductModel,
    tenant: Option<TenantId>,
) -> Result<(), ServiceError> {
    if !is_publicly_visible(unit, product, tenant) {
        return Err(ServiceError::UnitUnavailable(format!(
            "{} (unit {}) is not available",
            product.name, unit.id
        )));
    }
    Ok(())
}

/// Pieces already promised to pending orders do not count as stock.
fn ensure_stock(unit: &InventoryUnitModel, wanted: i32) -> Result<(), ServiceError> {
    if wanted > unit.available_quantity() {
        return Err(ServiceError::UnitUnavailable(format!(
            "Only {} of unit {} available, {} requested",
            unit.available_quantity(),
            unit.id,
            wanted
        )));
    }
    Ok(())
}

pub(crate) async fn load_cart<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> Result<CartModel, ServiceError> {
    Cart::find_by_id(cart_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))
}

async fn mutable_cart<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
    now: DateTime<Utc>,
) -> Result<CartModel, ServiceError> {
    let cart = load_cart(conn, cart_id).await?;
    if cart.is_submitted {
        return Err(ServiceError::InvalidCartState(format!(
            "Cart {} has already been submitted",
            cart_id
        )));
    }
    if cart.is_expired(now) {
        return Err(ServiceError::InvalidCartState(format!(
            "Cart {} has expired",
            cart_id
        )));
    }
    Ok(cart)
}

async fn cart_line<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
    item_id: Uuid,
) -> Result<CartItemModel, ServiceError> {
    CartItem::find_by_id(item_id)
        .one(conn)
        .await?
        .filter(|item| item.cart_id == cart_id)
        .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found in cart {}", item_id, cart_id)))
}

async fn lines_for_unit<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
    unit_id: Uuid,
) -> Result<Vec<CartItemModel>, ServiceError> {
    Ok(CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .filter(cart_item::Column::UnitId.eq(unit_id))
        .all(conn)
        .await?)
}

async fn cheapest_available_price<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<Option<Decimal>, ServiceError> {
    Ok(InventoryUnit::find()
        .filter(inventory_unit::Column::ProductId.eq(product_id))
        .filter(inventory_unit::Column::SaleStatus.eq(SaleStatus::Available))
        .all(conn)
        .await?
        .into_iter()
        .map(|unit| unit.selling_price)
        .min())
}

async fn touch<C: ConnectionTrait>(
    conn: &C,
    cart: CartModel,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let mut active: cart::ActiveModel = cart.into();
    active.updated_at = Set(now);
    active.update(conn).await?;
    Ok(())
}

pub(crate) async fn cart_items<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> Result<Vec<CartItemModel>, ServiceError> {
    Ok(CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .order_by_asc(cart_item::Column::AddedAt)
        .all(conn)
        .await?)
}

async fn cart_view<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> Result<CartView, ServiceError> {
    let cart = load_cart(conn, cart_id).await?;
    let items = cart_items(conn, cart_id).await?;
    let total = items.iter().map(CartItemModel::line_total).sum();
    Ok(CartView { cart, items, total })
}

/// Deletes a cart and its lines.
pub(crate) async fn delete_cart<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> Result<(), ServiceError> {
    CartItem::delete_many()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .exec(conn)
        .await?;
    Cart::delete_by_id(cart_id).exec(conn).await?;
    Ok(())
}
