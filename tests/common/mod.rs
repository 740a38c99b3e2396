#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use stockroom_api::{
    config::AppConfig,
    db::{self, DbPool},
    entities::{
        bundle, bundle_item, delivery_rate, inventory_unit, product,
        promotion::{self, ProductIdList, ProductTypeList},
        staff, BundlePricingMode, InventoryUnit, InventoryUnitModel, ProductModel, ProductType,
        PromotionModel, SaleStatus, StaffModel, StaffRole,
    },
    events::{self, EventSender},
    notifications::{InMemoryNotificationSink, NotificationError, ReceiptDispatcher},
    services::{checkout::CheckoutInput, AppServices},
    tenancy::BrandScope,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Records every receipt dispatch instead of sending anything.
#[derive(Default)]
pub struct RecordingReceipts {
    dispatched: Mutex<Vec<Uuid>>,
}

impl RecordingReceipts {
    pub fn count_for(&self, order_id: Uuid) -> usize {
        self.dispatched
            .lock()
            .unwrap()
            .iter()
            .filter(|id| **id == order_id)
            .count()
    }
}

#[async_trait]
impl ReceiptDispatcher for RecordingReceipts {
    async fn dispatch(&self, order_id: Uuid) -> Result<(), NotificationError> {
        self.dispatched.lock().unwrap().push(order_id);
        Ok(())
    }
}

/// Services wired to a fresh in-memory SQLite database.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub services: AppServices,
    pub notifications: Arc<InMemoryNotificationSink>,
    pub receipts: Arc<RecordingReceipts>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        // every connection to sqlite::memory: is a separate database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.db_idle_timeout_secs = 3_600;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let db = Arc::new(pool);
        let config = Arc::new(cfg);

        let (tx, rx) = mpsc::channel(1024);
        let event_task = tokio::spawn(events::process_events(rx));
        let notifications = Arc::new(InMemoryNotificationSink::new());
        let receipts = Arc::new(RecordingReceipts::default());

        let services = AppServices::new(
            db.clone(),
            config.clone(),
            Arc::new(EventSender::new(tx)),
            notifications.clone(),
            receipts.clone(),
        );

        Self {
            db,
            config,
            services,
            notifications,
            receipts,
            _event_task: event_task,
        }
    }

    pub async fn product(&self, name: &str, product_type: ProductType) -> ProductModel {
        self.product_for(name, product_type, BrandScope::unrestricted(), false)
            .await
    }

    pub async fn product_for(
        &self,
        name: &str,
        product_type: ProductType,
        brands: BrandScope,
        is_global: bool,
    ) -> ProductModel {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            product_type: Set(product_type),
            brands: Set(brands),
            is_global: Set(is_global),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("failed to insert product")
    }

    /// One AVAILABLE, online, unrestricted unit.
    pub async fn unit(&self, product: &ProductModel, price: Decimal) -> InventoryUnitModel {
        self.unit_with(product, price, 1, BrandScope::unrestricted())
            .await
    }

    pub async fn unit_with(
        &self,
        product: &ProductModel,
        price: Decimal,
        quantity: i32,
        brands: BrandScope,
    ) -> InventoryUnitModel {
        let serial = product
            .product_type
            .is_serialized()
            .then(|| format!("SN-{}", Uuid::new_v4().simple()));
        inventory_unit::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            serial_number: Set(serial),
            quantity: Set(quantity),
            held_quantity: Set(0),
            sale_status: Set(SaleStatus::Available),
            available_online: Set(true),
            selling_price: Set(price),
            compare_at_price: Set(None),
            reserved_by: Set(None),
            reserved_until: Set(None),
            reservation_id: Set(None),
            brands: Set(brands),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("failed to insert unit")
    }

    /// Re-reads a unit from the database.
    pub async fn reload_unit(&self, unit_id: Uuid) -> InventoryUnitModel {
        InventoryUnit::find_by_id(unit_id)
            .one(&*self.db)
            .await
            .expect("failed to load unit")
            .expect("unit missing")
    }

    pub async fn unit_status(&self, unit_id: Uuid) -> SaleStatus {
        self.reload_unit(unit_id).await.sale_status
    }

    /// Forces a unit into a state without going through the ledger.
    pub async fn force_status(&self, unit_id: Uuid, status: SaleStatus, holder: Option<Uuid>) {
        let unit = self.reload_unit(unit_id).await;
        let mut active: inventory_unit::ActiveModel = unit.into();
        active.sale_status = Set(status);
        active.reserved_by = Set(holder);
        active.update(&*self.db).await.expect("failed to update unit");
    }

    pub async fn staff(&self, name: &str, role: StaffRole) -> StaffModel {
        self.staff_for(name, role, BrandScope::unrestricted()).await
    }

    pub async fn staff_for(&self, name: &str, role: StaffRole, brands: BrandScope) -> StaffModel {
        staff::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            role: Set(role),
            brands: Set(brands),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("failed to insert staff")
    }

    pub async fn salesperson(&self, name: &str) -> StaffModel {
        self.staff(name, StaffRole::Salesperson).await
    }

    pub async fn manager(&self, name: &str) -> StaffModel {
        self.staff(name, StaffRole::InventoryManager).await
    }

    /// Active percentage promotion for one product, running from yesterday to next week.
    pub async fn percent_promotion(&self, product_id: Uuid, percentage: Decimal) -> PromotionModel {
        promotion::ActiveModel {
            id: Set(Uuid::new_v4()),
            brand_id: Set(None),
            title: Set(format!("{}% off", percentage)),
            discount_percentage: Set(Some(percentage)),
            discount_amount: Set(None),
            start_date: Set(Utc::now() - Duration::days(1)),
            end_date: Set(Utc::now() + Duration::days(7)),
            is_active: Set(true),
            product_ids: Set(ProductIdList(vec![product_id])),
            product_types: Set(ProductTypeList(Vec::new())),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("failed to insert promotion")
    }

    /// Fixed-price bundle anchored on `main_product_id` with the given items in order.
    pub async fn fixed_bundle(
        &self,
        main_product_id: Uuid,
        items: &[Uuid],
        bundle_price: Decimal,
    ) -> bundle::Model {
        let bundle = bundle::ActiveModel {
            id: Set(Uuid::new_v4()),
            brand_id: Set(None),
            main_product_id: Set(main_product_id),
            title: Set("Starter kit".to_string()),
            pricing_mode: Set(BundlePricingMode::Fixed),
            bundle_price: Set(Some(bundle_price)),
            discount_percentage: Set(None),
            discount_amount: Set(None),
            is_active: Set(true),
            start_date: Set(None),
            end_date: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("failed to insert bundle");

        for (position, product_id) in items.iter().enumerate() {
            bundle_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                bundle_id: Set(bundle.id),
                product_id: Set(*product_id),
                quantity: Set(1),
                override_price: Set(None),
                display_order: Set(position as i32),
            }
            .insert(&*self.db)
            .await
            .expect("failed to insert bundle item");
        }
        bundle
    }

    pub async fn delivery_rate(&self, county: &str, ward: Option<&str>, price: Decimal) {
        delivery_rate::ActiveModel {
            id: Set(Uuid::new_v4()),
            county: Set(county.to_string()),
            ward: Set(ward.map(str::to_string)),
            price: Set(price),
            is_active: Set(true),
        }
        .insert(&*self.db)
        .await
        .expect("failed to insert delivery rate");
    }
}

pub fn checkout_input(phone: &str, name: &str) -> CheckoutInput {
    CheckoutInput {
        phone: phone.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}
