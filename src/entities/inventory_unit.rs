use crate::tenancy::BrandScope;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One physical stock line: a serialized device (quantity 1) or a bulk accessory line.
///
/// `sale_status` is written only by the inventory ledger.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_units")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    #[sea_orm(nullable)]
    pub serial_number: Option<String>,
    pub quantity: i32,
    /// Pieces of a bulk line promised to pending orders. Always 0 for serialized units.
    pub held_quantity: i32,
    pub sale_status: SaleStatus,
    pub available_online: bool,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub selling_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub compare_at_price: Option<Decimal>,
    /// Salesperson currently holding the unit while RESERVED
    #[sea_orm(nullable)]
    pub reserved_by: Option<Uuid>,
    #[sea_orm(nullable)]
    pub reserved_until: Option<DateTime<Utc>>,
    /// Approved reservation request that owns the current hold
    #[sea_orm(nullable)]
    pub reservation_id: Option<Uuid>,
    #[sea_orm(column_type = "Json")]
    pub brands: BrandScope,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Pieces not yet promised to a pending order.
    pub fn available_quantity(&self) -> i32 {
        self.quantity - self.held_quantity
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    #[sea_orm(string_value = "AVAILABLE")]
    Available,
    #[sea_orm(string_value = "RESERVED")]
    Reserved,
    #[sea_orm(string_value = "PENDING_PAYMENT")]
    PendingPayment,
    #[sea_orm(string_value = "SOLD")]
    Sold,
    #[sea_orm(string_value = "RETURNED")]
    Returned,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Available => "AVAILABLE",
            SaleStatus::Reserved => "RESERVED",
            SaleStatus::PendingPayment => "PENDING_PAYMENT",
            SaleStatus::Sold => "SOLD",
            SaleStatus::Returned => "RETURNED",
        }
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
