use crate::tenancy::BrandScope;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog product; physical stock hangs off it as inventory units
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub product_type: ProductType,
    /// Tenants this product is listed for; empty means unrestricted
    #[sea_orm(column_type = "Json")]
    pub brands: BrandScope,
    /// Global products are visible to every tenant regardless of `brands`
    pub is_global: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inventory_unit::Entity")]
    InventoryUnits,
}

impl Related<super::inventory_unit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryUnits.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    #[sea_orm(string_value = "PHONE")]
    Phone,
    #[sea_orm(string_value = "LAPTOP")]
    Laptop,
    #[sea_orm(string_value = "TABLET")]
    Tablet,
    #[sea_orm(string_value = "ACCESSORY")]
    Accessory,
}

impl ProductType {
    /// Serialized devices are tracked one unit per row
    pub fn is_serialized(&self) -> bool {
        !matches!(self, ProductType::Accessory)
    }
}
