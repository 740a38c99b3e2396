use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Package price anchored to a main product plus component items
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bundles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(nullable)]
    pub brand_id: Option<Uuid>,
    pub main_product_id: Uuid,
    pub title: String,
    pub pricing_mode: BundlePricingMode,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub bundle_price: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((5, 2)))", nullable)]
    pub discount_percentage: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub discount_amount: Option<Decimal>,
    pub is_active: bool,
    #[sea_orm(nullable)]
    pub start_date: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bundle_item::Entity")]
    Items,
}

impl Related<super::bundle_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Active flag plus the optional date window
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.start_date.map_or(true, |start| start <= now)
            && self.end_date.map_or(true, |end| now <= end)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BundlePricingMode {
    #[sea_orm(string_value = "FIXED")]
    Fixed,
    #[sea_orm(string_value = "PERCENT")]
    Percent,
    #[sea_orm(string_value = "AMOUNT")]
    Amount,
}
