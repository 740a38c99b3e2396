use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable record of purchase interest created at checkout; reserves nothing
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "leads")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// `LEAD-<year>-<6-digit sequence>`
    #[sea_orm(unique)]
    pub reference: String,
    #[sea_orm(nullable)]
    pub brand_id: Option<Uuid>,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub customer_phone: String,
    #[sea_orm(nullable)]
    pub customer_email: Option<String>,
    #[sea_orm(nullable)]
    pub delivery_county: Option<String>,
    #[sea_orm(nullable)]
    pub delivery_ward: Option<String>,
    #[sea_orm(nullable)]
    pub delivery_address: Option<String>,
    pub status: LeadStatus,
    #[sea_orm(nullable)]
    pub assigned_to: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub delivery_fee: Decimal,
    /// Key supplied with the checkout that created this lead
    #[sea_orm(nullable)]
    pub checkout_key: Option<String>,
    #[sea_orm(nullable)]
    pub order_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub expires_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub contacted_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub converted_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub closed_at: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::lead_item::Entity")]
    LeadItems,
}

impl Related<super::lead_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LeadItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    #[sea_orm(string_value = "NEW")]
    New,
    #[sea_orm(string_value = "CONTACTED")]
    Contacted,
    #[sea_orm(string_value = "CONVERTED")]
    Converted,
    #[sea_orm(string_value = "CLOSED")]
    Closed,
    #[sea_orm(string_value = "EXPIRED")]
    Expired,
}

impl LeadStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, LeadStatus::New | LeadStatus::Contacted)
    }
}
