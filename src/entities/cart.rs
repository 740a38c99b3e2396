use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shopping cart scoped to one tenant and one session or phone number.
///
/// Holds no inventory; once submitted it is frozen and linked to its lead.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "carts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(nullable)]
    pub brand_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub session_key: Option<String>,
    #[sea_orm(nullable)]
    pub customer_phone: Option<String>,
    #[sea_orm(nullable)]
    pub customer_id: Option<Uuid>,
    pub is_submitted: bool,
    #[sea_orm(nullable)]
    pub lead_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_submitted && self.expires_at < now
    }
}
