use crate::tenancy::BrandScope;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Staff member acting on inventory: salespeople request, managers approve
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "staff")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub role: StaffRole,
    /// Tenants this staff member serves; drives lead fan-out
    #[sea_orm(column_type = "Json")]
    pub brands: BrandScope,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(30))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffRole {
    #[sea_orm(string_value = "SALESPERSON")]
    Salesperson,
    #[sea_orm(string_value = "INVENTORY_MANAGER")]
    InventoryManager,
    #[sea_orm(string_value = "SUPERUSER")]
    Superuser,
}

impl Model {
    pub fn can_approve(&self) -> bool {
        self.is_active
            && matches!(
                self.role,
                StaffRole::InventoryManager | StaffRole::Superuser
            )
    }

    pub fn is_salesperson(&self) -> bool {
        self.is_active && self.role == StaffRole::Salesperson
    }
}
