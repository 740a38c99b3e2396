use super::RelatedEntity;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only record of every inventory state change
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    #[sea_orm(column_type = "Json")]
    pub entity: RelatedEntity,
    #[sea_orm(column_type = "Json", nullable)]
    pub old_value: Option<Json>,
    #[sea_orm(column_type = "Json", nullable)]
    pub new_value: Option<Json>,
    #[sea_orm(nullable)]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
