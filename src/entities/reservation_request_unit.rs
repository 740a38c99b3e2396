use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Units covered by a reservation request
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservation_request_units")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub reservation_request_id: Uuid,
    pub unit_id: Uuid,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::reservation_request::Entity",
        from = "Column::ReservationRequestId",
        to = "super::reservation_request::Column::Id",
        on_delete = "Cascade"
    )]
    ReservationRequest,
}

impl Related<super::reservation_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReservationRequest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
