use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod audit_log;
pub mod bundle;
pub mod bundle_item;
pub mod cart;
pub mod cart_item;
pub mod customer;
pub mod delivery_rate;
pub mod inventory_unit;
pub mod lead;
pub mod lead_item;
pub mod notification;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod product;
pub mod promotion;
pub mod reservation_request;
pub mod reservation_request_unit;
pub mod return_request;
pub mod return_request_unit;
pub mod staff;
pub mod unit_transfer;

// Re-export entities
pub use audit_log::{Entity as AuditLog, Model as AuditLogModel};
pub use bundle::{BundlePricingMode, Entity as Bundle, Model as BundleModel};
pub use bundle_item::{Entity as BundleItem, Model as BundleItemModel};
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use customer::{Entity as Customer, Model as CustomerModel};
pub use delivery_rate::{Entity as DeliveryRate, Model as DeliveryRateModel};
pub use inventory_unit::{Entity as InventoryUnit, Model as InventoryUnitModel, SaleStatus};
pub use lead::{Entity as Lead, LeadStatus, Model as LeadModel};
pub use lead_item::{Entity as LeadItem, Model as LeadItemModel};
pub use notification::{Entity as NotificationRecord, Model as NotificationRecordModel};
pub use order::{Entity as Order, Model as OrderModel, OrderSource, OrderStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use payment::{Entity as Payment, Model as PaymentModel, PaymentStatus};
pub use product::{Entity as Product, Model as ProductModel, ProductType};
pub use promotion::{Entity as Promotion, Model as PromotionModel};
pub use reservation_request::{
    Entity as ReservationRequest, Model as ReservationRequestModel, ReservationStatus,
};
pub use reservation_request_unit::Entity as ReservationRequestUnit;
pub use return_request::{ApprovalStatus, Entity as ReturnRequest, Model as ReturnRequestModel};
pub use return_request_unit::Entity as ReturnRequestUnit;
pub use staff::{Entity as Staff, Model as StaffModel, StaffRole};
pub use unit_transfer::{Entity as UnitTransfer, Model as UnitTransferModel};

/// Typed link from an audit entry or notification to the record it concerns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum RelatedEntity {
    Unit(Uuid),
    Lead(Uuid),
    Order(Uuid),
    Reservation(Uuid),
    Return(Uuid),
    Transfer(Uuid),
    Cart(Uuid),
    Payment(Uuid),
}

/// Who caused a state change; recorded on every audit entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Staff(Uuid),
    Customer(Uuid),
    PaymentProvider,
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Staff(id) => write!(f, "staff:{}", id),
            Actor::Customer(id) => write!(f, "customer:{}", id),
            Actor::PaymentProvider => f.write_str("payment_provider"),
            Actor::System => f.write_str("system"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn related_entity_serializes_as_tagged_variant() {
        let id = Uuid::nil();
        let value = serde_json::to_value(RelatedEntity::Lead(id)).unwrap();
        assert_eq!(value["type"], "lead");
        assert_eq!(value["id"], id.to_string());

        let back: RelatedEntity = serde_json::from_value(value).unwrap();
        assert_eq!(back, RelatedEntity::Lead(id));
    }

    #[test]
    fn actor_display_is_stable() {
        let id = Uuid::nil();
        assert_eq!(Actor::Staff(id).to_string(), format!("staff:{}", id));
        assert_eq!(Actor::System.to_string(), "system");
        assert_eq!(Actor::PaymentProvider.to_string(), "payment_provider");
    }
}
