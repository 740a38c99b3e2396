//! Tenant ("brand") scoping.
//!
//! The tenant is resolved by whatever sits in front of the services and passed in
//! explicitly as `Option<TenantId>`; `None` means the caller is unscoped.

use crate::entities::{inventory_unit, product, SaleStatus};
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for TenantId {
    fn from(id: Uuid) -> Self {
        TenantId(id)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Set of tenants a record is restricted to; empty means unrestricted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct BrandScope(pub Vec<Uuid>);

impl BrandScope {
    pub fn unrestricted() -> Self {
        Self(Vec::new())
    }

    pub fn only(tenants: impl IntoIterator<Item = Uuid>) -> Self {
        Self(tenants.into_iter().collect())
    }

    pub fn is_unrestricted(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, tenant: TenantId) -> bool {
        self.0.contains(&tenant.0)
    }
}

/// Whether `tenant` may see `unit` at all, ignoring its sale state.
///
/// Both the unit and its product must admit the tenant: a scope admits it when it is
/// empty or lists it, and a global product admits every tenant. An unscoped caller
/// applies no tenant filter.
pub fn tenant_may_see(
    unit: &inventory_unit::Model,
    product: &product::Model,
    tenant: Option<TenantId>,
) -> bool {
    let Some(tenant) = tenant else {
        return true;
    };
    let unit_admits = unit.brands.is_unrestricted() || unit.brands.contains(tenant);
    let product_admits =
        product.is_global || product.brands.is_unrestricted() || product.brands.contains(tenant);
    unit_admits && product_admits
}

/// Public storefront eligibility of a unit for the given tenant.
pub fn is_publicly_visible(
    unit: &inventory_unit::Model,
    product: &product::Model,
    tenant: Option<TenantId>,
) -> bool {
    unit.sale_status == SaleStatus::Available
        && unit.available_online
        && (product.product_type.is_serialized() || unit.available_quantity() > 0)
        && tenant_may_see(unit, product, tenant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ProductType;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn product(product_type: ProductType, brands: BrandScope, is_global: bool) -> product::Model {
        product::Model {
            id: Uuid::new_v4(),
            name: "Pixel 8".into(),
            product_type,
            brands,
            is_global,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn unit(product_id: Uuid, quantity: i32, brands: BrandScope) -> inventory_unit::Model {
        inventory_unit::Model {
            id: Uuid::new_v4(),
            product_id,
            serial_number: None,
            quantity,
            held_quantity: 0,
            sale_status: SaleStatus::Available,
            available_online: true,
            selling_price: dec!(50000),
            compare_at_price: None,
            reserved_by: None,
            reserved_until: None,
            reservation_id: None,
            brands,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unrestricted_unit_is_visible_to_everyone() {
        let p = product(ProductType::Phone, BrandScope::unrestricted(), false);
        let u = unit(p.id, 1, BrandScope::unrestricted());
        assert!(is_publicly_visible(&u, &p, None));
        assert!(is_publicly_visible(&u, &p, Some(TenantId(Uuid::new_v4()))));
    }

    #[test]
    fn unit_brands_restrict_visibility() {
        let tenant = TenantId(Uuid::new_v4());
        let p = product(ProductType::Phone, BrandScope::unrestricted(), true);
        let u = unit(p.id, 1, BrandScope::only([tenant.0]));
        assert!(is_publicly_visible(&u, &p, Some(tenant)));
        assert!(!is_publicly_visible(&u, &p, Some(TenantId(Uuid::new_v4()))));
        // unscoped callers are not filtered by tenant
        assert!(is_publicly_visible(&u, &p, None));
    }

    #[test]
    fn product_brands_restrict_visibility_unless_global() {
        let tenant = TenantId(Uuid::new_v4());
        let p = product(ProductType::Laptop, BrandScope::only([tenant.0]), false);
        let u = unit(p.id, 1, BrandScope::unrestricted());
        assert!(is_publicly_visible(&u, &p, Some(tenant)));
        assert!(!is_publicly_visible(&u, &p, Some(TenantId(Uuid::new_v4()))));

        let global = product(ProductType::Laptop, BrandScope::only([tenant.0]), true);
        assert!(is_publicly_visible(&u, &global, Some(TenantId(Uuid::new_v4()))));
    }

    #[test]
    fn empty_accessory_line_is_hidden() {
        let p = product(ProductType::Accessory, BrandScope::unrestricted(), false);
        let empty = unit(p.id, 0, BrandScope::unrestricted());
        assert!(!is_publicly_visible(&empty, &p, None));

        let mut stocked = unit(p.id, 4, BrandScope::unrestricted());
        assert!(is_publicly_visible(&stocked, &p, None));

        // every piece promised to pending orders
        stocked.held_quantity = 4;
        assert!(!is_publicly_visible(&stocked, &p, None));
    }

    #[test]
    fn offline_or_reserved_units_are_hidden() {
        let p = product(ProductType::Tablet, BrandScope::unrestricted(), false);
        let mut u = unit(p.id, 1, BrandScope::unrestricted());
        u.available_online = false;
        assert!(!is_publicly_visible(&u, &p, None));

        u.available_online = true;
        u.sale_status = SaleStatus::Reserved;
        assert!(!is_publicly_visible(&u, &p, None));
    }
}
