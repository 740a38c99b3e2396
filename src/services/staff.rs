//! Staff lookups: role checks for workflow actions and notification fan-out.

use crate::entities::{staff, Staff, StaffModel, StaffRole};
use crate::errors::ServiceError;
use crate::tenancy::TenantId;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

pub async fn find_staff<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<StaffModel, ServiceError> {
    Staff::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Staff member {} not found", id)))
}

/// Loads an active inventory manager or superuser, else `Forbidden`.
pub async fn require_approver<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<StaffModel, ServiceError> {
    let member = find_staff(conn, id).await?;
    if !member.can_approve() {
        return Err(ServiceError::Forbidden(format!(
            "{} is not allowed to approve or reject requests",
            member.name
        )));
    }
    Ok(member)
}

/// Loads an active salesperson, else `Forbidden`.
pub async fn require_salesperson<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<StaffModel, ServiceError> {
    let member = find_staff(conn, id).await?;
    if !member.is_salesperson() {
        return Err(ServiceError::Forbidden(format!(
            "{} is not an active salesperson",
            member.name
        )));
    }
    Ok(member)
}

/// Active inventory managers and superusers.
pub async fn approvers<C: ConnectionTrait>(conn: &C) -> Result<Vec<StaffModel>, ServiceError> {
    Ok(Staff::find()
        .filter(staff::Column::IsActive.eq(true))
        .filter(staff::Column::Role.is_in([StaffRole::InventoryManager, StaffRole::Superuser]))
        .all(conn)
        .await?)
}

/// Active salespeople serving `tenant`; every active salesperson when unscoped.
pub async fn salespeople_for<C: ConnectionTrait>(
    conn: &C,
    tenant: Option<TenantId>,
) -> Result<Vec<StaffModel>, ServiceError> {
    let active = Staff::find()
        .filter(staff::Column::IsActive.eq(true))
        .filter(staff::Column::Role.eq(StaffRole::Salesperson))
        .all(conn)
        .await?;
    Ok(match tenant {
        Some(tenant) => active
            .into_iter()
            .filter(|member| member.brands.contains(tenant))
            .collect(),
        None => active,
    })
}
