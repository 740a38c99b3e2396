//! Inventory ledger: the only writer of `inventory_units.sale_status`.
//!
//! Transitions are compare-and-swap updates filtered on the expected source states,
//! so two transactions racing for the same unit cannot both win. Each transition
//! writes an audit row through the same connection, which callers pass in as their
//! open transaction.

use crate::entities::{audit_log, inventory_unit, Actor, InventoryUnit, RelatedEntity, SaleStatus};
use crate::errors::ServiceError;
use crate::events::Event;
use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Every legal `(from, to)` edge of the unit lifecycle.
pub const LEGAL_TRANSITIONS: &[(SaleStatus, SaleStatus)] = &[
    (SaleStatus::Available, SaleStatus::Reserved),
    (SaleStatus::Available, SaleStatus::PendingPayment),
    (SaleStatus::Reserved, SaleStatus::Available),
    (SaleStatus::Reserved, SaleStatus::Returned),
    (SaleStatus::PendingPayment, SaleStatus::Sold),
    (SaleStatus::PendingPayment, SaleStatus::Available),
];

pub fn is_legal_transition(from: SaleStatus, to: SaleStatus) -> bool {
    LEGAL_TRANSITIONS.contains(&(from, to))
}

/// A transition that was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub unit_id: Uuid,
    pub from: SaleStatus,
    pub to: SaleStatus,
}

impl Transition {
    pub fn event(&self) -> Event {
        Event::UnitTransitioned {
            unit_id: self.unit_id,
            from: self.from,
            to: self.to,
        }
    }
}

pub struct InventoryLedger;

impl InventoryLedger {
    /// Moves one unit from any state in `from_set` to `to`.
    ///
    /// Fails with `InvalidTransition` when the unit's current state is outside
    /// `from_set`, when another writer changed it first, or when an edge in
    /// `from_set -> to` is not part of the lifecycle. The unit is left unchanged on
    /// every failure.
    #[instrument(skip(conn, actor, reason), fields(actor = %actor))]
    pub async fn transition<C: ConnectionTrait>(
        conn: &C,
        unit_id: Uuid,
        from_set: &[SaleStatus],
        to: SaleStatus,
        actor: Actor,
        reason: &str,
    ) -> Result<Transition, ServiceError> {
        if let Some(bad) = from_set.iter().find(|from| !is_legal_transition(**from, to)) {
            return Err(ServiceError::InvalidTransition(format!(
                "{} -> {} is not a permitted unit transition",
                bad, to
            )));
        }

        let unit = load_unit(conn, unit_id).await?;
        let from = unit.sale_status;
        if !from_set.contains(&from) {
            counter!("stockroom.ledger.transition_conflict", 1);
            return Err(ServiceError::InvalidTransition(format!(
                "Unit {} is {}, cannot move to {}",
                unit_id, from, to
            )));
        }
        if from == SaleStatus::Available && unit.held_quantity > 0 {
            counter!("stockroom.ledger.transition_conflict", 1);
            return Err(ServiceError::InvalidTransition(format!(
                "Unit {} has {} piece(s) promised to pending orders, cannot move to {}",
                unit_id, unit.held_quantity, to
            )));
        }

        if !Self::swap_status(conn, unit_id, from, to, None).await? {
            counter!("stockroom.ledger.transition_conflict", 1);
            warn!(%unit_id, %from, %to, "unit changed underneath transition");
            return Err(ServiceError::InvalidTransition(format!(
                "Unit {} changed state concurrently, cannot move to {}",
                unit_id, to
            )));
        }
        Self::record(conn, unit_id, from, to, actor, reason).await
    }

    /// Transitions every unit or fails on the first one that cannot move.
    ///
    /// Callers must run this inside a transaction and drop it on error so earlier
    /// units roll back with it.
    pub async fn transition_all<C: ConnectionTrait>(
        conn: &C,
        unit_ids: &[Uuid],
        from_set: &[SaleStatus],
        to: SaleStatus,
        actor: Actor,
        reason: &str,
    ) -> Result<Vec<Transition>, ServiceError> {
        let mut applied = Vec::with_capacity(unit_ids.len());
        for unit_id in unit_ids {
            applied.push(Self::transition(conn, *unit_id, from_set, to, actor, reason).await?);
        }
        Ok(applied)
    }

    /// RESERVED -> AVAILABLE, but only while the hold still belongs to `reservation_id`.
    ///
    /// Returns `None` when the unit was returned, sold or re-reserved under another
    /// request since.
    pub async fn release_reservation_hold<C: ConnectionTrait>(
        conn: &C,
        unit_id: Uuid,
        reservation_id: Uuid,
        actor: Actor,
        reason: &str,
    ) -> Result<Option<Transition>, ServiceError> {
        let owned = inventory_unit::Column::ReservationId.eq(reservation_id);
        let swapped = Self::swap_status(
            conn,
            unit_id,
            SaleStatus::Reserved,
            SaleStatus::Available,
            Some(owned),
        )
        .await?;
        if !swapped {
            debug!(%unit_id, %reservation_id, "hold no longer owned by reservation");
            return Ok(None);
        }
        let transition =
            Self::record(conn, unit_id, SaleStatus::Reserved, SaleStatus::Available, actor, reason)
                .await?;
        Ok(Some(transition))
    }

    /// Stamps a freshly reserved unit with its holder, expiry and owning request.
    pub async fn assign_hold<C: ConnectionTrait>(
        conn: &C,
        unit_id: Uuid,
        reservation_id: Uuid,
        holder: Uuid,
        until: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let result = InventoryUnit::update_many()
            .col_expr(inventory_unit::Column::ReservedBy, Expr::value(Some(holder)))
            .col_expr(inventory_unit::Column::ReservedUntil, Expr::value(Some(until)))
            .col_expr(
                inventory_unit::Column::ReservationId,
                Expr::value(Some(reservation_id)),
            )
            .col_expr(inventory_unit::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_unit::Column::Id.eq(unit_id))
            .filter(inventory_unit::Column::SaleStatus.eq(SaleStatus::Reserved))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::InvalidTransition(format!(
                "Unit {} is not reserved",
                unit_id
            )));
        }
        Ok(())
    }

    /// Hands a reserved unit from `expected_holder` to `new_holder`. Does not touch
    /// `sale_status` or the hold expiry.
    ///
    /// Fails with `UnitUnavailable` when the unit is no longer reserved by
    /// `expected_holder`, including when a concurrent hand-over won.
    pub async fn set_holder<C: ConnectionTrait>(
        conn: &C,
        unit_id: Uuid,
        expected_holder: Uuid,
        new_holder: Uuid,
    ) -> Result<(), ServiceError> {
        let result = InventoryUnit::update_many()
            .col_expr(inventory_unit::Column::ReservedBy, Expr::value(Some(new_holder)))
            .col_expr(inventory_unit::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_unit::Column::Id.eq(unit_id))
            .filter(inventory_unit::Column::SaleStatus.eq(SaleStatus::Reserved))
            .filter(inventory_unit::Column::ReservedBy.eq(expected_holder))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            counter!("stockroom.ledger.transition_conflict", 1);
            return Err(ServiceError::UnitUnavailable(format!(
                "Unit {} is no longer reserved by salesperson {}",
                unit_id, expected_holder
            )));
        }
        Ok(())
    }

    /// Promises `quantity` pieces of an AVAILABLE bulk line to a pending order.
    ///
    /// The line stays AVAILABLE; only its free quantity shrinks. Fails with
    /// `UnitUnavailable` when fewer than `quantity` pieces are free.
    pub async fn hold_quantity<C: ConnectionTrait>(
        conn: &C,
        unit_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let held = inventory_unit::Column::HeldQuantity;
        let result = InventoryUnit::update_many()
            .col_expr(held, Expr::col(held).add(quantity))
            .col_expr(inventory_unit::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_unit::Column::Id.eq(unit_id))
            .filter(inventory_unit::Column::SaleStatus.eq(SaleStatus::Available))
            .filter(Expr::col(inventory_unit::Column::Quantity).gte(Expr::col(held).add(quantity)))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            counter!("stockroom.ledger.transition_conflict", 1);
            return Err(ServiceError::UnitUnavailable(format!(
                "Fewer than {} piece(s) of unit {} are free",
                quantity, unit_id
            )));
        }
        debug!(%unit_id, quantity, "bulk pieces held");
        Ok(())
    }

    /// Returns held pieces of a bulk line to free stock. `false` when fewer than
    /// `quantity` pieces were held.
    pub async fn release_quantity<C: ConnectionTrait>(
        conn: &C,
        unit_id: Uuid,
        quantity: i32,
    ) -> Result<bool, ServiceError> {
        let held = inventory_unit::Column::HeldQuantity;
        let result = InventoryUnit::update_many()
            .col_expr(held, Expr::col(held).sub(quantity))
            .col_expr(inventory_unit::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_unit::Column::Id.eq(unit_id))
            .filter(held.gte(quantity))
            .exec(conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Sells held pieces of a bulk line: both `quantity` and the held count drop.
    ///
    /// A line sold down to zero moves AVAILABLE -> SOLD and that transition is
    /// returned. Fails with `InvalidTransition` when the pieces were not held.
    pub async fn sell_quantity<C: ConnectionTrait>(
        conn: &C,
        unit_id: Uuid,
        quantity: i32,
        actor: Actor,
        reason: &str,
    ) -> Result<Option<Transition>, ServiceError> {
        let unit = load_unit(conn, unit_id).await?;
        let held = inventory_unit::Column::HeldQuantity;
        let on_hand = inventory_unit::Column::Quantity;
        let result = InventoryUnit::update_many()
            .col_expr(on_hand, Expr::col(on_hand).sub(quantity))
            .col_expr(held, Expr::col(held).sub(quantity))
            .col_expr(inventory_unit::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_unit::Column::Id.eq(unit_id))
            .filter(held.gte(quantity))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            counter!("stockroom.ledger.transition_conflict", 1);
            return Err(ServiceError::InvalidTransition(format!(
                "Unit {} does not have {} held piece(s) to sell",
                unit_id, quantity
            )));
        }
        write_audit(
            conn,
            unit_id,
            actor,
            "quantity_sold",
            json!({ "quantity": unit.quantity }),
            json!({ "quantity": unit.quantity - quantity }),
            reason,
        )
        .await?;

        let sold_out = inventory_unit::Column::Quantity.eq(0);
        if !Self::swap_status(conn, unit_id, SaleStatus::Available, SaleStatus::Sold, Some(sold_out))
            .await?
        {
            return Ok(None);
        }
        let transition =
            Self::record(conn, unit_id, SaleStatus::Available, SaleStatus::Sold, actor, reason)
                .await?;
        Ok(Some(transition))
    }

    /// Compare-and-swap on `sale_status`, optionally narrowed by `guard`. Leaving
    /// RESERVED clears the hold fields.
    async fn swap_status<C: ConnectionTrait>(
        conn: &C,
        unit_id: Uuid,
        from: SaleStatus,
        to: SaleStatus,
        guard: Option<SimpleExpr>,
    ) -> Result<bool, ServiceError> {
        let mut update = InventoryUnit::update_many()
            .col_expr(inventory_unit::Column::SaleStatus, Expr::value(to))
            .col_expr(inventory_unit::Column::UpdatedAt, Expr::value(Utc::now()));
        if from == SaleStatus::Reserved {
            update = update
                .col_expr(
                    inventory_unit::Column::ReservedBy,
                    Expr::value(Option::<Uuid>::None),
                )
                .col_expr(
                    inventory_unit::Column::ReservedUntil,
                    Expr::value(Option::<DateTime<Utc>>::None),
                )
                .col_expr(
                    inventory_unit::Column::ReservationId,
                    Expr::value(Option::<Uuid>::None),
                );
        }
        if from == SaleStatus::Available {
            update = update.filter(inventory_unit::Column::HeldQuantity.eq(0));
        }
        if let Some(guard) = guard {
            update = update.filter(guard);
        }
        let result = update
            .filter(inventory_unit::Column::Id.eq(unit_id))
            .filter(inventory_unit::Column::SaleStatus.eq(from))
            .exec(conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn record<C: ConnectionTrait>(
        conn: &C,
        unit_id: Uuid,
        from: SaleStatus,
        to: SaleStatus,
        actor: Actor,
        reason: &str,
    ) -> Result<Transition, ServiceError> {
        write_audit(
            conn,
            unit_id,
            actor,
            "sale_status_change",
            json!({ "sale_status": from }),
            json!({ "sale_status": to }),
            reason,
        )
        .await?;
        counter!("stockroom.ledger.transition", 1, "to" => to.as_str());
        debug!(%unit_id, %from, %to, "unit transitioned");
        Ok(Transition { unit_id, from, to })
    }
}

async fn load_unit<C: ConnectionTrait>(
    conn: &C,
    unit_id: Uuid,
) -> Result<inventory_unit::Model, ServiceError> {
    InventoryUnit::find_by_id(unit_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Inventory unit {} not found", unit_id)))
}

async fn write_audit<C: ConnectionTrait>(
    conn: &C,
    unit_id: Uuid,
    actor: Actor,
    action: &str,
    old_value: serde_json::Value,
    new_value: serde_json::Value,
    reason: &str,
) -> Result<(), ServiceError> {
    audit_log::ActiveModel {
        id: Set(Uuid::new_v4()),
        actor: Set(actor.to_string()),
        action: Set(action.to_string()),
        entity: Set(RelatedEntity::Unit(unit_id)),
        old_value: Set(Some(old_value)),
        new_value: Set(Some(new_value)),
        reason: Set(Some(reason.to_string())),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Maps a lost race or stale state into the contention error workflows surface.
pub(crate) fn as_unavailable(err: ServiceError) -> ServiceError {
    match err {
        ServiceError::InvalidTransition(msg) => {
            ServiceError::UnitUnavailable(format!("Unit no longer available: {}", msg))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SaleStatus::Available, SaleStatus::Reserved, true)]
    #[case(SaleStatus::Available, SaleStatus::PendingPayment, true)]
    #[case(SaleStatus::Reserved, SaleStatus::Available, true)]
    #[case(SaleStatus::Reserved, SaleStatus::Returned, true)]
    #[case(SaleStatus::PendingPayment, SaleStatus::Sold, true)]
    #[case(SaleStatus::PendingPayment, SaleStatus::Available, true)]
    #[case(SaleStatus::Available, SaleStatus::Sold, false)]
    #[case(SaleStatus::Available, SaleStatus::Returned, false)]
    #[case(SaleStatus::Reserved, SaleStatus::PendingPayment, false)]
    #[case(SaleStatus::Reserved, SaleStatus::Sold, false)]
    #[case(SaleStatus::Sold, SaleStatus::Available, false)]
    #[case(SaleStatus::Sold, SaleStatus::Returned, false)]
    #[case(SaleStatus::Returned, SaleStatus::Available, false)]
    #[case(SaleStatus::PendingPayment, SaleStatus::Reserved, false)]
    #[case(SaleStatus::Available, SaleStatus::Available, false)]
    fn transition_table(#[case] from: SaleStatus, #[case] to: SaleStatus, #[case] legal: bool) {
        assert_eq!(is_legal_transition(from, to), legal);
    }

    #[test]
    fn contention_maps_to_unit_unavailable() {
        let err = as_unavailable(ServiceError::InvalidTransition("Unit x is SOLD".into()));
        assert!(matches!(err, ServiceError::UnitUnavailable(_)));

        let other = as_unavailable(ServiceError::NotFound("gone".into()));
        assert!(matches!(other, ServiceError::NotFound(_)));
    }

    #[test]
    fn transition_event_carries_both_states() {
        let id = Uuid::new_v4();
        let t = Transition {
            unit_id: id,
            from: SaleStatus::PendingPayment,
            to: SaleStatus::Sold,
        };
        assert_eq!(
            t.event(),
            Event::UnitTransitioned {
                unit_id: id,
                from: SaleStatus::PendingPayment,
                to: SaleStatus::Sold
            }
        );
    }
}
