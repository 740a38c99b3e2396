use crate::{
    entities::{
        reservation_request, reservation_request_unit, return_request, return_request_unit, Actor,
        ApprovalStatus, RelatedEntity, ReservationRequest, ReservationRequestUnit,
        ReservationStatus, ReturnRequest, ReturnRequestModel, ReturnRequestUnit, SaleStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{deliver_all, Notification, NotificationKind, NotificationSink, Recipient},
    services::{
        dedupe_ids,
        ledger::{as_unavailable, InventoryLedger, Transition},
        load_units,
        reservations::request_unit_ids,
        staff,
    },
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnDetail {
    pub request: ReturnRequestModel,
    pub unit_ids: Vec<Uuid>,
}

/// Releases reserved units back to stock, subject to manager approval.
#[derive(Clone)]
pub struct ReturnService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    notifier: Arc<dyn NotificationSink>,
}

impl ReturnService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            db,
            event_sender,
            notifier,
        }
    }

    /// Opens a PENDING return for RESERVED units.
    ///
    /// `requested_by` is `None` for system-initiated returns. A salesperson may only
    /// return units they hold.
    #[instrument(skip(self, notes))]
    pub async fn create_return(
        &self,
        requested_by: Option<Uuid>,
        unit_ids: Vec<Uuid>,
        notes: Option<String>,
    ) -> Result<ReturnDetail, ServiceError> {
        let unit_ids = dedupe_ids(unit_ids);
        if unit_ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one inventory unit must be specified".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        if let Some(salesperson_id) = requested_by {
            staff::require_salesperson(&txn, salesperson_id).await?;
        }
        for unit in load_units(&txn, &unit_ids).await? {
            if unit.sale_status != SaleStatus::Reserved {
                return Err(ServiceError::InvalidTransition(format!(
                    "Unit {} is {}, only reserved units can be returned",
                    unit.id, unit.sale_status
                )));
            }
            if let Some(salesperson_id) = requested_by {
                if unit.reserved_by != Some(salesperson_id) {
                    return Err(ServiceError::ValidationError(format!(
                        "Unit {} is not reserved by the requesting salesperson",
                        unit.id
                    )));
                }
            }
        }

        let now = Utc::now();
        let request = return_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            requested_by: Set(requested_by),
            status: Set(ApprovalStatus::Pending),
            approved_by: Set(None),
            approved_at: Set(None),
            notes: Set(notes),
            requested_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        for unit_id in &unit_ids {
            return_request_unit::ActiveModel {
                id: Set(Uuid::new_v4()),
                return_request_id: Set(request.id),
                unit_id: Set(*unit_id),
            }
            .insert(&txn)
            .await?;
        }
        let managers = staff::approvers(&txn).await?;
        txn.commit().await?;

        info!(request_id = %request.id, "return requested");
        self.event_sender
            .send_or_log(Event::ReturnRequested(request.id))
            .await;
        let batch = managers
            .into_iter()
            .map(|manager| {
                Notification::new(
                    Recipient::Staff(manager.id),
                    NotificationKind::RequestPendingApproval,
                    "Return awaiting approval",
                    format!("{} reserved unit(s) proposed for release", unit_ids.len()),
                    RelatedEntity::Return(request.id),
                )
            })
            .collect();
        deliver_all(&*self.notifier, batch).await;

        Ok(ReturnDetail { request, unit_ids })
    }

    /// Approves a PENDING return: every unit RESERVED -> AVAILABLE, or none.
    ///
    /// Approved reservations left with no reserved units are marked RETURNED.
    #[instrument(skip(self))]
    pub async fn approve_return(
        &self,
        request_id: Uuid,
        manager_id: Uuid,
    ) -> Result<ReturnDetail, ServiceError> {
        let txn = self.db.begin().await?;
        staff::require_approver(&txn, manager_id).await?;
        let request = pending_return(&txn, request_id).await?;
        let unit_ids = return_unit_ids(&txn, request_id).await?;

        let transitions = InventoryLedger::transition_all(
            &txn,
            &unit_ids,
            &[SaleStatus::Reserved],
            SaleStatus::Available,
            Actor::Staff(manager_id),
            "return approved",
        )
        .await
        .map_err(as_unavailable)?;
        close_returned_reservations(&txn, &unit_ids).await?;

        let now = Utc::now();
        let mut active: return_request::ActiveModel = request.into();
        active.status = Set(ApprovalStatus::Approved);
        active.approved_by = Set(Some(manager_id));
        active.approved_at = Set(Some(now));
        active.updated_at = Set(now);
        let request = active.update(&txn).await?;
        txn.commit().await?;

        info!(%request_id, units = unit_ids.len(), "return approved");
        let mut events: Vec<Event> = transitions.iter().map(Transition::event).collect();
        events.push(Event::ReturnApproved(request_id));
        self.event_sender.send_all(events).await;
        if let Some(requester) = request.requested_by {
            deliver_all(
                &*self.notifier,
                vec![Notification::new(
                    Recipient::Staff(requester),
                    NotificationKind::ReturnApproved,
                    "Return approved",
                    "The returned units are available for sale again",
                    RelatedEntity::Return(request_id),
                )],
            )
            .await;
        }

        Ok(ReturnDetail { request, unit_ids })
    }

    #[instrument(skip(self, reason))]
    pub async fn reject_return(
        &self,
        request_id: Uuid,
        manager_id: Uuid,
        reason: Option<String>,
    ) -> Result<ReturnRequestModel, ServiceError> {
        let txn = self.db.begin().await?;
        staff::require_approver(&txn, manager_id).await?;
        let request = pending_return(&txn, request_id).await?;

        let mut active: return_request::ActiveModel = request.into();
        active.status = Set(ApprovalStatus::Rejected);
        active.approved_by = Set(Some(manager_id));
        active.updated_at = Set(Utc::now());
        let request = active.update(&txn).await?;
        txn.commit().await?;

        info!(%request_id, "return rejected");
        self.event_sender
            .send_or_log(Event::ReturnRejected(request_id))
            .await;
        if let Some(requester) = request.requested_by {
            deliver_all(
                &*self.notifier,
                vec![Notification::new(
                    Recipient::Staff(requester),
                    NotificationKind::ReturnRejected,
                    "Return rejected",
                    reason.unwrap_or_else(|| "Your return request was rejected".to_string()),
                    RelatedEntity::Return(request_id),
                )],
            )
            .await;
        }
        Ok(request)
    }

    /// Records a reserved unit as physically returned, without re-listing it.
    #[instrument(skip(self, reason))]
    pub async fn record_unit_returned(
        &self,
        unit_id: Uuid,
        manager_id: Uuid,
        reason: &str,
    ) -> Result<Transition, ServiceError> {
        let txn = self.db.begin().await?;
        staff::require_approver(&txn, manager_id).await?;
        let transition = InventoryLedger::transition(
            &txn,
            unit_id,
            &[SaleStatus::Reserved],
            SaleStatus::Returned,
            Actor::Staff(manager_id),
            reason,
        )
        .await?;
        close_returned_reservations(&txn, &[unit_id]).await?;
        txn.commit().await?;

        self.event_sender.send_or_log(transition.event()).await;
        Ok(transition)
    }
}

async fn pending_return<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
) -> Result<ReturnRequestModel, ServiceError> {
    let request = ReturnRequest::find_by_id(request_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Return request {} not found", request_id)))?;
    if request.status != ApprovalStatus::Pending {
        return Err(ServiceError::InvalidTransition(format!(
            "Return request {} is already {:?}",
            request_id, request.status
        )));
    }
    Ok(request)
}

async fn return_unit_ids<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
) -> Result<Vec<Uuid>, ServiceError> {
    Ok(ReturnRequestUnit::find()
        .filter(return_request_unit::Column::ReturnRequestId.eq(request_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|row| row.unit_id)
        .collect())
}

/// Marks APPROVED reservations covering `unit_ids` as RETURNED once none of their
/// units is still held under them.
async fn close_returned_reservations<C: ConnectionTrait>(
    conn: &C,
    unit_ids: &[Uuid],
) -> Result<(), ServiceError> {
    let request_ids: Vec<Uuid> = ReservationRequestUnit::find()
        .filter(reservation_request_unit::Column::UnitId.is_in(unit_ids.iter().copied()))
        .all(conn)
        .await?
        .into_iter()
        .map(|row| row.reservation_request_id)
        .collect();
    if request_ids.is_empty() {
        return Ok(());
    }

    let approved = ReservationRequest::find()
        .filter(reservation_request::Column::Id.is_in(dedupe_ids(request_ids)))
        .filter(reservation_request::Column::Status.eq(ReservationStatus::Approved))
        .all(conn)
        .await?;
    for request in approved {
        let covered = request_unit_ids(conn, request.id).await?;
        let still_reserved = load_units(conn, &covered)
            .await?
            .iter()
            .any(|unit| {
                unit.sale_status == SaleStatus::Reserved && unit.reservation_id == Some(request.id)
            });
        if !still_reserved {
            let mut active: reservation_request::ActiveModel = request.into();
            active.status = Set(ReservationStatus::Returned);
            active.updated_at = Set(Utc::now());
            active.update(conn).await?;
        }
    }
    Ok(())
}
