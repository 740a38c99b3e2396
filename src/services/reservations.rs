use crate::{
    config::AppConfig,
    entities::{
        reservation_request, reservation_request_unit, Actor, RelatedEntity, ReservationRequest,
        ReservationRequestModel, ReservationRequestUnit, ReservationStatus, SaleStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{deliver_all, Notification, NotificationKind, NotificationSink, Recipient},
    services::{
        dedupe_ids, ledger::{as_unavailable, InventoryLedger}, load_units, staff,
    },
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// A reservation request together with the units it covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationDetail {
    pub request: ReservationRequestModel,
    pub unit_ids: Vec<Uuid>,
}

/// Salesperson holds on specific units, approved by an inventory manager.
///
/// Nothing changes on the units until approval. Approval moves every unit
/// AVAILABLE -> RESERVED in one transaction or none of them.
#[derive(Clone)]
pub struct ReservationService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    notifier: Arc<dyn NotificationSink>,
    config: Arc<AppConfig>,
}

impl ReservationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        notifier: Arc<dyn NotificationSink>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            notifier,
            config,
        }
    }

    /// Opens a PENDING request for `unit_ids` on behalf of a salesperson.
    #[instrument(skip(self, notes))]
    pub async fn create_reservation(
        &self,
        salesperson_id: Uuid,
        unit_ids: Vec<Uuid>,
        notes: Option<String>,
    ) -> Result<ReservationDetail, ServiceError> {
        let unit_ids = dedupe_ids(unit_ids);
        if unit_ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one inventory unit must be specified".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        staff::require_salesperson(&txn, salesperson_id).await?;

        for unit in load_units(&txn, &unit_ids).await? {
            if unit.sale_status != SaleStatus::Available {
                return Err(ServiceError::UnitUnavailable(format!(
                    "Unit {} is not available for reservation. Current status: {}",
                    unit.id, unit.sale_status
                )));
            }
            if unit.reserved_by.is_some_and(|holder| holder != salesperson_id) {
                return Err(ServiceError::UnitUnavailable(format!(
                    "Unit {} is already reserved by another salesperson",
                    unit.id
                )));
            }
        }

        let now = Utc::now();
        let request = reservation_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            requested_by: Set(salesperson_id),
            status: Set(ReservationStatus::Pending),
            approved_by: Set(None),
            approved_at: Set(None),
            expires_at: Set(None),
            notes: Set(notes),
            requested_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for unit_id in &unit_ids {
            reservation_request_unit::ActiveModel {
                id: Set(Uuid::new_v4()),
                reservation_request_id: Set(request.id),
                unit_id: Set(*unit_id),
            }
            .insert(&txn)
            .await?;
        }

        let managers = staff::approvers(&txn).await?;
        txn.commit().await?;

        info!(request_id = %request.id, units = unit_ids.len(), "reservation requested");
        self.event_sender
            .send_or_log(Event::ReservationRequested(request.id))
            .await;
        let batch = managers
            .into_iter()
            .map(|manager| {
                Notification::new(
                    Recipient::Staff(manager.id),
                    NotificationKind::RequestPendingApproval,
                    "Reservation awaiting approval",
                    format!("{} unit(s) requested for reservation", unit_ids.len()),
                    RelatedEntity::Reservation(request.id),
                )
            })
            .collect();
        deliver_all(&*self.notifier, batch).await;

        Ok(ReservationDetail { request, unit_ids })
    }

    /// Approves a PENDING request, reserving every unit or none.
    ///
    /// A unit that left AVAILABLE since the request was opened fails the whole
    /// approval with `UnitUnavailable` and the request stays PENDING.
    #[instrument(skip(self))]
    pub async fn approve_reservation(
        &self,
        request_id: Uuid,
        manager_id: Uuid,
    ) -> Result<ReservationDetail, ServiceError> {
        let txn = self.db.begin().await?;
        staff::require_approver(&txn, manager_id).await?;
        let request = pending_request(&txn, request_id).await?;
        let unit_ids = request_unit_ids(&txn, request_id).await?;

        let now = Utc::now();
        let expires_at = now + self.config.reservation_hold();
        let transitions = InventoryLedger::transition_all(
            &txn,
            &unit_ids,
            &[SaleStatus::Available],
            SaleStatus::Reserved,
            Actor::Staff(manager_id),
            "reservation approved",
        )
        .await
        .map_err(as_unavailable)?;
        for unit_id in &unit_ids {
            InventoryLedger::assign_hold(&txn, *unit_id, request.id, request.requested_by, expires_at)
                .await?;
        }

        let mut active: reservation_request::ActiveModel = request.into();
        active.status = Set(ReservationStatus::Approved);
        active.approved_by = Set(Some(manager_id));
        active.approved_at = Set(Some(now));
        active.expires_at = Set(Some(expires_at));
        active.updated_at = Set(now);
        let request = active.update(&txn).await?;

        txn.commit().await?;

        info!(%request_id, %expires_at, "reservation approved");
        let mut events: Vec<Event> = transitions.iter().map(|t| t.event()).collect();
        events.push(Event::ReservationApproved(request_id));
        self.event_sender.send_all(events).await;
        deliver_all(
            &*self.notifier,
            vec![Notification::new(
                Recipient::Staff(request.requested_by),
                NotificationKind::ReservationApproved,
                "Reservation approved",
                format!("Your reservation is held until {}", expires_at.format("%Y-%m-%d %H:%M")),
                RelatedEntity::Reservation(request_id),
            )],
        )
        .await;

        Ok(ReservationDetail { request, unit_ids })
    }

    /// Rejects a PENDING request. Units are untouched.
    #[instrument(skip(self, reason))]
    pub async fn reject_reservation(
        &self,
        request_id: Uuid,
        manager_id: Uuid,
        reason: Option<String>,
    ) -> Result<ReservationRequestModel, ServiceError> {
        let txn = self.db.begin().await?;
        staff::require_approver(&txn, manager_id).await?;
        let request = pending_request(&txn, request_id).await?;

        let now = Utc::now();
        let mut active: reservation_request::ActiveModel = request.into();
        active.status = Set(ReservationStatus::Rejected);
        active.approved_by = Set(Some(manager_id));
        active.updated_at = Set(now);
        let request = active.update(&txn).await?;
        txn.commit().await?;

        info!(%request_id, "reservation rejected");
        self.event_sender
            .send_or_log(Event::ReservationRejected(request_id))
            .await;
        deliver_all(
            &*self.notifier,
            vec![Notification::new(
                Recipient::Staff(request.requested_by),
                NotificationKind::ReservationRejected,
                "Reservation rejected",
                reason.unwrap_or_else(|| "Your reservation request was rejected".to_string()),
                RelatedEntity::Reservation(request_id),
            )],
        )
        .await;

        Ok(request)
    }

    #[instrument(skip(self))]
    pub async fn get_reservation(&self, request_id: Uuid) -> Result<ReservationDetail, ServiceError> {
        let db = &*self.db;
        let request = ReservationRequest::find_by_id(request_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Reservation request {} not found", request_id))
            })?;
        let unit_ids = request_unit_ids(db, request_id).await?;
        Ok(ReservationDetail { request, unit_ids })
    }

    /// APPROVED requests whose hold ended before `as_of`.
    pub async fn expired_reservation_ids(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, ServiceError> {
        Ok(ReservationRequest::find()
            .filter(reservation_request::Column::Status.eq(ReservationStatus::Approved))
            .filter(reservation_request::Column::ExpiresAt.lt(as_of))
            .order_by_asc(reservation_request::Column::ExpiresAt)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect())
    }

    /// Releases the units of one lapsed reservation and marks it EXPIRED.
    ///
    /// Only holds still owned by this request are released; a unit returned and
    /// re-reserved under another request keeps that newer hold. Returns `false`
    /// when the request is not an expired approval.
    #[instrument(skip(self))]
    pub async fn expire_reservation(
        &self,
        request_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;
        let Some(request) = ReservationRequest::find_by_id(request_id).one(&txn).await? else {
            return Ok(false);
        };
        let lapsed = request.status == ReservationStatus::Approved
            && request.expires_at.is_some_and(|expires_at| expires_at < as_of);
        if !lapsed {
            return Ok(false);
        }

        let unit_ids = request_unit_ids(&txn, request_id).await?;
        let mut transitions = Vec::new();
        for unit_id in &unit_ids {
            if let Some(transition) = InventoryLedger::release_reservation_hold(
                &txn,
                *unit_id,
                request_id,
                Actor::System,
                "reservation expired",
            )
            .await?
            {
                transitions.push(transition);
            }
        }

        let requested_by = request.requested_by;
        let mut active: reservation_request::ActiveModel = request.into();
        active.status = Set(ReservationStatus::Expired);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;
        txn.commit().await?;

        info!(%request_id, released = transitions.len(), "reservation expired");
        let mut events: Vec<Event> = transitions.iter().map(|t| t.event()).collect();
        events.push(Event::ReservationExpired(request_id));
        self.event_sender.send_all(events).await;
        deliver_all(
            &*self.notifier,
            vec![Notification::new(
                Recipient::Staff(requested_by),
                NotificationKind::ReservationExpired,
                "Reservation expired",
                "Your reservation hold has lapsed and the units are back in stock",
                RelatedEntity::Reservation(request_id),
            )],
        )
        .await;

        Ok(true)
    }
}

async fn pending_request<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
) -> Result<ReservationRequestModel, ServiceError> {
    let request = ReservationRequest::find_by_id(request_id)
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Reservation request {} not found", request_id))
        })?;
    if request.status != ReservationStatus::Pending {
        return Err(ServiceError::InvalidTransition(format!(
            "Reservation request {} is already {:?}",
            request_id, request.status
        )));
    }
    Ok(request)
}

pub(crate) async fn request_unit_ids<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
) -> Result<Vec<Uuid>, ServiceError> {
    Ok(ReservationRequestUnit::find()
        .filter(reservation_request_unit::Column::ReservationRequestId.eq(request_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|row| row.unit_id)
        .collect())
}
