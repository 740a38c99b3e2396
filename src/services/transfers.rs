use crate::{
    entities::{
        unit_transfer, ApprovalStatus, InventoryUnit, RelatedEntity, SaleStatus, UnitTransfer,
        UnitTransferModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{deliver_all, Notification, NotificationKind, NotificationSink, Recipient},
    services::{ledger::InventoryLedger, staff},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Hands a reserved unit from one salesperson to another.
///
/// The unit stays RESERVED throughout; only its holder changes, and only once a
/// manager approves.
#[derive(Clone)]
pub struct TransferService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    notifier: Arc<dyn NotificationSink>,
}

impl TransferService {
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

    #[instrument(skip(self, notes))]
    pub async fn request_transfer(
        &self,
        unit_id: Uuid,
        from_salesperson: Uuid,
        to_salesperson: Uuid,
        notes: Option<String>,
    ) -> Result<UnitTransferModel, ServiceError> {
        if from_salesperson == to_salesperson {
            return Err(ServiceError::ValidationError(
                "Cannot transfer a unit to the salesperson already holding it".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        staff::require_salesperson(&txn, from_salesperson).await?;
        staff::require_salesperson(&txn, to_salesperson).await?;
        ensure_held_by(&txn, unit_id, from_salesperson).await?;

        let now = Utc::now();
        let transfer = unit_transfer::ActiveModel {
            id: Set(Uuid::new_v4()),
            unit_id: Set(unit_id),
            from_salesperson: Set(from_salesperson),
            to_salesperson: Set(to_salesperson),
            status: Set(ApprovalStatus::Pending),
            approved_by: Set(None),
            approved_at: Set(None),
            notes: Set(notes),
            requested_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        let managers = staff::approvers(&txn).await?;
        txn.commit().await?;

        info!(transfer_id = %transfer.id, %unit_id, "transfer requested");
        self.event_sender
            .send_or_log(Event::TransferRequested(transfer.id))
            .await;
        let batch = managers
            .into_iter()
            .map(|manager| {
                Notification::new(
                    Recipient::Staff(manager.id),
                    NotificationKind::RequestPendingApproval,
                    "Transfer awaiting approval",
                    format!("Reserved unit {} proposed for hand-over", unit_id),
                    RelatedEntity::Transfer(transfer.id),
                )
            })
            .collect();
        deliver_all(&*self.notifier, batch).await;

        Ok(transfer)
    }

    /// Moves the reservation holder. Fails with `UnitUnavailable` if the unit is no
    /// longer reserved by the original salesperson.
    #[instrument(skip(self))]
    pub async fn approve_transfer(
        &self,
        transfer_id: Uuid,
        manager_id: Uuid,
    ) -> Result<UnitTransferModel, ServiceError> {
        let txn = self.db.begin().await?;
        staff::require_approver(&txn, manager_id).await?;
        let transfer = pending_transfer(&txn, transfer_id).await?;
        ensure_held_by(&txn, transfer.unit_id, transfer.from_salesperson)
            .await
            .map_err(|e| match e {
                ServiceError::ValidationError(msg) => ServiceError::UnitUnavailable(msg),
                other => other,
            })?;
        InventoryLedger::set_holder(
            &txn,
            transfer.unit_id,
            transfer.from_salesperson,
            transfer.to_salesperson,
        )
        .await?;

        let now = Utc::now();
        let mut active: unit_transfer::ActiveModel = transfer.into();
        active.status = Set(ApprovalStatus::Approved);
        active.approved_by = Set(Some(manager_id));
        active.approved_at = Set(Some(now));
        active.updated_at = Set(now);
        let transfer = active.update(&txn).await?;
        txn.commit().await?;

        info!(%transfer_id, unit_id = %transfer.unit_id, "transfer approved");
        self.event_sender
            .send_all(vec![
                Event::ReservationHolderChanged {
                    unit_id: transfer.unit_id,
                    from_salesperson: transfer.from_salesperson,
                    to_salesperson: transfer.to_salesperson,
                },
                Event::TransferApproved(transfer_id),
            ])
            .await;
        let batch = [transfer.from_salesperson, transfer.to_salesperson]
            .into_iter()
            .map(|salesperson| {
                Notification::new(
                    Recipient::Staff(salesperson),
                    NotificationKind::TransferApproved,
                    "Transfer approved",
                    format!("Unit {} now belongs to the receiving salesperson", transfer.unit_id),
                    RelatedEntity::Transfer(transfer_id),
                )
            })
            .collect();
        deliver_all(&*self.notifier, batch).await;

        Ok(transfer)
    }

    #[instrument(skip(self, reason))]
    pub async fn reject_transfer(
        &self,
        transfer_id: Uuid,
        manager_id: Uuid,
        reason: Option<String>,
    ) -> Result<UnitTransferModel, ServiceError> {
        let txn = self.db.begin().await?;
        staff::require_approver(&txn, manager_id).await?;
        let transfer = pending_transfer(&txn, transfer_id).await?;

        let mut active: unit_transfer::ActiveModel = transfer.into();
        active.status = Set(ApprovalStatus::Rejected);
        active.approved_by = Set(Some(manager_id));
        active.updated_at = Set(Utc::now());
        let transfer = active.update(&txn).await?;
        txn.commit().await?;

        info!(%transfer_id, "transfer rejected");
        self.event_sender
            .send_or_log(Event::TransferRejected(transfer_id))
            .await;
        deliver_all(
            &*self.notifier,
            vec![Notification::new(
                Recipient::Staff(transfer.from_salesperson),
                NotificationKind::TransferRejected,
                "Transfer rejected",
                reason.unwrap_or_else(|| "Your transfer request was rejected".to_string()),
                RelatedEntity::Transfer(transfer_id),
            )],
        )
        .await;

        Ok(transfer)
    }
}

async fn ensure_held_by<C: ConnectionTrait>(
    conn: &C,
    unit_id: Uuid,
    salesperson: Uuid,
) -> Result<(), ServiceError> {
    let unit = InventoryUnit::find_by_id(unit_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Inventory unit {} not found", unit_id)))?;
    if unit.sale_status != SaleStatus::Reserved || unit.reserved_by != Some(salesperson) {
        return Err(ServiceError::ValidationError(format!(
            "Unit {} is not reserved by salesperson {}",
            unit_id, salesperson
        )));
    }
    Ok(())
}

async fn pending_transfer<C: ConnectionTrait>(
    conn: &C,
    transfer_id: Uuid,
) -> Result<UnitTransferModel, ServiceError> {
    let transfer = UnitTransfer::find_by_id(transfer_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Transfer {} not found", transfer_id)))?;
    if transfer.status != ApprovalStatus::Pending {
        return Err(ServiceError::InvalidTransition(format!(
            "Transfer {} is already {:?}",
            transfer_id, transfer.status
        )));
    }
    Ok(transfer)
}
