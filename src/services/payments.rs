use crate::{
    config::AppConfig,
    entities::{
        payment, Actor, OrderModel, OrderStatus, Payment, PaymentModel, PaymentStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{dispatch_receipt, ReceiptDispatcher},
    services::{
        ledger::Transition,
        orders::{load_order, release_order, settle_order},
        staff,
    },
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Status reported by the payment provider for a tracking id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive, serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderStatus {
    #[strum(to_string = "SUCCESS", serialize = "COMPLETED")]
    Success,
    Pending,
    #[strum(to_string = "FAILED", serialize = "INVALID")]
    Failed,
    #[strum(to_string = "CANCELED", serialize = "CANCELLED", serialize = "REVERSED")]
    Canceled,
    Expired,
}

/// What a provider report did to the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    Settled,
    AlreadySettled,
    Released,
    AlreadyReleased,
    AmountMismatch { expected: Decimal, reported: Decimal },
    LateSuccessIgnored,
    StillPending,
}

/// Work to do once the settlement transaction has committed
enum AfterCommit {
    Nothing,
    Paid(Vec<Transition>),
    Canceled(Vec<Transition>),
    Mismatch { tracking_id: String },
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    receipts: Arc<dyn ReceiptDispatcher>,
    config: Arc<AppConfig>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        receipts: Arc<dyn ReceiptDispatcher>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            receipts,
            config,
        }
    }

    /// Records the provider tracking id for a pending order.
    #[instrument(skip(self))]
    pub async fn register_payment(
        &self,
        order_id: Uuid,
        tracking_id: &str,
        method: Option<String>,
    ) -> Result<PaymentModel, ServiceError> {
        let tracking_id = tracking_id.trim();
        if tracking_id.is_empty() {
            return Err(ServiceError::ValidationError(
                "Payment tracking id is required".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        if let Some(existing) = find_by_tracking_id(&txn, tracking_id).await? {
            if existing.order_id != order_id {
                return Err(ServiceError::ValidationError(format!(
                    "Tracking id {} already belongs to another order",
                    tracking_id
                )));
            }
            return Ok(existing);
        }
        let order = load_order(&txn, order_id).await?;
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidTransition(format!(
                "Order {} is {:?}; payments can only be registered for pending orders",
                order_id, order.status
            )));
        }
        let payment = insert_payment(&txn, &order, tracking_id, method, PaymentStatus::Pending).await?;
        txn.commit().await?;

        info!(%order_id, tracking_id, amount = %payment.amount, "payment registered");
        Ok(payment)
    }

    /// Applies a provider status report. Safe to call any number of times with the
    /// same report; only the first success settles the order and sends a receipt.
    #[instrument(skip(self))]
    pub async fn apply_provider_status(
        &self,
        tracking_id: &str,
        status: ProviderStatus,
        reported_amount: Option<Decimal>,
    ) -> Result<SettlementOutcome, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let payment = find_by_tracking_id(&txn, tracking_id.trim())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment {} not found", tracking_id))
            })?;
        Payment::update_many()
            .col_expr(
                payment::Column::CallbackCount,
                Expr::col(payment::Column::CallbackCount).add(1),
            )
            .col_expr(payment::Column::LastCallbackAt, Expr::value(Some(now)))
            .filter(payment::Column::Id.eq(payment.id))
            .exec(&txn)
            .await?;
        let order = load_order(&txn, payment.order_id).await?;

        let (outcome, after) = match (status, order.status) {
            (ProviderStatus::Pending, _) => (SettlementOutcome::StillPending, AfterCommit::Nothing),
            (ProviderStatus::Success, OrderStatus::Paid | OrderStatus::Delivered) => {
                (SettlementOutcome::AlreadySettled, AfterCommit::Nothing)
            }
            (ProviderStatus::Success, OrderStatus::Canceled) => {
                warn!(order_id = %order.id, tracking_id, "payment succeeded after the order was canceled");
                (SettlementOutcome::LateSuccessIgnored, AfterCommit::Nothing)
            }
            (ProviderStatus::Success, OrderStatus::Pending) => {
                match reported_amount {
                    Some(reported)
                        if (reported - payment.amount).abs()
                            > self.config.payment_amount_tolerance =>
                    {
                        warn!(
                            order_id = %order.id,
                            tracking_id,
                            expected = %payment.amount,
                            %reported,
                            "reported payment amount does not match"
                        );
                        set_payment_status(&txn, payment.id, PaymentStatus::Failed).await?;
                        (
                            SettlementOutcome::AmountMismatch {
                                expected: payment.amount,
                                reported,
                            },
                            AfterCommit::Mismatch {
                                tracking_id: payment.tracking_id.clone(),
                            },
                        )
                    }
                    _ => match settle_order(&txn, order.id, Actor::PaymentProvider).await? {
                        Some(transitions) => {
                            complete_payment(&txn, payment.id).await?;
                            (SettlementOutcome::Settled, AfterCommit::Paid(transitions))
                        }
                        None => (SettlementOutcome::AlreadySettled, AfterCommit::Nothing),
                    },
                }
            }
            (_, OrderStatus::Paid | OrderStatus::Delivered) => {
                info!(order_id = %order.id, %status, "failure report for a paid order ignored");
                (SettlementOutcome::AlreadySettled, AfterCommit::Nothing)
            }
            (_, OrderStatus::Canceled) => {
                (SettlementOutcome::AlreadyReleased, AfterCommit::Nothing)
            }
            (_, OrderStatus::Pending) => {
                let reason = format!("payment {}", status.to_string().to_lowercase());
                match release_order(&txn, order.id, Actor::PaymentProvider, &reason).await? {
                    Some(transitions) => {
                        (SettlementOutcome::Released, AfterCommit::Canceled(transitions))
                    }
                    None => (SettlementOutcome::AlreadyReleased, AfterCommit::Nothing),
                }
            }
        };
        txn.commit().await?;

        info!(order_id = %order.id, tracking_id, ?outcome, "provider status applied");
        self.after_commit(order.id, after).await;
        Ok(outcome)
    }

    /// Settles a pending order paid in cash at the counter.
    #[instrument(skip(self))]
    pub async fn confirm_cash_payment(
        &self,
        order_id: Uuid,
        staff_id: Uuid,
    ) -> Result<SettlementOutcome, ServiceError> {
        let txn = self.db.begin().await?;
        let member = staff::find_staff(&txn, staff_id).await?;
        if !member.is_active {
            return Err(ServiceError::Forbidden(format!(
                "{} is not an active staff member",
                member.name
            )));
        }
        let order = load_order(&txn, order_id).await?;
        match order.status {
            OrderStatus::Paid | OrderStatus::Delivered => {
                return Ok(SettlementOutcome::AlreadySettled)
            }
            OrderStatus::Canceled => {
                return Err(ServiceError::InvalidTransition(format!(
                    "Order {} was canceled and cannot be paid",
                    order_id
                )))
            }
            OrderStatus::Pending => {}
        }

        let Some(transitions) = settle_order(&txn, order_id, Actor::Staff(staff_id)).await? else {
            return Ok(SettlementOutcome::AlreadySettled);
        };
        let tracking_id = format!("CASH-{}", order_id);
        match find_by_tracking_id(&txn, &tracking_id).await? {
            Some(existing) => complete_payment(&txn, existing.id).await?,
            None => {
                insert_payment(
                    &txn,
                    &order,
                    &tracking_id,
                    Some("cash".to_string()),
                    PaymentStatus::Completed,
                )
                .await?;
            }
        }
        txn.commit().await?;

        info!(%order_id, %staff_id, "cash payment confirmed");
        self.after_commit(order_id, AfterCommit::Paid(transitions))
            .await;
        Ok(SettlementOutcome::Settled)
    }

    pub async fn payments_for_order(&self, order_id: Uuid) -> Result<Vec<PaymentModel>, ServiceError> {
        Ok(Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_asc(payment::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    async fn after_commit(&self, order_id: Uuid, after: AfterCommit) {
        match after {
            AfterCommit::Nothing => {}
            AfterCommit::Paid(transitions) => {
                counter!("stockroom.payments.settled", 1);
                let mut events: Vec<Event> = transitions.iter().map(Transition::event).collect();
                events.push(Event::OrderPaid(order_id));
                self.event_sender.send_all(events).await;
                dispatch_receipt(&*self.receipts, order_id).await;
            }
            AfterCommit::Canceled(transitions) => {
                let mut events: Vec<Event> = transitions.iter().map(Transition::event).collect();
                events.push(Event::OrderCanceled(order_id));
                self.event_sender.send_all(events).await;
            }
            AfterCommit::Mismatch { tracking_id } => {
                error!(%order_id, %tracking_id, "payment flagged for manual review");
                self.event_sender
                    .send_or_log(Event::PaymentAmountMismatch {
                        order_id,
                        tracking_id,
                    })
                    .await;
            }
        }
    }
}

async fn find_by_tracking_id<C: ConnectionTrait>(
    conn: &C,
    tracking_id: &str,
) -> Result<Option<PaymentModel>, ServiceError> {
    Ok(Payment::find()
        .filter(payment::Column::TrackingId.eq(tracking_id))
        .one(conn)
        .await?)
}

async fn insert_payment<C: ConnectionTrait>(
    conn: &C,
    order: &OrderModel,
    tracking_id: &str,
    method: Option<String>,
    status: PaymentStatus,
) -> Result<PaymentModel, ServiceError> {
    let now = Utc::now();
    let completed_at = (status == PaymentStatus::Completed).then_some(now);
    Ok(payment::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        tracking_id: Set(tracking_id.to_string()),
        amount: Set(order.amount_due()),
        status: Set(status),
        method: Set(method),
        callback_count: Set(0),
        last_callback_at: Set(None),
        completed_at: Set(completed_at),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?)
}

async fn set_payment_status<C: ConnectionTrait>(
    conn: &C,
    payment_id: Uuid,
    status: PaymentStatus,
) -> Result<(), ServiceError> {
    Payment::update_many()
        .col_expr(payment::Column::Status, Expr::value(status))
        .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(payment::Column::Id.eq(payment_id))
        .exec(conn)
        .await?;
    Ok(())
}

async fn complete_payment<C: ConnectionTrait>(conn: &C, payment_id: Uuid) -> Result<(), ServiceError> {
    set_payment_status(conn, payment_id, PaymentStatus::Completed).await?;
    Payment::update_many()
        .col_expr(payment::Column::CompletedAt, Expr::value(Some(Utc::now())))
        .filter(payment::Column::Id.eq(payment_id))
        .exec(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case("COMPLETED", ProviderStatus::Success)]
    #[case("success", ProviderStatus::Success)]
    #[case("Failed", ProviderStatus::Failed)]
    #[case("INVALID", ProviderStatus::Failed)]
    #[case("REVERSED", ProviderStatus::Canceled)]
    #[case("cancelled", ProviderStatus::Canceled)]
    #[case("EXPIRED", ProviderStatus::Expired)]
    #[case("pending", ProviderStatus::Pending)]
    fn provider_status_parses_provider_spellings(#[case] raw: &str, #[case] expected: ProviderStatus) {
        assert_eq!(ProviderStatus::from_str(raw).unwrap(), expected);
    }

    #[test]
    fn unknown_provider_status_is_rejected() {
        assert!(ProviderStatus::from_str("MAYBE").is_err());
    }

    #[test]
    fn display_uses_canonical_spelling() {
        assert_eq!(ProviderStatus::Success.to_string(), "SUCCESS");
        assert_eq!(ProviderStatus::Canceled.to_string(), "CANCELED");
        assert_eq!(ProviderStatus::Pending.to_string(), "PENDING");
    }
}
