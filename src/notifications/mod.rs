//! Outbound notifications and receipt dispatch.
//!
//! Both are fire-and-forget: services call them after their transaction commits and
//! only log failures.

use crate::entities::{notification, RelatedEntity};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use strum::{AsRefStr, Display};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Who a notification is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Staff(Uuid),
    Customer(Uuid),
}

impl Recipient {
    fn parts(&self) -> (&'static str, Uuid) {
        match self {
            Recipient::Staff(id) => ("staff", *id),
            Recipient::Customer(id) => ("customer", *id),
        }
    }
}

/// Types of notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    ReservationApproved,
    ReservationRejected,
    ReservationExpired,
    ReturnApproved,
    ReturnRejected,
    TransferApproved,
    TransferRejected,
    RequestPendingApproval,
    NewLead,
    OrderCreated,
    OrderConfirmation,
}

/// Represents a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related: RelatedEntity,
}

impl Notification {
    pub fn new(
        recipient: Recipient,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        related: RelatedEntity,
    ) -> Self {
        Self {
            recipient,
            kind,
            title: title.into(),
            message: message.into(),
            related,
        }
    }
}

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Sends every notification in the batch, logging and skipping failures.
pub async fn deliver_all(sink: &dyn NotificationSink, batch: Vec<Notification>) {
    let results = join_all(batch.iter().map(|notification| sink.notify(notification))).await;
    for (notification, result) in batch.iter().zip(results) {
        if let Err(e) = result {
            warn!(
                kind = %notification.kind,
                recipient = ?notification.recipient,
                error = %e,
                "notification delivery failed"
            );
        }
    }
}

/// Persists notifications to the `notifications` table for in-app display
#[derive(Clone)]
pub struct DbNotificationSink {
    db: Arc<DatabaseConnection>,
}

impl DbNotificationSink {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationSink for DbNotificationSink {
    #[instrument(skip(self, notification), fields(kind = %notification.kind))]
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        let (recipient_kind, recipient_id) = notification.recipient.parts();
        let record = notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            recipient_kind: Set(recipient_kind.to_string()),
            recipient_id: Set(recipient_id),
            kind: Set(notification.kind.as_ref().to_string()),
            title: Set(notification.title.clone()),
            message: Set(notification.message.clone()),
            related: Set(notification.related),
            is_read: Set(false),
            created_at: Set(Utc::now()),
        };
        record.insert(&*self.db).await?;
        Ok(())
    }
}

/// Keeps notifications in memory; handy for embedding and tests
#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, recipient: Recipient) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.recipient == recipient)
            .collect()
    }

    pub fn count_of(&self, kind: NotificationKind) -> usize {
        self.sent().iter().filter(|n| n.kind == kind).count()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .map_err(|_| NotificationError::Delivery("notification buffer poisoned".into()))?
            .push(notification.clone());
        Ok(())
    }
}

/// Generates and sends the customer receipt once an order is paid
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReceiptDispatcher: Send + Sync {
    async fn dispatch(&self, order_id: Uuid) -> Result<(), NotificationError>;
}

/// Dispatches a receipt, logging instead of propagating failures.
pub async fn dispatch_receipt(dispatcher: &dyn ReceiptDispatcher, order_id: Uuid) {
    if let Err(e) = dispatcher.dispatch(order_id).await {
        error!(%order_id, error = %e, "receipt dispatch failed");
    }
}

/// Default dispatcher when no rendering or mail backend is wired in
#[derive(Clone, Default)]
pub struct LoggingReceiptDispatcher;

#[async_trait]
impl ReceiptDispatcher for LoggingReceiptDispatcher {
    async fn dispatch(&self, order_id: Uuid) -> Result<(), NotificationError> {
        info!(%order_id, "receipt ready for delivery");
        Ok(())
    }
}
