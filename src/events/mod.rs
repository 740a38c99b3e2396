use crate::entities::SaleStatus;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Domain events published after the owning transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Ledger events
    UnitTransitioned {
        unit_id: Uuid,
        from: SaleStatus,
        to: SaleStatus,
    },
    ReservationHolderChanged {
        unit_id: Uuid,
        from_salesperson: Uuid,
        to_salesperson: Uuid,
    },

    // Approval workflow events
    ReservationRequested(Uuid),
    ReservationApproved(Uuid),
    ReservationRejected(Uuid),
    ReservationExpired(Uuid),
    ReturnRequested(Uuid),
    ReturnApproved(Uuid),
    ReturnRejected(Uuid),
    TransferRequested(Uuid),
    TransferApproved(Uuid),
    TransferRejected(Uuid),

    // Pipeline events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, unit_id: Uuid },
    CartItemRemoved { cart_id: Uuid, item_id: Uuid },
    LeadCreated { lead_id: Uuid, reference: String },
    LeadClaimed { lead_id: Uuid, salesperson: Uuid },
    LeadContacted(Uuid),
    LeadClosed(Uuid),
    LeadExpired(Uuid),
    LeadConverted { lead_id: Uuid, order_id: Uuid },
    OrderCreated(Uuid),
    OrderPaid(Uuid),
    OrderCanceled(Uuid),
    OrderDelivered(Uuid),
    PaymentAmountMismatch { order_id: Uuid, tracking_id: String },
}

impl Event {
    /// Short, stable name used for metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            Event::UnitTransitioned { .. } => "unit_transitioned",
            Event::ReservationHolderChanged { .. } => "reservation_holder_changed",
            Event::ReservationRequested(_) => "reservation_requested",
            Event::ReservationApproved(_) => "reservation_approved",
            Event::ReservationRejected(_) => "reservation_rejected",
            Event::ReservationExpired(_) => "reservation_expired",
            Event::ReturnRequested(_) => "return_requested",
            Event::ReturnApproved(_) => "return_approved",
            Event::ReturnRejected(_) => "return_rejected",
            Event::TransferRequested(_) => "transfer_requested",
            Event::TransferApproved(_) => "transfer_approved",
            Event::TransferRejected(_) => "transfer_rejected",
            Event::CartCreated(_) => "cart_created",
            Event::CartItemAdded { .. } => "cart_item_added",
            Event::CartItemRemoved { .. } => "cart_item_removed",
            Event::LeadCreated { .. } => "lead_created",
            Event::LeadClaimed { .. } => "lead_claimed",
            Event::LeadContacted(_) => "lead_contacted",
            Event::LeadClosed(_) => "lead_closed",
            Event::LeadExpired(_) => "lead_expired",
            Event::LeadConverted { .. } => "lead_converted",
            Event::OrderCreated(_) => "order_created",
            Event::OrderPaid(_) => "order_paid",
            Event::OrderCanceled(_) => "order_canceled",
            Event::OrderDelivered(_) => "order_delivered",
            Event::PaymentAmountMismatch { .. } => "payment_amount_mismatch",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    ///
    /// State changes are already committed when events go out, so a dead
    /// consumer must not surface as an error to the caller.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "dropping domain event");
        }
    }

    pub async fn send_all(&self, events: Vec<Event>) {
        for event in events {
            self.send_or_log(event).await;
        }
    }
}

/// Consumes the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("stockroom.events.processed", 1, "event" => event.name());
        match &event {
            Event::UnitTransitioned { unit_id, from, to } => {
                info!(%unit_id, %from, %to, "unit state changed");
            }
            Event::PaymentAmountMismatch {
                order_id,
                tracking_id,
            } => {
                warn!(%order_id, tracking_id = %tracking_id, "payment amount mismatch reported");
            }
            other => debug!("Received event: {:?}", other),
        }
    }

    info!("Event channel closed; stopping event processing loop");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_survives_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        // must not panic or error
        sender.send_or_log(Event::OrderPaid(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();
        sender
            .send_all(vec![Event::OrderCreated(order_id), Event::OrderPaid(order_id)])
            .await;

        assert_eq!(rx.recv().await, Some(Event::OrderCreated(order_id)));
        assert_eq!(rx.recv().await, Some(Event::OrderPaid(order_id)));
    }
}
