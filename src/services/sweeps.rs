//! Periodic maintenance: expiry of reservations, leads, unpaid orders and carts.
//!
//! Every item is handled in its own transaction so one bad record cannot stall the
//! rest of the run.

use crate::{
    config::AppConfig,
    entities::{cart, lead, Cart, Lead, LeadStatus},
    errors::ServiceError,
    services::{
        cart::delete_cart, leads::LeadService, orders::OrderService,
        reservations::ReservationService,
    },
};
use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc};
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Counts from one sweep run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub as_of: DateTime<Utc>,
    pub reservations_expired: u64,
    pub leads_expired: u64,
    pub orders_expired: u64,
    pub carts_deleted: u64,
    pub stale_carts_deleted: u64,
    /// Items that failed and were left for the next run
    pub failures: u64,
}

impl SweepReport {
    fn new(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            ..Default::default()
        }
    }

    pub fn total_changes(&self) -> u64 {
        self.reservations_expired
            + self.leads_expired
            + self.orders_expired
            + self.carts_deleted
            + self.stale_carts_deleted
    }
}

#[derive(Clone)]
pub struct SweepService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    reservations: Arc<ReservationService>,
    leads: Arc<LeadService>,
    orders: Arc<OrderService>,
}

impl SweepService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        reservations: Arc<ReservationService>,
        leads: Arc<LeadService>,
        orders: Arc<OrderService>,
    ) -> Self {
        Self {
            db,
            config,
            reservations,
            leads,
            orders,
        }
    }

    /// Runs every sweep once as of `as_of`.
    ///
    /// Only a failure to list candidates aborts the run; per-item failures are
    /// logged and counted in `failures`.
    #[instrument(skip(self))]
    pub async fn run(&self, as_of: DateTime<Utc>) -> Result<SweepReport, ServiceError> {
        let mut report = SweepReport::new(as_of);

        for id in self.reservations.expired_reservation_ids(as_of).await? {
            let expired = self.reservations.expire_reservation(id, as_of).await;
            tally(&mut report.reservations_expired, &mut report.failures, "reservation", id, expired);
        }

        for id in self.leads.stale_lead_ids(as_of).await? {
            let expired = self.leads.expire_lead(id, as_of).await;
            tally(&mut report.leads_expired, &mut report.failures, "lead", id, expired);
        }

        let window = self.config.order_payment_window();
        for id in self.orders.unpaid_order_ids(as_of, window).await? {
            let expired = self.orders.expire_unpaid_order(id).await;
            tally(&mut report.orders_expired, &mut report.failures, "order", id, expired);
        }

        for id in self.expired_cart_ids(as_of).await? {
            let deleted = self.delete_one_cart(id).await;
            tally(&mut report.carts_deleted, &mut report.failures, "cart", id, deleted);
        }

        let cutoff = as_of - self.config.closed_lead_cart_grace();
        for id in self.stale_cart_ids(cutoff).await? {
            let deleted = self.delete_one_cart(id).await;
            tally(&mut report.stale_carts_deleted, &mut report.failures, "submitted cart", id, deleted);
        }

        counter!("stockroom.sweep.reservations_expired", report.reservations_expired);
        counter!("stockroom.sweep.leads_expired", report.leads_expired);
        counter!("stockroom.sweep.orders_expired", report.orders_expired);
        counter!(
            "stockroom.sweep.carts_deleted",
            report.carts_deleted + report.stale_carts_deleted
        );
        counter!("stockroom.sweep.failures", report.failures);
        info!(
            reservations = report.reservations_expired,
            leads = report.leads_expired,
            orders = report.orders_expired,
            carts = report.carts_deleted,
            stale_carts = report.stale_carts_deleted,
            failures = report.failures,
            "sweep finished"
        );
        Ok(report)
    }

    /// Unsubmitted carts past their expiry.
    async fn expired_cart_ids(&self, as_of: DateTime<Utc>) -> Result<Vec<Uuid>, ServiceError> {
        Ok(Cart::find()
            .filter(cart::Column::IsSubmitted.eq(false))
            .filter(cart::Column::ExpiresAt.lt(as_of))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect())
    }

    /// Submitted carts whose lead is finished and which have not changed since `cutoff`.
    async fn stale_cart_ids(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, ServiceError> {
        let finished: Vec<Uuid> = Lead::find()
            .filter(lead::Column::Status.is_in([LeadStatus::Closed, LeadStatus::Expired]))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|l| l.id)
            .collect();
        if finished.is_empty() {
            return Ok(Vec::new());
        }
        Ok(Cart::find()
            .filter(cart::Column::IsSubmitted.eq(true))
            .filter(cart::Column::LeadId.is_in(finished))
            .filter(cart::Column::UpdatedAt.lt(cutoff))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect())
    }

    async fn delete_one_cart(&self, cart_id: Uuid) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;
        delete_cart(&txn, cart_id).await?;
        txn.commit().await?;
        Ok(true)
    }
}

fn tally(
    count: &mut u64,
    failures: &mut u64,
    kind: &'static str,
    id: Uuid,
    result: Result<bool, ServiceError>,
) {
    match result {
        Ok(true) => *count += 1,
        Ok(false) => {}
        Err(e) => {
            *failures += 1;
            error!(kind, %id, error = %e, "sweep item failed");
        }
    }
}

/// Runs `sweep` every `period` until `shutdown` resolves.
pub async fn run_periodically<F>(sweeps: Arc<SweepService>, period: std::time::Duration, shutdown: F)
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sweeps.run(Utc::now()).await {
                    error!(error = %e, "sweep run failed");
                }
            }
            _ = &mut shutdown => {
                info!("sweep loop stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_changes_and_failures_separately() {
        let (mut count, mut failures) = (0, 0);
        let id = Uuid::new_v4();
        tally(&mut count, &mut failures, "lead", id, Ok(true));
        tally(&mut count, &mut failures, "lead", id, Ok(false));
        tally(
            &mut count,
            &mut failures,
            "lead",
            id,
            Err(ServiceError::InternalError("boom".into())),
        );
        assert_eq!((count, failures), (1, 1));
    }

    #[test]
    fn total_changes_ignores_failures() {
        let report = SweepReport {
            reservations_expired: 1,
            leads_expired: 2,
            orders_expired: 3,
            carts_deleted: 4,
            stale_carts_deleted: 5,
            failures: 9,
            ..SweepReport::new(Utc::now())
        };
        assert_eq!(report.total_changes(), 15);
    }
}
