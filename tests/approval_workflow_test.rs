mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use stockroom_api::{
    entities::{
        audit_log, ApprovalStatus, AuditLog, ProductType, RelatedEntity, ReservationStatus,
        SaleStatus, StaffRole,
    },
    errors::ServiceError,
    notifications::{NotificationKind, Recipient},
    services::ledger::InventoryLedger,
};

#[tokio::test]
async fn approved_reservation_holds_units_for_the_requester() {
    let app = TestApp::new().await;
    let phone = app.product("iPhone 14", ProductType::Phone).await;
    let unit = app.unit(&phone, dec!(90000)).await;
    let salesperson = app.salesperson("Zawadi").await;
    let manager = app.manager("Kariuki").await;

    let request = app
        .services
        .reservations
        .create_reservation(salesperson.id, vec![unit.id], Some("customer viewing".into()))
        .await
        .unwrap();
    assert_eq!(request.request.status, ReservationStatus::Pending);
    // a pending request does not touch stock
    assert_eq!(app.unit_status(unit.id).await, SaleStatus::Available);
    assert_eq!(
        app.notifications
            .count_of(NotificationKind::RequestPendingApproval),
        1
    );

    let approved = app
        .services
        .reservations
        .approve_reservation(request.request.id, manager.id)
        .await
        .unwrap();
    assert_eq!(approved.request.status, ReservationStatus::Approved);
    assert_eq!(approved.request.approved_by, Some(manager.id));
    let expected_expiry = approved.request.approved_at.unwrap() + app.config.reservation_hold();
    assert_eq!(approved.request.expires_at, Some(expected_expiry));

    let held = app.reload_unit(unit.id).await;
    assert_eq!(held.sale_status, SaleStatus::Reserved);
    assert_eq!(held.reserved_by, Some(salesperson.id));
    assert_eq!(held.reserved_until, Some(expected_expiry));
    assert_eq!(
        app.notifications
            .sent_to(Recipient::Staff(salesperson.id))
            .iter()
            .filter(|n| n.kind == NotificationKind::ReservationApproved)
            .count(),
        1
    );

    let audit = AuditLog::find()
        .filter(audit_log::Column::Action.eq("sale_status_change"))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].entity, RelatedEntity::Unit(unit.id));
    assert_eq!(audit[0].actor, format!("staff:{}", manager.id));

    // approving twice is not allowed
    assert_matches!(
        app.services
            .reservations
            .approve_reservation(request.request.id, manager.id)
            .await,
        Err(ServiceError::InvalidTransition(_))
    );
}

#[tokio::test]
async fn reservation_approval_is_all_or_nothing() {
    let app = TestApp::new().await;
    let phone = app.product("OnePlus 12", ProductType::Phone).await;
    let free = app.unit(&phone, dec!(80000)).await;
    let contested = app.unit(&phone, dec!(80000)).await;
    let salesperson = app.salesperson("Makena").await;
    let manager = app.manager("Njoroge").await;

    let request = app
        .services
        .reservations
        .create_reservation(salesperson.id, vec![free.id, contested.id], None)
        .await
        .unwrap();
    // claimed by a walk-in sale before approval
    app.force_status(contested.id, SaleStatus::PendingPayment, None)
        .await;

    assert_matches!(
        app.services
            .reservations
            .approve_reservation(request.request.id, manager.id)
            .await,
        Err(ServiceError::UnitUnavailable(_))
    );
    assert_eq!(app.unit_status(free.id).await, SaleStatus::Available);
    assert_eq!(app.unit_status(contested.id).await, SaleStatus::PendingPayment);
    let still = app
        .services
        .reservations
        .get_reservation(request.request.id)
        .await
        .unwrap();
    assert_eq!(still.request.status, ReservationStatus::Pending);
}

#[tokio::test]
async fn reservation_requires_available_units_and_roles() {
    let app = TestApp::new().await;
    let phone = app.product("Vivo V30", ProductType::Phone).await;
    let unit = app.unit(&phone, dec!(45000)).await;
    let salesperson = app.salesperson("Imani").await;
    let manager = app.manager("Gitau").await;

    assert_matches!(
        app.services
            .reservations
            .create_reservation(salesperson.id, Vec::new(), None)
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        app.services
            .reservations
            .create_reservation(manager.id, vec![unit.id], None)
            .await,
        Err(ServiceError::Forbidden(_))
    );

    let request = app
        .services
        .reservations
        .create_reservation(salesperson.id, vec![unit.id], None)
        .await
        .unwrap();
    assert_matches!(
        app.services
            .reservations
            .approve_reservation(request.request.id, salesperson.id)
            .await,
        Err(ServiceError::Forbidden(_))
    );

    app.force_status(unit.id, SaleStatus::Sold, None).await;
    assert_matches!(
        app.services
            .reservations
            .create_reservation(salesperson.id, vec![unit.id], None)
            .await,
        Err(ServiceError::UnitUnavailable(_))
    );
}

#[tokio::test]
async fn rejected_reservation_leaves_units_alone() {
    let app = TestApp::new().await;
    let phone = app.product("Pixel 7", ProductType::Phone).await;
    let unit = app.unit(&phone, dec!(35000)).await;
    let salesperson = app.salesperson("Wambui").await;
    let superuser = app.staff("Root", StaffRole::Superuser).await;

    let request = app
        .services
        .reservations
        .create_reservation(salesperson.id, vec![unit.id], None)
        .await
        .unwrap();
    let rejected = app
        .services
        .reservations
        .reject_reservation(request.request.id, superuser.id, Some("stock audit".into()))
        .await
        .unwrap();
    assert_eq!(rejected.status, ReservationStatus::Rejected);
    assert_eq!(app.unit_status(unit.id).await, SaleStatus::Available);
    let sent = app.notifications.sent_to(Recipient::Staff(salesperson.id));
    assert!(sent
        .iter()
        .any(|n| n.kind == NotificationKind::ReservationRejected && n.message == "stock audit"));
}

#[tokio::test]
async fn lapsed_reservation_is_released_by_the_sweep() {
    let app = TestApp::new().await;
    let phone = app.product("Galaxy Z Flip", ProductType::Phone).await;
    let held = app.unit(&phone, dec!(110000)).await;
    let sold_meanwhile = app.unit(&phone, dec!(110000)).await;
    let salesperson = app.salesperson("Wekesa").await;
    let manager = app.manager("Mugo").await;

    let request = app
        .services
        .reservations
        .create_reservation(salesperson.id, vec![held.id, sold_meanwhile.id], None)
        .await
        .unwrap();
    app.services
        .reservations
        .approve_reservation(request.request.id, manager.id)
        .await
        .unwrap();
    app.force_status(sold_meanwhile.id, SaleStatus::Sold, None).await;

    // nothing lapses inside the hold
    let early = app.services.sweeps.run(Utc::now() + Duration::days(1)).await.unwrap();
    assert_eq!(early.reservations_expired, 0);
    assert_eq!(app.unit_status(held.id).await, SaleStatus::Reserved);

    let report = app
        .services
        .sweeps
        .run(Utc::now() + Duration::days(3))
        .await
        .unwrap();
    assert_eq!(report.reservations_expired, 1);
    assert_eq!(report.failures, 0);

    let released = app.reload_unit(held.id).await;
    assert_eq!(released.sale_status, SaleStatus::Available);
    assert_eq!(released.reserved_by, None);
    assert_eq!(app.unit_status(sold_meanwhile.id).await, SaleStatus::Sold);
    let detail = app
        .services
        .reservations
        .get_reservation(request.request.id)
        .await
        .unwrap();
    assert_eq!(detail.request.status, ReservationStatus::Expired);
    assert_eq!(
        app.notifications
            .sent_to(Recipient::Staff(salesperson.id))
            .iter()
            .filter(|n| n.kind == NotificationKind::ReservationExpired)
            .count(),
        1
    );

    // a second sweep finds nothing left to do
    let again = app
        .services
        .sweeps
        .run(Utc::now() + Duration::days(3))
        .await
        .unwrap();
    assert_eq!(again.reservations_expired, 0);
}

#[tokio::test]
async fn approved_return_puts_units_back_and_closes_the_reservation() {
    let app = TestApp::new().await;
    let phone = app.product("Galaxy A55", ProductType::Phone).await;
    let unit = app.unit(&phone, dec!(48000)).await;
    let salesperson = app.salesperson("Chege").await;
    let other = app.salesperson("Kemunto").await;
    let manager = app.manager("Ruto").await;

    let request = app
        .services
        .reservations
        .create_reservation(salesperson.id, vec![unit.id], None)
        .await
        .unwrap();
    app.services
        .reservations
        .approve_reservation(request.request.id, manager.id)
        .await
        .unwrap();

    assert_matches!(
        app.services
            .returns
            .create_return(Some(other.id), vec![unit.id], None)
            .await,
        Err(ServiceError::ValidationError(_))
    );

    let ret = app
        .services
        .returns
        .create_return(Some(salesperson.id), vec![unit.id], Some("customer declined".into()))
        .await
        .unwrap();
    assert_eq!(ret.request.status, ApprovalStatus::Pending);
    assert_eq!(app.unit_status(unit.id).await, SaleStatus::Reserved);

    let approved = app
        .services
        .returns
        .approve_return(ret.request.id, manager.id)
        .await
        .unwrap();
    assert_eq!(approved.request.status, ApprovalStatus::Approved);
    let unit_now = app.reload_unit(unit.id).await;
    assert_eq!(unit_now.sale_status, SaleStatus::Available);
    assert_eq!(unit_now.reserved_by, None);
    assert_eq!(
        app.services
            .reservations
            .get_reservation(request.request.id)
            .await
            .unwrap()
            .request
            .status,
        ReservationStatus::Returned
    );
}

#[tokio::test]
async fn return_of_unreserved_unit_is_refused() {
    let app = TestApp::new().await;
    let phone = app.product("Nokia C32", ProductType::Phone).await;
    let unit = app.unit(&phone, dec!(12000)).await;

    assert_matches!(
        app.services.returns.create_return(None, vec![unit.id], None).await,
        Err(ServiceError::InvalidTransition(_))
    );
}

#[tokio::test]
async fn rejected_return_keeps_the_reservation() {
    let app = TestApp::new().await;
    let phone = app.product("Galaxy A35", ProductType::Phone).await;
    let unit = app.unit(&phone, dec!(38000)).await;
    let salesperson = app.salesperson("Nyambura").await;
    let manager = app.manager("Kibet").await;
    app.force_status(unit.id, SaleStatus::Reserved, Some(salesperson.id))
        .await;

    let ret = app
        .services
        .returns
        .create_return(Some(salesperson.id), vec![unit.id], None)
        .await
        .unwrap();
    let rejected = app
        .services
        .returns
        .reject_return(ret.request.id, manager.id, None)
        .await
        .unwrap();
    assert_eq!(rejected.status, ApprovalStatus::Rejected);
    assert_eq!(app.unit_status(unit.id).await, SaleStatus::Reserved);
}

#[tokio::test]
async fn unit_can_be_recorded_as_returned() {
    let app = TestApp::new().await;
    let phone = app.product("Redmi 13C", ProductType::Phone).await;
    let unit = app.unit(&phone, dec!(14000)).await;
    let salesperson = app.salesperson("Langat").await;
    let manager = app.manager("Kamande").await;
    app.force_status(unit.id, SaleStatus::Reserved, Some(salesperson.id))
        .await;

    let transition = app
        .services
        .returns
        .record_unit_returned(unit.id, manager.id, "damaged on display")
        .await
        .unwrap();
    assert_eq!(transition.from, SaleStatus::Reserved);
    assert_eq!(transition.to, SaleStatus::Returned);
    assert_eq!(app.unit_status(unit.id).await, SaleStatus::Returned);
}

#[tokio::test]
async fn approved_transfer_moves_the_holder() {
    let app = TestApp::new().await;
    let phone = app.product("iPhone 13", ProductType::Phone).await;
    let unit = app.unit(&phone, dec!(70000)).await;
    let from = app.salesperson("Owino").await;
    let to = app.salesperson("Jelagat").await;
    let manager = app.manager("Mutiso").await;
    app.force_status(unit.id, SaleStatus::Reserved, Some(from.id)).await;

    assert_matches!(
        app.services
            .transfers
            .request_transfer(unit.id, from.id, from.id, None)
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        app.services
            .transfers
            .request_transfer(unit.id, to.id, from.id, None)
            .await,
        Err(ServiceError::ValidationError(_))
    );

    let transfer = app
        .services
        .transfers
        .request_transfer(unit.id, from.id, to.id, Some("shift change".into()))
        .await
        .unwrap();
    assert_eq!(transfer.status, ApprovalStatus::Pending);
    assert_eq!(app.reload_unit(unit.id).await.reserved_by, Some(from.id));

    let approved = app
        .services
        .transfers
        .approve_transfer(transfer.id, manager.id)
        .await
        .unwrap();
    assert_eq!(approved.status, ApprovalStatus::Approved);
    let moved = app.reload_unit(unit.id).await;
    assert_eq!(moved.sale_status, SaleStatus::Reserved);
    assert_eq!(moved.reserved_by, Some(to.id));
    for salesperson in [from.id, to.id] {
        assert!(app
            .notifications
            .sent_to(Recipient::Staff(salesperson))
            .iter()
            .any(|n| n.kind == NotificationKind::TransferApproved));
    }
}

#[tokio::test]
async fn transfer_approval_fails_when_holder_changed() {
    let app = TestApp::new().await;
    let phone = app.product("iPhone 12", ProductType::Phone).await;
    let unit = app.unit(&phone, dec!(50000)).await;
    let from = app.salesperson("Barasa").await;
    let to = app.salesperson("Anyango").await;
    let manager = app.manager("Mbugua").await;
    app.force_status(unit.id, SaleStatus::Reserved, Some(from.id)).await;

    let transfer = app
        .services
        .transfers
        .request_transfer(unit.id, from.id, to.id, None)
        .await
        .unwrap();
    app.force_status(unit.id, SaleStatus::Available, None).await;

    assert_matches!(
        app.services
            .transfers
            .approve_transfer(transfer.id, manager.id)
            .await,
        Err(ServiceError::UnitUnavailable(_))
    );
    let rejected = app
        .services
        .transfers
        .reject_transfer(transfer.id, manager.id, Some("unit released".into()))
        .await
        .unwrap();
    assert_eq!(rejected.status, ApprovalStatus::Rejected);
}

#[tokio::test]
async fn lapsed_reservation_leaves_units_rereserved_elsewhere() {
    let app = TestApp::new().await;
    let phone = app.product("Pixel 8", ProductType::Phone).await;
    let returned = app.unit(&phone, dec!(85000)).await;
    let still_held = app.unit(&phone, dec!(85000)).await;
    let first_holder = app.salesperson("Nyambura").await;
    let second_holder = app.salesperson("Kiprono").await;
    let manager = app.manager("Omondi").await;

    let first = app
        .services
        .reservations
        .create_reservation(first_holder.id, vec![returned.id, still_held.id], None)
        .await
        .unwrap();
    let first = app
        .services
        .reservations
        .approve_reservation(first.request.id, manager.id)
        .await
        .unwrap();

    let ret = app
        .services
        .returns
        .create_return(Some(first_holder.id), vec![returned.id], None)
        .await
        .unwrap();
    app.services
        .returns
        .approve_return(ret.request.id, manager.id)
        .await
        .unwrap();
    // the other unit keeps the first request open
    assert_eq!(
        app.services
            .reservations
            .get_reservation(first.request.id)
            .await
            .unwrap()
            .request
            .status,
        ReservationStatus::Approved
    );

    let second = app
        .services
        .reservations
        .create_reservation(second_holder.id, vec![returned.id], None)
        .await
        .unwrap();
    let second = app
        .services
        .reservations
        .approve_reservation(second.request.id, manager.id)
        .await
        .unwrap();

    let lapse = first.request.expires_at.unwrap() + Duration::milliseconds(1);
    assert!(app
        .services
        .reservations
        .expire_reservation(first.request.id, lapse)
        .await
        .unwrap());

    let rereserved = app.reload_unit(returned.id).await;
    assert_eq!(rereserved.sale_status, SaleStatus::Reserved);
    assert_eq!(rereserved.reserved_by, Some(second_holder.id));
    assert_eq!(rereserved.reservation_id, Some(second.request.id));
    let released = app.reload_unit(still_held.id).await;
    assert_eq!(released.sale_status, SaleStatus::Available);
    assert_eq!(released.reservation_id, None);

    let statuses = (
        app.services
            .reservations
            .get_reservation(first.request.id)
            .await
            .unwrap()
            .request
            .status,
        app.services
            .reservations
            .get_reservation(second.request.id)
            .await
            .unwrap()
            .request
            .status,
    );
    assert_eq!(statuses, (ReservationStatus::Expired, ReservationStatus::Approved));
}

#[tokio::test]
async fn competing_transfers_of_one_unit_only_move_it_once() {
    let app = TestApp::new().await;
    let phone = app.product("Redmi Note 13", ProductType::Phone).await;
    let unit = app.unit(&phone, dec!(28000)).await;
    let from = app.salesperson("Achieng").await;
    let first_to = app.salesperson("Kimani").await;
    let second_to = app.salesperson("Wanjiku").await;
    let manager = app.manager("Njoroge").await;
    app.force_status(unit.id, SaleStatus::Reserved, Some(from.id)).await;

    let first = app
        .services
        .transfers
        .request_transfer(unit.id, from.id, first_to.id, None)
        .await
        .unwrap();
    let second = app
        .services
        .transfers
        .request_transfer(unit.id, from.id, second_to.id, None)
        .await
        .unwrap();

    app.services
        .transfers
        .approve_transfer(first.id, manager.id)
        .await
        .unwrap();
    assert_matches!(
        app.services
            .transfers
            .approve_transfer(second.id, manager.id)
            .await,
        Err(ServiceError::UnitUnavailable(_))
    );
    assert_eq!(app.reload_unit(unit.id).await.reserved_by, Some(first_to.id));

    // a hand-over that read the old holder cannot overwrite the new one
    assert_matches!(
        InventoryLedger::set_holder(&*app.db, unit.id, from.id, second_to.id).await,
        Err(ServiceError::UnitUnavailable(_))
    );
    let unit_now = app.reload_unit(unit.id).await;
    assert_eq!(unit_now.sale_status, SaleStatus::Reserved);
    assert_eq!(unit_now.reserved_by, Some(first_to.id));
}
