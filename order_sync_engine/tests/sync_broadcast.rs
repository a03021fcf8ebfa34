mod support;

use std::{sync::Arc, time::Duration};

use order_sync_engine::{
    db_types::{AuditEventType, OrderStatus},
    events::EventHandlers,
    sync::{OfflineWriteQueue, QueuedWrite, SyncBroadcaster, SyncMessage, Subscription},
    OrderFlowApi,
    OrderFlowError,
    SqliteDatabase,
};
use support::{claims, coffee_order, new_db, setup, TestMenu};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn wired_api(db: SqliteDatabase) -> (Arc<SyncBroadcaster>, OrderFlowApi<SqliteDatabase>) {
    let broadcaster = SyncBroadcaster::new(16);
    let handlers = EventHandlers::new(16, broadcaster.event_hooks());
    let api = OrderFlowApi::new(db, handlers.producers());
    handlers.start_handlers().await;
    (broadcaster, api)
}

async fn recv(sub: &mut Subscription) -> SyncMessage {
    tokio::time::timeout(RECV_TIMEOUT, sub.recv()).await.expect("Timed out waiting for a sync message").unwrap()
}

#[tokio::test]
async fn committed_changes_reach_subscribers_as_full_snapshots() {
    let db = new_db().await;
    let (broadcaster, api) = wired_api(db).await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");
    let mut sub = broadcaster.subscribe("cafe-1").await;

    let order = api.create_order(&claims, coffee_order("cafe-1"), &menu).await.unwrap();
    match recv(&mut sub).await {
        SyncMessage::OrderCreated(snapshot) => {
            assert_eq!(snapshot.order_id, order.order_id);
            assert_eq!(snapshot.version, 1);
        },
        other => panic!("Expected OrderCreated, got {other:?}"),
    }

    let _ = api.update_order_status(&claims, &order.order_id, 1, OrderStatus::Confirmed).await.unwrap();
    match recv(&mut sub).await {
        SyncMessage::OrderUpdated { previous_status, order: snapshot } => {
            assert_eq!(previous_status, OrderStatus::Pending);
            assert_eq!(snapshot.status, OrderStatus::Confirmed);
            assert_eq!(snapshot.version, 2);
        },
        other => panic!("Expected OrderUpdated, got {other:?}"),
    }
}

#[tokio::test]
async fn subscribers_never_see_another_tenants_orders() {
    let db = new_db().await;
    let (broadcaster, api) = wired_api(db).await;
    let menu = TestMenu::cafe();
    let mut sub_a = broadcaster.subscribe("cafe-a").await;
    let mut sub_b = broadcaster.subscribe("cafe-b").await;

    let _ = api.create_order(&claims("cafe-a"), coffee_order("cafe-a"), &menu).await.unwrap();
    let order_b = api.create_order(&claims("cafe-b"), coffee_order("cafe-b"), &menu).await.unwrap();

    let msg_a = recv(&mut sub_a).await;
    assert_eq!(msg_a.order().tenant_id.as_str(), "cafe-a");
    let msg_b = recv(&mut sub_b).await;
    assert_eq!(msg_b.order().tenant_id.as_str(), "cafe-b");
    assert_eq!(msg_b.order().order_id, order_b.order_id);

    // nothing else is waiting for tenant A
    let extra = tokio::time::timeout(Duration::from_millis(200), sub_a.recv()).await;
    assert!(extra.is_err(), "Tenant A must not receive tenant B's order");
}

#[tokio::test]
async fn dropped_subscriptions_are_pruned() {
    let db = new_db().await;
    let (broadcaster, api) = wired_api(db).await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");

    let sub_1 = broadcaster.subscribe("cafe-1").await;
    let mut sub_2 = broadcaster.subscribe("cafe-1").await;
    assert_eq!(broadcaster.subscriber_count(&"cafe-1".into()).await, 2);

    drop(sub_1);
    let _ = api.create_order(&claims, coffee_order("cafe-1"), &menu).await.unwrap();
    let _ = recv(&mut sub_2).await;
    assert_eq!(broadcaster.subscriber_count(&"cafe-1".into()).await, 1);
}

#[tokio::test]
async fn offline_writes_replay_in_order_and_are_tagged() {
    let (_db, orders, _) = setup().await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");

    // the device goes offline with one order already on the server
    let order = orders.create_order(&claims, coffee_order("cafe-1"), &menu).await.unwrap();

    let mut queue = OfflineWriteQueue::new(32);
    queue.queue_write(QueuedWrite::CreateOrder(coffee_order("cafe-1"))).unwrap();
    queue
        .queue_write(QueuedWrite::UpdateStatus { order_id: order.order_id.clone(), new_status: OrderStatus::Confirmed })
        .unwrap();
    queue
        .queue_write(QueuedWrite::UpdateStatus { order_id: order.order_id.clone(), new_status: OrderStatus::Preparing })
        .unwrap();

    let summary = queue.replay(&orders, &claims, &menu).await;
    assert_eq!(summary.applied, 3);
    assert!(summary.rejected.is_empty());
    assert!(summary.interrupted.is_none());
    assert!(queue.is_empty());

    let current = orders.order(&claims, &order.order_id).await.unwrap().unwrap();
    assert_eq!(current.status, OrderStatus::Preparing);

    // the trail marks every replayed write
    let trail = orders.audit_trail(&claims, &order.order_id).await.unwrap();
    let replayed = trail
        .iter()
        .filter(|e| e.event_type == AuditEventType::StatusChange && e.payload["origin"] == "offline-replay")
        .count();
    assert_eq!(replayed, 2);
}

#[tokio::test]
async fn replayed_status_updates_absorb_version_drift() {
    let (_db, orders, _) = setup().await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");

    let order = orders.create_order(&claims, coffee_order("cafe-1"), &menu).await.unwrap();
    // while the device was offline, another device already confirmed the order
    let _ = orders.update_order_status(&claims, &order.order_id, 1, OrderStatus::Confirmed).await.unwrap();

    let mut queue = OfflineWriteQueue::new(32);
    queue
        .queue_write(QueuedWrite::UpdateStatus { order_id: order.order_id.clone(), new_status: OrderStatus::Preparing })
        .unwrap();
    let summary = queue.replay(&orders, &claims, &menu).await;
    assert_eq!(summary.applied, 1);

    let current = orders.order(&claims, &order.order_id).await.unwrap().unwrap();
    assert_eq!(current.status, OrderStatus::Preparing);
    assert_eq!(current.version, 3);
}

#[tokio::test]
async fn replays_the_server_no_longer_admits_are_rejected_not_forced() {
    let (_db, orders, _) = setup().await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");

    let order = orders.create_order(&claims, coffee_order("cafe-1"), &menu).await.unwrap();
    // the order was cancelled while the device was offline
    let _ = orders.update_order_status(&claims, &order.order_id, 1, OrderStatus::Cancelled).await.unwrap();

    let mut queue = OfflineWriteQueue::new(32);
    queue
        .queue_write(QueuedWrite::UpdateStatus { order_id: order.order_id.clone(), new_status: OrderStatus::Confirmed })
        .unwrap();
    queue.queue_write(QueuedWrite::CreateOrder(coffee_order("cafe-1"))).unwrap();
    let summary = queue.replay(&orders, &claims, &menu).await;

    // the impossible transition is surfaced; the rest of the queue still replays
    assert_eq!(summary.applied, 1);
    assert_eq!(summary.rejected.len(), 1);
    assert!(matches!(summary.rejected[0].1, OrderFlowError::InvalidTransition { .. }));
    let current = orders.order(&claims, &order.order_id).await.unwrap().unwrap();
    assert_eq!(current.status, OrderStatus::Cancelled);
}
