mod support;

use order_sync_engine::{
    db_types::{AuditEventType, LineItem, NewOrder, OrderId, OrderStatus},
    OrderFlowError,
};
use ose_common::MinorUnits;
use support::{block_inserts, claims, coffee_order, payment_token, setup, TestMenu, TestProcessor};

#[tokio::test]
async fn create_and_walk_an_order_through_its_lifecycle() {
    let (_db, orders, _) = setup().await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");

    let order = orders.create_order(&claims, coffee_order("cafe-1"), &menu).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.version, 1);
    assert_eq!(order.seq_no, 1);
    assert_eq!(order.total_price, MinorUnits::from(800));

    let order = orders.update_order_status(&claims, &order.order_id, 1, OrderStatus::Confirmed).await.unwrap();
    let order = orders.update_order_status(&claims, &order.order_id, 2, OrderStatus::Preparing).await.unwrap();
    let order = orders.update_order_status(&claims, &order.order_id, 3, OrderStatus::Ready).await.unwrap();
    let order = orders.update_order_status(&claims, &order.order_id, 4, OrderStatus::Completed).await.unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.version, 5);
}

#[tokio::test]
async fn sequence_numbers_count_per_tenant() {
    let (_db, orders, _) = setup().await;
    let menu = TestMenu::cafe();
    let a = claims("cafe-a");
    let b = claims("cafe-b");

    let first = orders.create_order(&a, coffee_order("cafe-a"), &menu).await.unwrap();
    let second = orders.create_order(&a, coffee_order("cafe-a"), &menu).await.unwrap();
    let other = orders.create_order(&b, coffee_order("cafe-b"), &menu).await.unwrap();
    assert_eq!(first.seq_no, 1);
    assert_eq!(second.seq_no, 2);
    assert_eq!(other.seq_no, 1);
}

#[tokio::test]
async fn declared_total_must_match_the_menu() {
    let (_db, orders, _) = setup().await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");

    let mut order = coffee_order("cafe-1");
    order.declared_total = MinorUnits::from(999);
    let err = orders.create_order(&claims, order, &menu).await.unwrap_err();
    match err {
        OrderFlowError::TotalMismatch { declared, computed } => {
            assert_eq!(declared, MinorUnits::from(999));
            assert_eq!(computed, MinorUnits::from(800));
        },
        e => panic!("Expected TotalMismatch, got {e}"),
    }
}

#[tokio::test]
async fn total_epsilon_absorbs_small_rounding_differences() {
    let (_db, orders, _) = setup().await;
    let orders = orders.with_total_epsilon(MinorUnits::from(1));
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");

    let mut order = coffee_order("cafe-1");
    order.declared_total = MinorUnits::from(799);
    let created = orders.create_order(&claims, order, &menu).await.unwrap();
    // the stored total is the recomputed one, not the declared one
    assert_eq!(created.total_price, MinorUnits::from(800));
}

#[tokio::test]
async fn modifications_are_priced_in() {
    let (_db, orders, _) = setup().await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");

    let items =
        vec![LineItem::new("espresso", 2).with_modifications(vec!["oat milk".to_string(), "extra shot".to_string()])];
    // 2 * (350 + 2 * 50)
    let order = NewOrder::new("cafe-1", "tester", items, MinorUnits::from(900));
    let created = orders.create_order(&claims, order, &menu).await.unwrap();
    assert_eq!(created.total_price, MinorUnits::from(900));
}

#[tokio::test]
async fn unknown_items_cannot_be_ordered() {
    let (_db, orders, _) = setup().await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");

    let items = vec![LineItem::new("unicorn-frappe", 1)];
    let order = NewOrder::new("cafe-1", "tester", items, MinorUnits::from(100));
    let err = orders.create_order(&claims, order, &menu).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Pricing(_)), "Expected a pricing error, got {err}");
}

#[tokio::test]
async fn skipping_a_lifecycle_step_is_rejected() {
    let (_db, orders, _) = setup().await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");

    let order = orders.create_order(&claims, coffee_order("cafe-1"), &menu).await.unwrap();
    let err = orders.update_order_status(&claims, &order.order_id, 1, OrderStatus::Ready).await.unwrap_err();
    match err {
        OrderFlowError::InvalidTransition { from, to } => {
            assert_eq!(from, OrderStatus::Pending);
            assert_eq!(to, OrderStatus::Ready);
        },
        e => panic!("Expected InvalidTransition, got {e}"),
    }
    // the failed attempt wrote nothing
    let current = orders.order(&claims, &order.order_id).await.unwrap().unwrap();
    assert_eq!(current.version, 1);
    assert_eq!(current.status, OrderStatus::Pending);
}

#[tokio::test]
async fn cancelling_keeps_the_row() {
    let (_db, orders, _) = setup().await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");

    let order = orders.create_order(&claims, coffee_order("cafe-1"), &menu).await.unwrap();
    let order = orders.update_order_status(&claims, &order.order_id, 1, OrderStatus::Cancelled).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);

    // still readable, but closed to further mutation
    let stored = orders.order(&claims, &order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    let err = orders.update_order_status(&claims, &order.order_id, 2, OrderStatus::Confirmed).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::InvalidTransition { .. }));
}

#[tokio::test]
async fn cross_tenant_reads_and_writes_look_like_missing_orders() {
    let (_db, orders, _) = setup().await;
    let menu = TestMenu::cafe();
    let owner = claims("cafe-1");
    let intruder = claims("cafe-2");

    let order = orders.create_order(&owner, coffee_order("cafe-1"), &menu).await.unwrap();

    assert!(orders.order(&intruder, &order.order_id).await.unwrap().is_none());
    let err = orders.update_order_status(&intruder, &order.order_id, 1, OrderStatus::Confirmed).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::NotFound), "Expected NotFound, got {err}");
    let err = orders.audit_trail(&intruder, &order.order_id).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::NotFound), "Expected NotFound, got {err}");

    // creating *for* a foreign tenant is refused outright
    let err = orders.create_order(&intruder, coffee_order("cafe-1"), &menu).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::TenantMismatch));
}

#[tokio::test]
async fn audit_trail_is_complete_and_ordered() {
    let (_db, orders, _) = setup().await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");

    let order = orders.create_order(&claims, coffee_order("cafe-1"), &menu).await.unwrap();
    let order = orders.update_order_status(&claims, &order.order_id, 1, OrderStatus::Confirmed).await.unwrap();
    let _ = orders.update_order_status(&claims, &order.order_id, 2, OrderStatus::Preparing).await.unwrap();

    let trail = orders.audit_trail(&claims, &order.order_id).await.unwrap();
    assert_eq!(trail.len(), 3);
    let versions = trail.iter().map(|e| e.order_version).collect::<Vec<_>>();
    assert_eq!(versions, vec![1, 2, 3]);
    assert!(trail.iter().all(|e| e.event_type == AuditEventType::StatusChange));
    assert_eq!(trail[0].payload["to"], "Pending");
    assert_eq!(trail[1].payload["from"], "Pending");
    assert_eq!(trail[1].payload["to"], "Confirmed");
    assert_eq!(trail[2].payload["to"], "Preparing");
}

#[tokio::test]
async fn a_failed_audit_write_rolls_back_the_whole_creation() {
    let (db, orders, _) = setup().await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");

    block_inserts(&db, "audit_log").await;
    let err = orders.create_order(&claims, coffee_order("cafe-1"), &menu).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::StorageUnavailable(_)), "Expected StorageUnavailable, got {err}");

    // no half-created order is visible
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders").fetch_one(db.pool()).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn content_updates_recompute_the_total() {
    let (_db, orders, _) = setup().await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");

    let order = orders.create_order(&claims, coffee_order("cafe-1"), &menu).await.unwrap();
    let change = order_sync_engine::db_types::OrderChange {
        line_items: Some(vec![LineItem::new("muffin", 3)]),
        total_price: None,
        metadata: None,
    };
    let updated = orders.update_order(&claims, &order.order_id, 1, change, &menu).await.unwrap();
    assert_eq!(updated.total_price, MinorUnits::from(1200));
    assert_eq!(updated.version, 2);
    assert_eq!(updated.line_items.len(), 1);

    let trail = orders.audit_trail(&claims, &order.order_id).await.unwrap();
    assert_eq!(trail[1].event_type, AuditEventType::OrderChange);
}

#[tokio::test]
async fn a_total_on_its_own_cannot_rewrite_the_price() {
    let (_db, orders, payments) = setup().await;
    let menu = TestMenu::cafe();
    let claims = claims("cafe-1");
    let processor = TestProcessor::approving();

    let order = orders.create_order(&claims, coffee_order("cafe-1"), &menu).await.unwrap();
    let change = order_sync_engine::db_types::OrderChange {
        line_items: None,
        total_price: Some(MinorUnits::from(1)),
        metadata: None,
    };
    let err = orders.update_order(&claims, &order.order_id, 1, change, &menu).await.unwrap_err();
    match err {
        OrderFlowError::TotalMismatch { declared, computed } => {
            assert_eq!(declared, MinorUnits::from(1));
            assert_eq!(computed, MinorUnits::from(800));
        },
        e => panic!("Expected TotalMismatch, got {e}"),
    }

    // nothing moved, and a payment still charges the real total
    let current = orders.order(&claims, &order.order_id).await.unwrap().unwrap();
    assert_eq!(current.total_price, MinorUnits::from(800));
    assert_eq!(current.version, 1);
    let record = payments
        .submit_payment(&claims, &order.order_id, "pay-rewrite", "card", &payment_token(), &processor)
        .await
        .unwrap();
    assert_eq!(record.amount, MinorUnits::from(800));

    // a lone total that agrees with the stored line items is fine
    let change = order_sync_engine::db_types::OrderChange {
        line_items: None,
        total_price: Some(MinorUnits::from(800)),
        metadata: None,
    };
    let updated = orders.update_order(&claims, &order.order_id, 2, change, &menu).await.unwrap();
    assert_eq!(updated.total_price, MinorUnits::from(800));
}

#[tokio::test]
async fn missing_orders_are_not_found() {
    let (_db, orders, _) = setup().await;
    let claims = claims("cafe-1");
    let ghost = OrderId::from("ord-does-not-exist".to_string());
    assert!(orders.order(&claims, &ghost).await.unwrap().is_none());
    let err = orders.update_order_status(&claims, &ghost, 1, OrderStatus::Confirmed).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::NotFound));
}
