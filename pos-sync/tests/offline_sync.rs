//! 离线同步集成测试
//!
//! Orders are taken while the backend is unreachable, then the terminal comes
//! back online and the sync worker catches up.

mod common;

use common::{MockBackend, MockDirectory, create_test_manager, immediate_retry, wait_until};
use pos_sync::remote::RemoteError;
use pos_sync::{
    Config, Connectivity, Engine, OrderDraft, OrderIntent, OrderPatch, RetryPolicy, SyncConfig,
    SyncWorker,
};
use rust_decimal::Decimal;
use shared::order::{
    Customer, DeadLetterReason, MutationOp, OrderItem, OrderStatus, OrderType, SyncState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn dine_in_draft() -> OrderDraft {
    OrderDraft {
        order_type: OrderType::dine_in("T7", 4),
        customer: None,
        items: vec![
            OrderItem::new("butter-chicken", 1, Decimal::from(320)),
            OrderItem::new("naan", 4, Decimal::from(40)).with_variant("garlic"),
        ],
    }
}

fn worker_for(
    manager: &pos_sync::OrdersManager,
    backend: Arc<MockBackend>,
    connectivity: &Connectivity,
) -> SyncWorker {
    SyncWorker::new(
        manager.queue().clone(),
        backend,
        connectivity.clone(),
        manager.trigger(),
        SyncConfig::default(),
    )
}

#[tokio::test]
async fn test_offline_create_then_reconnect() {
    let manager = create_test_manager(immediate_retry());
    let backend = Arc::new(MockBackend::default());
    let connectivity = Connectivity::new(false);
    let worker = worker_for(&manager, backend.clone(), &connectivity);

    let order = manager
        .create_order(dine_in_draft(), OrderIntent::New)
        .unwrap();
    assert_eq!(order.total, Decimal::from(504));
    assert_eq!(manager.sync_status(&order.id).unwrap(), SyncState::Unsynced);

    // Offline: nothing leaves the terminal
    assert_eq!(worker.drain().await.attempted(), 0);
    assert_eq!(backend.create_count(), 0);

    connectivity.set_online(true);
    let report = worker.drain().await;
    assert_eq!(report.synced, 1);

    let synced = manager.get_order(&order.id).unwrap().unwrap();
    assert_eq!(synced.sync_state, SyncState::Synced);
    let remote_id = synced.remote_id.clone().unwrap();
    assert_eq!(backend.remote_order(&remote_id).unwrap().id, order.id);
    assert_eq!(synced.sync_history.len(), 1);
    assert_eq!(synced.sync_history[0].operation, MutationOp::Create);
}

#[tokio::test]
async fn test_offline_edits_collapse_into_single_create() {
    let manager = create_test_manager(immediate_retry());
    let backend = Arc::new(MockBackend::default());
    let connectivity = Connectivity::new(false);
    let worker = worker_for(&manager, backend.clone(), &connectivity);

    let order = manager
        .create_order(dine_in_draft(), OrderIntent::Draft)
        .unwrap();
    for quantity in 2..=5 {
        let patch = OrderPatch {
            items: Some(vec![OrderItem::new("butter-chicken", quantity, Decimal::from(320))]),
            ..Default::default()
        };
        manager.update_order(&order.id, patch).unwrap();
    }
    manager.send_ticket(&order.id).unwrap();

    let pending = manager.pending_mutations().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].operation, MutationOp::Create);
    assert_eq!(pending[0].payload.status, OrderStatus::New);

    connectivity.set_online(true);
    worker.drain().await;

    assert_eq!(backend.create_count(), 1);
    assert!(backend.updates.lock().is_empty());
    let remote_id = manager.get_order(&order.id).unwrap().unwrap().remote_id.unwrap();
    let remote = backend.remote_order(&remote_id).unwrap();
    assert_eq!(remote.items[0].quantity, 5);
    assert_eq!(remote.status, OrderStatus::New);
}

#[tokio::test]
async fn test_retries_never_duplicate_create() {
    let manager = create_test_manager(immediate_retry());
    let backend = Arc::new(MockBackend::default());
    let connectivity = Connectivity::new(true);
    let worker = worker_for(&manager, backend.clone(), &connectivity);

    let order = manager
        .create_order(dine_in_draft(), OrderIntent::New)
        .unwrap();
    backend.fail_next(RemoteError::Timeout(Duration::from_secs(10)));
    backend.fail_next(RemoteError::from_status(502, "bad gateway"));

    assert_eq!(worker.drain().await.retried, 1);
    assert_eq!(worker.drain().await.retried, 1);
    assert_eq!(worker.drain().await.synced, 1);

    manager.bill_order(&order.id).unwrap();
    assert_eq!(worker.drain().await.synced, 1);

    // Three create attempts, one accepted, then an update against it
    assert_eq!(backend.create_count(), 3);
    assert_eq!(backend.orders.lock().len(), 1);
    let stored = manager.get_order(&order.id).unwrap().unwrap();
    assert_eq!(*backend.updates.lock(), vec![stored.remote_id.clone().unwrap()]);
    assert_eq!(stored.status, OrderStatus::Billed);
    assert_eq!(stored.sync_history.len(), 2);
}

#[tokio::test]
async fn test_retry_ceiling_dead_letters() {
    let manager = create_test_manager(immediate_retry());
    let backend = Arc::new(MockBackend::default());
    let connectivity = Connectivity::new(true);
    let worker = worker_for(&manager, backend.clone(), &connectivity);

    let order = manager
        .create_order(dine_in_draft(), OrderIntent::New)
        .unwrap();
    let max = RetryPolicy::default().max_attempts;
    for _ in 0..max {
        backend.fail_next(RemoteError::from_status(503, "unavailable"));
    }

    for _ in 1..max {
        assert_eq!(worker.drain().await.retried, 1);
    }
    assert_eq!(worker.drain().await.failed, 1);

    // Out of automatic retry: further drains do nothing
    assert_eq!(worker.drain().await.attempted(), 0);
    assert_eq!(manager.sync_status(&order.id).unwrap(), SyncState::Failed);
    let failed = manager.failed_mutations().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].reason, DeadLetterReason::RetriesExhausted);
    assert_eq!(failed[0].last_error, "Server error 503: unavailable");

    // Manual escalation puts it back
    manager.retry_failed(&order.id).unwrap();
    assert_eq!(worker.drain().await.synced, 1);
    assert_eq!(manager.sync_status(&order.id).unwrap(), SyncState::Synced);
}

#[tokio::test]
async fn test_rejected_write_dead_letters_immediately() {
    let manager = create_test_manager(immediate_retry());
    let backend = Arc::new(MockBackend::default());
    let connectivity = Connectivity::new(true);
    let worker = worker_for(&manager, backend.clone(), &connectivity);

    let order = manager
        .create_order(dine_in_draft(), OrderIntent::New)
        .unwrap();
    backend.fail_next(RemoteError::from_status(400, "table T7 does not exist"));

    assert_eq!(worker.drain().await.failed, 1);
    assert_eq!(backend.create_count(), 1);
    assert_eq!(manager.sync_status(&order.id).unwrap(), SyncState::Failed);
    assert_eq!(
        manager.failed_mutations().unwrap()[0].reason,
        DeadLetterReason::Rejected
    );
}

#[tokio::test]
async fn test_permanent_delete_is_never_written() {
    let manager = create_test_manager(immediate_retry());
    let backend = Arc::new(MockBackend::default());
    let connectivity = Connectivity::new(false);
    let worker = worker_for(&manager, backend.clone(), &connectivity);

    let kept = manager
        .create_order(dine_in_draft(), OrderIntent::New)
        .unwrap();
    let discarded = manager
        .create_order(dine_in_draft(), OrderIntent::Draft)
        .unwrap();
    manager.delete_order_permanently(&discarded.id).unwrap();

    connectivity.set_online(true);
    let report = worker.drain().await;
    assert_eq!(report.synced, 1);
    assert_eq!(*backend.creates.lock(), vec![kept.id.clone()]);
    assert!(manager.get_order(&discarded.id).unwrap().is_none());
}

#[tokio::test]
async fn test_delete_while_in_flight_discards_result() {
    let manager = create_test_manager(immediate_retry());
    let backend = Arc::new(MockBackend::default());
    *backend.latency.lock() = Some(Duration::from_millis(100));
    let connectivity = Connectivity::new(true);
    let worker = worker_for(&manager, backend.clone(), &connectivity);

    let order = manager
        .create_order(dine_in_draft(), OrderIntent::Draft)
        .unwrap();
    let drain = tokio::spawn({
        let worker = worker.clone();
        async move { worker.drain().await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    manager.delete_order_permanently(&order.id).unwrap();

    let report = drain.await.unwrap();
    assert_eq!(report.discarded, 1);
    assert!(manager.get_order(&order.id).unwrap().is_none());
    assert!(manager.pending_mutations().unwrap().is_empty());
}

#[tokio::test]
async fn test_archive_and_restore_sync_as_updates() {
    let manager = create_test_manager(immediate_retry());
    let backend = Arc::new(MockBackend::default());
    let connectivity = Connectivity::new(true);
    let worker = worker_for(&manager, backend.clone(), &connectivity);

    let order = manager
        .create_order(dine_in_draft(), OrderIntent::New)
        .unwrap();
    manager.bill_order(&order.id).unwrap();
    worker.drain().await;

    let archived = manager.archive_order(&order.id).unwrap();
    assert_eq!(archived.original_status, Some(OrderStatus::Billed));
    worker.drain().await;
    let remote_id = archived.remote_id.clone().unwrap();
    assert_eq!(
        backend.remote_order(&remote_id).unwrap().status,
        OrderStatus::Archived
    );

    let restored = manager.restore_order(&order.id).unwrap();
    assert_eq!(restored.status, OrderStatus::Billed);
    assert!(restored.archived_at.is_none());
    worker.drain().await;
    assert_eq!(
        backend.remote_order(&remote_id).unwrap().status,
        OrderStatus::Billed
    );
    assert_eq!(backend.create_count(), 1);
}

#[tokio::test]
async fn test_online_edge_triggers_drain() {
    let manager = create_test_manager(immediate_retry());
    let backend = Arc::new(MockBackend::default());
    let connectivity = Connectivity::new(false);
    let worker = SyncWorker::new(
        manager.queue().clone(),
        backend.clone(),
        connectivity.clone(),
        manager.trigger(),
        SyncConfig {
            interval: Duration::from_secs(3600),
            ..SyncConfig::default()
        },
    );
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    let order = manager
        .create_order(dine_in_draft(), OrderIntent::New)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.create_count(), 0);

    connectivity.set_online(true);
    assert!(
        wait_until(|| manager.sync_status(&order.id).unwrap() == SyncState::Synced).await
    );

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_enrichment_failure_never_blocks_orders() {
    let directory = Arc::new(MockDirectory::default());
    directory.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    let connectivity = Connectivity::new(true);

    let mut manager = create_test_manager(immediate_retry());
    manager.set_enricher(pos_sync::CustomerEnricher::new(
        directory.clone(),
        connectivity,
        Duration::from_millis(200),
    ));

    let draft = OrderDraft {
        customer: Some(Customer {
            name: Some("Meera".into()),
            phone: Some("9811122233".into()),
            email: None,
        }),
        ..dine_in_draft()
    };
    let order = manager.create_order(draft.clone(), OrderIntent::New).unwrap();
    assert_eq!(order.sync_state, SyncState::Unsynced);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(directory.customers.lock().is_empty());

    directory.fail.store(false, std::sync::atomic::Ordering::SeqCst);
    manager.create_order(draft, OrderIntent::New).unwrap();
    assert!(wait_until(|| directory.customers.lock().len() == 1).await);
    assert_eq!(directory.customers.lock()[0].phone, "9811122233");
}

#[tokio::test]
async fn test_edits_do_not_count_as_new_visits() {
    let directory = Arc::new(MockDirectory::default());
    let mut manager = create_test_manager(immediate_retry());
    manager.set_enricher(pos_sync::CustomerEnricher::new(
        directory.clone(),
        Connectivity::new(true),
        Duration::from_millis(200),
    ));

    let draft = OrderDraft {
        customer: Some(Customer {
            name: Some("Arjun".into()),
            phone: Some("98111".into()),
            email: None,
        }),
        ..dine_in_draft()
    };
    let order = manager.create_order(draft, OrderIntent::Draft).unwrap();
    assert!(wait_until(|| directory.customers.lock().len() == 1).await);

    for quantity in 2..=4 {
        let patch = OrderPatch {
            items: Some(vec![OrderItem::new("masala-dosa", quantity, Decimal::from(90))]),
            ..Default::default()
        };
        manager.update_order(&order.id, patch).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let customers = directory.customers.lock();
    assert_eq!(customers.len(), 1);
    assert_eq!(customers[0].total_visits, 1);
}

#[tokio::test]
async fn test_engine_restart_keeps_queue() {
    let dir = tempfile::tempdir().unwrap();
    let work_dir = dir.path().to_string_lossy().to_string();
    let backend = Arc::new(MockBackend::default());

    let order_id = {
        let engine = Engine::open(Config::with_work_dir(&work_dir), backend.clone(), None).unwrap();
        let order = engine
            .manager()
            .create_order(dine_in_draft(), OrderIntent::New)
            .unwrap();
        order.id
    };

    let mut engine = Engine::open(Config::with_work_dir(&work_dir), backend.clone(), None).unwrap();
    assert_eq!(engine.manager().pending_mutations().unwrap().len(), 1);

    engine.start_sync_worker();
    engine.connectivity().set_online(true);
    let manager = engine.manager().clone();
    assert!(wait_until(|| manager.sync_status(&order_id).unwrap() == SyncState::Synced).await);
    assert_eq!(backend.create_count(), 1);

    engine.shutdown().await;
}
