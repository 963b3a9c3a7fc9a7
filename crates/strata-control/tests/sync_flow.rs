//! Integration tests for the sync orchestrator and region workers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use strata_control::metrics::{labeled, labels, names};
use strata_control::prelude::*;
use strata_core::prelude::*;
use strata_test_utils::{
    FailingSyncQueue, HybridFixture, RegionVoter, StoreOp, init_test_logging,
};
use tokio::sync::watch;
use tokio_test::assert_ok;

async fn committed_write(fx: &HybridFixture, table: &TableId, files: Vec<FileRef>) -> CommitId {
    fx.seed_onprem_files(&files).await;
    let gate = Arc::new(fx.commit_gate());
    let _onprem = RegionVoter::approving(gate.clone(), fx.onprem.clone());
    let _cloud = RegionVoter::approving(gate.clone(), fx.cloud.clone());
    fx.write_coordinator(gate)
        .execute_write(CommitRequest::append(table.clone(), fx.onprem.clone(), files))
        .await
        .unwrap()
}

#[tokio::test]
async fn write_then_sync_copies_files_to_cloud_path() {
    init_test_logging();
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    committed_write(
        &fx,
        &table,
        vec![
            FileRef::new("staging/orders/part-0.parquet", 16),
            FileRef::new("staging/orders/part-1.parquet", 24),
        ],
    )
    .await;

    let completed = fx.orchestrator().process_pending_events(&fx.cloud).await.unwrap();
    assert_eq!(completed, 2);

    let base = fx.config.table_data_path(&table.namespace, &table.name);
    let copied = fx
        .cloud_store
        .inner()
        .stat(&format!("{base}/part-1.parquet"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(copied.size, 24);
    assert_eq!(fx.metrics.counter(names::SYNC_FILES_COPIED_TOTAL), 2);
    assert_eq!(
        fx.metrics.counter(&labeled(
            names::SYNC_EVENTS_PROCESSED_TOTAL,
            labels::OUTCOME,
            "completed"
        )),
        2
    );

    let history = fx.queue.event_history(&table, &fx.cloud).await.unwrap();
    assert!(history.iter().all(|e| e.status == SyncStatus::Completed));
}

#[tokio::test]
async fn resync_skips_files_already_present() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    let commit = committed_write(
        &fx,
        &table,
        vec![FileRef::new("staging/orders/part-0.parquet", 16)],
    )
    .await;
    fx.orchestrator().process_pending_events(&fx.cloud).await.unwrap();

    fx.queue
        .publish(SyncEvent::new(
            SyncEventType::DataSync,
            table.clone(),
            commit,
            fx.onprem.clone(),
            fx.cloud.clone(),
        ))
        .await
        .unwrap();
    let puts_before = put_count(&fx);
    assert_eq!(
        fx.orchestrator().process_pending_events(&fx.cloud).await.unwrap(),
        1
    );
    assert_eq!(put_count(&fx), puts_before);
}

fn put_count(fx: &HybridFixture) -> usize {
    fx.cloud_store
        .operations()
        .iter()
        .filter(|op| matches!(op, StoreOp::Put { .. }))
        .count()
}

#[tokio::test]
async fn storage_failure_marks_event_failed_without_aborting_batch() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    committed_write(
        &fx,
        &table,
        vec![FileRef::new("staging/orders/part-0.parquet", 16)],
    )
    .await;
    let base = fx.config.table_data_path(&table.namespace, &table.name);
    fx.cloud_store.inject_failure(base.clone());

    let orchestrator = fx.orchestrator();
    assert_eq!(orchestrator.process_pending_events(&fx.cloud).await.unwrap(), 1);

    let failed = fx.queue.failed_events(&fx.cloud).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].event_type, SyncEventType::DataSync);
    assert!(failed[0].last_error.as_deref().unwrap().contains("injected failure"));

    // Retry moves it back to pending and out of the failed list.
    assert_eq!(orchestrator.retry_failed_events(&fx.cloud).await.unwrap(), 1);
    assert!(fx.queue.failed_events(&fx.cloud).await.unwrap().is_empty());
    let pending = fx.queue.pending_events(&fx.cloud).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, failed[0].id);

    fx.cloud_store.clear_failures();
    assert_eq!(orchestrator.process_pending_events(&fx.cloud).await.unwrap(), 1);
    assert!(
        fx.cloud_store
            .inner()
            .stat(&format!("{base}/part-0.parquet"))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn unrecorded_completion_is_not_counted_as_completed() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    committed_write(
        &fx,
        &table,
        vec![FileRef::new("staging/orders/part-0.parquet", 16)],
    )
    .await;

    let queue = Arc::new(FailingSyncQueue::wrapping(fx.queue.clone()));
    queue.fail_transitions_to(SyncStatus::Completed);
    let orchestrator = SyncOrchestrator::new(
        fx.onprem_catalog.clone(),
        fx.registry.clone(),
        queue.clone(),
        fx.stores.clone(),
        fx.metrics.clone(),
    )
    .with_config(fx.config.clone());

    assert_eq!(orchestrator.process_pending_events(&fx.cloud).await.unwrap(), 0);
    let completed = labeled(names::SYNC_EVENTS_PROCESSED_TOTAL, labels::OUTCOME, "completed");
    assert_eq!(fx.metrics.counter(&completed), 0);
    let history = fx.queue.event_history(&table, &fx.cloud).await.unwrap();
    assert!(history.iter().all(|e| e.status == SyncStatus::InProgress));
}

#[tokio::test]
async fn missing_storage_location_fails_data_sync() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    let commit = committed_write(
        &fx,
        &table,
        vec![FileRef::new("staging/orders/part-0.parquet", 16)],
    )
    .await;
    let unknown = RegionId::new("cloud-eu-west");
    let event = SyncEvent::new(
        SyncEventType::DataSync,
        table.clone(),
        commit,
        fx.onprem.clone(),
        unknown.clone(),
    );
    fx.queue.publish(event.clone()).await.unwrap();

    assert_eq!(
        fx.orchestrator().process_pending_events(&unknown).await.unwrap(),
        0
    );
    let stored = fx.queue.get(&event.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SyncStatus::Failed);
}

#[tokio::test]
async fn region_worker_drains_queue_until_shutdown() {
    let config = ControlConfig {
        worker_poll_interval: Duration::from_millis(10),
        ..ControlConfig::default()
    };
    let fx = HybridFixture::with_config(config).await;
    let table = fx.create_table("orders").await;
    committed_write(
        &fx,
        &table,
        vec![FileRef::new("staging/orders/part-0.parquet", 16)],
    )
    .await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = RegionWorker::new(Arc::new(fx.orchestrator()), fx.cloud.clone());
    assert_eq!(worker.region(), &fx.cloud);
    let handle = worker.spawn(shutdown_rx);

    let mut drained = false;
    for _ in 0..100 {
        if fx.queue.pending_events(&fx.cloud).await.unwrap().is_empty() {
            drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(drained, "worker did not drain the queue");

    assert_ok!(shutdown_tx.send(true));
    assert_ok!(handle.await);
}

#[tokio::test]
async fn workers_for_different_regions_run_independently() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    committed_write(
        &fx,
        &table,
        vec![FileRef::new("staging/orders/part-0.parquet", 16)],
    )
    .await;

    let orchestrator = Arc::new(fx.orchestrator());
    let onprem_pass = RegionWorker::new(orchestrator.clone(), fx.onprem.clone())
        .run_once()
        .await
        .unwrap();
    assert_eq!(onprem_pass.completed, 0);
    let cloud_pass = RegionWorker::new(orchestrator, fx.cloud.clone())
        .run_once()
        .await
        .unwrap();
    assert_eq!(cloud_pass.completed, 2);
}
