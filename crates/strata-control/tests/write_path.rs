//! Integration tests for the write path: quorum, commit, sync fan-out.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use strata_control::metrics::{labeled, labels, names};
use strata_control::prelude::*;
use strata_core::prelude::*;
use strata_test_utils::{HybridFixture, RegionVoter, init_test_logging};

fn new_files(table: &str) -> Vec<FileRef> {
    vec![
        FileRef::new(format!("staging/{table}/part-0.parquet"), 32),
        FileRef::new(format!("staging/{table}/part-1.parquet"), 48),
    ]
}

#[tokio::test]
async fn approved_write_commits_and_fans_out() {
    init_test_logging();
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    let gate = Arc::new(fx.commit_gate());
    let _onprem = RegionVoter::approving(gate.clone(), fx.onprem.clone());
    let _cloud = RegionVoter::approving(gate.clone(), fx.cloud.clone());
    let coordinator = fx.write_coordinator(gate);

    let files = new_files("orders");
    fx.seed_onprem_files(&files).await;
    let commit = coordinator
        .execute_write(CommitRequest::append(table.clone(), fx.onprem.clone(), files))
        .await
        .unwrap();

    let latest = fx.onprem_catalog.latest_snapshot(&table).await.unwrap().unwrap();
    assert_eq!(latest.id.id, commit.as_str());
    assert_eq!(latest.id.sequence_number, 1);
    assert_eq!(latest.files().count(), 2);
    assert!(fx.onprem_catalog.lock_owner(&table).unwrap().is_none());

    let history = fx.queue.event_history(&table, &fx.cloud).await.unwrap();
    let kinds: Vec<_> = history.iter().map(|e| e.event_type).collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&SyncEventType::MetadataSync));
    assert!(kinds.contains(&SyncEventType::DataSync));
    assert!(
        fx.queue
            .event_history(&table, &fx.onprem)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        fx.metrics
            .counter(&labeled(names::COMMITS_TOTAL, labels::OUTCOME, "committed")),
        1
    );
    assert_eq!(fx.metrics.observations(names::COMMIT_APPROVAL_SECONDS).len(), 1);
}

#[tokio::test]
async fn schema_update_publishes_metadata_sync_only() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    let gate = Arc::new(fx.commit_gate());
    let _onprem = RegionVoter::approving(gate.clone(), fx.onprem.clone());
    let _cloud = RegionVoter::approving(gate.clone(), fx.cloud.clone());
    let coordinator = fx.write_coordinator(gate);

    coordinator
        .execute_write(CommitRequest::schema_update(
            table.clone(),
            fx.onprem.clone(),
            r#"{"fields":[{"name":"id","type":"long"}]}"#,
        ))
        .await
        .unwrap();

    let history = fx.queue.event_history(&table, &fx.cloud).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event_type, SyncEventType::MetadataSync);
    let latest = fx.onprem_catalog.latest_snapshot(&table).await.unwrap().unwrap();
    assert!(latest.schema.is_some());
}

#[tokio::test]
async fn rejected_write_surfaces_region_and_releases_lock() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    let gate = Arc::new(fx.commit_gate());
    let _onprem = RegionVoter::approving(gate.clone(), fx.onprem.clone());
    let cloud = RegionVoter::rejecting(gate.clone(), fx.cloud.clone(), "schema drift");
    let coordinator = fx.write_coordinator(gate.clone());

    let err = coordinator
        .execute_write(CommitRequest::append(
            table.clone(),
            fx.onprem.clone(),
            new_files("orders"),
        ))
        .await
        .unwrap_err();
    match err {
        Error::QuorumDenied { region, reason } => {
            assert_eq!(region, fx.cloud.to_string());
            assert_eq!(reason, "schema drift");
        }
        other => panic!("expected QuorumDenied, got {other:?}"),
    }
    assert!(fx.onprem_catalog.lock_owner(&table).unwrap().is_none());
    assert!(fx.onprem_catalog.latest_snapshot(&table).await.unwrap().is_none());
    assert!(fx.queue.event_history(&table, &fx.cloud).await.unwrap().is_empty());

    // A fresh attempt goes through once the region approves.
    drop(cloud);
    let _cloud = RegionVoter::approving(gate, fx.cloud.clone());
    coordinator
        .execute_write(CommitRequest::append(
            table.clone(),
            fx.onprem.clone(),
            new_files("orders"),
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn approval_timeout_releases_lock() {
    let config = ControlConfig {
        approval_timeout: Duration::from_millis(100),
        ..ControlConfig::default()
    };
    let fx = HybridFixture::with_config(config).await;
    let table = fx.create_table("orders").await;
    let gate = Arc::new(fx.commit_gate());
    let _onprem = RegionVoter::approving(gate.clone(), fx.onprem.clone());
    let coordinator = fx.write_coordinator(gate.clone());

    let err = coordinator
        .execute_write(CommitRequest::append(
            table.clone(),
            fx.onprem.clone(),
            new_files("orders"),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert!(err.is_retryable());
    assert!(fx.onprem_catalog.lock_owner(&table).unwrap().is_none());
    assert_eq!(
        fx.metrics
            .counter(&labeled(names::COMMITS_TOTAL, labels::OUTCOME, "timeout")),
        1
    );

    let _cloud = RegionVoter::approving(gate, fx.cloud.clone());
    coordinator
        .execute_write(CommitRequest::append(
            table.clone(),
            fx.onprem.clone(),
            new_files("orders"),
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn duplicate_submit_does_not_disturb_in_flight_write() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    let gate = Arc::new(fx.commit_gate());
    let _onprem = RegionVoter::approving(gate.clone(), fx.onprem.clone());
    let coordinator = Arc::new(fx.write_coordinator(gate.clone()));

    let request = CommitRequest::append(table.clone(), fx.onprem.clone(), new_files("orders"));
    let original = tokio::spawn({
        let coordinator = coordinator.clone();
        let request = request.clone();
        async move { coordinator.execute_write(request).await }
    });
    while gate.pending_requests(&fx.cloud).unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let err = coordinator.execute_write(request.clone()).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
    assert!(fx.onprem_catalog.lock_owner(&table).unwrap().is_some());
    assert_eq!(gate.pending_requests(&fx.cloud).unwrap(), vec![request]);

    let _cloud = RegionVoter::approving(gate, fx.cloud.clone());
    let commit = original.await.unwrap().unwrap();
    let latest = fx.onprem_catalog.latest_snapshot(&table).await.unwrap().unwrap();
    assert_eq!(latest.id.id, commit.as_str());
    assert!(fx.onprem_catalog.lock_owner(&table).unwrap().is_none());
    assert_eq!(
        fx.metrics
            .counter(&labeled(names::COMMITS_TOTAL, labels::OUTCOME, "conflict")),
        1
    );
}

#[tokio::test]
async fn sequential_appends_chain_parents() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    let gate = Arc::new(fx.commit_gate());
    let _onprem = RegionVoter::approving(gate.clone(), fx.onprem.clone());
    let _cloud = RegionVoter::approving(gate.clone(), fx.cloud.clone());
    let coordinator = fx.write_coordinator(gate);

    let first = coordinator
        .execute_write(CommitRequest::append(
            table.clone(),
            fx.onprem.clone(),
            vec![FileRef::new("staging/a.parquet", 1)],
        ))
        .await
        .unwrap();
    coordinator
        .execute_write(CommitRequest::append(
            table.clone(),
            fx.onprem.clone(),
            vec![FileRef::new("staging/b.parquet", 1)],
        ))
        .await
        .unwrap();

    let latest = fx.onprem_catalog.latest_snapshot(&table).await.unwrap().unwrap();
    assert_eq!(latest.id.sequence_number, 2);
    assert_eq!(latest.parent_id.as_deref(), Some(first.as_str()));
    assert_eq!(latest.files().count(), 2);
}

#[derive(Debug, Clone, Copy)]
enum Ballot {
    Approve(usize),
    Reject(usize),
}

fn ballot() -> impl Strategy<Value = Ballot> {
    prop_oneof![
        (0usize..3).prop_map(Ballot::Approve),
        (0usize..3).prop_map(Ballot::Reject),
    ]
}

proptest! {
    #[test]
    fn quorum_needs_every_region_and_no_rejection(ballots in proptest::collection::vec(ballot(), 0..12)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let regions = [RegionId::new("a"), RegionId::new("b"), RegionId::new("c")];
            let registry = Arc::new(InMemoryRegistry::new());
            let table = TableId::new("demo", "quorum");
            registry
                .set_required_regions(&table, regions.to_vec())
                .await
                .unwrap();
            let gate = CommitGate::new(registry, Arc::new(InMemoryCatalog::new()));
            let request = CommitRequest::append(table, regions[0].clone(), vec![]);
            let _handle = gate.request_approval(&request).await.unwrap();
            let key = request.key();

            let mut approved = [false; 3];
            let mut rejected = false;
            for ballot in &ballots {
                match *ballot {
                    Ballot::Approve(i) => {
                        if gate.approve(&key, &regions[i]).is_ok() {
                            approved[i] = true;
                        }
                    }
                    Ballot::Reject(i) => {
                        gate.reject(&key, &regions[i], "no").unwrap();
                        rejected = true;
                    }
                }
            }

            let expected = !rejected && approved.iter().all(|a| *a);
            prop_assert_eq!(gate.is_approved(&key).unwrap(), expected);
            if rejected {
                prop_assert!(
                    matches!(gate.status(&key).unwrap(), QuorumStatus::Rejected { .. }),
                    "rejection must be terminal"
                );
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
