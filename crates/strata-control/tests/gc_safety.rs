//! Integration tests for safety-windowed garbage collection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use strata_control::metrics::names;
use strata_control::prelude::*;
use strata_core::prelude::*;
use strata_test_utils::HybridFixture;

const CANDIDATE: &str = "tables/orders/expired.parquet";

fn plan(table: &TableId, candidates: &[&str], generated_at: DateTime<Utc>) -> DeletePlan {
    DeletePlan::new(
        table.clone(),
        candidates.iter().map(ToString::to_string).collect(),
        generated_at,
        generated_at,
        generated_at + Duration::hours(1),
        vec!["retention-job".into()],
    )
    .unwrap()
}

async fn seed_cloud(fx: &HybridFixture, paths: &[&str]) {
    for path in paths {
        fx.cloud_store
            .inner()
            .put(path, Bytes::from_static(b"stale"))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn cloud_plan_five_minutes_old_waits_seven_minutes_old_deletes() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    seed_cloud(&fx, &[CANDIDATE]).await;
    let now = Utc::now();
    // The mirror last caught up six minutes ago.
    fx.tokens
        .save(&table, ConsistencyToken::new(now - Duration::minutes(6), 7, "inv-v7"))
        .await
        .unwrap();
    let gc = fx.cloud_gc();

    let five_minutes = gc
        .apply_delete_plan_at(
            &plan(&table, &[CANDIDATE], now - Duration::minutes(5)),
            SafetyWindow::default(),
            Side::Cloud,
            now,
        )
        .await
        .unwrap();
    assert!(five_minutes.deleted.is_empty());
    assert_eq!(five_minutes.skipped_watermark, 1);
    assert!(fx.cloud_store.inner().stat(CANDIDATE).await.unwrap().is_some());

    let seven_minutes = gc
        .apply_delete_plan_at(
            &plan(&table, &[CANDIDATE], now - Duration::minutes(7)),
            SafetyWindow::default(),
            Side::Cloud,
            now,
        )
        .await
        .unwrap();
    assert_eq!(seven_minutes.deleted, vec![CANDIDATE.to_string()]);
    assert!(fx.cloud_store.inner().stat(CANDIDATE).await.unwrap().is_none());
}

#[tokio::test]
async fn cloud_side_waits_out_the_cloud_delay() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    seed_cloud(&fx, &[CANDIDATE]).await;
    let now = Utc::now();
    fx.tokens
        .save(&table, ConsistencyToken::new(now, 7, "inv-v7"))
        .await
        .unwrap();
    let window = SafetyWindow::new(60, 360);

    let early = fx
        .cloud_gc()
        .apply_delete_plan_at(
            &plan(&table, &[CANDIDATE], now - Duration::minutes(5)),
            window,
            Side::Cloud,
            now,
        )
        .await
        .unwrap();
    assert_eq!(early.skipped_safety_window, 1);

    // The same age clears the shorter on-prem delay.
    fx.onprem_store
        .put(CANDIDATE, Bytes::from_static(b"stale"))
        .await
        .unwrap();
    let onprem = fx
        .onprem_gc()
        .apply_delete_plan_at(
            &plan(&table, &[CANDIDATE], now - Duration::minutes(5)),
            window,
            Side::OnPrem,
            now,
        )
        .await
        .unwrap();
    assert_eq!(onprem.deleted.len(), 1);
}

#[tokio::test]
async fn default_window_protects_recent_cloud_plans() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    seed_cloud(&fx, &[CANDIDATE]).await;
    let now = Utc::now();
    fx.tokens
        .save(&table, ConsistencyToken::new(now, 1, "inv-v1"))
        .await
        .unwrap();

    let report = fx
        .cloud_gc()
        .apply_delete_plan_at(
            &plan(&table, &[CANDIDATE], now - Duration::minutes(2)),
            fx.config.safety_window,
            Side::Cloud,
            now,
        )
        .await
        .unwrap();
    assert_eq!(report.skipped_safety_window, 1);
    assert!(report.deleted.is_empty());
}

#[tokio::test]
async fn failed_delete_is_counted_and_pass_continues() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    let broken = "tables/orders/locked/a.parquet";
    let fine = "tables/orders/b.parquet";
    seed_cloud(&fx, &[broken, fine]).await;
    fx.cloud_store.inject_failure("tables/orders/locked/");
    let now = Utc::now();
    fx.tokens
        .save(&table, ConsistencyToken::new(now, 1, "inv-v1"))
        .await
        .unwrap();

    let report = fx
        .cloud_gc()
        .apply_delete_plan_at(
            &plan(&table, &[broken, fine], now - Duration::minutes(10)),
            SafetyWindow::default(),
            Side::Cloud,
            now,
        )
        .await
        .unwrap();

    assert_eq!(report.deleted, vec![fine.to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].path, broken);
    assert_eq!(fx.metrics.counter(names::GC_DELETED), 1);
    assert_eq!(fx.metrics.counter(names::GC_DELETE_FAIL), 1);

    // A later pass picks up the leftover once storage recovers.
    fx.cloud_store.clear_failures();
    let retry = fx
        .cloud_gc()
        .apply_delete_plan_at(
            &plan(&table, &[broken], now - Duration::minutes(10)),
            SafetyWindow::default(),
            Side::Cloud,
            now,
        )
        .await
        .unwrap();
    assert_eq!(retry.deleted, vec![broken.to_string()]);
}

#[tokio::test]
async fn onprem_deletes_without_token_but_cloud_does_not() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    seed_cloud(&fx, &[CANDIDATE]).await;
    fx.onprem_store
        .put(CANDIDATE, Bytes::from_static(b"stale"))
        .await
        .unwrap();
    let now = Utc::now();
    let p = plan(&table, &[CANDIDATE], now - Duration::minutes(30));

    let cloud = fx
        .cloud_gc()
        .apply_delete_plan_at(&p, SafetyWindow::default(), Side::Cloud, now)
        .await
        .unwrap();
    assert_eq!(cloud.skipped_watermark, 1);

    let onprem = fx
        .onprem_gc()
        .apply_delete_plan_at(&p, SafetyWindow::default(), Side::OnPrem, now)
        .await
        .unwrap();
    assert_eq!(onprem.deleted.len(), 1);
}

#[tokio::test]
async fn active_leases_are_reported() {
    let fx = HybridFixture::new().await;
    let table = fx.create_table("orders").await;
    seed_cloud(&fx, &[CANDIDATE]).await;
    let leases = fx.lease_registry();
    let lease = leases.acquire(&table, "s-1", "dashboard-query").await.unwrap();
    assert!(leases.is_protected(&table, "s-1").await.unwrap());

    let now = Utc::now();
    fx.tokens
        .save(&table, ConsistencyToken::new(now, 1, "inv-v1"))
        .await
        .unwrap();
    let report = fx
        .cloud_gc()
        .apply_delete_plan_at(
            &plan(&table, &[CANDIDATE], now - Duration::minutes(10)),
            SafetyWindow::default(),
            Side::Cloud,
            now,
        )
        .await
        .unwrap();
    assert_eq!(report.active_leases, 1);

    leases.release(&lease.id).await.unwrap();
    assert!(!leases.is_protected(&table, "s-1").await.unwrap());
}

#[test]
fn gc_report_serializes_camel_case() {
    let report = GcReport {
        skipped_safety_window: 2,
        ..GcReport::default()
    };
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["skippedSafetyWindow"], 2);
    assert_eq!(json["discarded"], false);
}
