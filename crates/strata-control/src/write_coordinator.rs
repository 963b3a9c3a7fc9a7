//! Write coordinator: approval, catalog commit, then sync fan-out.
//!
//! ```text
//! request_approval ──► wait(timeout) ──► commit_snapshot ──► publish sync events
//!        │                   │                  │                   │
//!        └───────────────────┴──────────────────┴───────────────────┴──► release_lock
//! ```
//!
//! Once `request_approval` succeeds the commit lock is released on every
//! path. A submission refused by the gate never held the lock and leaves the
//! in-flight holder untouched. A failed attempt is retried by resubmitting
//! with a fresh request time.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ulid::Ulid;

use strata_core::catalog::{Catalog, TableMetadata};
use strata_core::commit::{CommitRequest, OperationKind};
use strata_core::metrics::MetricsSink;
use strata_core::registry::Registry;
use strata_core::snapshot::{Manifest, Snapshot, SnapshotId};
use strata_core::sync_event::{SyncEvent, SyncEventType};
use strata_core::sync_queue::SyncQueue;
use strata_core::{CommitId, Error, RegionId, Result, TableId};

use crate::commit_gate::{ApprovalHandle, CommitGate};
use crate::config::ControlConfig;
use crate::metrics::{labeled, labels, names};

/// Orchestrates one write from approval to sync fan-out.
pub struct WriteCoordinator {
    gate: Arc<CommitGate>,
    catalog: Arc<dyn Catalog>,
    registry: Arc<dyn Registry>,
    queue: Arc<dyn SyncQueue>,
    metrics: Arc<dyn MetricsSink>,
    config: ControlConfig,
}

impl std::fmt::Debug for WriteCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WriteCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(
        gate: Arc<CommitGate>,
        catalog: Arc<dyn Catalog>,
        registry: Arc<dyn Registry>,
        queue: Arc<dyn SyncQueue>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            gate,
            catalog,
            registry,
            queue,
            metrics,
            config: ControlConfig::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ControlConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates a table in the source-of-truth catalog and registers its data
    /// path for `region`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the table exists, or propagates
    /// catalog and registry failures.
    #[tracing::instrument(skip(self, schema), fields(table = %table, region = %region))]
    pub async fn create_table(
        &self,
        table: &TableId,
        schema: Option<String>,
        region: &RegionId,
    ) -> Result<TableMetadata> {
        let metadata = self.catalog.create_table(table, schema, region).await?;
        let path = self.config.table_data_path(&table.namespace, &table.name);
        self.registry
            .register_table_location(table, region, &path)
            .await?;
        tracing::info!(path = %path, "table created");
        Ok(metadata)
    }

    /// Runs one write end to end and returns the new commit id.
    ///
    /// # Errors
    ///
    /// - [`Error::QuorumDenied`] if a required region rejected
    /// - [`Error::Timeout`] if votes did not arrive within the approval timeout
    /// - [`Error::Conflict`] if another commit holds the table, the same
    ///   request is already in flight, or the table moved underneath this one
    /// - [`Error::NotFound`] if the table does not exist
    ///
    /// A lock taken by this call is released in every case.
    #[tracing::instrument(
        skip(self, request),
        fields(table = %request.table, source = %request.source_region, operation = %request.operation)
    )]
    pub async fn execute_write(&self, request: CommitRequest) -> Result<CommitId> {
        let started = Instant::now();
        let result = match self.gate.request_approval(&request).await {
            Ok(handle) => {
                let key = handle.key().clone();
                let result = self.commit(&request, handle, started).await;
                if let Err(e) = self.gate.release_lock(&key).await {
                    tracing::warn!(request = %key, error = %e, "failed to release commit lock");
                }
                result
            }
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(_) => "committed",
            Err(Error::QuorumDenied { .. }) => "rejected",
            Err(Error::Timeout { .. }) => "timeout",
            Err(Error::Conflict { .. }) => "conflict",
            Err(_) => "failed",
        };
        self.metrics
            .increment(&labeled(names::COMMITS_TOTAL, labels::OUTCOME, outcome), 1);

        match &result {
            Ok(commit_id) => tracing::info!(commit = %commit_id, "write committed"),
            Err(e) => tracing::warn!(error = %e, outcome, "write failed"),
        }
        result
    }

    async fn commit(
        &self,
        request: &CommitRequest,
        handle: ApprovalHandle,
        started: Instant,
    ) -> Result<CommitId> {
        let approval = handle.wait(self.config.approval_timeout).await;
        self.metrics.observe(
            names::COMMIT_APPROVAL_SECONDS,
            started.elapsed().as_secs_f64(),
        );
        approval?;

        let parent = self.catalog.latest_snapshot(&request.table).await?;
        let snapshot = self.build_snapshot(request, parent.as_ref(), Utc::now());
        let expected_parent = parent.as_ref().map(|p| p.id.id.as_str());
        let committed = self
            .catalog
            .commit_snapshot(&request.table, snapshot, expected_parent)
            .await?;

        let commit_id = CommitId::new(committed.id);
        self.publish_sync_events(request, &commit_id).await?;
        Ok(commit_id)
    }

    fn build_snapshot(
        &self,
        request: &CommitRequest,
        parent: Option<&Snapshot>,
        now: DateTime<Utc>,
    ) -> Snapshot {
        let snapshot_id = Ulid::new().to_string();
        let sequence = parent.map_or(1, |p| p.id.sequence_number + 1);

        let mut manifests = match (request.operation, parent) {
            (OperationKind::Overwrite, _) | (_, None) => Vec::new(),
            (OperationKind::Append | OperationKind::SchemaUpdate, Some(p)) => p.manifests.clone(),
        };
        if request.has_data_files() {
            let path = format!(
                "{}/metadata/{snapshot_id}.manifest",
                self.config
                    .table_data_path(&request.table.namespace, &request.table.name)
            );
            manifests.push(Manifest::new(path, request.new_data_files.clone()));
        }

        let mut snapshot = Snapshot::new(SnapshotId::new(snapshot_id, sequence, now), manifests)
            .visible_from(now);
        if let Some(p) = parent {
            snapshot = snapshot.with_parent(p.id.id.clone());
        }
        snapshot.schema = request
            .updated_schema
            .clone()
            .or_else(|| parent.and_then(|p| p.schema.clone()));
        snapshot
            .properties
            .insert("operation".into(), request.operation.to_string());
        snapshot
            .properties
            .insert("source-region".into(), request.source_region.to_string());
        snapshot
    }

    async fn publish_sync_events(&self, request: &CommitRequest, commit_id: &CommitId) -> Result<()> {
        let regions = self.registry.table_regions(&request.table).await?;
        for target in regions.into_iter().filter(|r| r != &request.source_region) {
            let metadata = SyncEvent::new(
                SyncEventType::MetadataSync,
                request.table.clone(),
                commit_id.clone(),
                request.source_region.clone(),
                target.clone(),
            );
            self.queue.publish(metadata).await?;

            if request.has_data_files() {
                let data = SyncEvent::new(
                    SyncEventType::DataSync,
                    request.table.clone(),
                    commit_id.clone(),
                    request.source_region.clone(),
                    target.clone(),
                );
                self.queue.publish(data).await?;
            }
            tracing::debug!(target = %target, commit = %commit_id, "sync events published");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use strata_core::catalog::InMemoryCatalog;
    use strata_core::metrics::InMemoryMetrics;
    use strata_core::registry::InMemoryRegistry;
    use strata_core::snapshot::FileRef;
    use strata_core::sync_queue::InMemorySyncQueue;

    struct Setup {
        coordinator: WriteCoordinator,
        catalog: Arc<InMemoryCatalog>,
        queue: Arc<InMemorySyncQueue>,
        metrics: Arc<InMemoryMetrics>,
        table: TableId,
    }

    async fn setup() -> Setup {
        let catalog = Arc::new(InMemoryCatalog::new());
        let registry = Arc::new(InMemoryRegistry::new());
        let queue = Arc::new(InMemorySyncQueue::new());
        let metrics = Arc::new(InMemoryMetrics::new());
        let gate = Arc::new(CommitGate::new(registry.clone(), catalog.clone()));
        let coordinator = WriteCoordinator::new(
            gate,
            catalog.clone(),
            registry.clone(),
            queue.clone(),
            metrics.clone(),
        )
        .with_config(ControlConfig {
            approval_timeout: Duration::from_millis(50),
            ..ControlConfig::default()
        });

        let table = TableId::new("demo", "orders");
        coordinator
            .create_table(&table, Some("id BIGINT".into()), &RegionId::new("onprem"))
            .await
            .unwrap();
        registry
            .register_table_location(&table, &RegionId::new("cloud"), "tables/demo/orders")
            .await
            .unwrap();

        Setup {
            coordinator,
            catalog,
            queue,
            metrics,
            table,
        }
    }

    fn files() -> Vec<FileRef> {
        vec![FileRef::new("tables/demo/orders/f1.parquet", 10)]
    }

    #[tokio::test]
    async fn append_without_required_regions_commits_and_fans_out() {
        let s = setup().await;
        let commit = s
            .coordinator
            .execute_write(CommitRequest::append(s.table.clone(), RegionId::new("onprem"), files()))
            .await
            .unwrap();

        let latest = s.catalog.latest_snapshot(&s.table).await.unwrap().unwrap();
        assert_eq!(latest.id.id, commit.as_str());
        assert_eq!(latest.id.sequence_number, 1);
        assert!(latest.is_visible());
        assert_eq!(latest.schema.as_deref(), Some("id BIGINT"));

        let events = s.queue.pending_events(&RegionId::new("cloud")).await.unwrap();
        let mut kinds: Vec<_> = events.iter().map(|e| e.event_type).collect();
        kinds.sort_by_key(|k| k.to_string());
        assert_eq!(kinds, vec![SyncEventType::DataSync, SyncEventType::MetadataSync]);
        assert!(s.queue.pending_events(&RegionId::new("onprem")).await.unwrap().is_empty());
        assert!(s.catalog.lock_owner(&s.table).unwrap().is_none());
        assert_eq!(s.metrics.counter("strata_commits_total{outcome=committed}"), 1);
    }

    #[tokio::test]
    async fn schema_update_emits_metadata_sync_only_and_keeps_manifests() {
        let s = setup().await;
        s.coordinator
            .execute_write(CommitRequest::append(s.table.clone(), RegionId::new("onprem"), files()))
            .await
            .unwrap();
        let before = s.queue.pending_events(&RegionId::new("cloud")).await.unwrap().len();

        s.coordinator
            .execute_write(CommitRequest::schema_update(
                s.table.clone(),
                RegionId::new("onprem"),
                "id BIGINT, name STRING",
            ))
            .await
            .unwrap();

        let latest = s.catalog.latest_snapshot(&s.table).await.unwrap().unwrap();
        assert_eq!(latest.id.sequence_number, 2);
        assert_eq!(latest.manifests.len(), 1);
        assert_eq!(latest.schema.as_deref(), Some("id BIGINT, name STRING"));
        let after = s.queue.pending_events(&RegionId::new("cloud")).await.unwrap().len();
        assert_eq!(after - before, 1);
    }

    #[tokio::test]
    async fn overwrite_replaces_manifests() {
        let s = setup().await;
        for _ in 0..2 {
            s.coordinator
                .execute_write(CommitRequest::append(s.table.clone(), RegionId::new("onprem"), files()))
                .await
                .unwrap();
        }
        s.coordinator
            .execute_write(CommitRequest::overwrite(
                s.table.clone(),
                RegionId::new("onprem"),
                vec![FileRef::new("tables/demo/orders/g.parquet", 5)],
            ))
            .await
            .unwrap();

        let latest = s.catalog.latest_snapshot(&s.table).await.unwrap().unwrap();
        assert_eq!(latest.manifests.len(), 1);
        assert_eq!(latest.files().count(), 1);
    }

    #[tokio::test]
    async fn unknown_table_fails_and_releases_lock() {
        let s = setup().await;
        let missing = TableId::new("demo", "missing");
        let err = s
            .coordinator
            .execute_write(CommitRequest::append(missing.clone(), RegionId::new("onprem"), files()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(s.catalog.lock_owner(&missing).unwrap().is_none());
        assert_eq!(s.metrics.counter("strata_commits_total{outcome=failed}"), 1);
    }
}
