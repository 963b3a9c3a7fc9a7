//! Sync orchestrator and region worker loop.
//!
//! Each event for a target region moves through
//! `PENDING -> IN_PROGRESS -> COMPLETED | FAILED`. A failing event is marked
//! `FAILED` and the batch moves on; [`SyncOrchestrator::retry_failed_events`]
//! puts failed events back to `PENDING` for a later pass.
//!
//! Data sync places each file at its path relative to the source table's data
//! path, under the target table's data path. Files outside the source table
//! root land by file name; two such files sharing a name fail the event
//! rather than overwrite or drop one another.
//!
//! Workers for different regions share no locks. Two workers racing on the
//! same event are arbitrated by the queue: only one wins the
//! `PENDING -> IN_PROGRESS` transition.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use strata_core::catalog::Catalog;
use strata_core::metrics::MetricsSink;
use strata_core::object_store::ObjectStoreProvider;
use strata_core::observability::{region_span, table_span};
use strata_core::region::StorageKind;
use strata_core::registry::Registry;
use strata_core::snapshot::{FileRef, Snapshot};
use strata_core::sync_event::{SyncEvent, SyncEventType, SyncStatus};
use strata_core::sync_queue::SyncQueue;
use strata_core::{Error, RegionId, Result, TableId};

use crate::config::ControlConfig;
use crate::metrics::{labeled, labels, names};

/// Drains per-region sync queues.
pub struct SyncOrchestrator {
    catalog: Arc<dyn Catalog>,
    registry: Arc<dyn Registry>,
    queue: Arc<dyn SyncQueue>,
    stores: Arc<dyn ObjectStoreProvider>,
    metrics: Arc<dyn MetricsSink>,
    config: ControlConfig,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Creates an orchestrator reading commits from the source-of-truth `catalog`.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn Catalog>,
        registry: Arc<dyn Registry>,
        queue: Arc<dyn SyncQueue>,
        stores: Arc<dyn ObjectStoreProvider>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            catalog,
            registry,
            queue,
            stores,
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

    /// Processes every pending event targeting `region`, oldest first.
    ///
    /// Returns how many completed. Individual failures mark the event
    /// `FAILED` and do not stop the batch.
    ///
    /// # Errors
    ///
    /// Returns an error only if the pending list cannot be read.
    pub async fn process_pending_events(&self, region: &RegionId) -> Result<usize> {
        let pending = self.queue.pending_events(region).await?;
        let mut completed = 0usize;

        for event in pending {
            if let Err(e) = self
                .queue
                .update_status(&event.id, SyncStatus::InProgress, None)
                .await
            {
                // Another worker claimed it first.
                tracing::debug!(event = %event.id, error = %e, "event not claimable; skipping");
                continue;
            }

            let span = table_span(&event.event_type.to_string(), &event.table.to_string());
            match self.process_event(&event).instrument(span).await {
                Ok(()) => {
                    match self
                        .queue
                        .update_status(&event.id, SyncStatus::Completed, None)
                        .await
                    {
                        Ok(_) => {
                            completed += 1;
                            self.record_outcome("completed");
                        }
                        Err(e) => {
                            tracing::warn!(event = %event.id, error = %e, "failed to mark event completed");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        event = %event.id,
                        event_type = %event.event_type,
                        table = %event.table,
                        error = %e,
                        "sync event failed"
                    );
                    if let Err(update) = self
                        .queue
                        .update_status(&event.id, SyncStatus::Failed, Some(e.to_string()))
                        .await
                    {
                        tracing::warn!(event = %event.id, error = %update, "failed to mark event failed");
                    }
                    self.record_outcome("failed");
                }
            }
        }

        if completed > 0 {
            tracing::info!(region = %region, completed, "sync events processed");
        }
        Ok(completed)
    }

    /// Resets every failed event targeting `region` to pending.
    ///
    /// # Errors
    ///
    /// Returns an error only if the failed list cannot be read.
    pub async fn retry_failed_events(&self, region: &RegionId) -> Result<usize> {
        let failed = self.queue.failed_events(region).await?;
        let mut retried = 0usize;
        for event in failed {
            match self.queue.retry_failed(&event.id).await {
                Ok(_) => retried += 1,
                Err(e) => tracing::warn!(event = %event.id, error = %e, "retry failed"),
            }
        }
        if retried > 0 {
            tracing::info!(region = %region, retried, "failed sync events re-queued");
        }
        Ok(retried)
    }

    fn record_outcome(&self, outcome: &str) {
        self.metrics.increment(
            &labeled(names::SYNC_EVENTS_PROCESSED_TOTAL, labels::OUTCOME, outcome),
            1,
        );
    }

    async fn process_event(&self, event: &SyncEvent) -> Result<()> {
        match event.event_type {
            SyncEventType::MetadataSync => self.sync_metadata(event).await,
            SyncEventType::DataSync => self.sync_data(event).await.map(|_| ()),
            SyncEventType::CommitCompleted => Ok(()),
        }
    }

    async fn commit_snapshot(&self, event: &SyncEvent) -> Result<Snapshot> {
        self.catalog
            .snapshot(&event.table, event.commit_id.as_str())
            .await?
            .ok_or_else(|| Error::not_found("commit", &event.commit_id))
    }

    async fn table_data_path(&self, table: &TableId, region: &RegionId) -> Result<String> {
        Ok(self
            .registry
            .table_data_path(table, region)
            .await?
            .unwrap_or_else(|| self.config.table_data_path(&table.namespace, &table.name)))
    }

    async fn sync_metadata(&self, event: &SyncEvent) -> Result<()> {
        let snapshot = self.commit_snapshot(event).await?;
        if self
            .registry
            .table_data_path(&event.table, &event.target_region)
            .await?
            .is_none()
        {
            let path = self
                .config
                .table_data_path(&event.table.namespace, &event.table.name);
            self.registry
                .register_table_location(&event.table, &event.target_region, &path)
                .await?;
            tracing::info!(table = %event.table, region = %event.target_region, path = %path, "registered table data path");
        }
        tracing::debug!(
            table = %event.table,
            snapshot = %snapshot.id.id,
            sequence = snapshot.id.sequence_number,
            "metadata synced"
        );
        Ok(())
    }

    /// Copies the files a commit added to the target region.
    async fn sync_data(&self, event: &SyncEvent) -> Result<usize> {
        let source_location = self
            .registry
            .storage_location(&event.source_region, StorageKind::Data)
            .await?
            .ok_or_else(|| Error::not_found("data location", &event.source_region))?;
        let target_location = self
            .registry
            .storage_location(&event.target_region, StorageKind::Data)
            .await?
            .ok_or_else(|| Error::not_found("data location", &event.target_region))?;
        let source = self.stores.store_for(&source_location)?;
        let target = self.stores.store_for(&target_location)?;

        let snapshot = self.commit_snapshot(event).await?;
        let files = self.added_files(&event.table, &snapshot).await?;
        let source_base = self
            .table_data_path(&event.table, &event.source_region)
            .await?;
        let target_base = self
            .table_data_path(&event.table, &event.target_region)
            .await?;
        let placements = place_files(&files, &source_base, &target_base)?;

        let mut copied = 0usize;
        for (file, destination) in placements {
            if target.stat(&destination).await?.is_some() {
                tracing::debug!(path = %destination, "already present; skipping");
                continue;
            }
            let data = source.get(&file.path).await?;
            target.put(&destination, data).await?;
            copied += 1;
        }

        self.metrics
            .increment(names::SYNC_FILES_COPIED_TOTAL, copied as u64);
        tracing::info!(
            table = %event.table,
            commit = %event.commit_id,
            target = %event.target_region,
            copied,
            "data synced"
        );
        Ok(copied)
    }

    /// Files in manifests the parent snapshot did not reference.
    async fn added_files(&self, table: &TableId, snapshot: &Snapshot) -> Result<Vec<FileRef>> {
        let parent = match &snapshot.parent_id {
            Some(parent_id) => self.catalog.snapshot(table, parent_id).await?,
            None => None,
        };
        let inherited: HashSet<&str> = parent
            .as_ref()
            .map(|p| p.manifests.iter().map(|m| m.path.as_str()).collect())
            .unwrap_or_default();
        Ok(snapshot
            .manifests
            .iter()
            .filter(|m| !inherited.contains(m.path.as_str()))
            .flat_map(|m| m.files.iter().cloned())
            .collect())
    }
}

/// Maps each file to its destination under `target_base`.
///
/// Files under `source_base` keep their relative path, so partitioned layouts
/// such as `date=1/part-0.parquet` and `date=2/part-0.parquet` stay apart.
fn place_files<'a>(
    files: &'a [FileRef],
    source_base: &str,
    target_base: &str,
) -> Result<Vec<(&'a FileRef, String)>> {
    let root = format!("{}/", source_base.trim_end_matches('/'));
    let mut claimed: HashMap<String, &str> = HashMap::with_capacity(files.len());
    let mut placements = Vec::with_capacity(files.len());

    for file in files {
        let relative = file
            .path
            .strip_prefix(root.as_str())
            .unwrap_or_else(|| file.file_name());
        let destination = format!("{target_base}/{relative}");
        if let Some(other) = claimed.insert(destination.clone(), file.path.as_str()) {
            if other != file.path {
                return Err(Error::conflict(format!(
                    "{} and {other} both map to {destination}",
                    file.path
                )));
            }
            continue;
        }
        placements.push((file, destination));
    }
    Ok(placements)
}

/// Result of one worker pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerPass {
    /// Events completed.
    pub completed: usize,
    /// Failed events re-queued.
    pub retried: usize,
}

/// Runs the sync loop for one region until shut down.
#[derive(Debug)]
pub struct RegionWorker {
    orchestrator: Arc<SyncOrchestrator>,
    region: RegionId,
    poll_interval: Duration,
    retry_failed: bool,
}

impl RegionWorker {
    /// Creates a worker using the orchestrator's configuration.
    #[must_use]
    pub fn new(orchestrator: Arc<SyncOrchestrator>, region: RegionId) -> Self {
        let poll_interval = orchestrator.config.worker_poll_interval;
        let retry_failed = orchestrator.config.retry_failed_events;
        Self {
            orchestrator,
            region,
            poll_interval,
            retry_failed,
        }
    }

    /// Region this worker serves.
    #[must_use]
    pub const fn region(&self) -> &RegionId {
        &self.region
    }

    /// Runs one pass: process pending events, then re-queue failures for the
    /// next pass.
    ///
    /// # Errors
    ///
    /// Returns queue read failures.
    pub async fn run_once(&self) -> Result<WorkerPass> {
        let completed = self
            .orchestrator
            .process_pending_events(&self.region)
            .await?;
        let retried = if self.retry_failed {
            self.orchestrator.retry_failed_events(&self.region).await?
        } else {
            0
        };
        Ok(WorkerPass { completed, retried })
    }

    /// Loops until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let span = region_span("sync_worker", self.region.as_str());
        async move {
            tracing::info!(poll_interval = ?self.poll_interval, "region worker started");
            loop {
                if *shutdown.borrow() {
                    break;
                }
                if let Err(e) = self.run_once().await {
                    tracing::warn!(error = %e, "worker pass failed");
                }
                tokio::select! {
                    () = tokio::time::sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("region worker stopped");
        }
        .instrument(span)
        .await;
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    #[must_use]
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
