//! Two-environment fixture wired from in-memory ports.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;

use strata_control::{
    CommitGate, ConsistencyTracker, ControlConfig, GcCoordinator, LeaseRegistry, ReadRouter,
    ReplicationPlanner, StateReconciler, SyncOrchestrator, WriteCoordinator,
};
use strata_core::prelude::*;

/// URI of the on-prem data location.
pub const ONPREM_DATA_URI: &str = "mem://onprem/data";
/// URI of the cloud data location.
pub const CLOUD_DATA_URI: &str = "mem://cloud/data";

/// Pre-wired on-prem source of truth plus cloud mirror.
///
/// Both regions are registered, active and required for every table created
/// through [`create_table`](Self::create_table).
pub struct HybridFixture {
    /// On-prem region id.
    pub onprem: RegionId,
    /// Cloud region id.
    pub cloud: RegionId,
    /// Source-of-truth catalog.
    pub onprem_catalog: Arc<InMemoryCatalog>,
    /// Mirror catalog.
    pub cloud_catalog: Arc<InMemoryCatalog>,
    /// On-prem data store.
    pub onprem_store: Arc<MemoryObjectStore>,
    /// Cloud data store, with failure injection.
    pub cloud_store: Arc<crate::FailingObjectStore>,
    /// Region and location registry.
    pub registry: Arc<InMemoryRegistry>,
    /// Store resolution by location URI.
    pub stores: Arc<InMemoryStoreProvider>,
    /// Sync event queue.
    pub queue: Arc<InMemorySyncQueue>,
    /// Consistency tokens.
    pub tokens: Arc<InMemoryConsistencyStore>,
    /// Query leases.
    pub leases: Arc<InMemoryLeaseStore>,
    /// Cloud inventory.
    pub inventory: Arc<InMemoryInventory>,
    /// Recorded metrics.
    pub metrics: Arc<InMemoryMetrics>,
    /// Control configuration.
    pub config: ControlConfig,
    /// Namespace unique to this fixture.
    pub namespace: String,
}

impl HybridFixture {
    /// Builds the fixture with default configuration.
    pub async fn new() -> Self {
        Self::with_config(ControlConfig::default()).await
    }

    /// Builds the fixture with `config`.
    pub async fn with_config(config: ControlConfig) -> Self {
        let onprem = RegionId::new("onprem-dc1");
        let cloud = RegionId::new("cloud-us-east");

        let registry = Arc::new(InMemoryRegistry::new());
        registry
            .register_region(Region::new(onprem.as_str(), "On-prem DC1", Side::OnPrem))
            .await
            .expect("register onprem");
        registry
            .register_region(Region::new(cloud.as_str(), "Cloud us-east", Side::Cloud))
            .await
            .expect("register cloud");
        registry
            .register_storage_location(StorageLocation::new(
                onprem.clone(),
                StorageKind::Data,
                ONPREM_DATA_URI,
            ))
            .await
            .expect("onprem location");
        registry
            .register_storage_location(StorageLocation::new(
                cloud.clone(),
                StorageKind::Data,
                CLOUD_DATA_URI,
            ))
            .await
            .expect("cloud location");

        let onprem_store = Arc::new(MemoryObjectStore::new());
        let cloud_store = Arc::new(crate::FailingObjectStore::new());
        let stores = Arc::new(InMemoryStoreProvider::new());
        stores
            .register(ONPREM_DATA_URI, onprem_store.clone())
            .expect("register onprem store");
        stores
            .register(CLOUD_DATA_URI, cloud_store.clone())
            .expect("register cloud store");

        Self {
            onprem,
            cloud,
            onprem_catalog: Arc::new(InMemoryCatalog::new()),
            cloud_catalog: Arc::new(InMemoryCatalog::new()),
            onprem_store,
            cloud_store,
            registry,
            stores,
            queue: Arc::new(InMemorySyncQueue::new()),
            tokens: Arc::new(InMemoryConsistencyStore::new()),
            leases: Arc::new(InMemoryLeaseStore::new()),
            inventory: Arc::new(InMemoryInventory::new()),
            metrics: Arc::new(InMemoryMetrics::new()),
            config,
            namespace: format!("test_{}", uuid::Uuid::new_v4().as_simple()),
        }
    }

    /// A table id in this fixture's namespace.
    #[must_use]
    pub fn table(&self, name: &str) -> TableId {
        TableId::new(self.namespace.clone(), name)
    }

    /// Creates `name` on-prem through the write coordinator and requires both
    /// regions to approve its commits.
    pub async fn create_table(&self, name: &str) -> TableId {
        let table = self.table(name);
        self.write_coordinator(Arc::new(self.commit_gate()))
            .create_table(&table, None, &self.onprem)
            .await
            .expect("create table");
        self.registry
            .register_table_location(
                &table,
                &self.cloud,
                &self.config.table_data_path(&table.namespace, &table.name),
            )
            .await
            .expect("cloud table location");
        self.registry
            .set_required_regions(&table, vec![self.onprem.clone(), self.cloud.clone()])
            .await
            .expect("required regions");
        table
    }

    /// Writes `files` to the on-prem store, each filled with `size` bytes.
    pub async fn seed_onprem_files(&self, files: &[FileRef]) {
        for file in files {
            let data = vec![b'x'; usize::try_from(file.size).expect("size fits")];
            self.onprem_store
                .put(&file.path, Bytes::from(data))
                .await
                .expect("seed file");
        }
    }

    /// Commits a visible snapshot directly to the on-prem catalog.
    pub async fn commit_onprem(
        &self,
        table: &TableId,
        id: &str,
        sequence: u64,
        parent: Option<&str>,
        manifests: Vec<Manifest>,
    ) -> SnapshotId {
        let now = Utc::now();
        let mut snapshot =
            Snapshot::new(SnapshotId::new(id, sequence, now), manifests).visible_from(now);
        if let Some(p) = parent {
            snapshot = snapshot.with_parent(p);
        }
        self.onprem_catalog
            .commit_snapshot(table, snapshot, parent)
            .await
            .expect("commit on-prem")
    }

    /// Commit gate over the on-prem catalog.
    #[must_use]
    pub fn commit_gate(&self) -> CommitGate {
        CommitGate::new(self.registry.clone(), self.onprem_catalog.clone())
            .with_lock_ttl(self.config.commit_lock_ttl)
    }

    /// Write coordinator committing to the on-prem catalog.
    #[must_use]
    pub fn write_coordinator(&self, gate: Arc<CommitGate>) -> WriteCoordinator {
        WriteCoordinator::new(
            gate,
            self.onprem_catalog.clone(),
            self.registry.clone(),
            self.queue.clone(),
            self.metrics.clone(),
        )
        .with_config(self.config.clone())
    }

    /// Planner from the on-prem catalog into the cloud mirror.
    #[must_use]
    pub fn planner(&self) -> ReplicationPlanner {
        ReplicationPlanner::new(
            self.onprem_catalog.clone(),
            self.cloud_catalog.clone(),
            self.cloud_store.clone(),
            self.inventory.clone(),
            self.metrics.clone(),
        )
    }

    /// Reconciler over the cloud mirror.
    #[must_use]
    pub fn reconciler(&self) -> StateReconciler {
        StateReconciler::new(
            self.cloud_catalog.clone(),
            self.cloud_store.clone(),
            self.metrics.clone(),
        )
    }

    /// Consistency tracker.
    #[must_use]
    pub fn tracker(&self) -> ConsistencyTracker {
        ConsistencyTracker::new(self.tokens.clone())
    }

    /// Read router.
    #[must_use]
    pub fn router(&self) -> ReadRouter {
        ReadRouter::new(self.tokens.clone())
    }

    /// Lease registry.
    #[must_use]
    pub fn lease_registry(&self) -> LeaseRegistry {
        LeaseRegistry::new(self.leases.clone())
    }

    /// GC coordinator over the cloud store.
    #[must_use]
    pub fn cloud_gc(&self) -> GcCoordinator {
        GcCoordinator::new(
            self.cloud_store.clone(),
            self.leases.clone(),
            self.tokens.clone(),
            self.metrics.clone(),
        )
    }

    /// GC coordinator over the on-prem store.
    #[must_use]
    pub fn onprem_gc(&self) -> GcCoordinator {
        GcCoordinator::new(
            self.onprem_store.clone(),
            self.leases.clone(),
            self.tokens.clone(),
            self.metrics.clone(),
        )
    }

    /// Sync orchestrator reading from the on-prem catalog.
    #[must_use]
    pub fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::new(
            self.onprem_catalog.clone(),
            self.registry.clone(),
            self.queue.clone(),
            self.stores.clone(),
            self.metrics.clone(),
        )
        .with_config(self.config.clone())
    }
}
