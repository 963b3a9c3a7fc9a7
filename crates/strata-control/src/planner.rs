//! Replication planner: which files must be copied to bring the mirror up to a
//! given snapshot.
//!
//! Deduplication runs in three tiers, cheapest first:
//!
//! 1. **Manifest**: manifests the destination's latest snapshot already
//!    references are skipped wholesale (in-memory comparison by path).
//! 2. **Inventory**: files the inventory index lists with matching
//!    size and etag are skipped (batched lookup, may be stale).
//! 3. **Stat**: everything else is probed in destination storage; missing
//!    objects, size mismatches and (when both sides have one) etag mismatches
//!    go into the copy set.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use strata_core::catalog::Catalog;
use strata_core::inventory::{Inventory, InventoryIndex};
use strata_core::metrics::MetricsSink;
use strata_core::object_store::ObjectStore;
use strata_core::snapshot::{FileRef, SnapshotId};
use strata_core::{Error, Result, TableId};

use crate::metrics::names;

/// Output of [`ReplicationPlanner::plan`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationPlan {
    /// Files to copy, in manifest order, deduplicated by path.
    pub objects_to_copy: Vec<FileRef>,
    /// Manifests skipped because the destination already references them.
    pub manifests_skipped: usize,
    /// Files skipped because the inventory listed them as present.
    pub inventory_hits: usize,
    /// Files probed with a direct stat.
    pub stat_probes: usize,
}

impl ReplicationPlan {
    /// Paths of the files to copy.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.objects_to_copy.iter().map(|f| f.path.as_str()).collect()
    }

    /// Returns true if the mirror is already up to date.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects_to_copy.is_empty()
    }
}

/// Diffs a source snapshot against the mirror.
pub struct ReplicationPlanner {
    source_catalog: Arc<dyn Catalog>,
    destination_catalog: Arc<dyn Catalog>,
    destination_store: Arc<dyn ObjectStore>,
    inventory: Arc<dyn Inventory>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for ReplicationPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationPlanner").finish_non_exhaustive()
    }
}

impl ReplicationPlanner {
    /// Creates a planner.
    #[must_use]
    pub fn new(
        source_catalog: Arc<dyn Catalog>,
        destination_catalog: Arc<dyn Catalog>,
        destination_store: Arc<dyn ObjectStore>,
        inventory: Arc<dyn Inventory>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            source_catalog,
            destination_catalog,
            destination_store,
            inventory,
            metrics,
        }
    }

    /// Computes the copy set for `snapshot` of `table`.
    ///
    /// A table absent from the destination catalog is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the snapshot is not in the source
    /// catalog, and propagates storage failures from stat probes.
    #[tracing::instrument(skip(self, snapshot, index), fields(table = %table, snapshot = %snapshot.id))]
    pub async fn plan(
        &self,
        table: &TableId,
        snapshot: &SnapshotId,
        index: &InventoryIndex,
    ) -> Result<ReplicationPlan> {
        let source = self
            .source_catalog
            .snapshot(table, &snapshot.id)
            .await?
            .ok_or_else(|| Error::not_found("snapshot", &snapshot.id))?;

        let destination_latest = if self.destination_catalog.table_exists(table).await? {
            self.destination_catalog.latest_snapshot(table).await?
        } else {
            None
        };
        let present: HashSet<&str> = destination_latest
            .as_ref()
            .map(|s| s.manifests.iter().map(|m| m.path.as_str()).collect())
            .unwrap_or_default();

        let mut plan = ReplicationPlan::default();
        let mut seen = HashSet::new();

        for manifest in &source.manifests {
            if present.contains(manifest.path.as_str()) {
                plan.manifests_skipped += 1;
                continue;
            }
            for file in &manifest.files {
                if !seen.insert(file.path.as_str()) {
                    continue;
                }
                if self
                    .inventory
                    .contains(index, &file.path, file.etag.as_deref(), file.size)
                {
                    plan.inventory_hits += 1;
                    continue;
                }
                plan.stat_probes += 1;
                if self.needs_copy(file).await? {
                    plan.objects_to_copy.push(file.clone());
                }
            }
        }

        self.metrics.increment(
            names::REPLICATION_PLANNED_FILES_TOTAL,
            plan.objects_to_copy.len() as u64,
        );
        tracing::info!(
            to_copy = plan.objects_to_copy.len(),
            manifests_skipped = plan.manifests_skipped,
            inventory_hits = plan.inventory_hits,
            stat_probes = plan.stat_probes,
            inventory_version = %index.version,
            "replication plan computed"
        );
        Ok(plan)
    }

    async fn needs_copy(&self, file: &FileRef) -> Result<bool> {
        let Some(stat) = self.destination_store.stat(&file.path).await? else {
            return Ok(true);
        };
        if stat.size != file.size {
            return Ok(true);
        }
        Ok(matches!(
            (stat.etag.as_deref(), file.etag.as_deref()),
            (Some(dest), Some(src)) if dest != src
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use strata_core::catalog::InMemoryCatalog;
    use strata_core::inventory::InMemoryInventory;
    use strata_core::metrics::InMemoryMetrics;
    use strata_core::object_store::MemoryObjectStore;
    use strata_core::snapshot::{Manifest, Snapshot};
    use strata_core::RegionId;

    struct Setup {
        planner: ReplicationPlanner,
        source: Arc<InMemoryCatalog>,
        dest: Arc<InMemoryCatalog>,
        store: Arc<MemoryObjectStore>,
        table: TableId,
    }

    async fn setup() -> Setup {
        let source = Arc::new(InMemoryCatalog::new());
        let dest = Arc::new(InMemoryCatalog::new());
        let store = Arc::new(MemoryObjectStore::new());
        let table = TableId::new("demo", "t");
        source
            .create_table(&table, None, &RegionId::new("onprem"))
            .await
            .unwrap();
        let planner = ReplicationPlanner::new(
            source.clone(),
            dest.clone(),
            store.clone(),
            Arc::new(InMemoryInventory::new()),
            Arc::new(InMemoryMetrics::new()),
        );
        Setup {
            planner,
            source,
            dest,
            store,
            table,
        }
    }

    fn snapshot(id: &str, seq: u64, manifests: Vec<Manifest>) -> Snapshot {
        Snapshot::new(SnapshotId::new(id, seq, Utc::now()), manifests)
    }

    #[tokio::test]
    async fn everything_absent_copies_every_file() {
        let s = setup().await;
        let snap = snapshot(
            "s-1",
            1,
            vec![Manifest::new(
                "m1",
                vec![FileRef::new("f1", 100), FileRef::new("f2", 200)],
            )],
        );
        let id = s.source.commit_snapshot(&s.table, snap, None).await.unwrap();

        let plan = s
            .planner
            .plan(&s.table, &id, &InventoryIndex::new("v0"))
            .await
            .unwrap();
        assert_eq!(plan.paths(), vec!["f1", "f2"]);
        assert_eq!(plan.stat_probes, 2);
    }

    #[tokio::test]
    async fn manifests_in_destination_are_skipped() {
        let s = setup().await;
        let m1 = Manifest::new("m1", vec![FileRef::new("f1", 1)]);
        let m2 = Manifest::new("m2", vec![FileRef::new("f2", 1)]);
        s.source
            .commit_snapshot(&s.table, snapshot("s-1", 1, vec![m1.clone()]), None)
            .await
            .unwrap();
        let id = s
            .source
            .commit_snapshot(&s.table, snapshot("s-2", 2, vec![m1.clone(), m2]), Some("s-1"))
            .await
            .unwrap();

        s.dest
            .create_table(&s.table, None, &RegionId::new("onprem"))
            .await
            .unwrap();
        s.dest
            .commit_snapshot(&s.table, snapshot("s-1", 1, vec![m1]), None)
            .await
            .unwrap();

        let plan = s
            .planner
            .plan(&s.table, &id, &InventoryIndex::new("v0"))
            .await
            .unwrap();
        assert_eq!(plan.paths(), vec!["f2"]);
        assert_eq!(plan.manifests_skipped, 1);
    }

    #[tokio::test]
    async fn inventory_hit_skips_stat() {
        let s = setup().await;
        let snap = snapshot(
            "s-1",
            1,
            vec![Manifest::new(
                "m1",
                vec![FileRef::new("f1", 10).with_etag("e1"), FileRef::new("f2", 20)],
            )],
        );
        let id = s.source.commit_snapshot(&s.table, snap, None).await.unwrap();
        let index = InventoryIndex::new("v1").with_entry("f1", 10, Some("e1".into()));

        let plan = s.planner.plan(&s.table, &id, &index).await.unwrap();
        assert_eq!(plan.paths(), vec!["f2"]);
        assert_eq!(plan.inventory_hits, 1);
        assert_eq!(plan.stat_probes, 1);
    }

    #[tokio::test]
    async fn stat_detects_size_and_etag_mismatch_only_when_both_have_etags() {
        let s = setup().await;
        let same = s.store.put("same", Bytes::from_static(b"abcd")).await.unwrap();
        s.store.put("short", Bytes::from_static(b"ab")).await.unwrap();
        s.store.put("etag", Bytes::from_static(b"abcd")).await.unwrap();
        s.store.put("no-etag", Bytes::from_static(b"abcd")).await.unwrap();

        let snap = snapshot(
            "s-1",
            1,
            vec![Manifest::new(
                "m1",
                vec![
                    FileRef::new("same", 4).with_etag(same.etag.unwrap()),
                    FileRef::new("short", 4),
                    FileRef::new("etag", 4).with_etag("other"),
                    FileRef::new("no-etag", 4),
                    FileRef::new("missing", 4),
                ],
            )],
        );
        let id = s.source.commit_snapshot(&s.table, snap, None).await.unwrap();

        let plan = s
            .planner
            .plan(&s.table, &id, &InventoryIndex::new("v0"))
            .await
            .unwrap();
        assert_eq!(plan.paths(), vec!["short", "etag", "missing"]);
    }

    #[tokio::test]
    async fn unknown_snapshot_is_not_found() {
        let s = setup().await;
        let err = s
            .planner
            .plan(
                &s.table,
                &SnapshotId::new("nope", 1, Utc::now()),
                &InventoryIndex::new("v0"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
