//! In-memory catalog for tests and local development.
//!
//! State lives in a single `RwLock`; every trait call takes the lock once and
//! releases it before returning, so no lock is ever held across an await.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Catalog, TableMetadata};
use crate::error::{Error, Result, poison_err};
use crate::id::{RegionId, TableId};
use crate::snapshot::{Snapshot, SnapshotId};

#[derive(Debug)]
struct TableState {
    metadata: TableMetadata,
    /// Kept sorted by sequence number.
    snapshots: Vec<Snapshot>,
}

#[derive(Debug, Clone)]
struct TableLock {
    owner: String,
    expires_at: DateTime<Utc>,
}

/// In-memory [`Catalog`].
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    tables: RwLock<HashMap<TableId, TableState>>,
    locks: RwLock<HashMap<TableId, TableLock>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current lock owner of a table, ignoring expired locks.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the lock map is poisoned.
    pub fn lock_owner(&self, table: &TableId) -> Result<Option<String>> {
        let locks = self.locks.read().map_err(poison_err)?;
        let now = Utc::now();
        Ok(locks
            .get(table)
            .filter(|lock| lock.expires_at > now)
            .map(|lock| lock.owner.clone()))
    }
}

fn table_not_found(table: &TableId) -> Error {
    Error::not_found("table", table)
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn create_table(
        &self,
        table: &TableId,
        schema: Option<String>,
        owner_region: &RegionId,
    ) -> Result<TableMetadata> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        if tables.contains_key(table) {
            return Err(Error::conflict(format!("table {table} already exists")));
        }
        let metadata = TableMetadata {
            table: table.clone(),
            schema,
            owner_region: owner_region.clone(),
            created_at: Utc::now(),
            current_snapshot_id: None,
            properties: BTreeMap::new(),
        };
        tables.insert(
            table.clone(),
            TableState {
                metadata: metadata.clone(),
                snapshots: Vec::new(),
            },
        );
        Ok(metadata)
    }

    async fn table_exists(&self, table: &TableId) -> Result<bool> {
        let tables = self.tables.read().map_err(poison_err)?;
        Ok(tables.contains_key(table))
    }

    async fn list_tables(&self, namespace: &str) -> Result<Vec<TableId>> {
        let tables = self.tables.read().map_err(poison_err)?;
        let mut ids: Vec<_> = tables
            .keys()
            .filter(|t| t.namespace == namespace)
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn table_metadata(&self, table: &TableId) -> Result<TableMetadata> {
        let tables = self.tables.read().map_err(poison_err)?;
        tables
            .get(table)
            .map(|state| state.metadata.clone())
            .ok_or_else(|| table_not_found(table))
    }

    async fn list_snapshots(&self, table: &TableId) -> Result<Vec<Snapshot>> {
        let tables = self.tables.read().map_err(poison_err)?;
        tables
            .get(table)
            .map(|state| state.snapshots.clone())
            .ok_or_else(|| table_not_found(table))
    }

    async fn snapshot(&self, table: &TableId, snapshot_id: &str) -> Result<Option<Snapshot>> {
        let tables = self.tables.read().map_err(poison_err)?;
        let state = tables.get(table).ok_or_else(|| table_not_found(table))?;
        Ok(state
            .snapshots
            .iter()
            .find(|s| s.id.id == snapshot_id)
            .cloned())
    }

    async fn latest_snapshot(&self, table: &TableId) -> Result<Option<Snapshot>> {
        let tables = self.tables.read().map_err(poison_err)?;
        let state = tables.get(table).ok_or_else(|| table_not_found(table))?;
        Ok(state.snapshots.last().cloned())
    }

    async fn commit_snapshot(
        &self,
        table: &TableId,
        snapshot: Snapshot,
        expected_parent: Option<&str>,
    ) -> Result<SnapshotId> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        let state = tables.get_mut(table).ok_or_else(|| table_not_found(table))?;

        let latest = state.snapshots.last();
        if let Some(expected) = expected_parent {
            let current = latest.map(|s| s.id.id.as_str());
            if current != Some(expected) {
                return Err(Error::conflict(format!(
                    "table {table} moved: expected parent {expected}, current {}",
                    current.unwrap_or("<none>")
                )));
            }
        }
        if let Some(latest) = latest {
            if snapshot.id.sequence_number <= latest.id.sequence_number {
                return Err(Error::conflict(format!(
                    "table {table}: sequence {} does not follow {}",
                    snapshot.id.sequence_number, latest.id.sequence_number
                )));
            }
        }
        if state.snapshots.iter().any(|s| s.id.id == snapshot.id.id) {
            return Err(Error::conflict(format!(
                "table {table}: snapshot {} already committed",
                snapshot.id.id
            )));
        }

        let id = snapshot.id.clone();
        if let Some(schema) = &snapshot.schema {
            state.metadata.schema = Some(schema.clone());
        }
        state.metadata.current_snapshot_id = Some(id.id.clone());
        state.snapshots.push(snapshot);
        drop(tables);

        tracing::debug!(table = %table, snapshot = %id.id, sequence = id.sequence_number, "snapshot committed");
        Ok(id)
    }

    async fn set_visibility(
        &self,
        table: &TableId,
        snapshot_id: &str,
        visible_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        let state = tables.get_mut(table).ok_or_else(|| table_not_found(table))?;
        let snapshot = state
            .snapshots
            .iter_mut()
            .find(|s| s.id.id == snapshot_id)
            .ok_or_else(|| Error::not_found("snapshot", snapshot_id))?;
        snapshot.visible_at = Some(visible_at);
        Ok(())
    }

    async fn acquire_table_lock(
        &self,
        table: &TableId,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let mut locks = self.locks.write().map_err(poison_err)?;
        let now = Utc::now();

        if let Some(lock) = locks.get(table) {
            if lock.expires_at > now && lock.owner != owner {
                return Ok(false);
            }
        }

        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(60));
        locks.insert(
            table.clone(),
            TableLock {
                owner: owner.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release_table_lock(&self, table: &TableId, owner: &str) -> Result<()> {
        let mut locks = self.locks.write().map_err(poison_err)?;
        if locks.get(table).is_some_and(|lock| lock.owner == owner) {
            locks.remove(table);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{FileRef, Manifest};

    fn table() -> TableId {
        TableId::new("demo", "orders")
    }

    fn snap(id: &str, seq: u64) -> Snapshot {
        Snapshot::new(
            SnapshotId::new(id, seq, Utc::now()),
            vec![Manifest::new(
                format!("m-{id}"),
                vec![FileRef::new(format!("data/{id}.parquet"), 10)],
            )],
        )
    }

    async fn catalog() -> InMemoryCatalog {
        let catalog = InMemoryCatalog::new();
        catalog
            .create_table(&table(), None, &RegionId::new("onprem"))
            .await
            .expect("create");
        catalog
    }

    #[tokio::test]
    async fn create_table_twice_conflicts() {
        let catalog = catalog().await;
        let err = catalog
            .create_table(&table(), None, &RegionId::new("onprem"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn snapshots_are_listed_by_sequence() {
        let catalog = catalog().await;
        catalog.commit_snapshot(&table(), snap("a", 1), None).await.unwrap();
        catalog.commit_snapshot(&table(), snap("b", 2), Some("a")).await.unwrap();

        let ids: Vec<_> = catalog
            .list_snapshots(&table())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(
            catalog.latest_snapshot(&table()).await.unwrap().unwrap().id.id,
            "b"
        );
        assert_eq!(
            catalog.table_metadata(&table()).await.unwrap().current_snapshot_id.as_deref(),
            Some("b")
        );
    }

    #[tokio::test]
    async fn stale_parent_conflicts() {
        let catalog = catalog().await;
        catalog.commit_snapshot(&table(), snap("a", 1), None).await.unwrap();
        catalog.commit_snapshot(&table(), snap("b", 2), Some("a")).await.unwrap();

        let err = catalog
            .commit_snapshot(&table(), snap("c", 3), Some("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn non_increasing_sequence_conflicts() {
        let catalog = catalog().await;
        catalog.commit_snapshot(&table(), snap("a", 5), None).await.unwrap();
        let err = catalog
            .commit_snapshot(&table(), snap("b", 5), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn set_visibility_unknown_snapshot_is_not_found() {
        let catalog = catalog().await;
        let err = catalog
            .set_visibility(&table(), "missing", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn table_lock_is_exclusive_and_release_is_idempotent() {
        let catalog = catalog().await;
        let ttl = Duration::from_secs(60);

        assert!(catalog.acquire_table_lock(&table(), "w1", ttl).await.unwrap());
        assert!(!catalog.acquire_table_lock(&table(), "w2", ttl).await.unwrap());
        assert!(catalog.acquire_table_lock(&table(), "w1", ttl).await.unwrap());

        // A non-owner release leaves the lock in place.
        catalog.release_table_lock(&table(), "w2").await.unwrap();
        assert_eq!(catalog.lock_owner(&table()).unwrap().as_deref(), Some("w1"));

        catalog.release_table_lock(&table(), "w1").await.unwrap();
        catalog.release_table_lock(&table(), "w1").await.unwrap();
        assert!(catalog.acquire_table_lock(&table(), "w2", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lock_can_be_taken_over() {
        let catalog = catalog().await;
        assert!(
            catalog
                .acquire_table_lock(&table(), "w1", Duration::ZERO)
                .await
                .unwrap()
        );
        assert!(
            catalog
                .acquire_table_lock(&table(), "w2", Duration::from_secs(60))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn list_tables_filters_namespace() {
        let catalog = catalog().await;
        catalog
            .create_table(&TableId::new("other", "x"), None, &RegionId::new("onprem"))
            .await
            .unwrap();
        assert_eq!(catalog.list_tables("demo").await.unwrap(), vec![table()]);
    }
}
