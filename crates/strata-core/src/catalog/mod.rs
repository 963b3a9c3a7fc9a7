//! Catalog port: versioned table metadata.
//!
//! One [`Catalog`] instance represents one environment's catalog: the on-prem
//! source of truth or the cloud mirror. The control plane never assumes both
//! sides share storage; it only talks to them through this trait.
//!
//! ## Concurrency
//!
//! - [`Catalog::commit_snapshot`] is optimistic: callers pass the parent they
//!   built on and get [`Error::Conflict`](crate::error::Error::Conflict) if the
//!   table moved underneath them.
//! - [`Catalog::acquire_table_lock`] is a coarse, TTL-bounded lock held by the
//!   commit gate while a write is in flight. At most one owner holds it.

pub mod memory;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::id::{RegionId, TableId};
use crate::snapshot::{Snapshot, SnapshotId};

pub use memory::InMemoryCatalog;

/// Table-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    /// Table identity.
    pub table: TableId,
    /// Current schema, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Region that created the table.
    pub owner_region: RegionId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Id of the highest-sequence snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_snapshot_id: Option<String>,
    /// Free-form properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Catalog of versioned tables.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Creates a table with no snapshots.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the table already exists.
    async fn create_table(
        &self,
        table: &TableId,
        schema: Option<String>,
        owner_region: &RegionId,
    ) -> Result<TableMetadata>;

    /// Returns true if the table exists.
    async fn table_exists(&self, table: &TableId) -> Result<bool>;

    /// Lists tables in a namespace, sorted by name.
    async fn list_tables(&self, namespace: &str) -> Result<Vec<TableId>>;

    /// Returns table metadata.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown table.
    async fn table_metadata(&self, table: &TableId) -> Result<TableMetadata>;

    /// Lists snapshots ordered by ascending sequence number.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown table.
    async fn list_snapshots(&self, table: &TableId) -> Result<Vec<Snapshot>>;

    /// Looks up one snapshot by its opaque id.
    async fn snapshot(&self, table: &TableId, snapshot_id: &str) -> Result<Option<Snapshot>>;

    /// Returns the highest-sequence snapshot, if any.
    async fn latest_snapshot(&self, table: &TableId) -> Result<Option<Snapshot>> {
        Ok(self.list_snapshots(table).await?.pop())
    }

    /// Commits a snapshot.
    ///
    /// When `expected_parent` is set, the table's latest snapshot id must equal
    /// it. The snapshot's sequence number must exceed every existing one.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` on a parent mismatch, a non-increasing sequence number
    /// or a duplicate snapshot id, and `NotFound` for an unknown table.
    async fn commit_snapshot(
        &self,
        table: &TableId,
        snapshot: Snapshot,
        expected_parent: Option<&str>,
    ) -> Result<SnapshotId>;

    /// Sets the time from which a snapshot is visible to readers.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown table or snapshot.
    async fn set_visibility(
        &self,
        table: &TableId,
        snapshot_id: &str,
        visible_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Tries to take the table lock for `owner`.
    ///
    /// Returns `false` if another owner holds an unexpired lock. Re-acquiring
    /// by the current owner refreshes the TTL.
    async fn acquire_table_lock(&self, table: &TableId, owner: &str, ttl: Duration)
    -> Result<bool>;

    /// Releases the table lock if `owner` holds it. Always safe to call.
    async fn release_table_lock(&self, table: &TableId, owner: &str) -> Result<()>;
}
