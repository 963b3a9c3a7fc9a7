//! Snapshot, manifest and file reference model.
//!
//! A snapshot is an immutable, sequence-numbered version of a table. It refers
//! to manifests by path; a manifest lists data files. Manifests are immutable
//! once committed, so two snapshots that reference the same manifest path share
//! exactly the same files.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity and ordering key of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotId {
    /// Opaque identifier, stable across catalogs.
    pub id: String,
    /// Monotonically increasing sequence number per table.
    pub sequence_number: u64,
    /// When the snapshot was committed in the source of truth.
    pub committed_at: DateTime<Utc>,
}

impl SnapshotId {
    /// Creates a snapshot identity.
    #[must_use]
    pub fn new(id: impl Into<String>, sequence_number: u64, committed_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            sequence_number,
            committed_at,
        }
    }
}

/// Format of a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Apache Parquet.
    #[default]
    Parquet,
    /// Apache ORC.
    Orc,
    /// Apache Avro.
    Avro,
    /// Positional or equality delete file.
    Deletes,
}

/// Reference to one data file.
///
/// Identity is the path; integrity is `(size, etag)`. A missing etag disables
/// etag comparison rather than counting as a mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    /// Object path relative to the storage root.
    pub path: String,
    /// File format.
    pub content_type: ContentType,
    /// Partition the file belongs to, if the table is partitioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Content fingerprint, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Last modification time, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileRef {
    /// Creates a parquet file reference with no etag or partition.
    #[must_use]
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            content_type: ContentType::Parquet,
            partition_key: None,
            size,
            etag: None,
            last_modified: None,
        }
    }

    /// Sets the etag.
    #[must_use]
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// Sets the partition key.
    #[must_use]
    pub fn with_partition(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    /// Returns the final path segment.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// An immutable list of file references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Manifest path; the identity used when diffing snapshots.
    pub path: String,
    /// Files, in commit order.
    pub files: Vec<FileRef>,
}

impl Manifest {
    /// Creates a manifest.
    #[must_use]
    pub fn new(path: impl Into<String>, files: Vec<FileRef>) -> Self {
        Self {
            path: path.into(),
            files,
        }
    }
}

/// A committed version of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Identity and ordering key.
    pub id: SnapshotId,
    /// Opaque id of the parent snapshot, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Manifests making up the table at this version.
    pub manifests: Vec<Manifest>,
    /// Free-form properties (operation, source region, ...).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// When the snapshot became visible to readers; `None` while hidden.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_at: Option<DateTime<Utc>>,
    /// Table schema at this version, when it changed or is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl Snapshot {
    /// Creates a hidden snapshot with no parent.
    #[must_use]
    pub fn new(id: SnapshotId, manifests: Vec<Manifest>) -> Self {
        Self {
            id,
            parent_id: None,
            manifests,
            properties: BTreeMap::new(),
            visible_at: None,
            schema: None,
        }
    }

    /// Sets the parent snapshot id.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Marks the snapshot visible from `visible_at`.
    #[must_use]
    pub fn visible_from(mut self, visible_at: DateTime<Utc>) -> Self {
        self.visible_at = Some(visible_at);
        self
    }

    /// Returns true once the snapshot has been made visible.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible_at.is_some()
    }

    /// Iterates over every file in every manifest.
    pub fn files(&self) -> impl Iterator<Item = &FileRef> {
        self.manifests.iter().flat_map(|m| m.files.iter())
    }

    /// Returns the manifest with the given path.
    #[must_use]
    pub fn manifest(&self, path: &str) -> Option<&Manifest> {
        self.manifests.iter().find(|m| m.path == path)
    }
}
