//! Regions and the storage locations they own.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::RegionId;

/// Which environment a region belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The on-premise source of truth.
    OnPrem,
    /// The cloud mirror.
    Cloud,
}

impl Side {
    /// Returns true for the cloud mirror.
    #[must_use]
    pub const fn is_cloud(self) -> bool {
        matches!(self, Self::Cloud)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OnPrem => "onprem",
            Self::Cloud => "cloud",
        })
    }
}

/// A participant in consensus and replication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    /// Stable identifier.
    pub id: RegionId,
    /// Human readable name.
    pub display_name: String,
    /// Environment the region runs in.
    pub side: Side,
}

impl Region {
    /// Creates a region.
    #[must_use]
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, side: Side) -> Self {
        Self {
            id: RegionId::new(id),
            display_name: display_name.into(),
            side,
        }
    }
}

/// Purpose of a storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// Table data files.
    Data,
    /// Catalog metadata and manifests.
    Metadata,
}

/// A storage root owned by a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageLocation {
    /// Owning region.
    pub region: RegionId,
    /// What the location stores.
    pub kind: StorageKind,
    /// Root URI, e.g. `s3://bucket/warehouse` or `hdfs://nn/warehouse`.
    pub uri: String,
}

impl StorageLocation {
    /// Creates a storage location.
    #[must_use]
    pub fn new(region: RegionId, kind: StorageKind, uri: impl Into<String>) -> Self {
        Self {
            region,
            kind,
            uri: uri.into(),
        }
    }
}
