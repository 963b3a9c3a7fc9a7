//! Object store port.
//!
//! Paths are relative to the store's root. Stats, copies and deletes are
//! idempotent and may race with each other; callers never rely on ordering
//! between two stores.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::region::StorageLocation;

pub use memory::{InMemoryStoreProvider, MemoryObjectStore};

/// Metadata about a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStat {
    /// Object path.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Content fingerprint, when the backend provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
}

/// Object storage for one location.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns object metadata, or `None` if the object does not exist.
    async fn stat(&self, path: &str) -> Result<Option<ObjectStat>>;

    /// Copies `src` to `dst` within this store.
    ///
    /// Returns `false` without copying when `dst` exists and `overwrite` is
    /// not set.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `src` does not exist.
    async fn copy(&self, src: &str, dst: &str, overwrite: bool) -> Result<bool>;

    /// Deletes an object. Returns whether it existed; deleting a missing
    /// object is not an error.
    async fn delete(&self, path: &str) -> Result<bool>;

    /// Streams metadata for every object under `prefix`, in path order.
    fn list<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, Result<ObjectStat>>;

    /// Writes an object, replacing any existing one.
    async fn put(&self, path: &str, data: Bytes) -> Result<ObjectStat>;

    /// Reads an object.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the object does not exist.
    async fn get(&self, path: &str) -> Result<Bytes>;
}

/// Resolves storage locations to object stores.
pub trait ObjectStoreProvider: Send + Sync {
    /// Returns the store backing `location`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no store is configured for the location.
    fn store_for(&self, location: &StorageLocation) -> Result<Arc<dyn ObjectStore>>;
}
