//! Inventory port: batched, versioned listings of a bucket.
//!
//! An inventory index is a cheap stand-in for per-object stat calls. It may be
//! stale, so a miss is never proof of absence; callers fall back to a stat.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, poison_err};

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEntry {
    /// Object size in bytes.
    pub size: u64,
    /// Etag, when the listing recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// A loaded inventory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryIndex {
    /// Version label of the listing.
    pub version: String,
    entries: HashMap<String, InventoryEntry>,
}

impl InventoryIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            entries: HashMap::new(),
        }
    }

    /// Adds an entry.
    #[must_use]
    pub fn with_entry(mut self, path: impl Into<String>, size: u64, etag: Option<String>) -> Self {
        self.insert(path, size, etag);
        self
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, path: impl Into<String>, size: u64, etag: Option<String>) {
        self.entries.insert(path.into(), InventoryEntry { size, etag });
    }

    /// Looks up one entry.
    #[must_use]
    pub fn entry(&self, path: &str) -> Option<&InventoryEntry> {
        self.entries.get(path)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the index has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if the index lists `path` with a matching size and, when
    /// both sides carry one, a matching etag.
    #[must_use]
    pub fn matches(&self, path: &str, etag: Option<&str>, size: u64) -> bool {
        self.entries.get(path).is_some_and(|entry| {
            entry.size == size
                && match (entry.etag.as_deref(), etag) {
                    (Some(listed), Some(wanted)) => listed == wanted,
                    _ => true,
                }
        })
    }
}

/// Source of inventory indexes.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Loads the index for `bucket/prefix` as of `as_of`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no listing exists for that date.
    async fn load_index(&self, bucket: &str, prefix: &str, as_of: NaiveDate)
    -> Result<InventoryIndex>;

    /// Returns true if `index` lists the object as present and matching.
    fn contains(&self, index: &InventoryIndex, path: &str, etag: Option<&str>, size: u64) -> bool {
        index.matches(path, etag, size)
    }
}

/// In-memory [`Inventory`] keyed by bucket, prefix and date.
#[derive(Debug, Default)]
pub struct InMemoryInventory {
    indexes: RwLock<HashMap<(String, String, NaiveDate), InventoryIndex>>,
}

impl InMemoryInventory {
    /// Creates an inventory with no listings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a listing.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the inventory is poisoned.
    pub fn publish(
        &self,
        bucket: &str,
        prefix: &str,
        as_of: NaiveDate,
        index: InventoryIndex,
    ) -> Result<()> {
        self.indexes
            .write()
            .map_err(poison_err)?
            .insert((bucket.to_string(), prefix.to_string(), as_of), index);
        Ok(())
    }
}

#[async_trait]
impl Inventory for InMemoryInventory {
    async fn load_index(
        &self,
        bucket: &str,
        prefix: &str,
        as_of: NaiveDate,
    ) -> Result<InventoryIndex> {
        let indexes = self.indexes.read().map_err(poison_err)?;
        indexes
            .get(&(bucket.to_string(), prefix.to_string(), as_of))
            .cloned()
            .ok_or_else(|| Error::not_found("inventory", format!("{bucket}/{prefix}@{as_of}")))
    }
}
