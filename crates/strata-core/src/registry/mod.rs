//! Registry port: which regions exist, which hold which tables, and where
//! each region keeps its data.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::id::{RegionId, TableId};
use crate::region::{Region, StorageKind, StorageLocation};

pub use memory::InMemoryRegistry;

/// Table, region and data-path mapping.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Registers (or replaces) a region. New regions are active.
    async fn register_region(&self, region: Region) -> Result<()>;

    /// Looks up a region.
    async fn region(&self, region: &RegionId) -> Result<Option<Region>>;

    /// Marks a region active or inactive.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown region.
    async fn set_region_active(&self, region: &RegionId, active: bool) -> Result<()>;

    /// Returns true if the region is registered and active.
    async fn is_region_active(&self, region: &RegionId) -> Result<bool>;

    /// Regions whose approval is required for writes to `table`.
    async fn required_regions(&self, table: &TableId) -> Result<Vec<RegionId>>;

    /// Sets the regions whose approval is required for writes to `table`.
    async fn set_required_regions(&self, table: &TableId, regions: Vec<RegionId>) -> Result<()>;

    /// Active regions holding a replica of `table`, sorted by id.
    async fn table_regions(&self, table: &TableId) -> Result<Vec<RegionId>>;

    /// Data path registered for `table` in `region`, if any.
    async fn table_data_path(&self, table: &TableId, region: &RegionId) -> Result<Option<String>>;

    /// Records that `region` holds `table` at `path`.
    async fn register_table_location(
        &self,
        table: &TableId,
        region: &RegionId,
        path: &str,
    ) -> Result<()>;

    /// Storage location of the given kind for a region.
    async fn storage_location(
        &self,
        region: &RegionId,
        kind: StorageKind,
    ) -> Result<Option<StorageLocation>>;

    /// Registers (or replaces) a storage location.
    async fn register_storage_location(&self, location: StorageLocation) -> Result<()>;
}
