//! In-memory registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use super::Registry;
use crate::error::{Error, Result, poison_err};
use crate::id::{RegionId, TableId};
use crate::region::{Region, StorageKind, StorageLocation};

#[derive(Debug, Default)]
struct State {
    regions: HashMap<RegionId, (Region, bool)>,
    required: HashMap<TableId, Vec<RegionId>>,
    /// table -> region -> data path
    locations: HashMap<TableId, BTreeMap<RegionId, String>>,
    storage: HashMap<(RegionId, StorageKind), StorageLocation>,
}

/// In-memory [`Registry`].
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: RwLock<State>,
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn register_region(&self, region: Region) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.regions.insert(region.id.clone(), (region, true));
        Ok(())
    }

    async fn region(&self, region: &RegionId) -> Result<Option<Region>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.regions.get(region).map(|(r, _)| r.clone()))
    }

    async fn set_region_active(&self, region: &RegionId, active: bool) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let entry = state
            .regions
            .get_mut(region)
            .ok_or_else(|| Error::not_found("region", region))?;
        entry.1 = active;
        Ok(())
    }

    async fn is_region_active(&self, region: &RegionId) -> Result<bool> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.regions.get(region).is_some_and(|(_, active)| *active))
    }

    async fn required_regions(&self, table: &TableId) -> Result<Vec<RegionId>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.required.get(table).cloned().unwrap_or_default())
    }

    async fn set_required_regions(&self, table: &TableId, regions: Vec<RegionId>) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.required.insert(table.clone(), regions);
        Ok(())
    }

    async fn table_regions(&self, table: &TableId) -> Result<Vec<RegionId>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .locations
            .get(table)
            .map(|by_region| {
                by_region
                    .keys()
                    .filter(|r| state.regions.get(*r).is_none_or(|(_, active)| *active))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn table_data_path(&self, table: &TableId, region: &RegionId) -> Result<Option<String>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .locations
            .get(table)
            .and_then(|by_region| by_region.get(region))
            .cloned())
    }

    async fn register_table_location(
        &self,
        table: &TableId,
        region: &RegionId,
        path: &str,
    ) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state
            .locations
            .entry(table.clone())
            .or_default()
            .insert(region.clone(), path.to_string());
        Ok(())
    }

    async fn storage_location(
        &self,
        region: &RegionId,
        kind: StorageKind,
    ) -> Result<Option<StorageLocation>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.storage.get(&(region.clone(), kind)).cloned())
    }

    async fn register_storage_location(&self, location: StorageLocation) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state
            .storage
            .insert((location.region.clone(), location.kind), location);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Side;

    #[tokio::test]
    async fn table_regions_skip_inactive_regions() {
        let registry = InMemoryRegistry::new();
        let table = TableId::new("demo", "t");
        registry
            .register_region(Region::new("onprem", "On-prem", Side::OnPrem))
            .await
            .unwrap();
        registry
            .register_region(Region::new("cloud", "Cloud", Side::Cloud))
            .await
            .unwrap();
        registry
            .register_table_location(&table, &RegionId::new("onprem"), "tables/demo/t")
            .await
            .unwrap();
        registry
            .register_table_location(&table, &RegionId::new("cloud"), "tables/demo/t")
            .await
            .unwrap();

        assert_eq!(registry.table_regions(&table).await.unwrap().len(), 2);

        registry
            .set_region_active(&RegionId::new("cloud"), false)
            .await
            .unwrap();
        assert_eq!(
            registry.table_regions(&table).await.unwrap(),
            vec![RegionId::new("onprem")]
        );
        assert!(!registry.is_region_active(&RegionId::new("cloud")).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_region_cannot_be_deactivated() {
        let registry = InMemoryRegistry::new();
        let err = registry
            .set_region_active(&RegionId::new("nope"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn storage_locations_are_keyed_by_region_and_kind() {
        let registry = InMemoryRegistry::new();
        let region = RegionId::new("cloud");
        registry
            .register_storage_location(StorageLocation::new(
                region.clone(),
                StorageKind::Data,
                "mem://cloud-data",
            ))
            .await
            .unwrap();
        assert!(
            registry
                .storage_location(&region, StorageKind::Metadata)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(
            registry
                .storage_location(&region, StorageKind::Data)
                .await
                .unwrap()
                .unwrap()
                .uri,
            "mem://cloud-data"
        );
    }
}
