//! Sync queue port: durable per-region queues of [`SyncEvent`]s.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::id::{EventId, RegionId, TableId};
use crate::sync_event::{SyncEvent, SyncStatus};

pub use memory::InMemorySyncQueue;

/// Queue of sync events, partitioned by target region.
#[async_trait]
pub trait SyncQueue: Send + Sync {
    /// Publishes an event.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if an event with the same id already exists.
    async fn publish(&self, event: SyncEvent) -> Result<()>;

    /// Looks up one event.
    async fn get(&self, event_id: &EventId) -> Result<Option<SyncEvent>>;

    /// Pending events targeting `region`, oldest first.
    async fn pending_events(&self, region: &RegionId) -> Result<Vec<SyncEvent>>;

    /// Failed events targeting `region`, oldest first.
    async fn failed_events(&self, region: &RegionId) -> Result<Vec<SyncEvent>>;

    /// Every event for `table` targeting `region`, in any state, oldest first.
    async fn event_history(&self, table: &TableId, region: &RegionId) -> Result<Vec<SyncEvent>>;

    /// Moves an event to `status`, recording `error` on failure.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown event and `InvalidTransition` for a
    /// transition the event lifecycle does not allow.
    async fn update_status(
        &self,
        event_id: &EventId,
        status: SyncStatus,
        error: Option<String>,
    ) -> Result<SyncEvent>;

    /// Resets a failed event to pending.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown event and `InvalidTransition` unless
    /// the event is `FAILED`.
    async fn retry_failed(&self, event_id: &EventId) -> Result<SyncEvent>;
}
