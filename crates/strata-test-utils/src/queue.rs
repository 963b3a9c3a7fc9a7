//! Sync queue wrapper that refuses chosen status transitions.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use strata_core::error::{Error, Result};
use strata_core::sync_event::{SyncEvent, SyncStatus};
use strata_core::sync_queue::{InMemorySyncQueue, SyncQueue};
use strata_core::{EventId, RegionId, TableId};

/// Wraps an [`InMemorySyncQueue`], failing `update_status` calls that move an
/// event into an injected status.
#[derive(Debug, Clone, Default)]
pub struct FailingSyncQueue {
    inner: Arc<InMemorySyncQueue>,
    fail_statuses: Arc<Mutex<Vec<SyncStatus>>>,
}

impl FailingSyncQueue {
    /// Wraps an existing queue.
    #[must_use]
    pub fn wrapping(inner: Arc<InMemorySyncQueue>) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Fails every transition into `status`.
    pub fn fail_transitions_to(&self, status: SyncStatus) {
        self.fail_statuses.lock().expect("lock").push(status);
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.fail_statuses.lock().expect("lock").clear();
    }
}

#[async_trait]
impl SyncQueue for FailingSyncQueue {
    async fn publish(&self, event: SyncEvent) -> Result<()> {
        self.inner.publish(event).await
    }

    async fn get(&self, event_id: &EventId) -> Result<Option<SyncEvent>> {
        self.inner.get(event_id).await
    }

    async fn pending_events(&self, region: &RegionId) -> Result<Vec<SyncEvent>> {
        self.inner.pending_events(region).await
    }

    async fn failed_events(&self, region: &RegionId) -> Result<Vec<SyncEvent>> {
        self.inner.failed_events(region).await
    }

    async fn event_history(&self, table: &TableId, region: &RegionId) -> Result<Vec<SyncEvent>> {
        self.inner.event_history(table, region).await
    }

    async fn update_status(
        &self,
        event_id: &EventId,
        status: SyncStatus,
        error: Option<String>,
    ) -> Result<SyncEvent> {
        if self.fail_statuses.lock().expect("lock").contains(&status) {
            return Err(Error::storage(format!(
                "injected failure moving {event_id} to {status:?}"
            )));
        }
        self.inner.update_status(event_id, status, error).await
    }

    async fn retry_failed(&self, event_id: &EventId) -> Result<SyncEvent> {
        self.inner.retry_failed(event_id).await
    }
}
