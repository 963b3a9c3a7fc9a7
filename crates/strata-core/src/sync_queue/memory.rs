//! In-memory sync queue.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use super::SyncQueue;
use crate::error::{Error, Result, poison_err};
use crate::id::{EventId, RegionId, TableId};
use crate::sync_event::{SyncEvent, SyncStatus};

/// In-memory [`SyncQueue`].
///
/// Events are retained after completion so history stays queryable.
#[derive(Debug, Default)]
pub struct InMemorySyncQueue {
    events: RwLock<HashMap<EventId, SyncEvent>>,
}

impl InMemorySyncQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn select(&self, filter: impl Fn(&SyncEvent) -> bool) -> Result<Vec<SyncEvent>> {
        let events = self.events.read().map_err(poison_err)?;
        let mut selected: Vec<_> = events.values().filter(|e| filter(e)).cloned().collect();
        selected.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(selected)
    }
}

#[async_trait]
impl SyncQueue for InMemorySyncQueue {
    async fn publish(&self, event: SyncEvent) -> Result<()> {
        let mut events = self.events.write().map_err(poison_err)?;
        if events.contains_key(&event.id) {
            return Err(Error::conflict(format!("event {} already published", event.id)));
        }
        events.insert(event.id, event);
        Ok(())
    }

    async fn get(&self, event_id: &EventId) -> Result<Option<SyncEvent>> {
        let events = self.events.read().map_err(poison_err)?;
        Ok(events.get(event_id).cloned())
    }

    async fn pending_events(&self, region: &RegionId) -> Result<Vec<SyncEvent>> {
        self.select(|e| &e.target_region == region && e.status == SyncStatus::Pending)
    }

    async fn failed_events(&self, region: &RegionId) -> Result<Vec<SyncEvent>> {
        self.select(|e| &e.target_region == region && e.status == SyncStatus::Failed)
    }

    async fn event_history(&self, table: &TableId, region: &RegionId) -> Result<Vec<SyncEvent>> {
        self.select(|e| &e.table == table && &e.target_region == region)
    }

    async fn update_status(
        &self,
        event_id: &EventId,
        status: SyncStatus,
        error: Option<String>,
    ) -> Result<SyncEvent> {
        let mut events = self.events.write().map_err(poison_err)?;
        let event = events
            .get_mut(event_id)
            .ok_or_else(|| Error::not_found("sync event", event_id))?;
        event.transition(status, Utc::now())?;
        if status == SyncStatus::Failed {
            event.last_error = error;
        }
        Ok(event.clone())
    }

    async fn retry_failed(&self, event_id: &EventId) -> Result<SyncEvent> {
        let mut events = self.events.write().map_err(poison_err)?;
        let event = events
            .get_mut(event_id)
            .ok_or_else(|| Error::not_found("sync event", event_id))?;
        event.retry(Utc::now())?;
        Ok(event.clone())
    }
}
