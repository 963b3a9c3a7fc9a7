//! Synchronization events and their lifecycle.
//!
//! ```text
//! PENDING ──► IN_PROGRESS ──► COMPLETED
//!    ▲              │
//!    │              ▼
//!    └── retry ── FAILED
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::{CommitId, EventId, RegionId, TableId};

/// What a sync event propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncEventType {
    /// Register table metadata in the target region.
    MetadataSync,
    /// Copy the commit's data files to the target region.
    DataSync,
    /// Acknowledge a finished commit.
    CommitCompleted,
}

impl fmt::Display for SyncEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MetadataSync => "METADATA_SYNC",
            Self::DataSync => "DATA_SYNC",
            Self::CommitCompleted => "COMMIT_COMPLETED",
        })
    }
}

/// Processing state of a sync event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Waiting to be processed.
    Pending,
    /// Dequeued by a worker.
    InProgress,
    /// Processed successfully.
    Completed,
    /// Processing failed; eligible for retry.
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        })
    }
}

impl SyncStatus {
    /// Returns true if a worker may move an event from `self` to `to`.
    ///
    /// `FAILED -> PENDING` is not included: it is only reachable through
    /// [`SyncEvent::retry`].
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed | Self::Failed)
        )
    }
}

/// A unit of work for the sync loop of one target region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    /// Unique id.
    pub id: EventId,
    /// What to propagate.
    pub event_type: SyncEventType,
    /// Table the commit belongs to.
    pub table: TableId,
    /// Commit being propagated.
    pub commit_id: CommitId,
    /// Region the commit came from.
    pub source_region: RegionId,
    /// Region that must apply it.
    pub target_region: RegionId,
    /// Processing state.
    pub status: SyncStatus,
    /// Creation time; pending events are processed in this order.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
    /// Last failure message, if the event failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SyncEvent {
    /// Creates a pending event.
    #[must_use]
    pub fn new(
        event_type: SyncEventType,
        table: TableId,
        commit_id: CommitId,
        source_region: RegionId,
        target_region: RegionId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EventId::generate(),
            event_type,
            table,
            commit_id,
            source_region,
            target_region,
            status: SyncStatus::Pending,
            created_at: now,
            updated_at: now,
            last_error: None,
        }
    }

    /// Moves the event to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] for anything other than
    /// `PENDING -> IN_PROGRESS` or `IN_PROGRESS -> COMPLETED | FAILED`.
    pub fn transition(&mut self, to: SyncStatus, at: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = at;
        Ok(())
    }

    /// Resets a failed event to pending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the event is `FAILED`.
    pub fn retry(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.status != SyncStatus::Failed {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: SyncStatus::Pending.to_string(),
            });
        }
        self.status = SyncStatus::Pending;
        self.updated_at = at;
        self.last_error = None;
        Ok(())
    }
}
