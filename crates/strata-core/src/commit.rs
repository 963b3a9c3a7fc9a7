//! Commit requests and per-region approvals.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{RegionId, TableId};
use crate::snapshot::FileRef;

/// Kind of change a commit applies to a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// Adds new files on top of the current snapshot.
    #[default]
    Append,
    /// Replaces every file of the current snapshot.
    Overwrite,
    /// Changes the schema without touching data files.
    SchemaUpdate,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Append => "APPEND",
            Self::Overwrite => "OVERWRITE",
            Self::SchemaUpdate => "SCHEMA_UPDATE",
        };
        f.write_str(s)
    }
}

/// Identity of a commit request: `(table, source region, request time)`.
///
/// The request time is stamped per attempt, so resubmitting a failed write
/// produces a distinct key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequestKey {
    /// Table being written.
    pub table: TableId,
    /// Region the write originates from.
    pub source_region: RegionId,
    /// When the attempt was made.
    pub requested_at: DateTime<Utc>,
}

impl fmt::Display for CommitRequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}#{}",
            self.table,
            self.source_region,
            self.requested_at.timestamp_millis()
        )
    }
}

/// A write awaiting multi-region approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    /// Table being written.
    pub table: TableId,
    /// Region the write originates from.
    pub source_region: RegionId,
    /// When the attempt was made.
    pub requested_at: DateTime<Utc>,
    /// Data files added by this write.
    #[serde(default)]
    pub new_data_files: Vec<FileRef>,
    /// New schema, for schema-changing writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_schema: Option<String>,
    /// Kind of change.
    pub operation: OperationKind,
}

impl CommitRequest {
    /// Creates an append request stamped with the current time.
    #[must_use]
    pub fn append(table: TableId, source_region: RegionId, files: Vec<FileRef>) -> Self {
        Self {
            table,
            source_region,
            requested_at: Utc::now(),
            new_data_files: files,
            updated_schema: None,
            operation: OperationKind::Append,
        }
    }

    /// Creates an overwrite request stamped with the current time.
    #[must_use]
    pub fn overwrite(table: TableId, source_region: RegionId, files: Vec<FileRef>) -> Self {
        Self {
            operation: OperationKind::Overwrite,
            ..Self::append(table, source_region, files)
        }
    }

    /// Creates a schema update request stamped with the current time.
    #[must_use]
    pub fn schema_update(table: TableId, source_region: RegionId, schema: impl Into<String>) -> Self {
        Self {
            updated_schema: Some(schema.into()),
            operation: OperationKind::SchemaUpdate,
            ..Self::append(table, source_region, Vec::new())
        }
    }

    /// Overrides the request time.
    #[must_use]
    pub fn requested_at(mut self, requested_at: DateTime<Utc>) -> Self {
        self.requested_at = requested_at;
        self
    }

    /// Returns the identity of this request.
    #[must_use]
    pub fn key(&self) -> CommitRequestKey {
        CommitRequestKey {
            table: self.table.clone(),
            source_region: self.source_region.clone(),
            requested_at: self.requested_at,
        }
    }

    /// Returns true when the write carries data files.
    #[must_use]
    pub fn has_data_files(&self) -> bool {
        !self.new_data_files.is_empty()
    }
}

/// A region's vote on a commit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    /// The region has not voted yet.
    Pending,
    /// The region approved.
    Approved,
    /// The region rejected; terminal for the request.
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

/// One required region's approval record for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitApproval {
    /// The request voted on.
    pub request: CommitRequestKey,
    /// The voting region.
    pub region: RegionId,
    /// Current vote.
    pub status: ApprovalStatus,
    /// When the vote was recorded (or the record created, while pending).
    pub decided_at: DateTime<Utc>,
    /// Reason given for a rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_identifies_attempt() {
        let table = TableId::new("demo", "orders");
        let at = Utc::now();
        let a = CommitRequest::append(table.clone(), RegionId::new("onprem"), vec![]).requested_at(at);
        let b = CommitRequest::overwrite(table, RegionId::new("onprem"), vec![]).requested_at(at);
        assert_eq!(a.key(), b.key());

        let later = a.clone().requested_at(at + chrono::Duration::milliseconds(1));
        assert_ne!(a.key(), later.key());
    }

    #[test]
    fn schema_update_has_no_files() {
        let req = CommitRequest::schema_update(
            TableId::new("demo", "orders"),
            RegionId::new("onprem"),
            "id BIGINT",
        );
        assert_eq!(req.operation, OperationKind::SchemaUpdate);
        assert!(!req.has_data_files());
        assert_eq!(req.updated_schema.as_deref(), Some("id BIGINT"));
    }
}
