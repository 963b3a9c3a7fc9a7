//! Read router: on-prem or cloud, given the requested snapshot and the watermark.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use strata_core::consistency::{ConsistencyStore, ConsistencyToken};
use strata_core::snapshot::SnapshotId;
use strata_core::TableId;

/// How a caller wants its read routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingPolicy {
    /// Cloud when it has the snapshot, otherwise on-prem.
    PreferCloud,
    /// Always on-prem.
    PreferOnPrem,
    /// Cloud only when the watermark covers the snapshot.
    MeetWatermark,
}

/// Where a read goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteTarget {
    /// The on-prem source of truth.
    OnPrem,
    /// The cloud mirror.
    Cloud,
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OnPrem => "ONPREM",
            Self::Cloud => "CLOUD",
        })
    }
}

/// Routing result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    /// Chosen environment.
    pub target: RouteTarget,
    /// Snapshot to read there.
    pub snapshot: SnapshotId,
}

/// Routes reads using the consistency watermark.
pub struct ReadRouter {
    consistency: Arc<dyn ConsistencyStore>,
}

impl fmt::Debug for ReadRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadRouter").finish_non_exhaustive()
    }
}

impl ReadRouter {
    /// Creates a router.
    #[must_use]
    pub fn new(consistency: Arc<dyn ConsistencyStore>) -> Self {
        Self { consistency }
    }

    /// Chooses where to read `snapshot` of `table`.
    ///
    /// Never fails: a missing token or a token store error routes on-prem.
    #[tracing::instrument(skip(self, snapshot), fields(table = %table, snapshot = %snapshot.id, ?policy))]
    pub async fn route(
        &self,
        table: &TableId,
        snapshot: &SnapshotId,
        policy: RoutingPolicy,
    ) -> RouteDecision {
        let target = match policy {
            RoutingPolicy::PreferOnPrem => RouteTarget::OnPrem,
            // Both policies require the mirror to have the snapshot.
            RoutingPolicy::PreferCloud | RoutingPolicy::MeetWatermark => {
                let token = match self.consistency.load(table).await {
                    Ok(token) => token,
                    Err(e) => {
                        tracing::warn!(error = %e, "token load failed; routing on-prem");
                        None
                    }
                };
                if cloud_eligible(token.as_ref(), snapshot) {
                    RouteTarget::Cloud
                } else {
                    RouteTarget::OnPrem
                }
            }
        };

        tracing::debug!(target = %target, "read routed");
        RouteDecision {
            target,
            snapshot: snapshot.clone(),
        }
    }
}

fn cloud_eligible(token: Option<&ConsistencyToken>, snapshot: &SnapshotId) -> bool {
    token.is_some_and(|t| snapshot.committed_at <= t.high_watermark_ts)
}
