//! State reconciler: verify copied files, then make the mirror snapshot visible.
//!
//! Verification is all-or-nothing. Visibility flips only after every file in
//! the snapshot passed; a single missing or mis-sized file aborts the whole
//! promotion and leaves the catalog untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use strata_core::catalog::Catalog;
use strata_core::metrics::MetricsSink;
use strata_core::object_store::ObjectStore;
use strata_core::snapshot::SnapshotId;
use strata_core::{Error, Result, TableId};

use crate::metrics::names;

/// Outcome of a successful [`StateReconciler::verify_and_promote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Promotion {
    /// Files verified.
    pub files_verified: usize,
    /// Visibility timestamp now in effect.
    pub visible_at: DateTime<Utc>,
    /// False if the snapshot was already visible and was only re-verified.
    pub newly_visible: bool,
}

/// Verifies and promotes snapshots in the mirror.
pub struct StateReconciler {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn ObjectStore>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for StateReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateReconciler").finish_non_exhaustive()
    }
}

impl StateReconciler {
    /// Creates a reconciler over the mirror's catalog and storage.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn ObjectStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            catalog,
            store,
            metrics,
        }
    }

    /// Verifies every file of `snapshot` and sets its visibility to `visible_at`.
    ///
    /// Re-running on an already visible snapshot re-verifies the files and
    /// leaves the existing visibility timestamp alone.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the snapshot is not in the mirror catalog
    /// - [`Error::IntegrityViolation`] naming the first file that is missing
    ///   or has the wrong size
    /// - storage errors from stat calls
    #[tracing::instrument(skip(self, snapshot), fields(table = %table, snapshot = %snapshot.id))]
    pub async fn verify_and_promote(
        &self,
        table: &TableId,
        snapshot: &SnapshotId,
        visible_at: DateTime<Utc>,
    ) -> Result<Promotion> {
        let stored = self
            .catalog
            .snapshot(table, &snapshot.id)
            .await?
            .ok_or_else(|| Error::not_found("snapshot", &snapshot.id))?;

        let mut verified = 0usize;
        for file in stored.files() {
            let failure = match self.store.stat(&file.path).await? {
                None => Some("object is missing".to_string()),
                Some(stat) if stat.size != file.size => Some(format!(
                    "size mismatch: expected {} bytes, found {}",
                    file.size, stat.size
                )),
                Some(_) => None,
            };
            if let Some(message) = failure {
                self.metrics
                    .increment(names::RECONCILER_INTEGRITY_FAILURES_TOTAL, 1);
                tracing::error!(path = %file.path, reason = %message, "verification failed; promotion aborted");
                return Err(Error::integrity(&file.path, message));
            }
            verified += 1;
        }

        if let Some(existing) = stored.visible_at {
            tracing::info!(files = verified, visible_at = %existing, "snapshot already visible; re-verified");
            return Ok(Promotion {
                files_verified: verified,
                visible_at: existing,
                newly_visible: false,
            });
        }

        self.catalog
            .set_visibility(table, &snapshot.id, visible_at)
            .await?;
        self.metrics.increment(names::RECONCILER_PROMOTIONS_TOTAL, 1);
        tracing::info!(files = verified, visible_at = %visible_at, "snapshot promoted");
        Ok(Promotion {
            files_verified: verified,
            visible_at,
            newly_visible: true,
        })
    }
}
