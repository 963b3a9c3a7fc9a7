//! Consistency tracker: per-table mirror freshness.

use std::sync::Arc;

use strata_core::consistency::{ConsistencyStore, ConsistencyToken};
use strata_core::snapshot::SnapshotId;
use strata_core::{Result, TableId};

/// Stores and advances per-table consistency tokens.
///
/// The watermark never regresses: [`advance`](Self::advance) ignores a token
/// older than the stored one.
#[derive(Clone)]
pub struct ConsistencyTracker {
    store: Arc<dyn ConsistencyStore>,
}

impl std::fmt::Debug for ConsistencyTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyTracker").finish_non_exhaustive()
    }
}

impl ConsistencyTracker {
    /// Creates a tracker over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ConsistencyStore>) -> Self {
        Self { store }
    }

    /// Loads the current token for `table`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn current(&self, table: &TableId) -> Result<Option<ConsistencyToken>> {
        self.store.load(table).await
    }

    /// Saves `token` unless it would move the watermark backwards.
    ///
    /// The comparison and the write happen atomically in the store, so
    /// concurrent advances settle on the newest token.
    ///
    /// Returns the token in effect afterwards: `token` if it was saved, or the
    /// stored token if `token` was stale.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    #[tracing::instrument(skip(self, token), fields(table = %table))]
    pub async fn advance(
        &self,
        table: &TableId,
        token: ConsistencyToken,
    ) -> Result<ConsistencyToken> {
        let offered = token.clone();
        let saved = self.store.save_if_newer(table, token).await?;
        if saved == offered {
            tracing::info!(
                watermark = %saved.high_watermark_ts,
                sequence = saved.last_applied_sequence,
                inventory_version = %saved.inventory_version,
                "watermark advanced"
            );
        } else {
            tracing::debug!(
                stored = %saved.high_watermark_ts,
                offered = %offered.high_watermark_ts,
                "ignoring stale consistency token"
            );
        }
        Ok(saved)
    }

    /// Advances the watermark to a promoted snapshot's commit time.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn advance_to_snapshot(
        &self,
        table: &TableId,
        snapshot: &SnapshotId,
        inventory_version: &str,
    ) -> Result<ConsistencyToken> {
        let token = ConsistencyToken::new(
            snapshot.committed_at,
            snapshot.sequence_number,
            inventory_version,
        );
        self.advance(table, token).await
    }
}
