//! Lease registry: short-lived holds that protect a `(table, snapshot)` pair
//! from garbage collection.

use std::sync::Arc;
use std::time::Duration;

use strata_core::lease::{LeaseStore, QueryLease};
use strata_core::{LeaseId, Result, TableId};

/// Default lease duration when the caller does not pick one.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(300);

/// Issues and tracks query leases.
#[derive(Clone)]
pub struct LeaseRegistry {
    store: Arc<dyn LeaseStore>,
    default_ttl: Duration,
}

impl std::fmt::Debug for LeaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseRegistry")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl LeaseRegistry {
    /// Creates a registry over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self {
            store,
            default_ttl: DEFAULT_LEASE_TTL,
        }
    }

    /// Sets the TTL used by [`acquire`](Self::acquire) and [`renew`](Self::renew).
    #[must_use]
    pub const fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Takes a lease on `snapshot_id` of `table` for `holder`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    #[tracing::instrument(skip(self), fields(table = %table))]
    pub async fn acquire(
        &self,
        table: &TableId,
        snapshot_id: &str,
        holder: &str,
    ) -> Result<QueryLease> {
        let lease = self
            .store
            .create(table, snapshot_id, holder, self.default_ttl)
            .await?;
        tracing::debug!(lease = %lease.id, expires_at = %lease.expires_at, "lease acquired");
        Ok(lease)
    }

    /// Extends `lease_id` by the default TTL from now.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the lease expired or was released.
    pub async fn renew(&self, lease_id: &LeaseId) -> Result<QueryLease> {
        self.store.renew(lease_id, self.default_ttl).await
    }

    /// Releases `lease_id`. Releasing an unknown lease is not an error.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn release(&self, lease_id: &LeaseId) -> Result<bool> {
        let existed = self.store.release(lease_id).await?;
        if !existed {
            tracing::debug!(lease = %lease_id, "release of unknown lease");
        }
        Ok(existed)
    }

    /// Unexpired leases on `table`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn active(&self, table: &TableId) -> Result<Vec<QueryLease>> {
        self.store.list_active(table).await
    }

    /// Returns true if any unexpired lease holds `snapshot_id` of `table`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn is_protected(&self, table: &TableId, snapshot_id: &str) -> Result<bool> {
        Ok(self
            .active(table)
            .await?
            .iter()
            .any(|lease| lease.snapshot_id == snapshot_id))
    }
}
