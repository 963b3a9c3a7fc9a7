//! Query leases: soft, time-bounded holds that protect a snapshot from GC.
//!
//! Leases have no owner lock. Create, renew and release on one lease id are
//! linearizable; different leases never coordinate.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, poison_err};
use crate::id::{LeaseId, TableId};

/// A hold on `(table, snapshot)` until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLease {
    /// Lease identity.
    pub id: LeaseId,
    /// Protected table.
    pub table: TableId,
    /// Protected snapshot id.
    pub snapshot_id: String,
    /// Who holds the lease (query id, session, ...).
    pub holder: String,
    /// When the lease lapses.
    pub expires_at: DateTime<Utc>,
}

impl QueryLease {
    /// Returns true if the lease is still in force at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Storage for query leases.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Creates a lease lasting `ttl` from now.
    async fn create(
        &self,
        table: &TableId,
        snapshot_id: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<QueryLease>;

    /// Extends a lease to `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the lease does not exist or already expired.
    async fn renew(&self, lease_id: &LeaseId, ttl: Duration) -> Result<QueryLease>;

    /// Releases a lease. Returns whether it existed.
    async fn release(&self, lease_id: &LeaseId) -> Result<bool>;

    /// Unexpired leases on `table`.
    async fn list_active(&self, table: &TableId) -> Result<Vec<QueryLease>>;
}

fn expiry(ttl: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(30))
}

/// In-memory [`LeaseStore`].
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    leases: RwLock<HashMap<LeaseId, QueryLease>>,
}

impl InMemoryLeaseStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn create(
        &self,
        table: &TableId,
        snapshot_id: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<QueryLease> {
        let lease = QueryLease {
            id: LeaseId::generate(),
            table: table.clone(),
            snapshot_id: snapshot_id.to_string(),
            holder: holder.to_string(),
            expires_at: expiry(ttl),
        };
        let mut leases = self.leases.write().map_err(poison_err)?;
        leases.insert(lease.id, lease.clone());
        Ok(lease)
    }

    async fn renew(&self, lease_id: &LeaseId, ttl: Duration) -> Result<QueryLease> {
        let mut leases = self.leases.write().map_err(poison_err)?;
        let now = Utc::now();
        match leases.get_mut(lease_id) {
            Some(lease) if lease.is_active_at(now) => {
                lease.expires_at = expiry(ttl);
                Ok(lease.clone())
            }
            _ => Err(Error::not_found("lease", lease_id)),
        }
    }

    async fn release(&self, lease_id: &LeaseId) -> Result<bool> {
        let mut leases = self.leases.write().map_err(poison_err)?;
        Ok(leases.remove(lease_id).is_some())
    }

    async fn list_active(&self, table: &TableId) -> Result<Vec<QueryLease>> {
        let leases = self.leases.read().map_err(poison_err)?;
        let now = Utc::now();
        let mut active: Vec<_> = leases
            .values()
            .filter(|l| &l.table == table && l.is_active_at(now))
            .cloned()
            .collect();
        active.sort_by_key(|l| l.expires_at);
        Ok(active)
    }
}
