//! Commit gate: multi-region approval for pending writes.
//!
//! ## Quorum rule
//!
//! A request is approved iff every required region has voted `APPROVED` and
//! none has voted `REJECTED`. A rejection is terminal: approvals arriving
//! afterwards from other regions are recorded but do not revive the request.
//!
//! ## Locking
//!
//! [`CommitGate::request_approval`] takes the catalog's table lock, so at most
//! one commit per table is in flight. Each acquisition holds the lock under
//! its own owner token, so a lock that expired and was taken over is never
//! released by the previous holder. [`CommitGate::release_lock`] drops it and
//! clears the vote tracking; it is idempotent and must be called on every
//! path after a successful `request_approval`, success or failure.
//!
//! A request key is reserved before the gate awaits anything, so two
//! concurrent submissions of the same request cannot both proceed.
//!
//! Vote state lives behind a synchronous mutex that is never held across an
//! await. Waiters observe quorum changes through a `watch` channel.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use ulid::Ulid;

use strata_core::catalog::Catalog;
use strata_core::commit::{ApprovalStatus, CommitApproval, CommitRequest, CommitRequestKey};
use strata_core::registry::Registry;
use strata_core::{Error, RegionId, Result};

/// Overall state of a commit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuorumStatus {
    /// At least one required region has not voted.
    Pending,
    /// Every required region approved.
    Approved,
    /// A required region rejected.
    Rejected {
        /// First region to reject.
        region: RegionId,
        /// Reason it gave.
        reason: String,
    },
}

impl QuorumStatus {
    /// Returns true once the request is approved.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Returns true once the outcome is known.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

struct Tracking {
    request: CommitRequest,
    owner: String,
    required: BTreeSet<RegionId>,
    votes: BTreeMap<RegionId, CommitApproval>,
    status: watch::Sender<QuorumStatus>,
}

impl Tracking {
    fn current(&self) -> QuorumStatus {
        self.status.borrow().clone()
    }

    fn recompute(&self) {
        if matches!(*self.status.borrow(), QuorumStatus::Rejected { .. }) {
            return;
        }
        let approved = self
            .votes
            .values()
            .all(|v| v.status == ApprovalStatus::Approved);
        if approved {
            self.status.send_replace(QuorumStatus::Approved);
        }
    }

    fn vote_mut(&mut self, key: &CommitRequestKey, region: &RegionId) -> Result<&mut CommitApproval> {
        if !self.required.contains(region) {
            return Err(Error::invalid_region(
                region,
                format!("not a required region for {}", key.table),
            ));
        }
        self.votes
            .get_mut(region)
            .ok_or_else(|| Error::internal(format!("missing vote record for {region}")))
    }
}

/// Pending approval for one request.
///
/// Obtained from [`CommitGate::request_approval`]. Dropping the handle does not
/// release the table lock; call [`CommitGate::release_lock`].
#[derive(Debug)]
pub struct ApprovalHandle {
    key: CommitRequestKey,
    owner: String,
    status: watch::Receiver<QuorumStatus>,
}

impl ApprovalHandle {
    /// The request this handle waits on.
    #[must_use]
    pub const fn key(&self) -> &CommitRequestKey {
        &self.key
    }

    /// Owner token the table lock was taken under.
    #[must_use]
    pub fn lock_owner(&self) -> &str {
        &self.owner
    }

    /// Current status without waiting.
    #[must_use]
    pub fn status(&self) -> QuorumStatus {
        self.status.borrow().clone()
    }

    /// Waits until every required region approved, any rejected, or `timeout`
    /// elapses.
    ///
    /// # Errors
    ///
    /// - [`Error::QuorumDenied`] naming the rejecting region
    /// - [`Error::Timeout`] if votes are still missing after `timeout`
    /// - [`Error::Conflict`] if the request was released while pending
    pub async fn wait(mut self, timeout: Duration) -> Result<()> {
        let resolved = tokio::time::timeout(timeout, async {
            self.status
                .wait_for(QuorumStatus::is_resolved)
                .await
                .map(|status| (*status).clone())
        })
        .await
        .map_err(|_| Error::Timeout {
            operation: "commit approval",
            elapsed: timeout,
        })?;

        match resolved {
            Ok(QuorumStatus::Approved) => Ok(()),
            Ok(QuorumStatus::Rejected { region, reason }) => Err(Error::QuorumDenied {
                region: region.to_string(),
                reason,
            }),
            Ok(QuorumStatus::Pending) => Err(Error::internal("quorum resolved to pending")),
            Err(_) => Err(Error::conflict(format!(
                "commit request {} released before quorum",
                self.key
            ))),
        }
    }
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::internal("commit gate state poisoned")
}

/// Holds a request key between the duplicate check and tracking insertion.
///
/// Dropping it frees the key, including when the submitting future is
/// cancelled mid-await.
struct Reservation<'a> {
    reserved: &'a Mutex<HashSet<CommitRequestKey>>,
    key: CommitRequestKey,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut reserved = self
            .reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        reserved.remove(&self.key);
    }
}

/// Tracks per-region votes on pending writes.
pub struct CommitGate {
    registry: Arc<dyn Registry>,
    catalog: Arc<dyn Catalog>,
    lock_ttl: Duration,
    requests: Mutex<HashMap<CommitRequestKey, Tracking>>,
    reserved: Mutex<HashSet<CommitRequestKey>>,
}

impl std::fmt::Debug for CommitGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitGate")
            .field("lock_ttl", &self.lock_ttl)
            .finish_non_exhaustive()
    }
}

impl CommitGate {
    /// Creates a gate with a 60 second commit lock TTL.
    #[must_use]
    pub fn new(registry: Arc<dyn Registry>, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            registry,
            catalog,
            lock_ttl: Duration::from_secs(60),
            requests: Mutex::new(HashMap::new()),
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Sets the commit lock TTL.
    #[must_use]
    pub const fn with_lock_ttl(mut self, lock_ttl: Duration) -> Self {
        self.lock_ttl = lock_ttl;
        self
    }

    /// Starts tracking `request` and takes the table's commit lock.
    ///
    /// A table with no required regions is approved immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if another commit holds the table lock or
    /// the same request is already pending. A conflicting caller holds
    /// nothing and must not call [`release_lock`](Self::release_lock).
    #[tracing::instrument(skip(self, request), fields(table = %request.table, source = %request.source_region))]
    pub async fn request_approval(&self, request: &CommitRequest) -> Result<ApprovalHandle> {
        let key = request.key();
        let _reservation = self.reserve(&key)?;

        let required: BTreeSet<RegionId> = self
            .registry
            .required_regions(&request.table)
            .await?
            .into_iter()
            .collect();

        let owner = format!("{key}#{}", Ulid::new());
        if !self
            .catalog
            .acquire_table_lock(&request.table, &owner, self.lock_ttl)
            .await?
        {
            return Err(Error::conflict(format!(
                "another commit is in flight for table {}",
                request.table
            )));
        }

        let now = Utc::now();
        let votes = required
            .iter()
            .map(|region| {
                (
                    region.clone(),
                    CommitApproval {
                        request: key.clone(),
                        region: region.clone(),
                        status: ApprovalStatus::Pending,
                        decided_at: now,
                        reason: None,
                    },
                )
            })
            .collect();
        let initial = if required.is_empty() {
            QuorumStatus::Approved
        } else {
            QuorumStatus::Pending
        };
        let (tx, rx) = watch::channel(initial);
        let required_count = required.len();

        self.requests.lock().map_err(poisoned)?.insert(
            key.clone(),
            Tracking {
                request: request.clone(),
                owner: owner.clone(),
                required,
                votes,
                status: tx,
            },
        );

        tracing::info!(request = %key, required = required_count, "approval requested");
        Ok(ApprovalHandle {
            key,
            owner,
            status: rx,
        })
    }

    fn reserve(&self, key: &CommitRequestKey) -> Result<Reservation<'_>> {
        let mut reserved = self.reserved.lock().map_err(poisoned)?;
        let tracked = self.requests.lock().map_err(poisoned)?.contains_key(key);
        if tracked || !reserved.insert(key.clone()) {
            return Err(Error::conflict(format!("commit request {key} is already pending")));
        }
        Ok(Reservation {
            reserved: &self.reserved,
            key: key.clone(),
        })
    }

    /// Records `region`'s approval.
    ///
    /// Re-approving is a no-op. Returns the resulting quorum status.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an untracked request
    /// - [`Error::InvalidRegion`] if `region` is not required for the table
    /// - [`Error::Conflict`] if `region` already rejected the request
    pub fn approve(&self, key: &CommitRequestKey, region: &RegionId) -> Result<QuorumStatus> {
        let mut requests = self.requests.lock().map_err(poisoned)?;
        let tracking = requests
            .get_mut(key)
            .ok_or_else(|| Error::not_found("commit request", key))?;

        let vote = tracking.vote_mut(key, region)?;
        match vote.status {
            ApprovalStatus::Approved => return Ok(tracking.current()),
            ApprovalStatus::Rejected => {
                return Err(Error::conflict(format!(
                    "region {region} already rejected {key}"
                )));
            }
            ApprovalStatus::Pending => {
                vote.status = ApprovalStatus::Approved;
                vote.decided_at = Utc::now();
            }
        }
        tracking.recompute();
        let status = tracking.current();
        drop(requests);

        tracing::info!(request = %key, region = %region, ?status, "region approved");
        Ok(status)
    }

    /// Records `region`'s rejection. Terminal for the request.
    ///
    /// Rejecting twice is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an untracked request
    /// - [`Error::InvalidRegion`] if `region` is not required for the table
    pub fn reject(
        &self,
        key: &CommitRequestKey,
        region: &RegionId,
        reason: impl Into<String>,
    ) -> Result<QuorumStatus> {
        let reason = reason.into();
        let mut requests = self.requests.lock().map_err(poisoned)?;
        let tracking = requests
            .get_mut(key)
            .ok_or_else(|| Error::not_found("commit request", key))?;

        let vote = tracking.vote_mut(key, region)?;
        if vote.status == ApprovalStatus::Rejected {
            return Ok(tracking.current());
        }
        vote.status = ApprovalStatus::Rejected;
        vote.decided_at = Utc::now();
        vote.reason = Some(reason.clone());

        if !matches!(tracking.current(), QuorumStatus::Rejected { .. }) {
            tracking.status.send_replace(QuorumStatus::Rejected {
                region: region.clone(),
                reason: reason.clone(),
            });
        }
        let status = tracking.current();
        drop(requests);

        tracing::warn!(request = %key, region = %region, reason = %reason, "region rejected");
        Ok(status)
    }

    /// Returns true iff the request is tracked and approved.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the gate state is poisoned.
    pub fn is_approved(&self, key: &CommitRequestKey) -> Result<bool> {
        let requests = self.requests.lock().map_err(poisoned)?;
        Ok(requests.get(key).is_some_and(|t| t.current().is_approved()))
    }

    /// Current quorum status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an untracked request.
    pub fn status(&self, key: &CommitRequestKey) -> Result<QuorumStatus> {
        let requests = self.requests.lock().map_err(poisoned)?;
        requests
            .get(key)
            .map(Tracking::current)
            .ok_or_else(|| Error::not_found("commit request", key))
    }

    /// Every required region's vote, ordered by region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an untracked request.
    pub fn approvals(&self, key: &CommitRequestKey) -> Result<Vec<CommitApproval>> {
        let requests = self.requests.lock().map_err(poisoned)?;
        requests
            .get(key)
            .map(|t| t.votes.values().cloned().collect())
            .ok_or_else(|| Error::not_found("commit request", key))
    }

    /// Unresolved requests on which `region` has yet to vote, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the gate state is poisoned.
    pub fn pending_requests(&self, region: &RegionId) -> Result<Vec<CommitRequest>> {
        let requests = self.requests.lock().map_err(poisoned)?;
        let mut pending: Vec<_> = requests
            .values()
            .filter(|t| !t.current().is_resolved())
            .filter(|t| {
                t.votes
                    .get(region)
                    .is_some_and(|v| v.status == ApprovalStatus::Pending)
            })
            .map(|t| t.request.clone())
            .collect();
        pending.sort_by_key(|r| r.requested_at);
        Ok(pending)
    }

    /// Clears tracking for the request and releases its table lock.
    ///
    /// Safe to call any number of times, on success or failure.
    ///
    /// # Errors
    ///
    /// Propagates catalog failures from releasing the lock.
    pub async fn release_lock(&self, key: &CommitRequestKey) -> Result<()> {
        let removed = self.requests.lock().map_err(poisoned)?.remove(key);
        if let Some(tracking) = removed {
            self.catalog
                .release_table_lock(&key.table, &tracking.owner)
                .await?;
            tracing::debug!(request = %key, "commit lock released");
        }
        Ok(())
    }
}
