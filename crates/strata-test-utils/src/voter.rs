//! Simulated remote region that votes on pending commit requests.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use strata_control::CommitGate;
use strata_core::RegionId;

/// How a [`RegionVoter`] answers.
#[derive(Debug, Clone)]
pub enum Vote {
    /// Approve every request.
    Approve,
    /// Reject every request with this reason.
    Reject(String),
    /// Never answer.
    Silent,
}

/// Polls the gate for requests awaiting `region` and answers them.
///
/// Dropping the voter aborts its task.
#[derive(Debug)]
pub struct RegionVoter {
    handle: JoinHandle<()>,
}

impl RegionVoter {
    /// Starts voting `vote` for `region` every `interval`.
    pub fn spawn(gate: Arc<CommitGate>, region: RegionId, vote: Vote, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                match gate.pending_requests(&region) {
                    Ok(requests) => {
                        for request in requests {
                            let key = request.key();
                            let result = match &vote {
                                Vote::Approve => gate.approve(&key, &region).map(|_| ()),
                                Vote::Reject(reason) => {
                                    gate.reject(&key, &region, reason.clone()).map(|_| ())
                                }
                                Vote::Silent => Ok(()),
                            };
                            if let Err(e) = result {
                                tracing::debug!(region = %region, request = %key, error = %e, "vote not recorded");
                            }
                        }
                    }
                    Err(e) => tracing::warn!(region = %region, error = %e, "listing pending requests failed"),
                }
                tokio::time::sleep(interval).await;
            }
        });
        Self { handle }
    }

    /// Starts an approving voter polling every 5ms.
    pub fn approving(gate: Arc<CommitGate>, region: RegionId) -> Self {
        Self::spawn(gate, region, Vote::Approve, Duration::from_millis(5))
    }

    /// Starts a rejecting voter polling every 5ms.
    pub fn rejecting(gate: Arc<CommitGate>, region: RegionId, reason: impl Into<String>) -> Self {
        Self::spawn(gate, region, Vote::Reject(reason.into()), Duration::from_millis(5))
    }
}

impl Drop for RegionVoter {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
