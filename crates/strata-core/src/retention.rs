//! Deletion plans and safety windows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::TableId;
use crate::region::Side;

/// Minimum delay between generating a delete plan and executing it.
///
/// The cloud delay is expected to be at least the on-prem delay: cloud readers
/// may lag behind the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyWindow {
    /// Delay applied on the on-prem side, in seconds.
    pub onprem_delay_secs: u64,
    /// Delay applied on the cloud side, in seconds.
    pub cloud_delay_secs: u64,
}

impl Default for SafetyWindow {
    fn default() -> Self {
        Self {
            onprem_delay_secs: 60,
            cloud_delay_secs: 180,
        }
    }
}

impl SafetyWindow {
    /// Largest delay, in seconds, that converts to a `chrono::Duration`.
    pub const MAX_DELAY_SECS: u64 = i64::MAX.unsigned_abs() / 1000;

    /// Creates a safety window.
    #[must_use]
    pub const fn new(onprem_delay_secs: u64, cloud_delay_secs: u64) -> Self {
        Self {
            onprem_delay_secs,
            cloud_delay_secs,
        }
    }

    /// Returns the delay for `side`.
    ///
    /// Delays beyond [`MAX_DELAY_SECS`](Self::MAX_DELAY_SECS) saturate to
    /// `chrono::Duration::MAX`, which keeps every plan waiting.
    #[must_use]
    pub fn delay_for(&self, side: Side) -> chrono::Duration {
        let secs = match side {
            Side::OnPrem => self.onprem_delay_secs,
            Side::Cloud => self.cloud_delay_secs,
        };
        i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

/// An immutable set of files scheduled for deletion.
///
/// Fields are private: once generated, neither the candidate list nor the
/// time bounds can change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePlan {
    table: TableId,
    candidates: Vec<String>,
    generated_at: DateTime<Utc>,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    approvals: Vec<String>,
}

impl DeletePlan {
    /// Creates a plan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `valid_from` is after `valid_until`.
    pub fn new(
        table: TableId,
        candidates: Vec<String>,
        generated_at: DateTime<Utc>,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
        approvals: Vec<String>,
    ) -> Result<Self> {
        if valid_from > valid_until {
            return Err(Error::InvalidInput(format!(
                "delete plan validity is empty: {valid_from} > {valid_until}"
            )));
        }
        Ok(Self {
            table,
            candidates,
            generated_at,
            valid_from,
            valid_until,
            approvals,
        })
    }

    /// Table the plan applies to.
    #[must_use]
    pub const fn table(&self) -> &TableId {
        &self.table
    }

    /// Object paths to delete.
    #[must_use]
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// When the plan was generated.
    #[must_use]
    pub const fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Start of the validity interval.
    #[must_use]
    pub const fn valid_from(&self) -> DateTime<Utc> {
        self.valid_from
    }

    /// End of the validity interval.
    #[must_use]
    pub const fn valid_until(&self) -> DateTime<Utc> {
        self.valid_until
    }

    /// Approvers recorded on the plan.
    #[must_use]
    pub fn approvals(&self) -> &[String] {
        &self.approvals
    }

    /// Returns true if `now` lies in `[valid_from, valid_until]`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_from && now <= self.valid_until
    }
}
