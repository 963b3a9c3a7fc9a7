//! GC coordinator: apply delete plans under safety-window and watermark rules.
//!
//! For each candidate of a valid plan:
//!
//! 1. skip unless `now - generated_at` exceeds the side's safety-window delay
//! 2. skip unless the watermark rule allows this side to delete
//!    - no token: on-prem may delete, cloud may not
//!    - token: only if the watermark is not earlier than `generated_at`
//! 3. delete, counting success or failure, and move on
//!
//! A delete pass never fails because of a single object. Failed deletes are
//! picked up by a later pass with a fresh plan. Deletes are idempotent, so
//! re-applying a plan is safe.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strata_core::consistency::ConsistencyStore;
use strata_core::lease::LeaseStore;
use strata_core::metrics::MetricsSink;
use strata_core::object_store::ObjectStore;
use strata_core::region::Side;
use strata_core::retention::{DeletePlan, SafetyWindow};
use strata_core::Result;

use crate::metrics::{labeled, labels, names};

/// A candidate that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcFailure {
    /// Object path.
    pub path: String,
    /// Error message.
    pub error: String,
}

/// Summary of one delete pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcReport {
    /// True if the plan was outside its validity interval and ignored.
    pub discarded: bool,
    /// Paths deleted (or already absent).
    pub deleted: Vec<String>,
    /// Deletes that failed.
    pub failed: Vec<GcFailure>,
    /// Candidates still inside the safety window.
    pub skipped_safety_window: usize,
    /// Candidates blocked by the watermark rule.
    pub skipped_watermark: usize,
    /// Active leases on the table when the pass ran.
    pub active_leases: usize,
}

/// Applies delete plans for one environment's storage.
pub struct GcCoordinator {
    store: Arc<dyn ObjectStore>,
    leases: Arc<dyn LeaseStore>,
    consistency: Arc<dyn ConsistencyStore>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for GcCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcCoordinator").finish_non_exhaustive()
    }
}

impl GcCoordinator {
    /// Creates a coordinator deleting from `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        leases: Arc<dyn LeaseStore>,
        consistency: Arc<dyn ConsistencyStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            store,
            leases,
            consistency,
            metrics,
        }
    }

    /// Applies `plan` now.
    ///
    /// # Errors
    ///
    /// Only lease and token loading can fail; per-file delete failures are
    /// reported in [`GcReport::failed`].
    pub async fn apply_delete_plan(
        &self,
        plan: &DeletePlan,
        window: SafetyWindow,
        side: Side,
    ) -> Result<GcReport> {
        self.apply_delete_plan_at(plan, window, side, Utc::now()).await
    }

    /// Applies `plan` as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// See [`apply_delete_plan`](Self::apply_delete_plan).
    #[tracing::instrument(skip(self, plan, window), fields(table = %plan.table(), side = %side))]
    pub async fn apply_delete_plan_at(
        &self,
        plan: &DeletePlan,
        window: SafetyWindow,
        side: Side,
        now: DateTime<Utc>,
    ) -> Result<GcReport> {
        let mut report = GcReport::default();
        if !plan.is_valid_at(now) {
            tracing::info!(
                valid_from = %plan.valid_from(),
                valid_until = %plan.valid_until(),
                "delete plan outside validity interval; discarded"
            );
            report.discarded = true;
            return Ok(report);
        }

        let leases = self.leases.list_active(plan.table()).await?;
        report.active_leases = leases.len();
        let token = self.consistency.load(plan.table()).await?;

        let window_elapsed = now - plan.generated_at() > window.delay_for(side);
        let watermark_allows = match &token {
            None => !side.is_cloud(),
            Some(token) => token.high_watermark_ts >= plan.generated_at(),
        };

        for path in plan.candidates() {
            if !window_elapsed {
                report.skipped_safety_window += 1;
                continue;
            }
            if !watermark_allows {
                report.skipped_watermark += 1;
                continue;
            }
            match self.store.delete(path).await {
                Ok(_) => {
                    self.metrics.increment(names::GC_DELETED, 1);
                    self.metrics.increment(
                        &labeled(names::GC_DELETED_TOTAL, labels::SIDE, &side.to_string()),
                        1,
                    );
                    report.deleted.push(path.clone());
                }
                Err(e) => {
                    self.metrics.increment(names::GC_DELETE_FAIL, 1);
                    self.metrics.increment(
                        &labeled(names::GC_DELETE_FAILED_TOTAL, labels::SIDE, &side.to_string()),
                        1,
                    );
                    tracing::warn!(path = %path, error = %e, "delete failed; will retry on a later pass");
                    report.failed.push(GcFailure {
                        path: path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.skipped_safety_window > 0 {
            self.metrics.increment(
                &labeled(names::GC_SKIPPED_TOTAL, labels::REASON, "safety_window"),
                report.skipped_safety_window as u64,
            );
        }
        if report.skipped_watermark > 0 {
            self.metrics.increment(
                &labeled(names::GC_SKIPPED_TOTAL, labels::REASON, "watermark"),
                report.skipped_watermark as u64,
            );
        }

        tracing::info!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            skipped_safety_window = report.skipped_safety_window,
            skipped_watermark = report.skipped_watermark,
            active_leases = report.active_leases,
            has_token = token.is_some(),
            "delete plan applied"
        );
        Ok(report)
    }
}
