//! Control plane metrics.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `strata_gc_deleted_total` | Counter | `side` | Files deleted by GC |
//! | `strata_gc_delete_failed_total` | Counter | `side` | Failed GC deletes |
//! | `strata_gc_skipped_total` | Counter | `reason` | Candidates skipped by GC |
//! | `strata_replication_planned_files_total` | Counter | - | Files added to copy sets |
//! | `strata_reconciler_promotions_total` | Counter | - | Snapshots promoted |
//! | `strata_reconciler_integrity_failures_total` | Counter | - | Failed verifications |
//! | `strata_sync_events_processed_total` | Counter | `outcome` | Sync events processed |
//! | `strata_sync_files_copied_total` | Counter | - | Files copied by data sync |
//! | `strata_commit_approval_seconds` | Histogram | - | Time spent waiting for quorum |
//! | `strata_commits_total` | Counter | `outcome` | Write attempts by outcome |
//!
//! Components report through [`MetricsSink`]; [`RecorderMetrics`] forwards to
//! the `metrics` facade so any installed recorder (Prometheus, statsd, ...)
//! receives them.

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use strata_core::metrics::MetricsSink;

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: files deleted by GC.
    pub const GC_DELETED_TOTAL: &str = "strata_gc_deleted_total";
    /// Counter: failed GC deletes.
    pub const GC_DELETE_FAILED_TOTAL: &str = "strata_gc_delete_failed_total";
    /// Counter: GC candidates skipped, by reason.
    pub const GC_SKIPPED_TOTAL: &str = "strata_gc_skipped_total";
    /// Counter: files added to replication copy sets.
    pub const REPLICATION_PLANNED_FILES_TOTAL: &str = "strata_replication_planned_files_total";
    /// Counter: snapshots promoted in the mirror.
    pub const RECONCILER_PROMOTIONS_TOTAL: &str = "strata_reconciler_promotions_total";
    /// Counter: promotions aborted by a failed verification.
    pub const RECONCILER_INTEGRITY_FAILURES_TOTAL: &str =
        "strata_reconciler_integrity_failures_total";
    /// Counter: sync events processed, by outcome.
    pub const SYNC_EVENTS_PROCESSED_TOTAL: &str = "strata_sync_events_processed_total";
    /// Counter: files copied by data sync.
    pub const SYNC_FILES_COPIED_TOTAL: &str = "strata_sync_files_copied_total";
    /// Histogram: seconds spent waiting for commit quorum.
    pub const COMMIT_APPROVAL_SECONDS: &str = "strata_commit_approval_seconds";
    /// Counter: write attempts, by outcome.
    pub const COMMITS_TOTAL: &str = "strata_commits_total";

    /// Counter reported through the sink for each deleted file.
    pub const GC_DELETED: &str = "gc.deleted";
    /// Counter reported through the sink for each failed delete.
    pub const GC_DELETE_FAIL: &str = "gc.delete_fail";
}

/// Label keys used across metrics.
pub mod labels {
    /// Why a GC candidate was skipped (`safety_window`, `watermark`).
    pub const REASON: &str = "reason";
    /// Result of an operation (`completed`, `failed`, `approved`, ...).
    pub const OUTCOME: &str = "outcome";
    /// Environment side (`onprem`, `cloud`).
    pub const SIDE: &str = "side";
}

/// Registers descriptions for every metric. Call once after installing a recorder.
pub fn register_metrics() {
    describe_counter!(names::GC_DELETED_TOTAL, Unit::Count, "Files deleted by GC");
    describe_counter!(
        names::GC_DELETE_FAILED_TOTAL,
        Unit::Count,
        "GC deletes that failed and will be retried by a later pass"
    );
    describe_counter!(
        names::GC_SKIPPED_TOTAL,
        Unit::Count,
        "GC candidates skipped by the safety window or watermark rule"
    );
    describe_counter!(
        names::REPLICATION_PLANNED_FILES_TOTAL,
        Unit::Count,
        "Files added to replication copy sets"
    );
    describe_counter!(
        names::RECONCILER_PROMOTIONS_TOTAL,
        Unit::Count,
        "Snapshots made visible in the mirror"
    );
    describe_counter!(
        names::RECONCILER_INTEGRITY_FAILURES_TOTAL,
        Unit::Count,
        "Promotions aborted because a file was missing or the wrong size"
    );
    describe_counter!(
        names::SYNC_EVENTS_PROCESSED_TOTAL,
        Unit::Count,
        "Sync events processed by outcome"
    );
    describe_counter!(
        names::SYNC_FILES_COPIED_TOTAL,
        Unit::Count,
        "Data files copied between regions by data sync"
    );
    describe_histogram!(
        names::COMMIT_APPROVAL_SECONDS,
        Unit::Seconds,
        "Time spent waiting for every required region to vote"
    );
    describe_counter!(names::COMMITS_TOTAL, Unit::Count, "Write attempts by outcome");
}

/// [`MetricsSink`] backed by the `metrics` facade.
///
/// Names containing a `{label=value}` suffix are split into a metric name and
/// one label, so `strata_gc_skipped_total{reason=watermark}` becomes the
/// counter `strata_gc_skipped_total` with label `reason="watermark"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecorderMetrics;

impl RecorderMetrics {
    /// Creates a facade-backed sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn split_label(name: &str) -> (String, Option<(String, String)>) {
    if let Some((base, rest)) = name.split_once('{') {
        if let Some((key, value)) = rest.trim_end_matches('}').split_once('=') {
            return (
                base.to_string(),
                Some((key.to_string(), value.trim_matches('"').to_string())),
            );
        }
    }
    (name.to_string(), None)
}

impl MetricsSink for RecorderMetrics {
    fn increment(&self, name: &str, delta: u64) {
        match split_label(name) {
            (base, Some((key, value))) => counter!(base, key => value).increment(delta),
            (base, None) => counter!(base).increment(delta),
        }
    }

    fn observe(&self, name: &str, value: f64) {
        match split_label(name) {
            (base, Some((key, label))) => histogram!(base, key => label).record(value),
            (base, None) => histogram!(base).record(value),
        }
    }
}

/// Builds a sink metric name carrying one label.
#[must_use]
pub fn labeled(name: &str, key: &str, value: &str) -> String {
    format!("{name}{{{key}={value}}}")
}
