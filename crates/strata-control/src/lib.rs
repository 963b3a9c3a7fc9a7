//! # strata-control
//!
//! Coordination engine for the strata hybrid catalog.
//!
//! An on-premise catalog is the source of truth; a cloud mirror serves
//! low-latency reads. This crate holds the orchestration layered on top of the
//! `strata-core` ports:
//!
//! - **Commit Gate**: per-region approval with a set-based quorum and a
//!   per-table commit lock
//! - **Write Coordinator**: approval, catalog commit, sync-event fan-out
//! - **Replication Planner**: manifest, inventory and stat deduplication
//! - **State Reconciler**: all-or-nothing verify-and-promote
//! - **Consistency Tracker** and **Read Router**: a never-regressing watermark
//!   and the routing decision that consumes it
//! - **Lease Registry** and **GC Coordinator**: safety-windowed deletion
//! - **Sync Orchestrator** and **Region Worker**: per-region event draining
//!
//! ## Write Path
//!
//! ```text
//! CommitRequest ─► CommitGate ─► Catalog ─► SyncQueue ─► RegionWorker (per region)
//!                  (quorum)      (commit)   (events)     (metadata / data sync)
//! ```
//!
//! ## Mirror Path
//!
//! ```text
//! ReplicationPlanner ─► external copy ─► StateReconciler ─► ConsistencyTracker ─► ReadRouter
//!   (copy set)                           (verify, promote)   (advance watermark)    (route)
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod commit_gate;
pub mod config;
pub mod consistency;
pub mod gc;
pub mod lease;
pub mod metrics;
pub mod planner;
pub mod reconciler;
pub mod router;
pub mod sync;
pub mod write_coordinator;

pub use commit_gate::{ApprovalHandle, CommitGate, QuorumStatus};
pub use config::ControlConfig;
pub use consistency::ConsistencyTracker;
pub use gc::{GcCoordinator, GcFailure, GcReport};
pub use lease::LeaseRegistry;
pub use metrics::RecorderMetrics;
pub use planner::{ReplicationPlan, ReplicationPlanner};
pub use reconciler::{Promotion, StateReconciler};
pub use router::{ReadRouter, RouteDecision, RouteTarget, RoutingPolicy};
pub use sync::{RegionWorker, SyncOrchestrator, WorkerPass};
pub use write_coordinator::WriteCoordinator;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::commit_gate::{ApprovalHandle, CommitGate, QuorumStatus};
    pub use crate::config::ControlConfig;
    pub use crate::consistency::ConsistencyTracker;
    pub use crate::gc::{GcCoordinator, GcReport};
    pub use crate::lease::LeaseRegistry;
    pub use crate::planner::{ReplicationPlan, ReplicationPlanner};
    pub use crate::reconciler::{Promotion, StateReconciler};
    pub use crate::router::{ReadRouter, RouteDecision, RouteTarget, RoutingPolicy};
    pub use crate::sync::{RegionWorker, SyncOrchestrator};
    pub use crate::write_coordinator::WriteCoordinator;
}
