//! # strata-core
//!
//! Core abstractions for the strata hybrid catalog control plane.
//!
//! strata keeps an on-premise source-of-truth catalog consistent with a cloud
//! mirror. This crate holds everything the coordination engine is built on:
//!
//! - **Identifiers**: tables, regions, commits, events and leases
//! - **Data model**: snapshots, manifests, commit requests, delete plans, sync events
//! - **Ports**: the catalog, object store, inventory, consistency, lease,
//!   registry, sync queue and metrics contracts, each with an in-memory adapter
//! - **Error types**: the shared error taxonomy and result alias
//! - **Observability**: logging initialisation and span helpers
//!
//! ## Crate Boundary
//!
//! `strata-core` defines contracts only. Orchestration logic lives in
//! `strata-control` and depends on these traits, never on a concrete backend.
//!
//! ## Example
//!
//! ```rust
//! use strata_core::prelude::*;
//!
//! let table = TableId::new("demo", "orders");
//! let file = FileRef::new("tables/demo/orders/part-0.parquet", 1024);
//! let request = CommitRequest::append(table, RegionId::new("onprem"), vec![file]);
//! assert!(request.has_data_files());
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod catalog;
pub mod commit;
pub mod consistency;
pub mod error;
pub mod id;
pub mod inventory;
pub mod lease;
pub mod metrics;
pub mod object_store;
pub mod observability;
pub mod region;
pub mod registry;
pub mod retention;
pub mod snapshot;
pub mod sync_event;
pub mod sync_queue;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use strata_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::catalog::{Catalog, InMemoryCatalog, TableMetadata};
    pub use crate::commit::{
        ApprovalStatus, CommitApproval, CommitRequest, CommitRequestKey, OperationKind,
    };
    pub use crate::consistency::{ConsistencyStore, ConsistencyToken, InMemoryConsistencyStore};
    pub use crate::error::{Error, Result};
    pub use crate::id::{CommitId, EventId, LeaseId, RegionId, TableId};
    pub use crate::inventory::{InMemoryInventory, Inventory, InventoryIndex};
    pub use crate::lease::{InMemoryLeaseStore, LeaseStore, QueryLease};
    pub use crate::metrics::{InMemoryMetrics, MetricsSink, NoopMetrics};
    pub use crate::object_store::{
        InMemoryStoreProvider, MemoryObjectStore, ObjectStat, ObjectStore, ObjectStoreProvider,
    };
    pub use crate::region::{Region, Side, StorageKind, StorageLocation};
    pub use crate::registry::{InMemoryRegistry, Registry};
    pub use crate::retention::{DeletePlan, SafetyWindow};
    pub use crate::snapshot::{ContentType, FileRef, Manifest, Snapshot, SnapshotId};
    pub use crate::sync_event::{SyncEvent, SyncEventType, SyncStatus};
    pub use crate::sync_queue::{InMemorySyncQueue, SyncQueue};
}

pub use error::{Error, Result};
pub use id::{CommitId, EventId, LeaseId, RegionId, TableId};
