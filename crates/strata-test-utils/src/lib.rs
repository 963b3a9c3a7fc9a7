//! Shared test utilities for strata integration tests.
//!
//! This crate provides:
//! - [`HybridFixture`]: on-prem source of truth plus cloud mirror, wired from
//!   in-memory ports
//! - [`FailingObjectStore`]: in-memory storage with failure injection and
//!   operation recording
//! - [`FailingSyncQueue`]: in-memory sync queue refusing chosen transitions
//! - [`RegionVoter`]: a simulated remote region answering commit votes
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_test_utils::{HybridFixture, RegionVoter};
//!
//! #[tokio::test]
//! async fn mirror_example() {
//!     let fx = HybridFixture::new().await;
//!     let table = fx.create_table("orders").await;
//!     let gate = std::sync::Arc::new(fx.commit_gate());
//!     let _cloud = RegionVoter::approving(gate.clone(), fx.cloud.clone());
//!     // ... run test ...
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod fixtures;
pub mod queue;
pub mod storage;
pub mod voter;

pub use fixtures::*;
pub use queue::*;
pub use storage::*;
pub use voter::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("strata=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
