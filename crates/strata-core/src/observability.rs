//! Logging initialisation and span helpers.
//!
//! Every component logs through `tracing` with structured fields. These
//! helpers keep span names and field names consistent across the crates.

use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines, for log shipping.
    Json,
    /// Human readable output.
    #[default]
    Pretty,
}

/// Installs the global subscriber.
///
/// Levels come from `RUST_LOG` and default to `info`. Only the first call has
/// an effect.
///
/// # Example
///
/// ```rust
/// use strata_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Json);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(env_filter);
        // try_init: an embedding application may already own the global subscriber.
        let _ = match format {
            LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
            LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        };
    });
}

/// Span for an operation on one table.
#[must_use]
pub fn table_span(operation: &str, table: &str) -> Span {
    tracing::info_span!("table", op = operation, table = table)
}

/// Span for an operation run on behalf of one region.
///
/// # Example
///
/// ```rust
/// use strata_core::observability::region_span;
///
/// let span = region_span("process_pending_events", "cloud-eu");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn region_span(operation: &str, region: &str) -> Span {
    tracing::info_span!("region", op = operation, region = region)
}
