//! Metrics port.
//!
//! Components report through [`MetricsSink`] so tests can assert on what was
//! counted. The production sink forwards to the `metrics` facade and lives in
//! `strata-control`.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Receives counters and observations.
pub trait MetricsSink: Send + Sync {
    /// Adds `delta` to the counter `name`.
    fn increment(&self, name: &str, delta: u64);

    /// Records one observation of `value` for `name`.
    fn observe(&self, name: &str, value: f64);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _name: &str, _delta: u64) {}

    fn observe(&self, _name: &str, _value: f64) {}
}

/// Sink that keeps counters and observations in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<String, u64>>,
    observations: Mutex<HashMap<String, Vec<f64>>>,
}

impl InMemoryMetrics {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter (zero if never incremented).
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Every observation recorded for `name`.
    #[must_use]
    pub fn observations(&self, name: &str) -> Vec<f64> {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment(&self, name: &str, delta: u64) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        *counters.entry(name.to_string()).or_insert(0) += delta;
    }

    fn observe(&self, name: &str, value: f64) {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .push(value);
    }
}
